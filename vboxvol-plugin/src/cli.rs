//! Command-line flags for the plugin daemon.
//!
//! Every flag that names a host resource can also be set from the environment,
//! which is how the plugin is usually configured when run as a system service.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vboxvol::config::{
    self, DEFAULT_BASE_STORAGE_SIZE, DEFAULT_DRAIN_TIMEOUT, DEFAULT_VBOXWEBSRV_URL,
};
use vboxvol::{DiskFormat, DriverOptions, HypervisorOptions};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "vboxvol-plugin",
    author,
    version,
    about = "Docker volume plugin backed by VirtualBox disk images"
)]
pub struct PluginArgs {
    /// Host directory where disk images are created
    #[arg(long, env = "VBOXVOL_STORAGE_LOCATION_ROOT")]
    pub storage_location_root: Option<PathBuf>,

    /// Directory reported to Docker as the parent of volume mountpoints
    #[arg(long, env = "VBOXVOL_MOUNT_ROOT", default_value_os_t = config::default_mount_root())]
    pub mount_root: PathBuf,

    /// Plugin socket Docker discovers the driver on
    #[arg(long, env = "VBOXVOL_SOCKET", default_value_os_t = config::default_socket_path())]
    pub socket_path: PathBuf,

    /// vboxwebsrv endpoint on the VirtualBox host
    #[arg(long, env = "VBOXWEBSRV_URL", default_value = DEFAULT_VBOXWEBSRV_URL)]
    pub vboxwebsrv_url: String,

    /// vboxwebsrv user
    #[arg(long, env = "VBOXWEBSRV_USERNAME", default_value = "")]
    pub vboxwebsrv_username: String,

    /// vboxwebsrv password
    #[arg(long, env = "VBOXWEBSRV_PASSWORD", default_value = "", hide_env_values = true)]
    pub vboxwebsrv_password: String,

    /// Per-call timeout for vboxwebsrv requests, in seconds
    #[arg(long, value_name = "SECS")]
    pub vboxwebsrv_timeout: Option<u64>,

    /// Disk image format (vmdk, vdi, vhd)
    #[arg(long, default_value_t = DiskFormat::default())]
    pub disk_format: DiskFormat,

    /// Logical size passed to the hypervisor when formatting a new image
    #[arg(long, default_value_t = DEFAULT_BASE_STORAGE_SIZE)]
    pub base_storage_size: u64,

    /// Seconds to let in-flight requests finish after SIGINT/SIGTERM
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_DRAIN_TIMEOUT.as_secs())]
    pub shutdown_timeout: u64,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, env = "VBOXVOL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl PluginArgs {
    /// Driver settings. A missing storage root is left empty and rejected by
    /// [`DriverOptions::validate`].
    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            storage_location_root: self.storage_location_root.clone().unwrap_or_default(),
            mount_root: self.mount_root.clone(),
            disk_format: self.disk_format,
            base_storage_size: self.base_storage_size,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    pub fn hypervisor_options(&self) -> HypervisorOptions {
        HypervisorOptions {
            url: self.vboxwebsrv_url.clone(),
            username: self.vboxwebsrv_username.clone(),
            password: self.vboxwebsrv_password.clone(),
            timeout: self.vboxwebsrv_timeout.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> PluginArgs {
        PluginArgs::try_parse_from(std::iter::once("vboxvol-plugin").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--storage-location-root", "/data"]);
        let driver = args.driver_options();
        assert_eq!(driver.storage_location_root, PathBuf::from("/data"));
        assert_eq!(driver.disk_format, DiskFormat::Vmdk);
        assert_eq!(driver.base_storage_size, 1_000_000);
        assert!(driver.validate().is_ok());

        assert_eq!(args.drain_timeout(), Duration::from_secs(10));

        let hypervisor = args.hypervisor_options();
        assert_eq!(hypervisor.timeout, None);
        assert!(hypervisor.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "--storage-location-root",
            "/data",
            "--mount-root",
            "/mnt/vols",
            "--disk-format",
            "vdi",
            "--base-storage-size",
            "2048",
            "--vboxwebsrv-url",
            "http://10.0.2.2:18083",
            "--vboxwebsrv-timeout",
            "30",
            "--shutdown-timeout",
            "3",
        ]);
        assert_eq!(args.drain_timeout(), Duration::from_secs(3));
        let driver = args.driver_options();
        assert_eq!(driver.mount_root, PathBuf::from("/mnt/vols"));
        assert_eq!(driver.disk_format, DiskFormat::Vdi);
        assert_eq!(driver.base_storage_size, 2048);

        let hypervisor = args.hypervisor_options();
        assert_eq!(hypervisor.url, "http://10.0.2.2:18083");
        assert_eq!(hypervisor.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_missing_storage_root_fails_validation() {
        let args = parse(&[]);
        assert!(args.driver_options().validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_disk_format() {
        let result = PluginArgs::try_parse_from([
            "vboxvol-plugin",
            "--storage-location-root",
            "/data",
            "--disk-format",
            "qcow2",
        ]);
        assert!(result.is_err());
    }
}
