//! Driver and hypervisor configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vboxvol_shared::errors::{VolumeError, VolumeResult};

/// Plugin name; also the socket file stem.
pub const PLUGIN_ID: &str = "virtualbox";

/// Directory where the engine discovers plugin sockets.
pub const PLUGIN_SOCKET_DIR: &str = "/run/docker/plugins";

/// The engine's own volume root; our mountpoints live beside its volumes.
pub const DOCKER_VOLUMES_ROOT: &str = "/var/lib/docker/volumes";

/// Address of `vboxwebsrv` as seen from a docker-machine VM on the host-only network.
pub const DEFAULT_VBOXWEBSRV_URL: &str = "http://192.168.99.1:18083";

/// Logical size handed to `createBaseStorage` (hypervisor-defined unit, bytes).
pub const DEFAULT_BASE_STORAGE_SIZE: u64 = 1_000_000;

/// How long the plugin server drains in-flight requests after a shutdown signal.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn default_socket_path() -> PathBuf {
    PathBuf::from(PLUGIN_SOCKET_DIR).join(format!("{}.sock", PLUGIN_ID))
}

pub fn default_mount_root() -> PathBuf {
    PathBuf::from(DOCKER_VOLUMES_ROOT).join(format!("_{}", PLUGIN_ID))
}

/// Disk image format.
///
/// The lowercase name doubles as the file extension of the image.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    /// VMware virtual disk, VirtualBox's choice for portable images.
    #[default]
    Vmdk,
    /// Native VirtualBox disk image.
    Vdi,
    /// Microsoft virtual hard disk.
    Vhd,
}

impl DiskFormat {
    /// Format identifier passed to the hypervisor.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Vmdk => "vmdk",
            DiskFormat::Vdi => "vdi",
            DiskFormat::Vhd => "vhd",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiskFormat {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vmdk" => Ok(DiskFormat::Vmdk),
            "vdi" => Ok(DiskFormat::Vdi),
            "vhd" => Ok(DiskFormat::Vhd),
            _ => Err(VolumeError::Config(format!(
                "Unknown disk format: '{}'. Supported: vmdk, vdi, vhd",
                s
            ))),
        }
    }
}

/// Settings consumed by [`VolumeDriver`](crate::VolumeDriver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    /// Host-side directory in which disk images are created.
    pub storage_location_root: PathBuf,
    /// Directory inside the VM under which mountpoints are reported.
    pub mount_root: PathBuf,
    pub disk_format: DiskFormat,
    pub base_storage_size: u64,
}

impl DriverOptions {
    /// Options with the default mount root, format and size.
    pub fn new(storage_location_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_location_root: storage_location_root.into(),
            mount_root: default_mount_root(),
            disk_format: DiskFormat::default(),
            base_storage_size: DEFAULT_BASE_STORAGE_SIZE,
        }
    }

    /// Check preconditions that make startup fatal.
    pub fn validate(&self) -> VolumeResult<()> {
        if self.storage_location_root.as_os_str().is_empty() {
            return Err(VolumeError::Config(
                "Storage location root must be specified with --storage-location-root"
                    .to_string(),
            ));
        }
        if self.mount_root.as_os_str().is_empty() {
            return Err(VolumeError::Config("mount root must not be empty".to_string()));
        }
        if self.base_storage_size == 0 {
            return Err(VolumeError::Config(
                "base storage size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection settings for the `vboxwebsrv` endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct HypervisorOptions {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Per-call timeout. `None` waits as long as the hypervisor takes.
    pub timeout: Option<Duration>,
}

impl HypervisorOptions {
    pub fn validate(&self) -> VolumeResult<()> {
        if self.url.starts_with("https://") {
            return Err(VolumeError::Config(format!(
                "vboxwebsrv URL must use plain http, TLS is not supported: '{}'",
                self.url
            )));
        }
        if !self.url.starts_with("http://") {
            return Err(VolumeError::Config(format!(
                "vboxwebsrv URL must be http, got: '{}'",
                self.url
            )));
        }
        Ok(())
    }
}

impl Default for HypervisorOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_VBOXWEBSRV_URL.to_string(),
            username: String::new(),
            password: String::new(),
            timeout: None,
        }
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for HypervisorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HypervisorOptions")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        assert_eq!(
            default_socket_path(),
            PathBuf::from("/run/docker/plugins/virtualbox.sock")
        );
        assert_eq!(
            default_mount_root(),
            PathBuf::from("/var/lib/docker/volumes/_virtualbox")
        );
    }

    #[test]
    fn test_disk_format_from_str() {
        assert_eq!("vmdk".parse::<DiskFormat>().unwrap(), DiskFormat::Vmdk);
        assert_eq!("VDI".parse::<DiskFormat>().unwrap(), DiskFormat::Vdi);
        assert_eq!("vhd".parse::<DiskFormat>().unwrap(), DiskFormat::Vhd);
        assert!("qcow2".parse::<DiskFormat>().is_err());
    }

    #[test]
    fn test_disk_format_extension() {
        assert_eq!(DiskFormat::default().extension(), "vmdk");
        assert_eq!(DiskFormat::Vdi.to_string(), "vdi");
    }

    #[test]
    fn test_driver_options_require_storage_root() {
        let opts = DriverOptions::new("");
        assert!(matches!(opts.validate(), Err(VolumeError::Config(_))));

        let opts = DriverOptions::new("/data");
        assert!(opts.validate().is_ok());
        assert_eq!(opts.base_storage_size, 1_000_000);
    }

    #[test]
    fn test_hypervisor_options_url_scheme() {
        assert!(HypervisorOptions::default().validate().is_ok());

        let opts = HypervisorOptions {
            url: "192.168.99.1:18083".into(),
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_hypervisor_options_reject_https() {
        let opts = HypervisorOptions {
            url: "https://192.168.99.1:18083".into(),
            ..Default::default()
        };
        match opts.validate() {
            Err(VolumeError::Config(msg)) => assert!(msg.contains("TLS is not supported")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_hypervisor_options_debug_hides_password() {
        let opts = HypervisorOptions {
            password: "hunter2".into(),
            ..Default::default()
        };
        assert!(!format!("{:?}", opts).contains("hunter2"));
    }
}
