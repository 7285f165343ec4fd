//! Volume lifecycle driver.
//!
//! Implements the plugin verbs on top of a [`HypervisorClient`] session and the
//! machine resolved at startup.
//!
//! **Locking**: Create and Remove take one driver-wide structural lock for
//! their whole duration, across all volume names, so at most one structural
//! mutation is ever in flight. The registry map has its own short-held lock:
//! Get and List take only that one and never wait behind a slow hypervisor
//! call. Mount, Unmount and Path take neither; a Mount racing a Remove of the
//! same name can observe the volume mid-transition.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use vboxvol_shared::errors::{VolumeError, VolumeResult};

use super::registry::{Volume, VolumeRegistry};
use crate::config::DriverOptions;
use crate::hypervisor::HypervisorClient;
use crate::net::HostAddresses;
use crate::resolver::{Machine, MachineResolver};

pub struct VolumeDriver {
    client: Arc<dyn HypervisorClient>,
    machine: Machine,
    options: DriverOptions,
    /// Serializes Create and Remove; held across hypervisor calls.
    structural: Mutex<()>,
    /// Only ever held for a map operation, never across `.await`.
    registry: RwLock<VolumeRegistry>,
}

impl std::fmt::Debug for VolumeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeDriver")
            .field("machine", &self.machine)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl VolumeDriver {
    /// Create a driver bound to an already resolved machine.
    pub fn new(client: Arc<dyn HypervisorClient>, machine: Machine, options: DriverOptions) -> Self {
        Self {
            client,
            machine,
            options,
            structural: Mutex::new(()),
            registry: RwLock::new(VolumeRegistry::new()),
        }
    }

    /// Validate options, resolve the current machine and build the driver.
    ///
    /// The registry starts empty: images from earlier runs are not adopted.
    pub async fn bootstrap(
        client: Arc<dyn HypervisorClient>,
        host: &HostAddresses,
        options: DriverOptions,
    ) -> VolumeResult<Self> {
        options.validate()?;
        let machine = MachineResolver::new(client.as_ref()).resolve(host).await?;
        Ok(Self::new(client, machine, options))
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Host path of the disk image backing `name`.
    pub fn storage_location(&self, name: &str) -> PathBuf {
        self.options.storage_location_root.join(format!(
            "{}.{}",
            name,
            self.options.disk_format.extension()
        ))
    }

    /// Mountpoint reported for `name`; independent of registry state.
    pub fn path(&self, name: &str) -> PathBuf {
        let mountpoint = self.options.mount_root.join(name);
        tracing::debug!(volume = %name, mountpoint = %mountpoint.display(), "Path");
        mountpoint
    }

    /// Allocate and format a disk image for `name` and register it.
    ///
    /// A second Create for a registered name allocates a fresh image and
    /// replaces the registry entry; the earlier image is left in place.
    pub async fn create(&self, name: &str) -> VolumeResult<()> {
        validate_name(name)?;

        let _structural = self.structural.lock().await;

        let location = self.storage_location(name);
        tracing::info!(volume = %name, location = %location.display(), "Creating volume");

        let disk = self
            .client
            .create_disk_image(self.options.disk_format, &location)
            .await?;
        tracing::debug!(volume = %name, disk = %disk.0, "Disk image registered");

        if let Err(e) = self
            .client
            .format_base_storage(&disk, self.options.base_storage_size)
            .await
        {
            // The image stays known to the hypervisor but unregistered here.
            tracing::warn!(
                volume = %name,
                disk = %disk.0,
                error = %e,
                "Formatting base storage failed; disk image left allocated"
            );
            return Err(e);
        }

        let replaced = self.registry.write().insert(Volume {
            name: name.to_string(),
            storage_location: location,
            disk,
        });
        if let Some(old) = replaced {
            tracing::warn!(
                volume = %name,
                disk = %old.disk.0,
                "Volume re-created; previous disk image is no longer tracked"
            );
        }

        tracing::info!(volume = %name, "Volume created");
        Ok(())
    }

    /// Delete the disk image for `name` and forget it.
    ///
    /// Removing an unregistered name succeeds without touching the hypervisor.
    /// If deletion fails the entry is kept so the caller can retry.
    pub async fn remove(&self, name: &str) -> VolumeResult<()> {
        let _structural = self.structural.lock().await;

        let registered = self.registry.read().lookup(name).map(|v| v.disk.clone());
        let disk = match registered {
            Ok(disk) => disk,
            Err(_) => {
                tracing::debug!(volume = %name, "Remove of unknown volume; nothing to do");
                return Ok(());
            }
        };

        tracing::info!(volume = %name, disk = %disk.0, "Removing volume");
        self.client.delete_disk_image(&disk).await?;
        self.registry.write().remove(name);

        tracing::info!(volume = %name, "Volume removed");
        Ok(())
    }

    /// Report the mountpoint for `name`.
    ///
    /// Attaching the image to a controller is not done here; the machine's
    /// storage controllers are listed for diagnostics only, and an empty list
    /// is not an error.
    pub async fn mount(&self, name: &str) -> VolumeResult<PathBuf> {
        tracing::info!(volume = %name, "Mounting volume");

        let controllers = self.client.storage_controllers(&self.machine.handle).await?;
        for controller in &controllers {
            tracing::debug!(
                volume = %name,
                controller = %controller.name,
                bus = %controller.bus,
                "Storage controller"
            );
        }

        Ok(self.path(name))
    }

    pub async fn unmount(&self, name: &str) -> VolumeResult<()> {
        tracing::info!(volume = %name, "Unmounting volume");
        Ok(())
    }

    /// Registered volume `name`, if any.
    pub async fn get(&self, name: &str) -> VolumeResult<Volume> {
        self.registry.read().lookup(name).cloned()
    }

    /// All registered volumes, sorted by name.
    pub async fn list(&self) -> Vec<Volume> {
        let mut volumes: Vec<_> = self.registry.read().iter().cloned().collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        volumes
    }

    /// End the hypervisor session. Called once on shutdown.
    pub async fn shutdown(&self) -> VolumeResult<()> {
        let registered = self.registry.read().len();
        if registered > 0 {
            tracing::info!(
                count = registered,
                "Shutting down with registered volumes; their images stay on the host"
            );
        }
        self.client.logoff().await
    }
}

/// Reject names that would place the image outside the storage root.
fn validate_name(name: &str) -> VolumeResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(VolumeError::InvalidRequest(format!(
            "invalid volume name '{}'",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::{ChipsetType, FakeHypervisor, FakeMachine, FakeOp};

    fn driver_with(fake: Arc<FakeHypervisor>, root: &str) -> VolumeDriver {
        let machine = Machine {
            handle: FakeHypervisor::machine_handle(0),
            chipset: ChipsetType::Piix3,
        };
        let mut options = DriverOptions::new(root);
        options.mount_root = PathBuf::from("/mnt");
        VolumeDriver::new(fake, machine, options)
    }

    fn fake() -> Arc<FakeHypervisor> {
        Arc::new(FakeHypervisor::new(vec![
            FakeMachine::new("default", ChipsetType::Piix3)
                .with_adapter("080027000001")
                .with_controller("SATA", "SATA"),
        ]))
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("data").is_ok());
        assert!(validate_name("my-vol_1.backup").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("/abs").is_err());
        assert!(validate_name("a\\b").is_err());
    }

    #[test]
    fn test_storage_location_uses_format_extension() {
        let driver = driver_with(fake(), "/data");
        assert_eq!(driver.storage_location("vol1"), PathBuf::from("/data/vol1.vmdk"));
    }

    #[tokio::test]
    async fn test_invalid_name_makes_no_hypervisor_call() {
        let fake = fake();
        let driver = driver_with(fake.clone(), "/data");

        let err = driver.create("../escape").await.unwrap_err();
        assert!(matches!(err, VolumeError::InvalidRequest(_)));
        assert_eq!(fake.calls(FakeOp::CreateDiskImage), 0);
    }

    #[tokio::test]
    async fn test_create_formats_with_configured_size() {
        let fake = fake();
        let driver = driver_with(fake.clone(), "/data");

        driver.create("v1").await.unwrap();

        let volume = driver.get("v1").await.unwrap();
        let disk = fake.disk(&volume.disk).unwrap();
        assert_eq!(disk.logical_size, Some(1_000_000));
        assert_eq!(disk.location, PathBuf::from("/data/v1.vmdk"));
    }

    #[tokio::test]
    async fn test_mount_lists_controllers_and_returns_path() {
        let fake = fake();
        let driver = driver_with(fake.clone(), "/data");

        let mountpoint = driver.mount("v1").await.unwrap();
        assert_eq!(mountpoint, PathBuf::from("/mnt/v1"));
        assert_eq!(fake.calls(FakeOp::StorageControllers), 1);
    }

    #[tokio::test]
    async fn test_shutdown_logs_off() {
        let fake = fake();
        let driver = driver_with(fake.clone(), "/data");
        driver.shutdown().await.unwrap();
        assert!(fake.is_logged_off());
    }
}
