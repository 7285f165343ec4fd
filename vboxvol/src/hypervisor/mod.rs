//! Hypervisor capability interface.
//!
//! The driver only ever talks to VirtualBox through [`HypervisorClient`].
//! [`VboxWebClient`] is the production implementation over `vboxwebsrv`;
//! [`FakeHypervisor`] is an in-memory stand-in for tests.

mod fake;
mod soap;
mod vboxweb;

pub use fake::{FakeHypervisor, FakeMachine, FakeOp};
pub use vboxweb::VboxWebClient;

use std::path::Path;

use serde::{Deserialize, Serialize};
use vboxvol_shared::errors::VolumeResult;

use crate::config::DiskFormat;

/// Reference to a `vboxwebsrv` managed object.
///
/// Opaque to the driver; only the client that produced it can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef(String);

impl ObjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineHandle(pub ObjectRef);

/// Handle to a disk image (an `IMedium`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiskHandle(pub ObjectRef);

/// Handle to the hypervisor-wide system properties object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SystemProperties(pub ObjectRef);

/// Emulated chipset of a machine; bounds its network adapter count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChipsetType {
    Piix3,
    Ich9,
    /// Any value this driver does not know by name, kept verbatim.
    Other(String),
}

impl ChipsetType {
    /// Wire name used by the VirtualBox API.
    pub fn as_str(&self) -> &str {
        match self {
            ChipsetType::Piix3 => "PIIX3",
            ChipsetType::Ich9 => "ICH9",
            ChipsetType::Other(name) => name,
        }
    }

    pub fn from_wire(value: &str) -> Self {
        match value {
            "PIIX3" => ChipsetType::Piix3,
            "ICH9" => ChipsetType::Ich9,
            other => ChipsetType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ChipsetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A machine's storage controller (attachment point for disk images).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageController {
    pub name: String,
    /// Bus type as reported by the hypervisor (`SATA`, `IDE`, ...).
    pub bus: String,
}

/// Capabilities the driver needs from the hypervisor.
///
/// Implementations hold an already authenticated session and are shared
/// read-only between requests.
#[async_trait::async_trait]
pub trait HypervisorClient: Send + Sync {
    /// Fetch the system properties object used for per-chipset limits.
    async fn system_properties(&self) -> VolumeResult<SystemProperties>;

    /// All registered machines, in hypervisor order.
    async fn list_machines(&self) -> VolumeResult<Vec<MachineHandle>>;

    async fn chipset_type(&self, machine: &MachineHandle) -> VolumeResult<ChipsetType>;

    /// Maximum number of network adapters a machine with `chipset` can have.
    async fn max_network_adapters(
        &self,
        properties: &SystemProperties,
        chipset: &ChipsetType,
    ) -> VolumeResult<u32>;

    /// MAC address of the adapter in `slot`, as reported (unnormalized).
    async fn adapter_mac(&self, machine: &MachineHandle, slot: u32) -> VolumeResult<String>;

    /// Register a new disk image at `location`. No storage is allocated yet.
    async fn create_disk_image(
        &self,
        format: DiskFormat,
        location: &Path,
    ) -> VolumeResult<DiskHandle>;

    /// Allocate the base storage of `disk`, waiting for completion.
    async fn format_base_storage(&self, disk: &DiskHandle, logical_size: u64) -> VolumeResult<()>;

    /// Delete the backing storage of `disk`, waiting for completion.
    async fn delete_disk_image(&self, disk: &DiskHandle) -> VolumeResult<()>;

    async fn storage_controllers(
        &self,
        machine: &MachineHandle,
    ) -> VolumeResult<Vec<StorageController>>;

    /// End the session. Further calls fail.
    async fn logoff(&self) -> VolumeResult<()>;
}
