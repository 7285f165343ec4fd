//! In-memory hypervisor for testing.
//!
//! Models machines with adapters and storage controllers, keeps disk images in
//! a map, and lets tests inject failures per operation. It also counts calls
//! and tracks how many calls were in flight at once, which is how the
//! driver's serialization is observed from the outside.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use vboxvol_shared::errors::{VolumeError, VolumeResult};

use super::{
    ChipsetType, DiskHandle, HypervisorClient, MachineHandle, ObjectRef, StorageController,
    SystemProperties,
};
use crate::config::DiskFormat;

/// Operations of [`HypervisorClient`], used to target failures and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    SystemProperties,
    ListMachines,
    ChipsetType,
    MaxNetworkAdapters,
    AdapterMac,
    CreateDiskImage,
    FormatBaseStorage,
    DeleteDiskImage,
    StorageControllers,
    Logoff,
}

/// A machine known to the fake hypervisor.
#[derive(Debug, Clone)]
pub struct FakeMachine {
    pub name: String,
    pub chipset: ChipsetType,
    /// MAC per adapter slot; slots past the end report an empty address.
    pub adapter_macs: Vec<String>,
    pub controllers: Vec<StorageController>,
}

impl FakeMachine {
    pub fn new(name: impl Into<String>, chipset: ChipsetType) -> Self {
        Self {
            name: name.into(),
            chipset,
            adapter_macs: Vec::new(),
            controllers: Vec::new(),
        }
    }

    pub fn with_adapter(mut self, mac: impl Into<String>) -> Self {
        self.adapter_macs.push(mac.into());
        self
    }

    pub fn with_controller(mut self, name: impl Into<String>, bus: impl Into<String>) -> Self {
        self.controllers.push(StorageController {
            name: name.into(),
            bus: bus.into(),
        });
        self
    }
}

/// A disk image created through the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeDisk {
    pub location: PathBuf,
    pub format: DiskFormat,
    /// Set once base storage has been formatted.
    pub logical_size: Option<u64>,
}

#[derive(Debug, Clone)]
enum Failure {
    Fault(String),
    Transport(String),
}

#[derive(Default)]
struct FakeState {
    machines: Vec<FakeMachine>,
    disks: HashMap<DiskHandle, FakeDisk>,
    next_disk: u64,
    failures: HashMap<FakeOp, Failure>,
    calls: HashMap<FakeOp, usize>,
    in_flight: usize,
    max_in_flight: usize,
    logged_off: bool,
}

/// In-memory [`HypervisorClient`].
pub struct FakeHypervisor {
    state: Mutex<FakeState>,
    latency: Option<Duration>,
}

impl FakeHypervisor {
    pub fn new(machines: Vec<FakeMachine>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                machines,
                ..Default::default()
            }),
            latency: None,
        }
    }

    /// Make every call sleep for `latency`, so overlapping calls can be seen.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail `op` with a hypervisor fault until cleared.
    pub fn fail_on(&self, op: FakeOp, message: impl Into<String>) {
        self.state
            .lock()
            .failures
            .insert(op, Failure::Fault(message.into()));
    }

    /// Fail `op` as if the endpoint were unreachable, until cleared.
    pub fn fail_transport_on(&self, op: FakeOp, message: impl Into<String>) {
        self.state
            .lock()
            .failures
            .insert(op, Failure::Transport(message.into()));
    }

    pub fn clear_failure(&self, op: FakeOp) {
        self.state.lock().failures.remove(&op);
    }

    /// Number of times `op` was invoked, failed calls included.
    pub fn calls(&self, op: FakeOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn disk_count(&self) -> usize {
        self.state.lock().disks.len()
    }

    pub fn disk(&self, handle: &DiskHandle) -> Option<FakeDisk> {
        self.state.lock().disks.get(handle).cloned()
    }

    pub fn is_logged_off(&self) -> bool {
        self.state.lock().logged_off
    }

    /// Handle the fake hands out for the machine at `index`.
    pub fn machine_handle(index: usize) -> MachineHandle {
        MachineHandle(ObjectRef::new(format!("machine-{}", index)))
    }

    /// Record the call, apply injected failures and simulate latency.
    async fn begin(&self, op: FakeOp) -> VolumeResult<()> {
        {
            let mut state = self.state.lock();
            *state.calls.entry(op).or_default() += 1;

            if state.logged_off {
                return Err(VolumeError::Transport(
                    "session has been logged off".to_string(),
                ));
            }
            match state.failures.get(&op) {
                Some(Failure::Fault(msg)) => return Err(VolumeError::Hypervisor(msg.clone())),
                Some(Failure::Transport(msg)) => {
                    return Err(VolumeError::Transport(msg.clone()));
                }
                None => {}
            }

            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.state.lock().in_flight -= 1;
        Ok(())
    }

    fn machine(&self, handle: &MachineHandle) -> VolumeResult<FakeMachine> {
        let index = handle
            .0
            .as_str()
            .strip_prefix("machine-")
            .and_then(|i| i.parse::<usize>().ok());
        let state = self.state.lock();
        index
            .and_then(|i| state.machines.get(i).cloned())
            .ok_or_else(|| VolumeError::Hypervisor(format!("no machine with reference {}", handle.0)))
    }
}

#[async_trait::async_trait]
impl HypervisorClient for FakeHypervisor {
    async fn system_properties(&self) -> VolumeResult<SystemProperties> {
        self.begin(FakeOp::SystemProperties).await?;
        Ok(SystemProperties(ObjectRef::new("system-properties")))
    }

    async fn list_machines(&self) -> VolumeResult<Vec<MachineHandle>> {
        self.begin(FakeOp::ListMachines).await?;
        let count = self.state.lock().machines.len();
        Ok((0..count).map(Self::machine_handle).collect())
    }

    async fn chipset_type(&self, machine: &MachineHandle) -> VolumeResult<ChipsetType> {
        self.begin(FakeOp::ChipsetType).await?;
        Ok(self.machine(machine)?.chipset)
    }

    async fn max_network_adapters(
        &self,
        _properties: &SystemProperties,
        chipset: &ChipsetType,
    ) -> VolumeResult<u32> {
        self.begin(FakeOp::MaxNetworkAdapters).await?;
        // Limits VirtualBox reports for its chipsets.
        Ok(match chipset {
            ChipsetType::Piix3 => 8,
            ChipsetType::Ich9 => 36,
            ChipsetType::Other(_) => 4,
        })
    }

    async fn adapter_mac(&self, machine: &MachineHandle, slot: u32) -> VolumeResult<String> {
        self.begin(FakeOp::AdapterMac).await?;
        let machine = self.machine(machine)?;
        Ok(machine
            .adapter_macs
            .get(slot as usize)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_disk_image(
        &self,
        format: DiskFormat,
        location: &Path,
    ) -> VolumeResult<DiskHandle> {
        self.begin(FakeOp::CreateDiskImage).await?;
        let mut state = self.state.lock();
        state.next_disk += 1;
        let handle = DiskHandle(ObjectRef::new(format!("medium-{}", state.next_disk)));
        state.disks.insert(
            handle.clone(),
            FakeDisk {
                location: location.to_path_buf(),
                format,
                logical_size: None,
            },
        );
        Ok(handle)
    }

    async fn format_base_storage(&self, disk: &DiskHandle, logical_size: u64) -> VolumeResult<()> {
        self.begin(FakeOp::FormatBaseStorage).await?;
        let mut state = self.state.lock();
        let entry = state
            .disks
            .get_mut(disk)
            .ok_or_else(|| VolumeError::Hypervisor(format!("no medium with reference {}", disk.0)))?;
        entry.logical_size = Some(logical_size);
        Ok(())
    }

    async fn delete_disk_image(&self, disk: &DiskHandle) -> VolumeResult<()> {
        self.begin(FakeOp::DeleteDiskImage).await?;
        self.state
            .lock()
            .disks
            .remove(disk)
            .map(|_| ())
            .ok_or_else(|| VolumeError::Hypervisor(format!("no medium with reference {}", disk.0)))
    }

    async fn storage_controllers(
        &self,
        machine: &MachineHandle,
    ) -> VolumeResult<Vec<StorageController>> {
        self.begin(FakeOp::StorageControllers).await?;
        Ok(self.machine(machine)?.controllers)
    }

    async fn logoff(&self) -> VolumeResult<()> {
        self.begin(FakeOp::Logoff).await?;
        self.state.lock().logged_off = true;
        Ok(())
    }
}
