//! Identification of the machine this process runs in.
//!
//! The plugin runs inside a VirtualBox guest but manages that guest's disks
//! through the host's webservice, so it first has to work out which of the
//! host's machines it is. It does so by matching the hardware addresses of
//! the local interfaces against every machine's adapter MACs.

use vboxvol_shared::errors::{VolumeError, VolumeResult};

use crate::hypervisor::{ChipsetType, HypervisorClient, MachineHandle};
use crate::net::HostAddresses;

/// The machine the driver is bound to for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub handle: MachineHandle,
    pub chipset: ChipsetType,
}

/// Resolves the current machine through a [`HypervisorClient`].
pub struct MachineResolver<'a> {
    client: &'a dyn HypervisorClient,
}

impl<'a> MachineResolver<'a> {
    pub fn new(client: &'a dyn HypervisorClient) -> Self {
        Self { client }
    }

    /// Find the first machine, in hypervisor order, owning one of `host`'s MACs.
    ///
    /// Probing stops at the first matching adapter.
    ///
    /// # Errors
    ///
    /// - `MachineNotFound` if no adapter of any machine matches.
    /// - `ResolutionTransport` if any hypervisor call fails; a failed call is
    ///   never treated as "no match".
    pub async fn resolve(&self, host: &HostAddresses) -> VolumeResult<Machine> {
        if host.is_empty() {
            tracing::warn!("No local interface has a hardware address; no machine can match");
        }

        let properties = self.client.system_properties().await.map_err(resolution)?;
        let machines = self.client.list_machines().await.map_err(resolution)?;

        tracing::debug!(count = machines.len(), "Probing machines for a matching adapter");

        for handle in machines {
            let chipset = self.client.chipset_type(&handle).await.map_err(resolution)?;
            let max_adapters = self
                .client
                .max_network_adapters(&properties, &chipset)
                .await
                .map_err(resolution)?;

            for slot in 0..max_adapters {
                let mac = self
                    .client
                    .adapter_mac(&handle, slot)
                    .await
                    .map_err(resolution)?;

                if host.contains(&mac) {
                    tracing::info!(
                        machine = %handle.0,
                        chipset = %chipset,
                        slot,
                        mac = %mac,
                        "Resolved current machine"
                    );
                    return Ok(Machine { handle, chipset });
                }
            }
        }

        Err(VolumeError::MachineNotFound)
    }
}

fn resolution(err: VolumeError) -> VolumeError {
    VolumeError::ResolutionTransport(err.message())
}
