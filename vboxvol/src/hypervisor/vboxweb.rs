//! `vboxwebsrv` client.
//!
//! Talks SOAP over HTTP to the VirtualBox webservice running on the host.
//! A session is opened once with [`VboxWebClient::logon`] and the returned
//! `IVirtualBox` reference is used for every later call.

use std::path::Path;

use reqwest::header::CONTENT_TYPE;
use vboxvol_shared::errors::{VolumeError, VolumeResult};

use super::soap::{self, SoapCall};
use super::{
    ChipsetType, DiskHandle, HypervisorClient, MachineHandle, ObjectRef, StorageController,
    SystemProperties,
};
use crate::config::{DiskFormat, HypervisorOptions};

/// Production [`HypervisorClient`] backed by `vboxwebsrv`.
pub struct VboxWebClient {
    http: reqwest::Client,
    url: String,
    /// `IVirtualBox` reference returned by logon.
    session: ObjectRef,
}

impl std::fmt::Debug for VboxWebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VboxWebClient")
            .field("url", &self.url)
            .field("session", &self.session)
            .finish()
    }
}

impl VboxWebClient {
    /// Open a webservice session.
    ///
    /// # Errors
    ///
    /// `Hypervisor` if the credentials are rejected, `Transport` if the
    /// endpoint cannot be reached.
    pub async fn logon(options: &HypervisorOptions) -> VolumeResult<Self> {
        options.validate()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| {
            VolumeError::Config(format!("Failed to create HTTP client: {}", e))
        })?;

        let call = SoapCall::new("IWebsessionManager_logon")
            .arg("username", &options.username)
            .arg("password", &options.password);
        let session = first(&call, invoke(&http, &options.url, &call).await?)?;

        tracing::info!(url = %options.url, "Logged on to vboxwebsrv");

        Ok(Self {
            http,
            url: options.url.clone(),
            session: ObjectRef::new(session),
        })
    }

    /// The `IVirtualBox` reference of this session.
    pub fn session(&self) -> &ObjectRef {
        &self.session
    }

    async fn call(&self, call: SoapCall) -> VolumeResult<Vec<String>> {
        invoke(&self.http, &self.url, &call).await
    }

    /// Call a method that returns exactly one value.
    async fn call_one(&self, call: SoapCall) -> VolumeResult<String> {
        let values = invoke(&self.http, &self.url, &call).await?;
        first(&call, values)
    }

    /// Block until a progress object finishes and map failure to an error.
    async fn wait_for_progress(&self, progress: &str) -> VolumeResult<()> {
        self.call(
            SoapCall::new("IProgress_waitForCompletion")
                .arg("_this", progress)
                .arg("timeout", -1),
        )
        .await?;

        let code = self
            .call_one(SoapCall::new("IProgress_getResultCode").arg("_this", progress))
            .await?;
        let code: i32 = code.trim().parse().map_err(|_| {
            VolumeError::Transport(format!("invalid progress result code: '{}'", code))
        })?;
        if code == 0 {
            return Ok(());
        }

        let info = self
            .call_one(SoapCall::new("IProgress_getErrorInfo").arg("_this", progress))
            .await?;
        let text = if info.is_empty() {
            String::new()
        } else {
            self.call_one(SoapCall::new("IVirtualBoxErrorInfo_getText").arg("_this", &info))
                .await?
        };

        if text.is_empty() {
            Err(VolumeError::Hypervisor(format!(
                "operation failed with result code {:#010x}",
                code as u32
            )))
        } else {
            Err(VolumeError::Hypervisor(text))
        }
    }
}

#[async_trait::async_trait]
impl HypervisorClient for VboxWebClient {
    async fn system_properties(&self) -> VolumeResult<SystemProperties> {
        let props = self
            .call_one(SoapCall::new("IVirtualBox_getSystemProperties").arg("_this", &self.session))
            .await?;
        Ok(SystemProperties(ObjectRef::new(props)))
    }

    async fn list_machines(&self) -> VolumeResult<Vec<MachineHandle>> {
        let machines = self
            .call(SoapCall::new("IVirtualBox_getMachines").arg("_this", &self.session))
            .await?;
        Ok(machines
            .into_iter()
            .filter(|m| !m.is_empty())
            .map(|m| MachineHandle(ObjectRef::new(m)))
            .collect())
    }

    async fn chipset_type(&self, machine: &MachineHandle) -> VolumeResult<ChipsetType> {
        let chipset = self
            .call_one(SoapCall::new("IMachine_getChipsetType").arg("_this", &machine.0))
            .await?;
        Ok(ChipsetType::from_wire(&chipset))
    }

    async fn max_network_adapters(
        &self,
        properties: &SystemProperties,
        chipset: &ChipsetType,
    ) -> VolumeResult<u32> {
        let max = self
            .call_one(
                SoapCall::new("ISystemProperties_getMaxNetworkAdapters")
                    .arg("_this", &properties.0)
                    .arg("chipset", chipset),
            )
            .await?;
        max.trim().parse().map_err(|_| {
            VolumeError::Transport(format!("invalid network adapter count: '{}'", max))
        })
    }

    async fn adapter_mac(&self, machine: &MachineHandle, slot: u32) -> VolumeResult<String> {
        let adapter = self
            .call_one(
                SoapCall::new("IMachine_getNetworkAdapter")
                    .arg("_this", &machine.0)
                    .arg("slot", slot),
            )
            .await?;
        self.call_one(SoapCall::new("INetworkAdapter_getMACAddress").arg("_this", &adapter))
            .await
    }

    async fn create_disk_image(
        &self,
        format: DiskFormat,
        location: &Path,
    ) -> VolumeResult<DiskHandle> {
        let medium = self
            .call_one(
                SoapCall::new("IVirtualBox_createMedium")
                    .arg("_this", &self.session)
                    .arg("format", format)
                    .arg("location", location.display())
                    .arg("accessMode", "ReadWrite")
                    .arg("aDeviceTypeHint", "HardDisk"),
            )
            .await?;
        Ok(DiskHandle(ObjectRef::new(medium)))
    }

    async fn format_base_storage(&self, disk: &DiskHandle, logical_size: u64) -> VolumeResult<()> {
        let progress = self
            .call_one(
                SoapCall::new("IMedium_createBaseStorage")
                    .arg("_this", &disk.0)
                    .arg("logicalSize", logical_size)
                    .arg("variant", "Standard"),
            )
            .await?;
        self.wait_for_progress(&progress).await
    }

    async fn delete_disk_image(&self, disk: &DiskHandle) -> VolumeResult<()> {
        let progress = self
            .call_one(SoapCall::new("IMedium_deleteStorage").arg("_this", &disk.0))
            .await?;
        self.wait_for_progress(&progress).await
    }

    async fn storage_controllers(
        &self,
        machine: &MachineHandle,
    ) -> VolumeResult<Vec<StorageController>> {
        let refs = self
            .call(SoapCall::new("IMachine_getStorageControllers").arg("_this", &machine.0))
            .await?;

        let mut controllers = Vec::with_capacity(refs.len());
        for controller in refs.iter().filter(|r| !r.is_empty()) {
            let name = self
                .call_one(SoapCall::new("IStorageController_getName").arg("_this", controller))
                .await?;
            let bus = self
                .call_one(SoapCall::new("IStorageController_getBus").arg("_this", controller))
                .await?;
            controllers.push(StorageController { name, bus });
        }
        Ok(controllers)
    }

    async fn logoff(&self) -> VolumeResult<()> {
        self.call(SoapCall::new("IWebsessionManager_logoff").arg("refIVirtualBox", &self.session))
            .await?;
        tracing::info!(url = %self.url, "Logged off vboxwebsrv");
        Ok(())
    }
}

/// POST one call and decode its return values.
async fn invoke(http: &reqwest::Client, url: &str, call: &SoapCall) -> VolumeResult<Vec<String>> {
    tracing::trace!(method = call.method(), "vboxwebsrv call");

    let response = http
        .post(url)
        .header(CONTENT_TYPE, "text/xml; charset=utf-8")
        .header("SOAPAction", "\"\"")
        .body(call.envelope())
        .send()
        .await
        .map_err(|e| VolumeError::Transport(format!("{}: {}", call.method(), e)))?;

    // Faults arrive with HTTP 500, so the body is decoded regardless of status.
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| VolumeError::Transport(format!("{}: {}", call.method(), e)))?;

    match soap::parse_response(&body) {
        Err(VolumeError::Transport(msg)) => Err(VolumeError::Transport(format!(
            "{} returned HTTP {}: {}",
            call.method(),
            status,
            msg
        ))),
        other => other,
    }
}

fn first(call: &SoapCall, values: Vec<String>) -> VolumeResult<String> {
    values.into_iter().next().ok_or_else(|| {
        VolumeError::Transport(format!("{} returned no value", call.method()))
    })
}
