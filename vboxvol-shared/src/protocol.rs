//! Docker volume plugin wire types.
//!
//! Every verb is an HTTP `POST` carrying a JSON body. Field names follow the
//! engine's Go conventions, hence the PascalCase renames.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Content type the engine expects on plugin responses.
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1+json";

/// Plugin subsystem advertised by `Plugin.Activate`.
pub const VOLUME_DRIVER_SUBSYSTEM: &str = "VolumeDriver";

/// Request body shared by the name-based verbs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeRequest {
    pub name: String,
    /// Driver options given to `docker volume create -o`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<HashMap<String, String>>,
    /// Caller id sent with Mount/Unmount by newer engines.
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl VolumeRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Response to Create/Remove/Mount/Path/Unmount.
///
/// An empty `err` signals success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeResponse {
    #[serde(default)]
    pub mountpoint: String,
    #[serde(default)]
    pub err: String,
}

impl VolumeResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_mountpoint(mountpoint: impl Into<String>) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            err: String::new(),
        }
    }

    pub fn error(err: impl Into<String>) -> Self {
        Self {
            mountpoint: String::new(),
            err: err.into(),
        }
    }
}

/// Volume description used by List and Get.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListResponse {
    pub volumes: Vec<VolumeInfo>,
    #[serde(default)]
    pub err: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeInfo>,
    #[serde(default)]
    pub err: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<String>,
}

impl Default for ActivateResponse {
    fn default() -> Self {
        Self {
            implements: vec![VOLUME_DRIVER_SUBSYSTEM.to_string()],
        }
    }
}

/// Volume scope reported through `VolumeDriver.Capabilities`.
///
/// Disk images live on one VirtualBox host, so volumes are always local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capabilities {
    pub scope: Scope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub capabilities: Capabilities,
}
