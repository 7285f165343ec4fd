//! Types shared between the vboxvol library and the plugin binary.

pub mod errors;
pub mod protocol;

pub use errors::{VolumeError, VolumeResult};
pub use protocol::{
    ActivateResponse, Capabilities, CapabilitiesResponse, GetResponse, ListResponse,
    PLUGIN_CONTENT_TYPE, Scope, VolumeInfo, VolumeRequest, VolumeResponse,
};
