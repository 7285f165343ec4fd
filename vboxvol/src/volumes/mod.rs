//! Volume registry and lifecycle driver.

mod driver;
mod registry;

pub use driver::VolumeDriver;
pub use registry::{Volume, VolumeRegistry};
