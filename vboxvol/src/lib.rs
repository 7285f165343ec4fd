//! VirtualBox volume driver library.
//!
//! This crate provides the pieces behind the `vboxvol-plugin` daemon: host
//! machine identification, the hypervisor capability interface, the volume
//! registry and driver, and the plugin socket server.

use std::path::Path;
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

// Global guard for tracing-appender to keep the writer thread alive
static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

pub mod config;
pub mod hypervisor;
pub mod net;
pub mod resolver;
pub mod server;
pub mod util;
pub mod volumes;

pub use config::{DiskFormat, DriverOptions, HypervisorOptions};
pub use hypervisor::{HypervisorClient, VboxWebClient};
pub use net::HostAddresses;
pub use resolver::{Machine, MachineResolver};
pub use server::PluginServer;
pub use volumes::{Volume, VolumeDriver, VolumeRegistry};

use vboxvol_shared::errors::{VolumeError, VolumeResult};

/// Initialize tracing for the plugin process.
///
/// Logs always go to stderr. When `log_dir` is given they are also written to
/// `<log_dir>/vboxvol.log` with daily rotation. `RUST_LOG` overrides the
/// default level (`debug` when `debug` is set, `info` otherwise).
/// Idempotent: subsequent calls return immediately once initialized.
pub fn init_logging(debug: bool, log_dir: Option<&Path>) -> VolumeResult<()> {
    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir).map_err(|e| {
            VolumeError::Config(format!(
                "Failed to create logs directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }

    let level = if debug { "debug" } else { "info" };

    let _ = LOG_GUARD.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let (file_writer, guard) = match log_dir {
            Some(dir) => {
                let file_appender = tracing_appender::rolling::daily(dir, "vboxvol.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                (Some(non_blocking), guard)
            }
            // A sink writer still hands back a guard, which keeps the OnceLock uniform.
            None => {
                let (_, guard) = tracing_appender::non_blocking(std::io::sink());
                (None, guard)
            }
        };

        // If global default subscriber is already set, this will return an error.
        // We ignore it to avoid interfering with host-configured tracing.
        util::register_to_tracing(file_writer, env_filter);

        guard
    });

    Ok(())
}
