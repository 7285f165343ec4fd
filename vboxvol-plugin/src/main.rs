mod cli;
mod shutdown;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::PluginArgs;
use vboxvol::{
    DriverOptions, HostAddresses, HypervisorClient, PluginServer, VboxWebClient, VolumeDriver,
};
use vboxvol_shared::errors::VolumeResult;

#[tokio::main]
async fn main() {
    let args = PluginArgs::parse();

    if let Err(error) = vboxvol::init_logging(args.debug, args.log_dir.as_deref()) {
        eprintln!("Error: {}", error);
        process::exit(1);
    }

    if let Err(error) = run(args).await {
        tracing::error!(error = %format!("{:#}", error), "Plugin exited with error");
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}

async fn run(args: PluginArgs) -> anyhow::Result<()> {
    let driver_options = args.driver_options();
    let hypervisor_options = args.hypervisor_options();

    // Fail on bad flags before touching the network.
    driver_options.validate()?;
    hypervisor_options.validate()?;

    let client = VboxWebClient::logon(&hypervisor_options)
        .await
        .with_context(|| format!("failed to log on to {}", hypervisor_options.url))?;
    let client: Arc<dyn HypervisorClient> = Arc::new(client);

    let driver = match resolve_driver(client.clone(), driver_options).await {
        Ok(driver) => Arc::new(driver),
        Err(e) => {
            if let Err(logoff) = client.logoff().await {
                tracing::warn!(error = %logoff, "Failed to log off vboxwebsrv");
            }
            return Err(e).context("failed to identify the current machine");
        }
    };

    tracing::info!(
        machine = %driver.machine().handle.0,
        chipset = %driver.machine().chipset,
        "Volume driver ready"
    );

    let shutdown = shutdown::shutdown_signal().context("failed to install signal handlers")?;
    let served = PluginServer::new(&args.socket_path, driver.clone())
        .with_drain_timeout(args.drain_timeout())
        .serve(shutdown)
        .await;

    if let Err(e) = driver.shutdown().await {
        tracing::warn!(error = %e, "Failed to log off vboxwebsrv");
    }

    served.context("plugin server failed")
}

/// Identify the VM this process runs in and bind a driver to it.
async fn resolve_driver(
    client: Arc<dyn HypervisorClient>,
    options: DriverOptions,
) -> VolumeResult<VolumeDriver> {
    let host = HostAddresses::discover()?;
    tracing::debug!(addresses = ?host.iter().collect::<Vec<_>>(), "Host MAC addresses");
    VolumeDriver::bootstrap(client, &host, options).await
}
