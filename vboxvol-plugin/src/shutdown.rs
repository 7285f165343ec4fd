//! Termination signals.

use std::future::Future;

use tokio::signal::unix::{Signal, SignalKind, signal};

/// Future that resolves on the first SIGINT or SIGTERM.
///
/// Handlers are installed before this returns, so a signal that arrives while
/// the server is still binding is not lost. Once the first signal has been
/// seen, a second one exits the process immediately without draining.
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(async move {
        let received = next_signal(&mut interrupt, &mut terminate).await;
        tracing::info!("Received {}", received);

        tokio::spawn(async move {
            let received = next_signal(&mut interrupt, &mut terminate).await;
            tracing::warn!("Received {} while draining; exiting immediately", received);
            std::process::exit(1);
        });
    })
}

async fn next_signal(interrupt: &mut Signal, terminate: &mut Signal) -> &'static str {
    tokio::select! {
        _ = interrupt.recv() => "SIGINT (Ctrl+C)",
        _ = terminate.recv() => "SIGTERM",
    }
}
