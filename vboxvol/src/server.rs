//! Docker volume plugin server.
//!
//! Serves the plugin protocol as HTTP/1.1 over a Unix socket. Each connection
//! is handled on its own task; every verb is a `POST` with a JSON body and is
//! answered with the plugin content type. A failed operation is answered with
//! HTTP 500 and the message in `Err`, a body that cannot be decoded with 400.
//!
//! Shutdown drains in-flight requests for a bounded time only: hypervisor
//! calls have no deadline of their own, so a hung Create must not keep the
//! process alive after a termination signal.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::Serialize;
use tokio::net::UnixListener;
use vboxvol_shared::errors::{VolumeError, VolumeResult};
use vboxvol_shared::protocol::{
    ActivateResponse, Capabilities, CapabilitiesResponse, GetResponse, ListResponse,
    PLUGIN_CONTENT_TYPE, Scope, VolumeInfo, VolumeRequest, VolumeResponse,
};

use crate::config::DEFAULT_DRAIN_TIMEOUT;
use crate::util;
use crate::volumes::VolumeDriver;

type SharedDriver = Arc<VolumeDriver>;

/// Binds a [`VolumeDriver`] to the plugin socket.
pub struct PluginServer {
    socket_path: PathBuf,
    driver: SharedDriver,
    drain_timeout: Duration,
}

impl PluginServer {
    pub fn new(socket_path: impl Into<PathBuf>, driver: SharedDriver) -> Self {
        Self {
            socket_path: socket_path.into(),
            driver,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// How long in-flight requests may run once shutdown has begun.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Routes for every plugin verb.
    pub fn router(driver: SharedDriver) -> Router {
        Router::new()
            .route("/Plugin.Activate", post(activate))
            .route("/VolumeDriver.Create", post(create))
            .route("/VolumeDriver.Remove", post(remove))
            .route("/VolumeDriver.Mount", post(mount))
            .route("/VolumeDriver.Unmount", post(unmount))
            .route("/VolumeDriver.Path", post(path))
            .route("/VolumeDriver.Get", post(get))
            .route("/VolumeDriver.List", post(list))
            .route("/VolumeDriver.Capabilities", post(capabilities))
            .with_state(driver)
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    ///
    /// Requests still running when the drain timeout expires are abandoned.
    /// A stale socket from an earlier run is replaced; the socket file is
    /// removed again on the way out.
    pub async fn serve<F>(self, shutdown: F) -> VolumeResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                VolumeError::Config(format!(
                    "Failed to create socket directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        util::remove_stale_socket(&self.socket_path)?;

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            VolumeError::Config(format!(
                "Failed to bind socket {}: {}",
                self.socket_path.display(),
                e
            ))
        })?;

        tracing::info!(socket = %self.socket_path.display(), "Plugin server listening");

        let (begun_tx, begun_rx) = tokio::sync::oneshot::channel::<()>();
        let shutdown = async move {
            shutdown.await;
            tracing::info!("Plugin server shutting down; draining in-flight requests");
            let _ = begun_tx.send(());
        };

        let drain_timeout = self.drain_timeout;
        let deadline = async move {
            // The sender is only dropped unsent once the server has finished.
            if begun_rx.await.is_err() {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(drain_timeout).await;
        };

        let server = axum::serve(listener, Self::router(self.driver.clone()))
            .with_graceful_shutdown(shutdown);
        let result = tokio::select! {
            result = async { server.await } => result,
            () = deadline => {
                tracing::warn!(
                    timeout = ?drain_timeout,
                    "Drain timeout expired; abandoning in-flight requests"
                );
                Ok(())
            }
        };

        if let Err(e) = util::remove_stale_socket(&self.socket_path) {
            tracing::warn!(
                socket = %self.socket_path.display(),
                error = %e,
                "Failed to remove plugin socket"
            );
        }

        tracing::info!("Plugin server stopped");
        result.map_err(|e| VolumeError::Internal(format!("plugin server failed: {}", e)))
    }
}

async fn activate() -> Response {
    plugin_json(StatusCode::OK, &ActivateResponse::default())
}

async fn create(State(driver): State<SharedDriver>, body: Bytes) -> Response {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = driver.create(&req.name).await.map(|()| VolumeResponse::ok());
    volume_response("Create", &req.name, result)
}

async fn remove(State(driver): State<SharedDriver>, body: Bytes) -> Response {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = driver.remove(&req.name).await.map(|()| VolumeResponse::ok());
    volume_response("Remove", &req.name, result)
}

async fn mount(State(driver): State<SharedDriver>, body: Bytes) -> Response {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = driver
        .mount(&req.name)
        .await
        .map(|mountpoint| VolumeResponse::with_mountpoint(mountpoint.display().to_string()));
    volume_response("Mount", &req.name, result)
}

async fn unmount(State(driver): State<SharedDriver>, body: Bytes) -> Response {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let result = driver.unmount(&req.name).await.map(|()| VolumeResponse::ok());
    volume_response("Unmount", &req.name, result)
}

async fn path(State(driver): State<SharedDriver>, body: Bytes) -> Response {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let mountpoint = driver.path(&req.name);
    plugin_json(
        StatusCode::OK,
        &VolumeResponse::with_mountpoint(mountpoint.display().to_string()),
    )
}

async fn get(State(driver): State<SharedDriver>, body: Bytes) -> Response {
    let req = match parse_request(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match driver.get(&req.name).await {
        Ok(volume) => plugin_json(
            StatusCode::OK,
            &GetResponse {
                volume: Some(volume_info(&driver, &volume.name)),
                err: String::new(),
            },
        ),
        Err(e) => plugin_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &GetResponse {
                volume: None,
                err: e.message(),
            },
        ),
    }
}

async fn list(State(driver): State<SharedDriver>) -> Response {
    let volumes = driver
        .list()
        .await
        .iter()
        .map(|volume| volume_info(&driver, &volume.name))
        .collect();
    plugin_json(
        StatusCode::OK,
        &ListResponse {
            volumes,
            err: String::new(),
        },
    )
}

async fn capabilities() -> Response {
    plugin_json(
        StatusCode::OK,
        &CapabilitiesResponse {
            capabilities: Capabilities {
                scope: Scope::Local,
            },
        },
    )
}

fn volume_info(driver: &VolumeDriver, name: &str) -> VolumeInfo {
    VolumeInfo {
        name: name.to_string(),
        mountpoint: driver.path(name).display().to_string(),
    }
}

fn parse_request(body: &[u8]) -> Result<VolumeRequest, Response> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed plugin request");
        plugin_json(
            StatusCode::BAD_REQUEST,
            &VolumeResponse::error(format!("invalid request: {}", e)),
        )
    })
}

fn volume_response(verb: &str, name: &str, result: VolumeResult<VolumeResponse>) -> Response {
    match result {
        Ok(resp) => plugin_json(StatusCode::OK, &resp),
        Err(e) => {
            tracing::warn!(verb, volume = %name, error = %e, "Plugin request failed");
            plugin_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &VolumeResponse::error(e.message()),
            )
        }
    }
}

fn plugin_json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, PLUGIN_CONTENT_TYPE)], bytes).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
