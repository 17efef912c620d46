//! Ephemeral backing-service provisioning with scoped teardown.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::CellError;

/// Poll interval while waiting for a service to accept connections.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How readiness of a started service is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyProbe {
    /// Poll until a TCP connect to 127.0.0.1:port succeeds.
    Tcp(u16),
    /// The start command exiting zero is the only readiness signal.
    None,
}

/// Specification of one ephemeral backing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    /// Command that starts the service and returns (e.g. `docker run -d`).
    pub start: Vec<String>,
    /// Command that stops and removes it.
    pub stop: Vec<String>,
    pub probe: ReadyProbe,
    pub ready_timeout_secs: u64,
}

/// Readiness state of a started service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Starting,
    Ready,
    Failed,
}

/// A running backing service.
#[derive(Debug)]
pub struct ServiceHandle {
    pub spec: ServiceSpec,
    pub state: ServiceState,
}

/// The full service set of one matrix cell.
///
/// All handles from one [`provision`] call are torn down together; the
/// owning cell calls [`teardown`](ProvisionedServices::teardown) on every
/// exit path, success or failure.
#[derive(Debug)]
pub struct ProvisionedServices {
    handles: Vec<ServiceHandle>,
}

impl ProvisionedServices {
    pub fn handles(&self) -> &[ServiceHandle] {
        &self.handles
    }

    /// Stop every service. Stop failures are logged, not propagated:
    /// teardown must not mask the cell's own outcome.
    pub async fn teardown(mut self) {
        for handle in self.handles.drain(..) {
            stop_service(&handle.spec).await;
        }
    }
}

/// Start every service in `specs` and block until each is ready.
///
/// On any failure the services already started are stopped before the
/// error is returned; a handle is never handed to the caller still in
/// [`ServiceState::Starting`].
pub async fn provision(specs: Vec<ServiceSpec>) -> Result<ProvisionedServices, CellError> {
    let mut handles: Vec<ServiceHandle> = Vec::with_capacity(specs.len());

    for spec in specs {
        if let Err(err) = start_service(&spec).await {
            ProvisionedServices { handles }.teardown().await;
            return Err(err);
        }
        if let Err(err) = wait_ready(&spec).await {
            stop_service(&spec).await;
            ProvisionedServices { handles }.teardown().await;
            return Err(err);
        }
        handles.push(ServiceHandle {
            spec,
            state: ServiceState::Ready,
        });
    }

    info!(services = handles.len(), "all services ready");
    Ok(ProvisionedServices { handles })
}

async fn start_service(spec: &ServiceSpec) -> Result<(), CellError> {
    if spec.start.is_empty() {
        return Err(CellError::ServiceStart {
            service: spec.name.clone(),
            reason: "empty start command".to_string(),
        });
    }

    debug!(service = %spec.name, "starting service");
    let output = Command::new(&spec.start[0])
        .args(&spec.start[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CellError::ServiceStart {
            service: spec.name.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(CellError::ServiceStart {
            service: spec.name.clone(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Block until the service accepts connections, bounded by the spec's
/// ready timeout.
async fn wait_ready(spec: &ServiceSpec) -> Result<(), CellError> {
    let port = match spec.probe {
        ReadyProbe::Tcp(port) => port,
        ReadyProbe::None => return Ok(()),
    };

    let deadline = Duration::from_secs(spec.ready_timeout_secs);
    let poll = async {
        loop {
            if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                return;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    };

    match tokio::time::timeout(deadline, poll).await {
        Ok(()) => {
            debug!(service = %spec.name, port, "service ready");
            Ok(())
        }
        Err(_) => Err(CellError::ProvisionTimeout {
            service: spec.name.clone(),
            timeout_secs: spec.ready_timeout_secs,
        }),
    }
}

async fn stop_service(spec: &ServiceSpec) {
    if spec.stop.is_empty() {
        return;
    }
    match Command::new(&spec.stop[0])
        .args(&spec.stop[1..])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) if status.success() => debug!(service = %spec.name, "service stopped"),
        Ok(status) => {
            warn!(service = %spec.name, code = status.code(), "stop command failed")
        }
        Err(e) => warn!(service = %spec.name, error = %e, "could not run stop command"),
    }
}
