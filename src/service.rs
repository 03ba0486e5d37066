use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::receiver::{self, Endpoint, ReceiverStats, ReceiverStatsSnapshot};
use crate::stats::ViewRegistry;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("socket setup failed: {0}")]
    Socket(#[source] io::Error),

    #[error("bind({addr}) failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("receiver is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Outcome of [`Service::reconfigure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconfigured {
    /// Same endpoint; nothing happened.
    Unchanged,
    /// Endpoint stored; takes effect on the next start.
    Updated,
    /// Receiver was running and has been restarted on the new endpoint.
    Restarted,
}

struct Listener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Owns the receiver task: binds the socket on `start`, tears everything
/// down on `stop`.
pub struct Service {
    registry: Arc<ViewRegistry>,
    stats: Arc<ReceiverStats>,
    endpoint: Endpoint,
    state: ServiceState,
    listener: Option<Listener>,
    generation: u64,
}

impl Service {
    pub fn new(registry: Arc<ViewRegistry>, endpoint: Endpoint) -> Self {
        Self {
            registry,
            stats: Arc::new(ReceiverStats::new()),
            endpoint,
            state: ServiceState::Stopped,
            listener: None,
            generation: 0,
        }
    }

    /// Bind the configured endpoint and spawn the listen loop on the current
    /// tokio runtime. On failure nothing is kept and the state stays
    /// `Stopped`.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        if self.listener.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }

        info!(endpoint = %self.endpoint, "starting receiver");
        self.state = ServiceState::Starting;

        let socket = match receiver::open_socket(&self.endpoint) {
            Ok(socket) => socket,
            Err(e) => {
                self.state = ServiceState::Stopped;
                return Err(e);
            }
        };
        let local_addr = match socket.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.state = ServiceState::Stopped;
                return Err(ServiceError::Socket(e));
            }
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(receiver::run(
            socket,
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
            cancel.clone(),
        ));

        self.listener = Some(Listener {
            cancel,
            handle,
            local_addr,
        });
        self.generation += 1;
        self.state = ServiceState::Running;
        info!(%local_addr, "receiver running");
        Ok(())
    }

    /// Stop the listen loop, wait for it to exit and close the socket.
    /// Stopping a stopped service does nothing.
    pub async fn stop(&mut self) {
        let Some(listener) = self.listener.take() else {
            self.state = ServiceState::Stopped;
            return;
        };

        self.state = ServiceState::Stopping;
        listener.cancel.cancel();
        if let Err(e) = listener.handle.await {
            warn!(error = %e, "listen loop ended abnormally");
        }

        self.state = ServiceState::Stopped;
        info!(local_addr = %listener.local_addr, "receiver stopped");
    }

    /// Switch to `endpoint`. A running receiver is restarted; identical
    /// endpoints are ignored.
    pub async fn reconfigure(&mut self, endpoint: Endpoint) -> Result<Reconfigured, ServiceError> {
        if endpoint == self.endpoint {
            return Ok(Reconfigured::Unchanged);
        }

        info!(from = %self.endpoint, to = %endpoint, "listen endpoint changed");
        self.endpoint = endpoint;

        if self.listener.is_none() {
            return Ok(Reconfigured::Updated);
        }

        self.stop().await;
        self.start()?;
        Ok(Reconfigured::Restarted)
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr)
    }

    /// Number of successful starts so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> ReceiverStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn registry(&self) -> &Arc<ViewRegistry> {
        &self.registry
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::RegistryBuilder;

    fn service(port: u16) -> Service {
        let registry = Arc::new(RegistryBuilder::new().finish());
        Service::new(registry, Endpoint::new("127.0.0.1", port))
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut svc = service(0);
        assert_eq!(svc.state(), ServiceState::Stopped);

        svc.start().unwrap();
        assert_eq!(svc.state(), ServiceState::Running);
        assert!(svc.local_addr().is_some());

        svc.stop().await;
        assert_eq!(svc.state(), ServiceState::Stopped);
        assert!(svc.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let mut svc = service(0);
        svc.start().unwrap();
        assert!(matches!(svc.start(), Err(ServiceError::AlreadyRunning)));
        assert_eq!(svc.generation(), 1);
        svc.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let mut svc = service(0);
        svc.stop().await;
        assert_eq!(svc.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_service_stopped() {
        let mut svc = service(0);
        svc.endpoint = Endpoint::new("192.0.2.1", 0);

        let err = svc.start().unwrap_err();
        assert!(matches!(err, ServiceError::Bind { .. }));
        assert_eq!(svc.state(), ServiceState::Stopped);
        assert!(svc.local_addr().is_none());
        assert_eq!(svc.generation(), 0);
    }

    #[tokio::test]
    async fn test_reconfigure_same_endpoint_is_noop() {
        let mut svc = service(0);
        svc.start().unwrap();
        let addr = svc.local_addr();

        let outcome = svc
            .reconfigure(Endpoint::new("127.0.0.1", 0))
            .await
            .unwrap();
        assert_eq!(outcome, Reconfigured::Unchanged);
        assert_eq!(svc.generation(), 1);
        assert_eq!(svc.local_addr(), addr);
        svc.stop().await;
    }

    #[tokio::test]
    async fn test_reconfigure_while_stopped_only_stores() {
        let mut svc = service(0);
        let outcome = svc
            .reconfigure(Endpoint::new("::1", 0))
            .await
            .unwrap();
        assert_eq!(outcome, Reconfigured::Updated);
        assert_eq!(svc.endpoint(), &Endpoint::new("::1", 0));
        assert_eq!(svc.state(), ServiceState::Stopped);
        assert_eq!(svc.generation(), 0);
    }

    #[tokio::test]
    async fn test_reconfigure_restarts_running_receiver() {
        let mut svc = service(0);
        svc.start().unwrap();

        let outcome = svc
            .reconfigure(Endpoint::new("0.0.0.0", 0))
            .await
            .unwrap();
        assert_eq!(outcome, Reconfigured::Restarted);
        assert_eq!(svc.generation(), 2);
        assert_eq!(svc.state(), ServiceState::Running);
        svc.stop().await;
    }
}
