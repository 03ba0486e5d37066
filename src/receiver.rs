use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{decode_request, MAX_DATAGRAM_SIZE};
use crate::service::ServiceError;
use crate::stats::ViewRegistry;

// ─── Endpoint ────────────────────────────────────────────────────

/// Address and port the receiver listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Socket address to bind. An empty address means any interface; an
    /// unparsable one is logged and also falls back to any interface.
    pub fn socket_addr(&self) -> SocketAddr {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let ip = if self.address.is_empty() {
            any
        } else {
            self.address.parse::<IpAddr>().unwrap_or_else(|e| {
                warn!(address = %self.address, error = %e, "invalid listen address, listening on any address");
                any
            })
        };
        SocketAddr::new(ip, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

// ─── Counters ────────────────────────────────────────────────────

/// Lock-free receiver counters, cumulative since the service was created.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    ingested: AtomicU64,
    decode_failures: AtomicU64,
    empty_datagrams: AtomicU64,
    read_errors: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiverStatsSnapshot {
    pub datagrams: u64,
    pub ingested: u64,
    pub decode_failures: u64,
    pub empty_datagrams: u64,
    pub read_errors: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            ingested: self.ingested.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            empty_datagrams: self.empty_datagrams.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ─── Socket ──────────────────────────────────────────────────────

/// Create a non-blocking UDP socket bound to `endpoint`, registered with the
/// current tokio reactor.
pub fn open_socket(endpoint: &Endpoint) -> Result<UdpSocket, ServiceError> {
    let addr = endpoint.socket_addr();

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(ServiceError::Socket)?;
    socket.set_reuse_address(true).map_err(ServiceError::Socket)?;
    socket.set_nonblocking(true).map_err(ServiceError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|source| ServiceError::Bind { addr, source })?;

    UdpSocket::from_std(socket.into()).map_err(ServiceError::Socket)
}

// ─── Listen loop ─────────────────────────────────────────────────

/// Read datagrams until `cancel` fires. Runs as a single task; the registry
/// lock is only taken inside `ingest`, never across an await.
pub async fn run(
    socket: UdpSocket,
    registry: Arc<ViewRegistry>,
    stats: Arc<ReceiverStats>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    debug!("entering listen loop");

    loop {
        let res = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("terminating listen loop");
                break;
            }
            res = socket.recv_from(&mut buf) => res,
        };

        match res {
            Ok((len, from)) => {
                if !process_datagram(&buf[..len], &registry, &stats) {
                    debug!(%from, len, "datagram discarded");
                }
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => {
                ReceiverStats::bump(&stats.read_errors);
                warn!(error = %e, "recv() failed");
            }
        }
    }
}

/// Count one received datagram, decode it and fold it into the registry.
/// Returns `false` when the payload was discarded. Empty datagrams are
/// counted but never decoded.
pub fn process_datagram(buf: &[u8], registry: &ViewRegistry, stats: &ReceiverStats) -> bool {
    ReceiverStats::bump(&stats.datagrams);

    if buf.is_empty() {
        ReceiverStats::bump(&stats.empty_datagrams);
        return false;
    }

    match decode_request(buf) {
        Ok(event) => {
            registry.ingest(&event);
            ReceiverStats::bump(&stats.ingested);
            true
        }
        Err(e) => {
            ReceiverStats::bump(&stats.decode_failures);
            debug!(error = %e, "discarding datagram");
            false
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
