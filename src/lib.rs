//! Pinba request statistics collector.
//!
//! PHP instances fire one UDP datagram per request; the [`receiver`] decodes
//! them and folds each into the matching [`stats`] views, and the
//! [`exporter`] drains and resets every view on a timer.

pub mod args;
pub mod clock;
pub mod codec;
pub mod config;
pub mod exporter;
pub mod handlers;
pub mod load_generator;
pub mod logging;
pub mod middleware;
pub mod receiver;
pub mod server;
pub mod service;
pub mod stats;

use std::sync::Arc;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Receiver lifecycle; locked for status reads and reconfiguration.
    pub service: tokio::sync::Mutex<service::Service>,

    /// Periodic poller; owns the latest harvest round.
    pub exporter: Arc<exporter::Exporter>,
}
