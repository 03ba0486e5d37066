use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::stats::{ViewRegistry, ViewSnapshot};

/// Every view drained in one polling round.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestRound {
    pub round: u64,
    pub collected_at: DateTime<Utc>,
    pub views: Vec<ViewSnapshot>,
}

/// Periodic poller: drains the registry on a timer, logs every view and keeps
/// the latest round around for the HTTP surface.
pub struct Exporter {
    registry: Arc<ViewRegistry>,
    latest: RwLock<Option<HarvestRound>>,
    rounds: AtomicU64,
}

impl Exporter {
    pub fn new(registry: Arc<ViewRegistry>) -> Self {
        Self {
            registry,
            latest: RwLock::new(None),
            rounds: AtomicU64::new(0),
        }
    }

    /// Drain one round now. Each step resets the view it reports.
    pub fn collect(&self) -> HarvestRound {
        let mut views = Vec::with_capacity(self.registry.len());
        let mut cursor = 0;

        while let Some((snapshot, next)) = self.registry.poll_next(cursor) {
            info!(
                target: "pinba_view",
                view = %snapshot.name,
                requests = snapshot.requests,
                req_per_sec = snapshot.requests_per_sec,
                req_time = snapshot.request_time,
                ru_utime = snapshot.ru_utime,
                ru_stime = snapshot.ru_stime,
                doc_size = snapshot.document_size,
                mem_peak = snapshot.memory_peak,
                "view harvested"
            );
            views.push(snapshot);
            cursor = next;
        }

        let round = HarvestRound {
            round: self.rounds.fetch_add(1, Ordering::Relaxed) + 1,
            collected_at: Utc::now(),
            views,
        };
        *self.latest.write() = Some(round.clone());
        round
    }

    /// Most recent round, if any has been collected.
    pub fn latest(&self) -> Option<HarvestRound> {
        self.latest.read().clone()
    }

    /// Collect every `interval` until `cancel` fires. The first round is
    /// taken one full interval after start.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("exporter stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let round = self.collect();
                    debug!(round = round.round, views = round.views.len(), "harvest round complete");
                }
            }
        }
    }
}
