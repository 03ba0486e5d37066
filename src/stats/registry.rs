use std::collections::TryReserveError;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::view::{View, ViewFilter, ViewSnapshot, ViewSpec};
use super::{RequestEvent, TOTAL_VIEW};
use crate::clock::{Clock, SystemClock};

// ─── Errors ──────────────────────────────────────────────────────

/// Rejections raised while registering views.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("view name cannot be empty")]
    EmptyName,

    #[error("view `{view}`: `{field}` filter cannot be empty")]
    EmptyFilter { view: String, field: &'static str },

    #[error("view `{0}` is already registered")]
    DuplicateView(String),

    #[error("cannot grow view registry: {0}")]
    Capacity(#[from] TryReserveError),
}

// ─── Configuration phase ─────────────────────────────────────────

/// Collects view definitions before ingestion starts.
///
/// A fresh builder already holds the `"total"` view. Consuming it with
/// [`finish`](Self::finish) freezes membership: the resulting
/// [`ViewRegistry`] has no way to add or remove views.
#[derive(Debug)]
pub struct RegistryBuilder {
    views: Vec<ViewSpec>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        debug!("initializing view registry");
        Self {
            views: vec![ViewSpec::new(TOTAL_VIEW, ViewFilter::any())],
        }
    }

    /// Append a view. On error the builder is left exactly as it was.
    pub fn add_view(&mut self, spec: ViewSpec) -> Result<(), RegistryError> {
        if spec.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if let Some((field, _)) = spec.filter.present().find(|(_, v)| v.is_empty()) {
            return Err(RegistryError::EmptyFilter {
                view: spec.name,
                field,
            });
        }
        if self.views.iter().any(|v| v.name == spec.name) {
            return Err(RegistryError::DuplicateView(spec.name));
        }

        self.views.try_reserve(1)?;

        debug!(
            view = %spec.name,
            host = spec.filter.host.as_deref().unwrap_or(""),
            server = spec.filter.server.as_deref().unwrap_or(""),
            script = spec.filter.script.as_deref().unwrap_or(""),
            "adding view"
        );
        self.views.push(spec);
        Ok(())
    }

    /// Number of views registered so far, `"total"` included.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// End the configuration phase using the system clock.
    pub fn finish(self) -> ViewRegistry {
        self.finish_with_clock(Arc::new(SystemClock))
    }

    /// End the configuration phase. Every window starts now.
    pub fn finish_with_clock(self, clock: Arc<dyn Clock>) -> ViewRegistry {
        let now = clock.now();
        let views = self
            .views
            .into_iter()
            .map(|spec| View::new(spec, now))
            .collect();

        ViewRegistry {
            inner: Mutex::new(Inner { views }),
            clock,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Traffic phase ───────────────────────────────────────────────

/// Thread-safe set of views.
/// The receiver calls `ingest()`, the exporter drains with `poll_next()`.
pub struct ViewRegistry {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

struct Inner {
    views: Vec<View>,
}

impl ViewRegistry {
    /// Fold one event into every view whose filter accepts it.
    /// Returns how many views matched.
    pub fn ingest(&self, event: &RequestEvent) -> usize {
        self.inner.lock().ingest(event)
    }

    /// Snapshot and reset the view at `cursor`.
    ///
    /// Start a round with cursor `0` and feed back the returned cursor until
    /// `None`. The lock is taken once per step and never held between calls,
    /// so ingestion stalls for at most one view's worth of work.
    pub fn poll_next(&self, cursor: usize) -> Option<(ViewSnapshot, usize)> {
        let mut inner = self.inner.lock();
        let view = inner.views.get_mut(cursor)?;
        let snapshot = view.take_snapshot(self.clock.now());
        Some((snapshot, cursor + 1))
    }

    /// Iterator over one full polling round.
    pub fn rounds(&self) -> Harvest<'_> {
        Harvest {
            registry: self,
            cursor: 0,
        }
    }

    /// Drain one round into a vector, in registration order.
    pub fn harvest(&self) -> Vec<ViewSnapshot> {
        self.rounds().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View names in registration order.
    pub fn view_names(&self) -> Vec<String> {
        self.inner.lock().views.iter().map(|v| v.name.clone()).collect()
    }

    /// Release all views. Ingestion must already be stopped.
    pub fn teardown(self) {
        debug!(views = self.len(), "shutting down view registry");
    }
}

impl std::fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewRegistry")
            .field("views", &self.view_names())
            .finish()
    }
}

impl Inner {
    fn ingest(&mut self, event: &RequestEvent) -> usize {
        let mut matched = 0;
        for view in self.views.iter_mut().filter(|v| v.filter.matches(event)) {
            view.accumulate(event);
            matched += 1;
        }
        matched
    }
}

/// Cursor-driven drain of a [`ViewRegistry`]; see [`ViewRegistry::poll_next`].
pub struct Harvest<'a> {
    registry: &'a ViewRegistry,
    cursor: usize,
}

impl Iterator for Harvest<'_> {
    type Item = ViewSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let (snapshot, next) = self.registry.poll_next(self.cursor)?;
        self.cursor = next;
        Some(snapshot)
    }
}
