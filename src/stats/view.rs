use std::time::{Duration, Instant};

use serde::Serialize;

use super::RequestEvent;

/// Windows shorter than this report a rate of zero instead of dividing by
/// (almost) nothing.
pub const MIN_RATE_WINDOW: Duration = Duration::from_micros(1);

/// Exact-match predicates over the origin fields of a request.
/// An absent predicate matches any value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub host: Option<String>,
    pub server: Option<String>,
    pub script: Option<String>,
}

impl ViewFilter {
    /// Filter with no predicates; matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Byte-for-byte comparison of every present predicate.
    pub fn matches(&self, event: &RequestEvent) -> bool {
        fn check(want: &Option<String>, got: &str) -> bool {
            want.as_deref().map_or(true, |w| w == got)
        }

        check(&self.host, &event.hostname)
            && check(&self.server, &event.server_name)
            && check(&self.script, &event.script_name)
    }

    /// Iterate over the predicates that are set, labelled by field.
    pub(crate) fn present(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("host", self.host.as_deref()),
            ("server", self.server.as_deref()),
            ("script", self.script.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
    }
}

/// A view as requested at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSpec {
    pub name: String,
    pub filter: ViewFilter,
}

impl ViewSpec {
    pub fn new(name: impl Into<String>, filter: ViewFilter) -> Self {
        Self {
            name: name.into(),
            filter,
        }
    }
}

/// Rate and per-request averages of one view since its previous reset.
/// Serialized straight into the HTTP JSON and the export log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub name: String,
    /// Raw number of requests in the window
    pub requests: u64,
    pub requests_per_sec: f64,
    pub request_time: f64,
    pub ru_utime: f64,
    pub ru_stime: f64,
    pub document_size: f64,
    pub memory_peak: f64,
}

/// A registered view: filter plus running sums since `window_start`.
#[derive(Debug)]
pub(crate) struct View {
    pub(crate) name: String,
    pub(crate) filter: ViewFilter,
    window_start: Instant,
    request_count: u64,
    sum_request_time: f64,
    sum_ru_utime: f64,
    sum_ru_stime: f64,
    sum_document_size: u64,
    sum_memory_peak: u64,
}

impl View {
    pub(crate) fn new(spec: ViewSpec, now: Instant) -> Self {
        Self {
            name: spec.name,
            filter: spec.filter,
            window_start: now,
            request_count: 0,
            sum_request_time: 0.0,
            sum_ru_utime: 0.0,
            sum_ru_stime: 0.0,
            sum_document_size: 0,
            sum_memory_peak: 0,
        }
    }

    /// Fold one event into the running sums.
    pub(crate) fn accumulate(&mut self, event: &RequestEvent) {
        self.request_count += 1;
        self.sum_request_time += event.request_time;
        self.sum_ru_utime += event.ru_utime;
        self.sum_ru_stime += event.ru_stime;
        self.sum_document_size = self.sum_document_size.saturating_add(event.document_size);
        self.sum_memory_peak = self.sum_memory_peak.saturating_add(event.memory_peak);
    }

    /// Compute the snapshot for the window ending at `now`, then start a new
    /// window at `now` with zeroed sums. Callers hold the registry lock, so
    /// both halves are one step to any observer.
    pub(crate) fn take_snapshot(&mut self, now: Instant) -> ViewSnapshot {
        let elapsed = now.saturating_duration_since(self.window_start);

        let requests_per_sec = if elapsed >= MIN_RATE_WINDOW {
            self.request_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        // Empty windows average to zero rather than NaN.
        let divisor = self.request_count.max(1) as f64;

        let snapshot = ViewSnapshot {
            name: self.name.clone(),
            requests: self.request_count,
            requests_per_sec,
            request_time: self.sum_request_time / divisor,
            ru_utime: self.sum_ru_utime / divisor,
            ru_stime: self.sum_ru_stime / divisor,
            document_size: self.sum_document_size as f64 / divisor,
            memory_peak: self.sum_memory_peak as f64 / divisor,
        };

        self.reset(now);
        snapshot
    }

    fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.request_count = 0;
        self.sum_request_time = 0.0;
        self.sum_ru_utime = 0.0;
        self.sum_ru_stime = 0.0;
        self.sum_document_size = 0;
        self.sum_memory_peak = 0;
    }

    #[cfg(test)]
    pub(crate) fn request_count(&self) -> u64 {
        self.request_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(host: &str, server: &str, script: &str) -> RequestEvent {
        RequestEvent {
            hostname: host.into(),
            server_name: server.into(),
            script_name: script.into(),
            request_time: 0.5,
            ru_utime: 0.25,
            ru_stime: 0.125,
            document_size: 1000,
            memory_peak: 4096,
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = ViewFilter::any();
        assert!(filter.matches(&event("a", "b", "c")));
        assert!(filter.matches(&event("", "", "")));
    }

    #[test]
    fn test_all_present_predicates_must_match() {
        let filter = ViewFilter::any().host("web1").script("/index.php");

        assert!(filter.matches(&event("web1", "anything", "/index.php")));
        assert!(!filter.matches(&event("web2", "anything", "/index.php")));
        assert!(!filter.matches(&event("web1", "anything", "/other.php")));
    }

    #[test]
    fn test_match_is_exact_and_case_sensitive() {
        let filter = ViewFilter::any().server("Example.com");
        assert!(!filter.matches(&event("h", "example.com", "s")));
        assert!(!filter.matches(&event("h", "Example.com ", "s")));
        assert!(filter.matches(&event("h", "Example.com", "s")));
    }

    #[test]
    fn test_present_lists_only_set_fields() {
        let filter = ViewFilter::any().server("srv");
        let fields: Vec<_> = filter.present().collect();
        assert_eq!(fields, vec![("server", "srv")]);
    }

    #[test]
    fn test_snapshot_averages_and_rate() {
        let t0 = Instant::now();
        let mut view = View::new(ViewSpec::new("v", ViewFilter::any()), t0);
        view.accumulate(&event("a", "b", "c"));
        view.accumulate(&event("a", "b", "c"));

        let snap = view.take_snapshot(t0 + Duration::from_secs(4));
        assert_eq!(snap.name, "v");
        assert_eq!(snap.requests, 2);
        assert!((snap.requests_per_sec - 0.5).abs() < 1e-12);
        assert!((snap.request_time - 0.5).abs() < 1e-12);
        assert!((snap.ru_utime - 0.25).abs() < 1e-12);
        assert!((snap.ru_stime - 0.125).abs() < 1e-12);
        assert_eq!(snap.document_size, 1000.0);
        assert_eq!(snap.memory_peak, 4096.0);
        assert_eq!(view.request_count(), 0);
    }

    #[test]
    fn test_empty_window_yields_zero_not_nan() {
        let t0 = Instant::now();
        let mut view = View::new(ViewSpec::new("v", ViewFilter::any()), t0);

        let snap = view.take_snapshot(t0 + Duration::from_secs(1));
        assert_eq!(snap.requests_per_sec, 0.0);
        assert_eq!(snap.request_time, 0.0);
        assert_eq!(snap.document_size, 0.0);
        assert_eq!(snap.memory_peak, 0.0);
    }

    #[test]
    fn test_zero_length_window_reports_zero_rate() {
        let t0 = Instant::now();
        let mut view = View::new(ViewSpec::new("v", ViewFilter::any()), t0);
        view.accumulate(&event("a", "b", "c"));

        let snap = view.take_snapshot(t0);
        assert_eq!(snap.requests_per_sec, 0.0);
        assert!(snap.requests_per_sec.is_finite());
        // Averages are still meaningful.
        assert!((snap.request_time - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_resets_window_start() {
        let t0 = Instant::now();
        let mut view = View::new(ViewSpec::new("v", ViewFilter::any()), t0);
        view.accumulate(&event("a", "b", "c"));
        let _ = view.take_snapshot(t0 + Duration::from_secs(10));

        view.accumulate(&event("a", "b", "c"));
        let snap = view.take_snapshot(t0 + Duration::from_secs(12));
        // One request over the 2 s since the previous reset.
        assert!((snap.requests_per_sec - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_size_sums_saturate() {
        let t0 = Instant::now();
        let mut view = View::new(ViewSpec::new("v", ViewFilter::any()), t0);
        let mut big = event("a", "b", "c");
        big.document_size = u64::MAX;
        view.accumulate(&big);
        view.accumulate(&big);

        let snap = view.take_snapshot(t0 + Duration::from_secs(1));
        assert_eq!(snap.document_size, u64::MAX as f64 / 2.0);
    }
}
