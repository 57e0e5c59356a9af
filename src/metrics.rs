//! Prometheus metrics for dispatcher saturation, session counts, and inference latency.
//!
//! This module is always compiled so that [`manager`](crate::manager), [`session`](crate::session),
//! and [`dispatch`](crate::dispatch) can hold a `Metrics` handle unconditionally. With the
//! `metrics` feature off, every method is a no-op — `Metrics::noop()` is the only constructor
//! available, and `prometheus` itself is never linked in.

#[cfg(feature = "metrics")]
use prometheus::{HistogramVec, IntCounterVec, IntGauge, Registry};

#[cfg(feature = "metrics")]
struct Inner {
    sessions_active: IntGauge,
    segments_total: IntCounterVec,
    dispatcher_inflight: IntGauge,
    inference_duration_seconds: HistogramVec,
}

/// A process-wide metrics handle, shared by reference across sessions and the dispatcher.
/// Cheap to hold even when disabled: [`Metrics::noop`] carries no collectors at all.
pub struct Metrics {
    #[cfg(feature = "metrics")]
    inner: Option<Inner>,
}

impl Metrics {
    /// A handle that records nothing. The default for callers who don't want metrics wired in,
    /// and the only variant available when the `metrics` feature is disabled.
    pub fn noop() -> Self {
        #[cfg(feature = "metrics")]
        {
            Self { inner: None }
        }
        #[cfg(not(feature = "metrics"))]
        {
            Self {}
        }
    }

    /// Registers all metrics into a fresh [`Registry`].
    #[cfg(feature = "metrics")]
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        Self::new_with_registry(&registry)
    }

    /// Registers all metrics into an existing `registry`, for callers embedding `cadence`'s
    /// metrics alongside their own.
    #[cfg(feature = "metrics")]
    pub fn new_with_registry(registry: &Registry) -> prometheus::Result<Self> {
        let sessions_active = IntGauge::new("cadence_sessions_active", "Currently open sessions")?;
        registry.register(Box::new(sessions_active.clone()))?;

        let segments_total = IntCounterVec::new(
            prometheus::Opts::new("cadence_segments_total", "Segments processed by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(segments_total.clone()))?;

        let dispatcher_inflight = IntGauge::new(
            "cadence_dispatcher_inflight",
            "Inference calls currently occupying a worker slot",
        )?;
        registry.register(Box::new(dispatcher_inflight.clone()))?;

        let inference_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "cadence_inference_duration_seconds",
                "Inference call latency by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(inference_duration_seconds.clone()))?;

        Ok(Self {
            inner: Some(Inner {
                sessions_active,
                segments_total,
                dispatcher_inflight,
                inference_duration_seconds,
            }),
        })
    }

    /// A session was opened.
    pub fn session_opened(&self) {
        #[cfg(feature = "metrics")]
        if let Some(inner) = &self.inner {
            inner.sessions_active.inc();
        }
    }

    /// A session was closed.
    pub fn session_closed(&self) {
        #[cfg(feature = "metrics")]
        if let Some(inner) = &self.inner {
            inner.sessions_active.dec();
        }
    }

    /// A segment finished processing with the given `outcome` label (see [`outcome`]).
    pub fn segment_outcome(&self, outcome: &str) {
        #[cfg(feature = "metrics")]
        if let Some(inner) = &self.inner {
            inner.segments_total.with_label_values(&[outcome]).inc();
        }
        #[cfg(not(feature = "metrics"))]
        let _ = outcome;
    }

    /// The dispatcher's current worker-slot occupancy.
    pub fn set_dispatcher_inflight(&self, inflight: i64) {
        #[cfg(feature = "metrics")]
        if let Some(inner) = &self.inner {
            inner.dispatcher_inflight.set(inflight);
        }
        #[cfg(not(feature = "metrics"))]
        let _ = inflight;
    }

    /// Records one inference call's latency under the given `kind` label (see [`kind`]).
    pub fn observe_inference_duration(&self, kind: &str, elapsed: std::time::Duration) {
        #[cfg(feature = "metrics")]
        if let Some(inner) = &self.inner {
            inner
                .inference_duration_seconds
                .with_label_values(&[kind])
                .observe(elapsed.as_secs_f64());
        }
        #[cfg(not(feature = "metrics"))]
        {
            let _ = kind;
            let _ = elapsed;
        }
    }
}

/// The `outcome` label values used on `cadence_segments_total`.
pub mod outcome {
    pub const SUCCESS: &str = "success";
    pub const TIMEOUT: &str = "timeout";
    pub const BUSY: &str = "busy";
    pub const MODEL_ERROR: &str = "model_error";
    pub const DROPPED_EMPTY: &str = "dropped_empty";
}

/// The `kind` label values used on `cadence_inference_duration_seconds`.
pub mod kind {
    pub const ASR: &str = "asr";
    pub const SPEAKER: &str = "speaker";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "metrics")]
    fn registers_without_conflict() {
        let metrics = Metrics::new().unwrap();
        metrics.session_opened();
        metrics.session_opened();
        metrics.segment_outcome(outcome::SUCCESS);
        assert_eq!(metrics.inner.as_ref().unwrap().sessions_active.get(), 2);
    }

    #[test]
    fn noop_handle_records_nothing_and_never_panics() {
        let metrics = Metrics::noop();
        metrics.session_opened();
        metrics.session_closed();
        metrics.segment_outcome(outcome::TIMEOUT);
        metrics.set_dispatcher_inflight(4);
        metrics.observe_inference_duration(kind::ASR, std::time::Duration::from_millis(5));
    }
}
