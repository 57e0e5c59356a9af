//! Session lifecycle, shared model handles, global worker-pool bounds, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SessionManagerConfig;
use crate::dispatch::InferenceDispatcher;
use crate::metrics::Metrics;
use crate::models::{AsrModel, SpeakerModel, Vad};
use crate::session::{ModelHandles, Session, SessionParams};

/// Default bound on how long [`SessionManager::shutdown`] waits for sessions to drain.
const DEFAULT_SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Owns the shared model handles and dispatcher pool, and opens/tracks sessions built from
/// them. Model handles are constructed once and passed by reference to each session rather
/// than held as package-level globals.
pub struct SessionManager {
    config: SessionManagerConfig,
    models: ModelHandles,
    dispatcher: Arc<InferenceDispatcher>,
    root_cancel: CancellationToken,
    metrics: Arc<Metrics>,
}

impl SessionManager {
    /// Validates `config` and constructs a manager sharing `asr`/`speaker`/`vad` across all
    /// sessions it opens. Metrics are a no-op handle; use [`SessionManager::new_with_metrics`]
    /// to wire in a real [`Metrics`] registry.
    pub fn new(
        config: SessionManagerConfig,
        asr: Arc<dyn AsrModel>,
        speaker: Arc<dyn SpeakerModel>,
        vad: Arc<dyn Vad>,
    ) -> crate::Result<Self> {
        Self::new_with_metrics(config, asr, speaker, vad, Arc::new(Metrics::noop()))
    }

    /// Like [`SessionManager::new`], but reports `sessions_active`, `segments_total`,
    /// `dispatcher_inflight`, and `inference_duration_seconds` to `metrics`.
    pub fn new_with_metrics(
        config: SessionManagerConfig,
        asr: Arc<dyn AsrModel>,
        speaker: Arc<dyn SpeakerModel>,
        vad: Arc<dyn Vad>,
        metrics: Arc<Metrics>,
    ) -> crate::Result<Self> {
        config.validate()?;
        let dispatcher = Arc::new(
            InferenceDispatcher::new(
                config.worker_pool_size,
                Duration::from_millis(config.inference_timeout_ms),
            )
            .with_metrics(metrics.clone()),
        );
        Ok(Self {
            config,
            models: ModelHandles { asr, speaker, vad },
            dispatcher,
            root_cancel: CancellationToken::new(),
            metrics,
        })
    }

    /// Allocates a session sharing this manager's model handles and dispatcher pool.
    pub fn open_session(&self, params: SessionParams) -> Session {
        let id = Uuid::new_v4();
        let cancel = self.root_cancel.child_token();
        tracing::info!(session_id = %id, language = ?params.language, sv = params.sv, "session opened");
        Session::new(
            id,
            params,
            &self.config,
            self.models.clone(),
            self.dispatcher.clone(),
            cancel,
            self.metrics.clone(),
        )
    }

    /// Cancels the manager's root token; sessions observe this the next time they wait for a
    /// worker slot. Does not itself drain any particular session — callers are
    /// expected to call [`crate::session::Session::close`] on each open session and await
    /// those futures, typically via [`futures_util::stream::FuturesUnordered`].
    pub fn begin_shutdown(&self) {
        tracing::info!("session manager shutdown initiated");
        self.root_cancel.cancel();
    }

    /// The bounded drain period sessions should use when closing during shutdown (default 5s).
    pub fn shutdown_drain_deadline(&self) -> Duration {
        DEFAULT_SHUTDOWN_DRAIN
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;
    use crate::testutil::{FakeAsrModel, FakeSpeakerModel, FakeVad};

    fn manager() -> SessionManager {
        SessionManager::new(
            SessionManagerConfig::default(),
            Arc::new(FakeAsrModel::echo()),
            Arc::new(FakeSpeakerModel::always_new()),
            Arc::new(FakeVad::whole_buffer_as_speech()),
        )
        .unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = SessionManagerConfig::default();
        config.worker_pool_size = 0;
        let err = SessionManager::new(
            config,
            Arc::new(FakeAsrModel::echo()),
            Arc::new(FakeSpeakerModel::always_new()),
            Arc::new(FakeVad::whole_buffer_as_speech()),
        );
        assert!(err.is_err());
    }

    #[test]
    fn open_session_starts_idle() {
        let manager = manager();
        let session = manager.open_session(SessionParams {
            language: Language::En,
            sv: false,
        });
        assert_eq!(session.state(), crate::session::SessionState::Idle);
    }

    #[tokio::test]
    async fn shutdown_cancels_new_sessions() {
        let manager = manager();
        let mut session = manager.open_session(SessionParams {
            language: Language::En,
            sv: false,
        });
        manager.begin_shutdown();
        session.close(manager.shutdown_drain_deadline()).await;
        assert_eq!(session.state(), crate::session::SessionState::Closed);
    }
}
