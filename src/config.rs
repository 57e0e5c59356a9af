use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// Configuration for a [`crate::manager::SessionManager`].
///
/// A plain typed struct rather than a stringly-typed map, so unknown keys are rejected by
/// `serde` itself (`deny_unknown_fields`) instead of by hand-rolled validation. Cross-field
/// invariants that the type system can't express are checked by
/// [`SessionManagerConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionManagerConfig {
    /// PCM sample rate assumed for all sessions.
    pub sample_rate: u32,
    /// VAD cadence, in milliseconds of newly ingested audio between VAD passes.
    pub chunk_size_ms: u64,
    /// `AudioBuffer` capacity, in seconds.
    pub vad_buffer_seconds: u64,
    /// Fraction of capacity at which the overflow-trim policy fires.
    pub vad_buffer_cleanup_threshold: f32,
    /// Fraction of capacity discarded by the overflow-trim policy.
    pub vad_buffer_cleanup_ratio: f32,
    /// Idle span, in seconds, before a silence reset fires.
    pub silence_reset_seconds: u64,
    /// Audio retained (trailing), in seconds, after a silence reset.
    pub keep_audio_seconds: u64,
    /// Base speaker-similarity threshold before dynamic adjustment.
    pub sv_threshold_base: f32,
    /// Minimum audio slice duration, in milliseconds, accepted by speaker verification.
    pub sv_min_duration_ms: u64,
    /// Minimum RMS energy accepted by speaker verification.
    pub sv_min_energy_rms: f32,
    /// Pause duration, in milliseconds, at or above which a same-speaker gap is a `pause`.
    pub pause_threshold_ms: u64,
    /// Whether `LineBreakPolicy` applies its speaker/pause rules, or always reports `traditional`.
    pub enable_smart_line_break: bool,
    /// Number of concurrent inference calls permitted across all sessions.
    pub worker_pool_size: usize,
    /// Per-call inference deadline, in milliseconds.
    pub inference_timeout_ms: u64,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_size_ms: 300,
            vad_buffer_seconds: 15,
            vad_buffer_cleanup_threshold: 0.8,
            vad_buffer_cleanup_ratio: 0.3,
            silence_reset_seconds: 30,
            keep_audio_seconds: 5,
            sv_threshold_base: 0.42,
            sv_min_duration_ms: 400,
            sv_min_energy_rms: 0.003,
            pause_threshold_ms: 1500,
            enable_smart_line_break: true,
            worker_pool_size: 4,
            inference_timeout_ms: 10_000,
        }
    }
}

impl SessionManagerConfig {
    /// Checks cross-field invariants that `serde` deserialization alone can't express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::kind(
                ErrorKind::ProtocolError,
                "sample_rate must be non-zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.vad_buffer_cleanup_threshold)
            || self.vad_buffer_cleanup_threshold == 0.0
        {
            return Err(Error::kind(
                ErrorKind::ProtocolError,
                "vad_buffer_cleanup_threshold must be in (0.0, 1.0]",
            ));
        }
        if !(0.0..=1.0).contains(&self.vad_buffer_cleanup_ratio) || self.vad_buffer_cleanup_ratio == 0.0
        {
            return Err(Error::kind(
                ErrorKind::ProtocolError,
                "vad_buffer_cleanup_ratio must be in (0.0, 1.0]",
            ));
        }
        if self.keep_audio_seconds >= self.vad_buffer_seconds {
            return Err(Error::kind(
                ErrorKind::ProtocolError,
                "keep_audio_seconds must be less than vad_buffer_seconds",
            ));
        }
        if !(0.0..=1.0).contains(&self.sv_threshold_base) {
            return Err(Error::kind(
                ErrorKind::ProtocolError,
                "sv_threshold_base must be in [0.0, 1.0]",
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(Error::kind(
                ErrorKind::ProtocolError,
                "worker_pool_size must be non-zero",
            ));
        }
        if self.inference_timeout_ms == 0 {
            return Err(Error::kind(
                ErrorKind::ProtocolError,
                "inference_timeout_ms must be non-zero",
            ));
        }
        Ok(())
    }

    pub(crate) fn capacity_samples(&self) -> usize {
        self.vad_buffer_seconds as usize * self.sample_rate as usize
    }

    pub(crate) fn keep_samples(&self) -> usize {
        self.keep_audio_seconds as usize * self.sample_rate as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = SessionManagerConfig::default();
        assert_eq!(cfg.sample_rate, 16_000);
        assert_eq!(cfg.chunk_size_ms, 300);
        assert_eq!(cfg.vad_buffer_seconds, 15);
        assert_eq!(cfg.silence_reset_seconds, 30);
        assert_eq!(cfg.keep_audio_seconds, 5);
        assert_eq!(cfg.pause_threshold_ms, 1500);
        assert_eq!(cfg.worker_pool_size, 4);
        assert_eq!(cfg.inference_timeout_ms, 10_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = serde_json::from_str::<SessionManagerConfig>(r#"{"not_a_real_key": 1}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn rejects_keep_audio_not_smaller_than_buffer() {
        let mut cfg = SessionManagerConfig::default();
        cfg.keep_audio_seconds = cfg.vad_buffer_seconds;
        assert!(cfg.validate().is_err());
    }
}
