//! Collaborator interfaces the core consumes but does not implement.
//!
//! `AsrModel`, `SpeakerModel`, and `Vad` stand in for the ML-model weights and inference
//! internals, which are out of scope for this crate. Real integrations implement these traits;
//! `testutil` supplies fakes for the test suite.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SpeakerVerifyError;

/// A language selector for a session, or "auto" to let the ASR model detect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Language {
    Zh,
    En,
    Ja,
    Ko,
    Yue,
    Auto,
}

impl Language {
    /// Conservative mapping from an inline language-tag marker to a [`Language`].
    ///
    /// Unknown tags map to `None` rather than guessing.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "zh" | "cn" | "mandarin" => Some(Language::Zh),
            "en" | "eng" => Some(Language::En),
            "ja" | "jp" => Some(Language::Ja),
            "ko" | "kr" => Some(Language::Ko),
            "yue" | "cantonese" => Some(Language::Yue),
            "auto" => Some(Language::Auto),
            _ => None,
        }
    }
}

/// A fixed, enumerated event extracted from a recognizer's inline event tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Laugh,
    Applause,
    Music,
    Bgm,
    Cry,
    Cough,
    Sigh,
    Neutral,
}

/// Raw recognizer output before it is stamped into an outbound `Result`.
#[derive(Debug, Clone)]
pub struct RawRecognition {
    pub text: String,
    pub language: Option<Language>,
    pub events: Vec<Event>,
    pub confidence: f32,
}

/// Hints passed to [`SpeakerModel::verify`] so it can make a continuity-aware decision.
#[derive(Debug, Clone)]
pub struct SpeakerHints {
    pub language: Language,
    pub duration_ms: u64,
    pub last_speaker_id: Option<String>,
    pub silence_ms: u64,
}

/// The outcome of a speaker-verification call.
#[derive(Debug, Clone)]
pub struct SpeakerDecision {
    pub speaker_id: String,
    pub similarity_score: f32,
    pub is_new_speaker: bool,
}

/// A read-only view over a session's buffered audio, passed to [`Vad::detect`].
#[derive(Debug, Clone)]
pub struct AudioSnapshot {
    pub pcm: Arc<[i16]>,
    pub start_offset: u64,
    pub end_offset: u64,
    pub sample_rate: u32,
}

impl AudioSnapshot {
    pub fn duration_ms(&self) -> u64 {
        let samples = self.end_offset.saturating_sub(self.start_offset);
        samples.saturating_mul(1000) / self.sample_rate.max(1) as u64
    }
}

/// Returns the current wall-clock time as epoch seconds, matching the `timestamp` field of the
/// external `Result` frame.
pub(crate) fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Automatic speech recognition. The ML model weights and their inference internals are out
/// of scope for this crate. Implementations wrap a real model.
#[async_trait]
pub trait AsrModel: Send + Sync {
    async fn transcribe(&self, pcm: &[i16], language: Language) -> anyhow::Result<RawRecognition>;
}

/// Speaker verification against a per-session registry. Recoverable failures (slice too short,
/// too quiet) are explicit `SpeakerVerifyError` variants, not exceptions.
#[async_trait]
pub trait SpeakerModel: Send + Sync {
    async fn verify(
        &self,
        pcm: &[i16],
        hints: SpeakerHints,
    ) -> Result<SpeakerDecision, SpeakerVerifyError>;
}

/// Voice-activity detection over a buffered audio snapshot.
pub trait Vad: Send + Sync {
    /// Produces zero or more disjoint, strictly-ordered speech intervals, expressed in absolute
    /// session sample offsets. Minimum/maximum duration and in-segment silence tolerance are
    /// enforced by [`crate::vad::VadSegmenter`], not by this trait's implementations.
    fn detect(&self, snapshot: &AudioSnapshot) -> anyhow::Result<Vec<(u64, u64)>>;
}
