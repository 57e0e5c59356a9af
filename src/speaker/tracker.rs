use std::collections::VecDeque;

use uuid::Uuid;

use crate::error::SpeakerVerifyError;
use crate::models::{Language, SpeakerDecision, SpeakerHints};

/// Registry/history capacities and threshold constants.
const HISTORY_CAPACITY: usize = 8;
const REGISTRY_CAPACITY: usize = 32;
const THRESHOLD_MIN: f32 = 0.30;
const THRESHOLD_MAX: f32 = 0.70;
const SHORT_UTTERANCE_MS: u64 = 1_000;
const SHORT_UTTERANCE_BONUS: f32 = 0.05;
const LONG_SILENCE_MS: u64 = 2_000;
const LONG_SILENCE_DISCOUNT: f32 = 0.03;

/// Maintains per-session speaker history, the dynamic similarity threshold, and a bounded LRU
/// registry of known speaker ids. Delegates embedding extraction and raw similarity scoring to
/// a [`crate::models::SpeakerModel`] (model weights/inference internals are out of this crate's
/// scope); this type owns the decision of *which* candidate counts as a match and the
/// bookkeeping that decision depends on.
///
/// Split into two phases so it stays correct under concurrent dispatch: [`Self::precheck`] and
/// [`Self::build_hints`] are read-only and safe to call while a segment is merely being
/// *dispatched* (segments for a session may be in flight concurrently); [`Self::finalize`]
/// mutates history and the registry and must only be called by the session's completion
/// collator, strictly in segment sequence order, since the dynamic-threshold math and "same as
/// last speaker" checks are only meaningful relative to state as of the immediately preceding
/// segment.
pub struct SpeakerTracker {
    threshold_base: f32,
    min_duration_ms: u64,
    min_energy_rms: f32,

    history: VecDeque<(String, u64)>,
    registry: VecDeque<String>,
}

impl SpeakerTracker {
    pub fn new(threshold_base: f32, min_duration_ms: u64, min_energy_rms: f32) -> Self {
        Self {
            threshold_base,
            min_duration_ms,
            min_energy_rms,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            registry: VecDeque::with_capacity(REGISTRY_CAPACITY),
        }
    }

    /// The most recently recorded speaker id, if any.
    pub fn last_speaker_id(&self) -> Option<String> {
        self.history.back().map(|(id, _)| id.clone())
    }

    /// Rejects audio that's too short or too quiet before ever invoking the model.
    pub fn precheck(&self, pcm: &[i16], duration_ms: u64) -> Result<(), SpeakerVerifyError> {
        if duration_ms < self.min_duration_ms {
            return Err(SpeakerVerifyError::TooShort);
        }
        if rms_energy(pcm) < self.min_energy_rms {
            return Err(SpeakerVerifyError::LowEnergy);
        }
        Ok(())
    }

    /// Builds the hints passed to [`crate::models::SpeakerModel::verify`], snapshotting the
    /// current `last_speaker_id` at dispatch time.
    pub fn build_hints(&self, language: Language, duration_ms: u64, silence_ms: u64) -> SpeakerHints {
        SpeakerHints {
            language,
            duration_ms,
            last_speaker_id: self.last_speaker_id(),
            silence_ms,
        }
    }

    /// Applies the dynamic-threshold decision to a raw model result and records the outcome
    /// into history, in the calling order (must be sequence-ordered by the caller).
    pub fn finalize(
        &mut self,
        raw: SpeakerDecision,
        duration_ms: u64,
        silence_ms: u64,
        end_ms: u64,
    ) -> SpeakerDecision {
        let last_speaker_id = self.last_speaker_id();
        let same_as_last = last_speaker_id.as_deref() == Some(raw.speaker_id.as_str());
        let threshold = self.effective_threshold(duration_ms, silence_ms, same_as_last);

        let decision = if raw.is_new_speaker || raw.similarity_score < threshold {
            let fresh_id = self.allocate_id();
            SpeakerDecision {
                speaker_id: fresh_id,
                similarity_score: raw.similarity_score,
                is_new_speaker: true,
            }
        } else {
            self.touch(&raw.speaker_id);
            SpeakerDecision {
                speaker_id: raw.speaker_id,
                similarity_score: raw.similarity_score,
                is_new_speaker: false,
            }
        };

        self.record(decision.speaker_id.clone(), end_ms);
        decision
    }

    /// Records a finalized `(speaker_id, end_ms)` pair into the bounded history.
    fn record(&mut self, speaker_id: String, end_ms: u64) {
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back((speaker_id, end_ms));
    }

    /// The effective similarity threshold for the given call context.
    fn effective_threshold(&self, duration_ms: u64, silence_ms: u64, same_as_last: bool) -> f32 {
        let mut threshold = self.threshold_base;
        if duration_ms < SHORT_UTTERANCE_MS {
            threshold += SHORT_UTTERANCE_BONUS;
        }
        if silence_ms > LONG_SILENCE_MS && same_as_last {
            threshold -= LONG_SILENCE_DISCOUNT;
        }
        threshold.clamp(THRESHOLD_MIN, THRESHOLD_MAX)
    }

    fn allocate_id(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        self.touch(&id);
        id
    }

    /// Marks `id` as most-recently-used, evicting the least-recently-used entry if the
    /// registry is at capacity.
    fn touch(&mut self, id: &str) {
        if let Some(pos) = self.registry.iter().position(|known| known == id) {
            self.registry.remove(pos);
        } else if self.registry.len() >= REGISTRY_CAPACITY {
            self.registry.pop_front();
        }
        self.registry.push_back(id.to_string());
    }
}

fn rms_energy(pcm: &[i16]) -> f32 {
    if pcm.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = pcm.iter().map(|&s| (s as f64 / i16::MAX as f64).powi(2)).sum();
    ((sum_squares / pcm.len() as f64).sqrt()) as f32
}
