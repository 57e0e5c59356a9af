//! Fake collaborators for tests. No network, no real model weights, no GPU — every
//! `AsrModel`/`SpeakerModel`/`Vad` implementation here is a deterministic stand-in, consistent
//! with "ML model weights and inference internals" being out of this crate's scope (spec §1).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SpeakerVerifyError;
use crate::models::{
    AsrModel, AudioSnapshot, Language, RawRecognition, SpeakerDecision, SpeakerHints, SpeakerModel,
    Vad,
};

/// Echoes a fixed transcript for every call, tagging it with a monotonically increasing
/// counter so tests can tell calls apart.
pub struct FakeAsrModel {
    text: String,
    confidence: f32,
}

impl FakeAsrModel {
    pub fn echo() -> Self {
        Self {
            text: "hello world".to_string(),
            confidence: 0.95,
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 0.95,
        }
    }

    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }
}

#[async_trait]
impl AsrModel for FakeAsrModel {
    async fn transcribe(&self, _pcm: &[i16], language: Language) -> anyhow::Result<RawRecognition> {
        Ok(RawRecognition {
            text: self.text.clone(),
            language: Some(language),
            events: vec![],
            confidence: self.confidence,
        })
    }
}

/// Echoes a fixed transcript after sleeping `delay`, for tests that need to hold a worker slot
/// open or outlast a session close.
pub struct SlowAsrModel {
    text: String,
    delay: std::time::Duration,
}

impl SlowAsrModel {
    pub fn new(text: impl Into<String>, delay: std::time::Duration) -> Self {
        Self {
            text: text.into(),
            delay,
        }
    }
}

#[async_trait]
impl AsrModel for SlowAsrModel {
    async fn transcribe(&self, _pcm: &[i16], language: Language) -> anyhow::Result<RawRecognition> {
        tokio::time::sleep(self.delay).await;
        Ok(RawRecognition {
            text: self.text.clone(),
            language: Some(language),
            events: vec![],
            confidence: 0.9,
        })
    }
}

/// Never matches an existing speaker; always allocates a fresh id supplied by the caller.
pub struct FakeSpeakerModel {
    counter: AtomicU64,
}

impl FakeSpeakerModel {
    pub fn always_new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl SpeakerModel for FakeSpeakerModel {
    async fn verify(
        &self,
        _pcm: &[i16],
        _hints: SpeakerHints,
    ) -> Result<SpeakerDecision, SpeakerVerifyError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(SpeakerDecision {
            speaker_id: format!("fake-speaker-{n}"),
            similarity_score: 0.0,
            is_new_speaker: true,
        })
    }
}

/// Always reports the same candidate id with a fixed similarity score; useful for exercising
/// the dynamic-threshold math deterministically.
pub struct FixedSpeakerModel {
    pub speaker_id: String,
    pub similarity_score: f32,
}

#[async_trait]
impl SpeakerModel for FixedSpeakerModel {
    async fn verify(
        &self,
        _pcm: &[i16],
        _hints: SpeakerHints,
    ) -> Result<SpeakerDecision, SpeakerVerifyError> {
        Ok(SpeakerDecision {
            speaker_id: self.speaker_id.clone(),
            similarity_score: self.similarity_score,
            is_new_speaker: false,
        })
    }
}

/// Returns a pre-scripted sequence of decisions, one per call, for tests that need to control
/// exactly which speaker each segment resolves to.
pub struct ScriptedSpeakerModel {
    decisions: Mutex<VecDeque<SpeakerDecision>>,
}

impl ScriptedSpeakerModel {
    pub fn new(decisions: Vec<SpeakerDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
        }
    }
}

#[async_trait]
impl SpeakerModel for ScriptedSpeakerModel {
    async fn verify(
        &self,
        _pcm: &[i16],
        _hints: SpeakerHints,
    ) -> Result<SpeakerDecision, SpeakerVerifyError> {
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(SpeakerVerifyError::Model(anyhow::anyhow!(
                "ScriptedSpeakerModel ran out of scripted decisions"
            )))
    }
}

/// Reports the entire snapshot as one speech interval.
pub struct FakeVad;

impl FakeVad {
    pub fn whole_buffer_as_speech() -> Self {
        Self
    }
}

impl Vad for FakeVad {
    fn detect(&self, snapshot: &AudioSnapshot) -> anyhow::Result<Vec<(u64, u64)>> {
        if snapshot.end_offset <= snapshot.start_offset {
            return Ok(vec![]);
        }
        Ok(vec![(snapshot.start_offset, snapshot.end_offset)])
    }
}

/// Returns a fixed, caller-supplied list of intervals regardless of the snapshot passed in.
/// Useful for tests that need to control segment boundaries precisely.
pub struct ScriptedVad {
    intervals: Mutex<Vec<(u64, u64)>>,
}

impl ScriptedVad {
    pub fn new(intervals: Vec<(u64, u64)>) -> Self {
        Self {
            intervals: Mutex::new(intervals),
        }
    }
}

impl Vad for ScriptedVad {
    fn detect(&self, _snapshot: &AudioSnapshot) -> anyhow::Result<Vec<(u64, u64)>> {
        Ok(std::mem::take(&mut self.intervals.lock().unwrap()))
    }
}
