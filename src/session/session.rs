use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio_buffer::AudioBuffer;
use crate::config::SessionManagerConfig;
use crate::dispatch::{DispatchError, InferenceDispatcher};
use crate::error::{Error, ErrorKind, SpeakerVerifyError};
use crate::line_break::LineBreakPolicy;
use crate::metrics::{self, Metrics};
use crate::models::{AsrModel, Language, SpeakerDecision, SpeakerModel, Vad};
use crate::speaker::SpeakerTracker;
use crate::text_formatter::{self, Formatted};
use crate::vad::VadSegmenter;

use super::result::{ResultFrame, ResultStream};

/// Shared, process-wide model handles: read-only after init, shared by reference. Routed
/// through [`crate::manager::SessionManager`] by construction rather than held as package-level
/// globals.
#[derive(Clone)]
pub struct ModelHandles {
    pub asr: Arc<dyn AsrModel>,
    pub speaker: Arc<dyn SpeakerModel>,
    pub vad: Arc<dyn Vad>,
}

/// Parameters supplied at session open.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub language: Language,
    pub sv: bool,
}

/// `Session`'s state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Draining,
    Closed,
}

/// The outcome of a speaker-verification attempt for one segment, resolved by whichever
/// dispatch task ran it. Failures are explicit variants (spec §9), never exceptions.
enum SpeakerOutcome {
    Decided(SpeakerDecision),
    TooShort,
    LowEnergy,
    Dispatch(DispatchError),
}

impl From<Result<SpeakerDecision, SpeakerVerifyError>> for SpeakerOutcome {
    fn from(result: Result<SpeakerDecision, SpeakerVerifyError>) -> Self {
        match result {
            Ok(decision) => SpeakerOutcome::Decided(decision),
            Err(SpeakerVerifyError::TooShort) => SpeakerOutcome::TooShort,
            Err(SpeakerVerifyError::LowEnergy) => SpeakerOutcome::LowEnergy,
            Err(SpeakerVerifyError::Model(err)) => {
                SpeakerOutcome::Dispatch(DispatchError::Model(err))
            }
        }
    }
}

/// A resolved segment, still awaiting its turn to be finalized in sequence order.
struct Completion {
    start_ms: u64,
    end_ms: u64,
    duration_ms: u64,
    silence_ms: u64,
    asr: Result<crate::models::RawRecognition, DispatchError>,
    speaker: Option<SpeakerOutcome>,
}

/// Per-connection state machine orchestrating C1–C6 (spec §4.7).
pub struct Session {
    #[allow(dead_code)]
    id: Uuid,
    params: SessionParams,
    state: SessionState,

    sample_rate: u32,
    chunk_size_samples: usize,
    samples_since_last_vad: usize,

    audio: AudioBuffer,
    vad_segmenter: VadSegmenter,
    /// Absolute sample offset up to which the VAD has already resolved closed intervals.
    /// Each periodic pass only scans `[last_vad_offset, audio.end_offset())`, so a segment is
    /// never re-detected and re-dispatched once it has been closed and scheduled.
    last_vad_offset: u64,
    speaker_tracker: SpeakerTracker,
    line_break: LineBreakPolicy,

    models: ModelHandles,
    dispatcher: Arc<InferenceDispatcher>,
    cancel: CancellationToken,
    metrics: Arc<Metrics>,

    next_seq: u64,
    next_seq_to_emit: u64,
    pending: BTreeMap<u64, Completion>,
    last_segment_end_ms: Option<u64>,

    completion_tx: mpsc::UnboundedSender<(u64, Completion)>,
    completion_rx: mpsc::UnboundedReceiver<(u64, Completion)>,
    result_tx: mpsc::UnboundedSender<ResultFrame>,
    result_stream: ResultStream,
}

impl Session {
    pub(crate) fn new(
        id: Uuid,
        params: SessionParams,
        config: &SessionManagerConfig,
        models: ModelHandles,
        dispatcher: Arc<InferenceDispatcher>,
        cancel: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> Self {
        let chunk_size_samples = (config.chunk_size_ms as usize * config.sample_rate as usize) / 1000;
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        metrics.session_opened();

        Self {
            id,
            params,
            state: SessionState::Idle,
            sample_rate: config.sample_rate,
            chunk_size_samples,
            samples_since_last_vad: 0,
            audio: AudioBuffer::new(
                config.capacity_samples(),
                config.vad_buffer_cleanup_threshold,
                config.vad_buffer_cleanup_ratio,
                config.silence_reset_seconds,
                config.keep_samples(),
            ),
            vad_segmenter: VadSegmenter::new(config.sample_rate),
            last_vad_offset: 0,
            speaker_tracker: SpeakerTracker::new(
                config.sv_threshold_base,
                config.sv_min_duration_ms,
                config.sv_min_energy_rms,
            ),
            line_break: LineBreakPolicy::new(config.pause_threshold_ms, config.enable_smart_line_break),
            models,
            dispatcher,
            cancel,
            metrics,
            next_seq: 0,
            next_seq_to_emit: 0,
            pending: BTreeMap::new(),
            last_segment_end_ms: None,
            completion_tx,
            completion_rx,
            result_tx,
            result_stream: ResultStream::new(result_rx),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of segments dispatched but not yet finalized.
    pub fn outstanding(&self) -> u64 {
        self.next_seq - self.next_seq_to_emit
    }

    /// Appends raw PCM bytes, runs periodic VAD, schedules inference for closed segments, and
    /// updates silence-reset state (spec §4.7 "Orchestration algorithm").
    pub fn ingest(&mut self, frame: &[u8]) -> Result<(), Error> {
        if self.state == SessionState::Draining || self.state == SessionState::Closed {
            return Err(Error::kind(
                ErrorKind::ProtocolError,
                "ingest called after session close",
            ));
        }
        if frame.len() % 2 != 0 {
            self.state = SessionState::Closed;
            return Err(Error::kind(
                ErrorKind::ProtocolError,
                "PCM frame has an odd number of bytes",
            ));
        }

        if self.state == SessionState::Idle {
            self.state = SessionState::Streaming;
        }

        let samples: Vec<i16> = frame
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        self.audio.append(&samples);
        if self.audio.fill() > self.audio.capacity() {
            self.fatal("audio buffer fill exceeded capacity after append");
            return Ok(());
        }
        self.samples_since_last_vad += samples.len();

        if self.samples_since_last_vad >= self.chunk_size_samples {
            self.samples_since_last_vad = 0;
            self.run_vad_pass();
        }

        self.drain_completions();
        self.audio.maybe_silence_reset(Instant::now());

        Ok(())
    }

    /// Transitions the session to `Closed` and emits a terminal `code=99` Result (spec §4.7,
    /// §7 `fatal_invariant`). `AudioBuffer` enforces its own `fill ≤ capacity` invariant by
    /// construction, so this is a defensive backstop, not a reachable path under correct
    /// collaborator behavior.
    fn fatal(&mut self, message: &str) {
        tracing::error!(reason = message, "fatal invariant violation, closing session");
        self.cancel.cancel();
        self.state = SessionState::Closed;
        self.metrics.session_closed();
        self.emit(ResultFrame {
            code: ErrorKind::FatalInvariant.code(),
            msg: ErrorKind::FatalInvariant.as_str().to_string(),
            data: String::new(),
            speaker_id: String::new(),
            is_new_line: false,
            segment_type: crate::line_break::SegmentType::Continue,
            timestamp: crate::models::epoch_seconds(),
            confidence: 0.0,
        });
    }

    fn run_vad_pass(&mut self) {
        // Only scan audio the VAD hasn't already resolved into a closed, dispatched interval —
        // otherwise every pass re-detects and re-dispatches everything still in the buffer.
        let snapshot = self
            .audio
            .snapshot_range(self.last_vad_offset, self.audio.end_offset());
        self.last_vad_offset = self.last_vad_offset.max(snapshot.start_offset);
        let now = Instant::now();
        let audio_snapshot = crate::models::AudioSnapshot {
            pcm: snapshot.pcm.clone(),
            start_offset: snapshot.start_offset,
            end_offset: snapshot.end_offset,
            sample_rate: self.sample_rate,
        };
        let intervals = match self
            .vad_segmenter
            .detect(self.models.vad.as_ref(), &audio_snapshot)
        {
            Ok(intervals) => intervals,
            Err(err) => {
                tracing::warn!(error = ?err, "vad detect failed");
                return;
            }
        };
        if !intervals.is_empty() {
            self.audio.note_voice_activity(now);
        }
        for (start_ms, end_ms) in intervals {
            self.dispatch_segment(start_ms, end_ms);
            let end_samples = end_ms * self.sample_rate as u64 / 1000;
            self.last_vad_offset = self.last_vad_offset.max(end_samples);
        }
    }

    fn dispatch_segment(&mut self, start_ms: u64, end_ms: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let start_samples = start_ms * self.sample_rate as u64 / 1000;
        let end_samples = end_ms * self.sample_rate as u64 / 1000;
        let snapshot = self.audio.snapshot_range(start_samples, end_samples);
        let duration_ms = end_ms.saturating_sub(start_ms);
        let silence_ms = start_ms.saturating_sub(self.last_segment_end_ms.unwrap_or(start_ms));
        self.last_segment_end_ms = Some(end_ms);

        let language = self.params.language;
        let sv_hints = self.params.sv.then(|| {
            (
                self.speaker_tracker.precheck(&snapshot.pcm, duration_ms),
                self.speaker_tracker
                    .build_hints(language, duration_ms, silence_ms),
            )
        });

        let asr_model = self.models.asr.clone();
        let speaker_model = self.models.speaker.clone();
        let dispatcher = self.dispatcher.clone();
        let cancel = self.cancel.clone();
        let completion_tx = self.completion_tx.clone();
        let pcm = snapshot.pcm.clone();

        tokio::spawn(async move {
            let asr_pcm = pcm.clone();
            let asr_fut = dispatcher.submit(metrics::kind::ASR, &cancel, move || {
                let model = asr_model.clone();
                let pcm = asr_pcm;
                async move { model.transcribe(&pcm, language).await }
            });

            let speaker_fut = async {
                match sv_hints {
                    None => None,
                    Some((Err(precheck_err), _)) => Some(SpeakerOutcome::from(Err(precheck_err))),
                    Some((Ok(()), hints)) => {
                        let pcm = pcm.clone();
                        let result = dispatcher
                            .submit(metrics::kind::SPEAKER, &cancel, move || {
                                let model = speaker_model.clone();
                                async move { model.verify(&pcm, hints).await.map_err(anyhow::Error::from) }
                            })
                            .await;
                        Some(match result {
                            Ok(decision) => SpeakerOutcome::Decided(decision),
                            Err(dispatch_err) => SpeakerOutcome::Dispatch(dispatch_err),
                        })
                    }
                }
            };

            let (asr, speaker) = tokio::join!(asr_fut, speaker_fut);
            let completion = Completion {
                start_ms,
                end_ms,
                duration_ms,
                silence_ms,
                asr,
                speaker,
            };
            let _ = completion_tx.send((seq, completion));
        });
    }

    /// Drains completed segments and, for each that has arrived in strict sequence order,
    /// finalizes and emits its result. Out-of-order arrivals are held in `pending` until their
    /// turn (spec §4.7 "Ordering guarantee").
    fn drain_completions(&mut self) {
        while let Ok((seq, completion)) = self.completion_rx.try_recv() {
            self.pending.insert(seq, completion);
        }
        while let Some(completion) = self.pending.remove(&self.next_seq_to_emit) {
            self.finalize(completion);
            self.next_seq_to_emit += 1;
        }
    }

    fn finalize(&mut self, completion: Completion) {
        let raw = match completion.asr {
            Ok(raw) => raw,
            // A cancelled future never emits a Result (spec §5): this segment was never
            // actually dispatched to the model, so there's nothing to report.
            Err(DispatchError::Cancelled) => return,
            Err(dispatch_err) => {
                self.emit_error(&dispatch_err);
                return;
            }
        };

        let (text, confidence) = match text_formatter::format(&raw) {
            Formatted::Empty => {
                self.metrics.segment_outcome(metrics::outcome::DROPPED_EMPTY);
                return;
            }
            Formatted::Text { text, confidence, .. } => (text, confidence),
        };

        let speaker_id = match completion.speaker {
            None => String::new(),
            Some(SpeakerOutcome::TooShort) | Some(SpeakerOutcome::LowEnergy) => {
                self.speaker_tracker.last_speaker_id().unwrap_or_default()
            }
            Some(SpeakerOutcome::Dispatch(_)) => {
                self.speaker_tracker.last_speaker_id().unwrap_or_default()
            }
            Some(SpeakerOutcome::Decided(decision)) => {
                let finalized = self.speaker_tracker.finalize(
                    decision,
                    completion.duration_ms,
                    completion.silence_ms,
                    completion.end_ms,
                );
                finalized.speaker_id
            }
        };

        let decision = self
            .line_break
            .decide(&speaker_id, completion.start_ms, completion.end_ms);

        let data = if self.params.sv {
            format!("[{speaker_id}]: {text}")
        } else {
            text
        };

        self.metrics.segment_outcome(metrics::outcome::SUCCESS);
        self.emit(ResultFrame {
            code: 0,
            msg: String::new(),
            data,
            speaker_id,
            is_new_line: decision.is_new_line,
            segment_type: decision.segment_type,
            timestamp: crate::models::epoch_seconds(),
            confidence,
        });
    }

    fn emit_error(&mut self, err: &DispatchError) {
        let code = match err.error_kind() {
            Some(ErrorKind::ModelError) => 2,
            _ => 1,
        };
        let msg = err
            .error_kind()
            .map(|k| k.as_str().to_string())
            .unwrap_or_default();
        let outcome = match err {
            DispatchError::Busy => metrics::outcome::BUSY,
            DispatchError::Timeout => metrics::outcome::TIMEOUT,
            DispatchError::Model(_) => metrics::outcome::MODEL_ERROR,
            // Never reached: `finalize` returns before calling `emit_error` for a cancelled
            // dispatch (spec §5, "never emits a Result").
            DispatchError::Cancelled => return,
        };
        self.metrics.segment_outcome(outcome);
        self.emit(ResultFrame {
            code,
            msg,
            data: String::new(),
            speaker_id: String::new(),
            is_new_line: false,
            segment_type: crate::line_break::SegmentType::Continue,
            timestamp: crate::models::epoch_seconds(),
            confidence: 0.0,
        });
    }

    fn emit(&self, result: ResultFrame) {
        let _ = self.result_tx.send(result);
    }

    /// The ordered outbound result sequence (spec §4.7 `Session::Results()`).
    pub fn results(&mut self) -> &mut ResultStream {
        &mut self.result_stream
    }

    /// Marks the session terminal: cancels in-flight inference, drains the result queue up to
    /// `drain_deadline`, then releases owned resources (spec §4.7 `Session::Close()`).
    pub async fn close(&mut self, drain_deadline: Duration) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Draining;
        self.cancel.cancel();

        let deadline = Instant::now() + drain_deadline;
        loop {
            self.drain_completions();
            if self.outstanding() == 0 {
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        self.state = SessionState::Closed;
        self.metrics.session_closed();
    }
}
