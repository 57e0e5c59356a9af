//! `cadence` — a per-session core for real-time speech transcription.
//!
//! This crate owns the parts of a streaming transcription pipeline that sit between a
//! transport (gRPC, WebSocket, whatever carries raw PCM frames in) and the ML models that do
//! recognition, speaker verification, and voice-activity detection:
//!
//! - Rolling audio buffering with bounded memory and silence-triggered resets
//! - Voice-activity segmentation into disjoint, duration-bounded intervals
//! - Concurrent, bounded dispatch of ASR and speaker-verification calls per segment
//! - Dynamic-threshold speaker continuity tracking
//! - Smart line-break decisions for the emitted transcript
//! - Strict-order result emission, even though inference completes out of order
//!
//! `AsrModel`, `SpeakerModel`, and `Vad` are the seams: this crate supplies the orchestration
//! and state machines, callers supply the models.

pub mod audio_buffer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod line_break;
pub mod logging;
pub mod metrics;
pub mod manager;
pub mod models;
pub mod session;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod text_formatter;
pub mod vad;

mod speaker;

pub use error::{Error, ErrorKind, Result};
pub use manager::SessionManager;
pub use models::{AsrModel, Language, SpeakerModel, Vad as VadModel};
pub use session::{ResultFrame, Session, SessionParams, SessionState};
