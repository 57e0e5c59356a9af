//! Per-connection state machine: orchestrates `AudioBuffer`, `VadSegmenter`, `SpeakerTracker`,
//! and `LineBreakPolicy`; implements backpressure, cancellation, and strict result ordering
//! (spec §4.7).

mod result;
mod session;

pub use result::{ResultFrame, ResultStream};
pub use session::{ModelHandles, Session, SessionParams, SessionState};
