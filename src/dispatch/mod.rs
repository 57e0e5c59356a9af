//! Bounded worker pool shared across sessions; runs ASR and speaker-verification work
//! concurrently and enforces per-call timeouts.

mod dispatcher;

pub use dispatcher::{DispatchError, InferenceDispatcher};
