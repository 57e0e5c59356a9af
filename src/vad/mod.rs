//! Wraps a [`crate::models::Vad`] capability, turning its raw detections into the disjoint,
//! duration-bounded speech intervals `Session` dispatches inference over.

mod segmenter;

pub use segmenter::VadSegmenter;
