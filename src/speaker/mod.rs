//! Speaker history, dynamic threshold adjustment, and continuity tracking.

mod tracker;

pub use tracker::SpeakerTracker;
