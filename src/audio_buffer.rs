//! Bounded rolling PCM buffer with overflow trim and silence-triggered reset.
//!
//! Samples accumulate in a `Vec<i16>`, a `head` index marks the start of the live window, and
//! `start_offset` tracks how many samples have been permanently discarded. The absolute sample
//! offset exposed to callers (`start_offset + head` through `start_offset + samples.len()`) is
//! monotonic and never resets, even though the physical buffer is trimmed.

use std::sync::Arc;
use std::time::Instant;

/// A read-only view over a contiguous range of buffered audio, suitable for VAD and ASR.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub pcm: Arc<[i16]>,
    pub start_offset: u64,
    pub end_offset: u64,
}

/// Bounded rolling PCM buffer for a single session.
pub struct AudioBuffer {
    capacity: usize,
    cleanup_threshold: f32,
    cleanup_ratio: f32,
    silence_reset_seconds: u64,
    keep_samples: usize,

    samples: Vec<i16>,
    head: usize,
    /// Absolute sample offset of `samples[0]` (i.e. of everything discarded so far).
    start_offset: u64,

    last_voice_at: Option<Instant>,
}

impl AudioBuffer {
    pub fn new(
        capacity: usize,
        cleanup_threshold: f32,
        cleanup_ratio: f32,
        silence_reset_seconds: u64,
        keep_samples: usize,
    ) -> Self {
        Self {
            capacity,
            cleanup_threshold,
            cleanup_ratio,
            silence_reset_seconds,
            keep_samples,
            samples: Vec::with_capacity(capacity),
            head: 0,
            start_offset: 0,
            last_voice_at: None,
        }
    }

    /// Current number of live samples held (`fill` in spec terms).
    pub fn fill(&self) -> usize {
        self.samples.len() - self.head
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Absolute offset of the start of the live window.
    pub fn start_offset(&self) -> u64 {
        self.start_offset + self.head as u64
    }

    /// Absolute offset one past the end of the live window.
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.samples.len() as u64
    }

    /// Appends mono PCM samples, trimming the head once the append would cross the
    /// configured cleanup threshold fraction of capacity. Never blocks, never fails.
    pub fn append(&mut self, samples: &[i16]) {
        if self.is_over_threshold(samples.len()) {
            self.trim_overflow();
        }
        self.samples.extend_from_slice(samples);
        debug_assert!(self.fill() <= self.capacity || samples.len() > self.capacity);
    }

    fn trim_overflow(&mut self) {
        let discard = (self.capacity as f32 * self.cleanup_ratio).ceil() as usize;
        let discard = discard.min(self.fill());
        self.head += discard;
        self.compact();
    }

    fn compact(&mut self) {
        if self.head == 0 {
            return;
        }
        self.start_offset += self.head as u64;
        self.samples.drain(..self.head);
        self.head = 0;
    }

    /// Returns whether appending `additional` more samples would cross the configured cleanup
    /// threshold fraction of capacity. `append` consults this to decide whether to trim first.
    pub fn is_over_threshold(&self, additional: usize) -> bool {
        (self.fill() + additional) as f32 >= self.capacity as f32 * self.cleanup_threshold
    }

    /// Returns a read-only snapshot of the full live window.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_range(self.start_offset(), self.end_offset())
    }

    /// Returns a read-only snapshot of `[start, end)` in absolute sample offsets. A range no
    /// longer held (already trimmed away) returns an empty snapshot.
    pub fn snapshot_range(&self, start: u64, end: u64) -> Snapshot {
        let live_start = self.start_offset();
        let live_end = self.end_offset();
        let start = start.max(live_start);
        let end = end.min(live_end);
        if start >= end {
            return Snapshot {
                pcm: Arc::from(&[][..]),
                start_offset: start,
                end_offset: start,
            };
        }
        let lo = (start - self.start_offset) as usize;
        let hi = (end - self.start_offset) as usize;
        Snapshot {
            pcm: Arc::from(&self.samples[lo..hi]),
            start_offset: start,
            end_offset: end,
        }
    }

    /// Records the wall-clock instant of detected voice activity.
    pub fn note_voice_activity(&mut self, at: Instant) {
        self.last_voice_at = Some(at);
    }

    /// If `now - last_voice_at ≥ silence_reset_seconds`, retains only the trailing
    /// `keep_samples` worth of audio and advances the offset accordingly.
    /// Idempotent: calling this repeatedly during one silent interval has no further effect
    /// once the trim has happened, since `last_voice_at` is unchanged until the next append.
    pub fn maybe_silence_reset(&mut self, now: Instant) -> bool {
        let Some(last_voice) = self.last_voice_at else {
            return false;
        };
        if now.saturating_duration_since(last_voice).as_secs() < self.silence_reset_seconds {
            return false;
        }
        let fill = self.fill();
        if fill <= self.keep_samples {
            return false;
        }
        let discard = fill - self.keep_samples;
        self.head += discard;
        self.compact();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf() -> AudioBuffer {
        AudioBuffer::new(16_000 * 15, 0.8, 0.3, 30, 16_000 * 5)
    }

    #[test]
    fn fill_never_exceeds_capacity() {
        let mut b = buf();
        for _ in 0..40 {
            b.append(&vec![1i16; 16_000]);
            assert!(b.fill() <= b.capacity());
        }
    }

    #[test]
    fn offset_is_monotonic_across_trims() {
        let mut b = buf();
        let mut last = b.end_offset();
        for _ in 0..40 {
            b.append(&vec![1i16; 16_000]);
            assert!(b.start_offset() <= b.end_offset());
            assert!(b.end_offset() >= last);
            last = b.end_offset();
        }
    }

    #[test]
    fn snapshot_of_discarded_range_is_empty() {
        let mut b = buf();
        for _ in 0..40 {
            b.append(&vec![1i16; 16_000]);
        }
        let snap = b.snapshot_range(0, 10);
        assert_eq!(snap.pcm.len(), 0);
    }

    #[test]
    fn trim_fires_at_cleanup_threshold_not_capacity() {
        let mut b = buf();
        let threshold = (b.capacity() as f32 * 0.8) as usize;
        b.append(&vec![1i16; threshold - 1]);
        assert_eq!(b.fill(), threshold - 1, "no trim below the cleanup threshold");
        b.append(&vec![1i16; 1]);
        assert!(
            b.fill() < threshold,
            "crossing the cleanup threshold must trim immediately, not wait for 100% capacity"
        );
    }

    #[test]
    fn silence_reset_trims_to_keep_seconds() {
        let mut b = buf();
        b.append(&vec![1i16; 16_000]);
        let t0 = Instant::now();
        b.note_voice_activity(t0);
        b.append(&vec![1i16; 16_000 * 10]);
        let t1 = t0 + std::time::Duration::from_secs(31);
        let reset = b.maybe_silence_reset(t1);
        assert!(reset);
        assert!(b.fill() <= 16_000 * 5);
    }

    #[test]
    fn silence_reset_is_idempotent_within_one_silent_interval() {
        let mut b = buf();
        b.append(&vec![1i16; 16_000 * 10]);
        let t0 = Instant::now();
        b.note_voice_activity(t0);
        let t1 = t0 + std::time::Duration::from_secs(31);
        assert!(b.maybe_silence_reset(t1));
        let fill_after_first = b.fill();
        assert!(!b.maybe_silence_reset(t1 + std::time::Duration::from_secs(1)));
        assert_eq!(b.fill(), fill_after_first);
    }

    proptest::proptest! {
        /// `fill` never exceeds `capacity`, and the live offset window stays well-formed,
        /// across any sequence of append sizes.
        #[test]
        fn fill_stays_bounded_across_arbitrary_appends(chunk_sizes in proptest::collection::vec(1usize..20_000, 1..50)) {
            let mut b = buf();
            for size in chunk_sizes {
                b.append(&vec![1i16; size]);
                proptest::prop_assert!(b.fill() <= b.capacity());
                proptest::prop_assert!(b.start_offset() <= b.end_offset());
            }
        }

        /// The absolute offset exposed to callers never moves backwards, regardless of how
        /// many times the buffer trims internally.
        #[test]
        fn end_offset_is_monotonic_across_arbitrary_appends(chunk_sizes in proptest::collection::vec(1usize..20_000, 1..50)) {
            let mut b = buf();
            let mut last_end = b.end_offset();
            for size in chunk_sizes {
                b.append(&vec![1i16; size]);
                proptest::prop_assert!(b.end_offset() >= last_end);
                last_end = b.end_offset();
            }
        }
    }
}
