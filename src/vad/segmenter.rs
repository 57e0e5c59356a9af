use crate::models::{AudioSnapshot, Vad};

/// Minimum accepted segment duration.
const MIN_SEGMENT_MS: u64 = 300;
/// Maximum segment duration before a force-cut.
const MAX_SEGMENT_MS: u64 = 30_000;
/// Silence within a candidate interval shorter than this does not close it.
const SILENCE_TOLERANCE_MS: u64 = 500;

/// Post-processes a [`Vad`] implementation's raw detections into disjoint, strictly-ordered
/// speech intervals obeying the minimum/maximum duration and in-segment silence tolerance
/// rules. The raw `Vad::detect` call may return closely-spaced or frame-granular intervals;
/// this merges across short gaps, splits long runs, and discards anything too short.
pub struct VadSegmenter {
    sample_rate: u32,
}

impl VadSegmenter {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Runs `vad` over `snapshot` and returns zero or more closed `(start_ms, end_ms)`
    /// intervals in absolute session time, disjoint and strictly ordered.
    pub fn detect(&self, vad: &dyn Vad, snapshot: &AudioSnapshot) -> anyhow::Result<Vec<(u64, u64)>> {
        let raw = vad.detect(snapshot)?;
        let merged = self.merge_close_intervals(raw);
        let split = self.split_long_intervals(merged);
        Ok(self.drop_short_intervals(split))
    }

    fn samples_to_ms(&self, samples: u64) -> u64 {
        samples.saturating_mul(1000) / self.sample_rate.max(1) as u64
    }

    fn merge_close_intervals(&self, mut raw: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
        raw.sort_unstable_by_key(|&(start, _)| start);
        let tolerance_samples =
            SILENCE_TOLERANCE_MS.saturating_mul(self.sample_rate as u64) / 1000;

        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(raw.len());
        for (start, end) in raw {
            if let Some(last) = merged.last_mut() {
                if start.saturating_sub(last.1) <= tolerance_samples {
                    last.1 = last.1.max(end);
                    continue;
                }
            }
            merged.push((start, end));
        }
        merged
    }

    fn split_long_intervals(&self, intervals: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
        let max_samples = MAX_SEGMENT_MS.saturating_mul(self.sample_rate as u64) / 1000;
        let mut out = Vec::with_capacity(intervals.len());
        for (start, end) in intervals {
            let mut cursor = start;
            while end.saturating_sub(cursor) > max_samples {
                out.push((cursor, cursor + max_samples));
                cursor += max_samples;
            }
            out.push((cursor, end));
        }
        out
    }

    fn drop_short_intervals(&self, intervals: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
        intervals
            .into_iter()
            .filter(|&(start, end)| self.samples_to_ms(end.saturating_sub(start)) >= MIN_SEGMENT_MS)
            .map(|(start_samples, end_samples)| {
                (self.samples_to_ms(start_samples), self.samples_to_ms(end_samples))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioSnapshot;
    use std::sync::Arc;

    struct FixedVad(Vec<(u64, u64)>);
    impl Vad for FixedVad {
        fn detect(&self, _snapshot: &AudioSnapshot) -> anyhow::Result<Vec<(u64, u64)>> {
            Ok(self.0.clone())
        }
    }

    fn snapshot() -> AudioSnapshot {
        AudioSnapshot {
            pcm: Arc::from(&[][..]),
            start_offset: 0,
            end_offset: 16_000 * 40,
            sample_rate: 16_000,
        }
    }

    #[test]
    fn discards_segment_under_minimum_duration() {
        let seg = VadSegmenter::new(16_000);
        // 299 ms worth of samples.
        let intervals = FixedVad(vec![(0, 16_000 * 299 / 1000)]);
        let out = seg.detect(&intervals, &snapshot()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn accepts_segment_at_minimum_duration() {
        let seg = VadSegmenter::new(16_000);
        let intervals = FixedVad(vec![(0, 16_000 * 300 / 1000)]);
        let out = seg.detect(&intervals, &snapshot()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], (0, 300));
    }

    #[test]
    fn merges_intervals_within_silence_tolerance() {
        let seg = VadSegmenter::new(16_000);
        let one_sec = 16_000u64;
        // Two 1s voice runs separated by 400ms silence: should merge into one 2.4s interval.
        let gap = 16_000 * 400 / 1000;
        let intervals = FixedVad(vec![(0, one_sec), (one_sec + gap, one_sec + gap + one_sec)]);
        let out = seg.detect(&intervals, &snapshot()).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn does_not_merge_across_silence_longer_than_tolerance() {
        let seg = VadSegmenter::new(16_000);
        let one_sec = 16_000u64;
        let gap = 16_000 * 600 / 1000;
        let intervals = FixedVad(vec![(0, one_sec), (one_sec + gap, one_sec + gap + one_sec)]);
        let out = seg.detect(&intervals, &snapshot()).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn splits_runs_longer_than_max_duration() {
        let seg = VadSegmenter::new(16_000);
        let samples_31s = 16_000 * 31;
        let intervals = FixedVad(vec![(0, samples_31s)]);
        let out = seg.detect(&intervals, &snapshot()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], (0, 30_000));
        assert_eq!(out[1].0, 30_000);
    }

    #[test]
    fn intervals_are_disjoint_and_ordered() {
        let seg = VadSegmenter::new(16_000);
        let one_sec = 16_000u64;
        let intervals = FixedVad(vec![
            (0, one_sec),
            (one_sec * 3, one_sec * 4),
            (one_sec * 10, one_sec * 11),
        ]);
        let out = seg.detect(&intervals, &snapshot()).unwrap();
        assert_eq!(out.len(), 3);
        for pair in out.windows(2) {
            assert!(pair[0].1 <= pair[1].0);
        }
    }
}
