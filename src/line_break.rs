//! Decides `new_line`/`segment_type` for each accepted result using speaker id continuity and
//! inter-segment pause.

use serde::{Deserialize, Serialize};

/// The `segment_type` field of the external `Result` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    NewSpeaker,
    Pause,
    Continue,
    Traditional,
}

/// The decision returned for each result: whether it starts a new displayed line, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBreakDecision {
    pub is_new_line: bool,
    pub segment_type: SegmentType,
}

/// Stateful decision procedure carried across a session's results. State is just
/// the previous `(speaker_id, end_ms)` pair; everything else is a pure function of the current
/// call's arguments.
pub struct LineBreakPolicy {
    pause_threshold_ms: u64,
    smart_line_break_enabled: bool,
    previous: Option<(String, u64)>,
}

impl LineBreakPolicy {
    pub fn new(pause_threshold_ms: u64, smart_line_break_enabled: bool) -> Self {
        Self {
            pause_threshold_ms,
            smart_line_break_enabled,
            previous: None,
        }
    }

    /// Decides the line-break outcome for a result with the given `speaker_id` and
    /// `[start_ms, end_ms)` span, then updates the carried state.
    pub fn decide(&mut self, speaker_id: &str, start_ms: u64, end_ms: u64) -> LineBreakDecision {
        let decision = if !self.smart_line_break_enabled {
            LineBreakDecision {
                is_new_line: true,
                segment_type: SegmentType::Traditional,
            }
        } else {
            match &self.previous {
                None => LineBreakDecision {
                    is_new_line: true,
                    segment_type: SegmentType::NewSpeaker,
                },
                Some((prev_speaker, _)) if prev_speaker != speaker_id => LineBreakDecision {
                    is_new_line: true,
                    segment_type: SegmentType::NewSpeaker,
                },
                Some((_, prev_end)) => {
                    let gap_ms = start_ms.saturating_sub(*prev_end);
                    if gap_ms >= self.pause_threshold_ms {
                        LineBreakDecision {
                            is_new_line: true,
                            segment_type: SegmentType::Pause,
                        }
                    } else {
                        LineBreakDecision {
                            is_new_line: false,
                            segment_type: SegmentType::Continue,
                        }
                    }
                }
            }
        };

        self.previous = Some((speaker_id.to_string(), end_ms));
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_result_is_new_speaker() {
        let mut policy = LineBreakPolicy::new(1500, true);
        let d = policy.decide("a", 0, 2000);
        assert!(d.is_new_line);
        assert_eq!(d.segment_type, SegmentType::NewSpeaker);
    }

    #[test]
    fn short_pause_same_speaker_continues() {
        let mut policy = LineBreakPolicy::new(1500, true);
        policy.decide("a", 0, 2000);
        let d = policy.decide("a", 2500, 4000);
        assert!(!d.is_new_line);
        assert_eq!(d.segment_type, SegmentType::Continue);
    }

    #[test]
    fn long_pause_same_speaker_is_pause() {
        let mut policy = LineBreakPolicy::new(1500, true);
        policy.decide("a", 0, 2000);
        let d = policy.decide("a", 3500, 5000);
        assert!(d.is_new_line);
        assert_eq!(d.segment_type, SegmentType::Pause);
    }

    #[test]
    fn speaker_change_is_new_speaker() {
        let mut policy = LineBreakPolicy::new(1500, true);
        policy.decide("a", 0, 2000);
        let d = policy.decide("b", 2300, 4000);
        assert!(d.is_new_line);
        assert_eq!(d.segment_type, SegmentType::NewSpeaker);
    }

    #[test]
    fn pause_boundary_exactly_1500ms_is_pause() {
        let mut policy = LineBreakPolicy::new(1500, true);
        policy.decide("a", 0, 2000);
        let d = policy.decide("a", 3500, 5000);
        assert_eq!(d.segment_type, SegmentType::Pause);
    }

    #[test]
    fn pause_boundary_1499ms_is_continue() {
        let mut policy = LineBreakPolicy::new(1500, true);
        policy.decide("a", 0, 2000);
        let d = policy.decide("a", 3499, 5000);
        assert_eq!(d.segment_type, SegmentType::Continue);
    }

    #[test]
    fn disabled_smart_line_break_is_always_traditional() {
        let mut policy = LineBreakPolicy::new(1500, false);
        policy.decide("a", 0, 2000);
        let d = policy.decide("a", 2100, 4000);
        assert!(d.is_new_line);
        assert_eq!(d.segment_type, SegmentType::Traditional);
    }

    #[test]
    fn decisions_are_deterministic_for_same_input_sequence() {
        let inputs = [("a", 0u64, 2000u64), ("a", 2500, 4000), ("b", 4300, 6000)];
        let mut p1 = LineBreakPolicy::new(1500, true);
        let mut p2 = LineBreakPolicy::new(1500, true);
        let out1: Vec<_> = inputs.iter().map(|(s, st, e)| p1.decide(s, *st, *e)).collect();
        let out2: Vec<_> = inputs.iter().map(|(s, st, e)| p2.decide(s, *st, *e)).collect();
        assert_eq!(out1, out2);
    }

    proptest::proptest! {
        /// Two independent policies fed the same arbitrary sequence of `(speaker_id, start_ms,
        /// duration_ms)` triples always produce identical decisions — `decide` is a pure
        /// function of its carried state and its arguments.
        #[test]
        fn decide_is_deterministic_for_arbitrary_sequences(
            steps in proptest::collection::vec(
                (0u8..4, 0u64..3000, 100u64..3000),
                1..30,
            )
        ) {
            let mut p1 = LineBreakPolicy::new(1500, true);
            let mut p2 = LineBreakPolicy::new(1500, true);
            let mut end_ms = 0u64;
            let mut out1 = Vec::new();
            let mut out2 = Vec::new();
            for (speaker, gap, duration) in steps {
                let speaker_id = format!("speaker-{speaker}");
                let start_ms = end_ms + gap;
                end_ms = start_ms + duration;
                out1.push(p1.decide(&speaker_id, start_ms, end_ms));
                out2.push(p2.decide(&speaker_id, start_ms, end_ms));
            }
            proptest::prop_assert_eq!(out1, out2);
        }

        /// A segment reported with the same speaker id as the previous one and a gap under the
        /// pause threshold never starts a new line.
        #[test]
        fn same_speaker_short_gap_never_breaks_the_line(gap_ms in 0u64..1500) {
            let mut policy = LineBreakPolicy::new(1500, true);
            policy.decide("a", 0, 2000);
            let d = policy.decide("a", 2000 + gap_ms, 4000 + gap_ms);
            proptest::prop_assert!(!d.is_new_line);
        }
    }
}
