use super::recognizer::ChordEvent;

/// Collapse repeated labels and absorb chords shorter than `min_duration`
/// seconds into their neighbours.
///
/// A short entry folds into the entry before it. A short first entry folds
/// into the one after it, which then starts at the first entry's time.
/// `end_time` closes the last entry. A `min_duration` of zero or less only
/// merges repeats.
pub fn smooth_timeline(
    timeline: &[ChordEvent],
    min_duration: f32,
    end_time: f32,
) -> Vec<ChordEvent> {
    let mut events = merge_repeats(timeline.to_vec());
    if min_duration.is_nan() || min_duration <= 0.0 {
        return events;
    }

    let before = events.len();
    let mut i = 0;
    while i < events.len() && events.len() > 1 {
        let until = events.get(i + 1).map_or(end_time, |next| next.time);
        if until - events[i].time >= min_duration {
            i += 1;
            continue;
        }

        if i == 0 {
            let first = events.remove(0);
            events[0].time = first.time;
        } else {
            events.remove(i);
            if i < events.len() && events[i].chord == events[i - 1].chord {
                events.remove(i);
            }
        }
        // Re-check position i, it now holds a different entry.
    }

    log::debug!(
        "Smoothing at {:.2}s folded {} chord changes",
        min_duration,
        before - events.len()
    );
    events
}

fn merge_repeats(mut events: Vec<ChordEvent>) -> Vec<ChordEvent> {
    events.dedup_by(|later, earlier| later.chord == earlier.chord);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(entries: &[(f32, &str)]) -> Vec<ChordEvent> {
        entries.iter().map(|&(t, c)| ChordEvent::new(t, c)).collect()
    }

    fn pairs(events: &[ChordEvent]) -> Vec<(f32, &str)> {
        events.iter().map(|e| (e.time, e.chord.as_str())).collect()
    }

    #[test]
    fn zero_duration_only_merges_repeats() {
        let input = timeline(&[(0.0, "C"), (0.5, "C"), (1.0, "G"), (1.1, "Am"), (1.5, "Am")]);
        let out = smooth_timeline(&input, 0.0, 2.0);
        assert_eq!(pairs(&out), vec![(0.0, "C"), (1.0, "G"), (1.1, "Am")]);
    }

    #[test]
    fn short_chord_folds_into_predecessor() {
        let input = timeline(&[(0.0, "C"), (1.0, "G"), (1.2, "C"), (2.0, "F")]);
        let out = smooth_timeline(&input, 0.5, 3.0);
        // G is absorbed, leaving C to run until F.
        assert_eq!(pairs(&out), vec![(0.0, "C"), (2.0, "F")]);
    }

    #[test]
    fn short_first_chord_folds_forward() {
        let input = timeline(&[(0.0, "Em"), (0.2, "C"), (1.5, "G")]);
        let out = smooth_timeline(&input, 0.5, 3.0);
        assert_eq!(pairs(&out), vec![(0.0, "C"), (1.5, "G")]);
    }

    #[test]
    fn short_last_chord_uses_end_time() {
        let input = timeline(&[(0.0, "C"), (1.0, "G"), (2.9, "D")]);
        let out = smooth_timeline(&input, 0.5, 3.0);
        assert_eq!(pairs(&out), vec![(0.0, "C"), (1.0, "G")]);
    }

    #[test]
    fn output_stays_strictly_increasing() {
        let input = timeline(&[
            (0.0, "C"),
            (0.3, "G"),
            (0.6, "Am"),
            (0.9, "F"),
            (2.0, "C"),
            (2.1, "G"),
            (3.5, "G"),
        ]);
        let out = smooth_timeline(&input, 0.5, 4.0);
        assert!(!out.is_empty());
        assert_eq!(out[0].time, 0.0);
        for pair in out.windows(2) {
            assert!(pair[1].time > pair[0].time);
            assert_ne!(pair[1].chord, pair[0].chord);
        }
    }

    #[test]
    fn single_or_empty_timeline_is_untouched() {
        assert!(smooth_timeline(&[], 0.5, 1.0).is_empty());
        let one = timeline(&[(0.0, "D")]);
        assert_eq!(smooth_timeline(&one, 10.0, 1.0), one);
    }
}
