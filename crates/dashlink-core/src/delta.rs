use serde::{Deserialize, Serialize};

/// Cumulative byte counters reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub upload: u64,
    pub download: u64,
}

/// Per-update traffic sample in the dashboard's `{up, down}` shape.
///
/// Signed: an engine restart resets its counters and shows up as one negative
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeltaSample {
    pub up: i64,
    pub down: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsDeltaTracker {
    last: Option<Totals>,
}

impl MetricsDeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delta(&mut self, totals: Totals) -> DeltaSample {
        let sample = match self.last {
            None => DeltaSample::default(),
            Some(prev) => DeltaSample {
                up: diff(totals.upload, prev.upload),
                down: diff(totals.download, prev.download),
            },
        };
        self.last = Some(totals);
        sample
    }

    pub fn baseline(&self) -> Option<Totals> {
        self.last
    }
}

fn diff(current: u64, previous: u64) -> i64 {
    (current as i128 - previous as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn successive_samples_are_differences() {
        let mut tracker = MetricsDeltaTracker::new();
        assert_eq!(
            tracker.delta(Totals { upload: 100, download: 50 }),
            DeltaSample { up: 0, down: 0 }
        );
        assert_eq!(
            tracker.delta(Totals { upload: 130, download: 50 }),
            DeltaSample { up: 30, down: 0 }
        );
        assert_eq!(
            tracker.delta(Totals { upload: 131, download: 90 }),
            DeltaSample { up: 1, down: 40 }
        );
    }

    #[test]
    fn engine_restart_surfaces_as_one_negative_sample() {
        let mut tracker = MetricsDeltaTracker::new();
        tracker.delta(Totals { upload: 500, download: 500 });
        let sample = tracker.delta(Totals { upload: 10, download: 0 });
        assert_eq!(sample, DeltaSample { up: -490, down: -500 });
        let sample = tracker.delta(Totals { upload: 15, download: 3 });
        assert_eq!(sample, DeltaSample { up: 5, down: 3 });
    }

    proptest! {
        #[test]
        fn first_sample_is_always_zero(upload in any::<u64>(), download in any::<u64>()) {
            let mut tracker = MetricsDeltaTracker::new();
            prop_assert_eq!(tracker.delta(Totals { upload, download }), DeltaSample::default());
            prop_assert_eq!(tracker.baseline(), Some(Totals { upload, download }));
        }
    }
}
