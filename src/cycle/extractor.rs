//! Angle-threshold crossing detection behind a `CycleFeatureExtractor` trait
//! (§4.5, design note §9) so the anomaly-scoring machinery in `analyzer.rs`
//! is not hard-wired to angle-based assets.

/// A candidate cycle boundary found by a `CycleFeatureExtractor`: the start
/// and end indices into the sample series that was scanned, plus the peak
/// value of the feature signal observed within that span (for angle-based
/// extraction, the peak swing angle).
#[derive(Debug, Clone, Copy)]
pub struct CycleBounds {
    pub start_idx: usize,
    pub end_idx: usize,
    pub start_ts: i64,
    pub end_ts: i64,
    pub peak_value: f64,
}

/// Finds cycle boundaries in a `(timestamp, feature_value)` series. Angle
/// assets implement this by upward/downward threshold crossing; other asset
/// types (e.g. a pump stroke count, a valve open/close signal) can plug in
/// their own boundary rule without touching the scoring code.
pub trait CycleFeatureExtractor: Send + Sync {
    fn find_cycles(
        &self,
        samples: &[(i64, f64)],
        min_duration_s: f64,
        max_duration_s: f64,
    ) -> Vec<CycleBounds>;
}

/// The default extractor: a cycle starts when the signal crosses
/// `angle_threshold` upward and ends when it next crosses back downward.
/// Durations outside `[min_duration_s, max_duration_s]` are still returned
/// (callers score them as `CycleTimeout`/`CycleTooShort`), not dropped —
/// the duration judgment is the scorer's job, not the extractor's.
pub struct AngleCrossingExtractor {
    pub angle_threshold: f64,
}

impl CycleFeatureExtractor for AngleCrossingExtractor {
    fn find_cycles(
        &self,
        samples: &[(i64, f64)],
        _min_duration_s: f64,
        _max_duration_s: f64,
    ) -> Vec<CycleBounds> {
        let mut cycles = Vec::new();
        let mut start: Option<usize> = None;
        let mut peak = f64::NEG_INFINITY;

        for i in 1..samples.len() {
            let (prev_ts, prev_v) = samples[i - 1];
            let (ts, v) = samples[i];
            let _ = prev_ts;

            match start {
                None => {
                    if prev_v < self.angle_threshold && v >= self.angle_threshold {
                        start = Some(i - 1);
                        peak = v;
                    }
                }
                Some(start_idx) => {
                    peak = peak.max(v);
                    if prev_v >= self.angle_threshold && v < self.angle_threshold {
                        cycles.push(CycleBounds {
                            start_idx,
                            end_idx: i,
                            start_ts: samples[start_idx].0,
                            end_ts: ts,
                            peak_value: peak,
                        });
                        start = None;
                        peak = f64::NEG_INFINITY;
                    }
                }
            }
        }
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_single_cycle_between_crossings() {
        let extractor = AngleCrossingExtractor { angle_threshold: 5.0 };
        let samples: Vec<(i64, f64)> = vec![
            (0, 0.0),
            (1000, 6.0),
            (2000, 20.0),
            (3000, 4.0),
            (4000, 0.0),
        ];
        let cycles = extractor.find_cycles(&samples, 0.0, 600.0);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].start_ts, 0);
        assert_eq!(cycles[0].end_ts, 3000);
        assert_eq!(cycles[0].peak_value, 20.0);
    }

    #[test]
    fn no_crossing_yields_no_cycles() {
        let extractor = AngleCrossingExtractor { angle_threshold: 5.0 };
        let samples: Vec<(i64, f64)> = vec![(0, 1.0), (1000, 2.0), (2000, 1.5)];
        assert!(extractor.find_cycles(&samples, 0.0, 600.0).is_empty());
    }

    #[test]
    fn open_cycle_at_stream_end_is_not_emitted() {
        let extractor = AngleCrossingExtractor { angle_threshold: 5.0 };
        let samples: Vec<(i64, f64)> = vec![(0, 0.0), (1000, 6.0), (2000, 20.0)];
        assert!(extractor.find_cycles(&samples, 0.0, 600.0).is_empty());
    }
}
