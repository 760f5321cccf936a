//! Shake detection.
//!
//! A shake is a deliberate abrupt motion performed at the start and at the
//! end of a recording. On a normalized reference channel it shows up as a
//! dense run of high-amplitude peaks; this extractor finds the best such run
//! inside a window at each end of the signal and reports the two runs as the
//! synchronization segments.

use chrono::{DateTime, Duration, Utc};

use crate::errors::{SyncError, SyncResult};
use crate::frame::Frame;
use crate::types::{Segment, SyncPairs, SyncPoint};

use super::SegmentExtractor;

/// Parameters for shake detection, validated once at construction.
#[derive(Debug, Clone)]
pub struct ShakeConfig {
    /// Window from the start of a signal in which the first shake must lie.
    pub start_window: Duration,
    /// Window before the end of a signal in which the second shake must lie.
    pub end_window: Duration,
    /// Minimum peak height in (0, 1); the input signals are normalized.
    pub threshold: f64,
    /// Maximum gap between adjacent peaks still counted as one sequence.
    pub distance: Duration,
    /// Minimum number of peaks per accepted sequence.
    pub min_length: usize,
    /// Padding added before the first and after the last peak of a segment.
    pub time_buffer: Duration,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            start_window: Duration::seconds(600),
            end_window: Duration::seconds(600),
            threshold: 0.6,
            distance: Duration::milliseconds(1500),
            min_length: 6,
            time_buffer: Duration::seconds(1),
        }
    }
}

impl ShakeConfig {
    fn validate(&self) -> SyncResult<()> {
        if self.start_window <= Duration::zero() || self.end_window <= Duration::zero() {
            return Err(SyncError::Configuration(format!(
                "window lengths must be positive, got start {} and end {}",
                self.start_window, self.end_window
            )));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(SyncError::Configuration(format!(
                "threshold must be in (0, 1), but you gave {}",
                self.threshold
            )));
        }
        if self.distance <= Duration::zero() {
            return Err(SyncError::Configuration(format!(
                "peak distance must be positive, got {}",
                self.distance
            )));
        }
        if self.min_length == 0 {
            return Err(SyncError::Configuration(
                "a sequence needs at least 1 peak, min_length must not be 0".into(),
            ));
        }
        if self.time_buffer < Duration::zero() {
            return Err(SyncError::Configuration(format!(
                "time buffer must not be negative, got {}",
                self.time_buffer
            )));
        }
        Ok(())
    }
}

/// Detects shake segments in normalized reference signals.
pub struct ShakeExtractor {
    config: ShakeConfig,
}

impl ShakeExtractor {
    /// Create an extractor, rejecting out-of-range parameters up front.
    pub fn new(config: ShakeConfig) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ShakeConfig {
        &self.config
    }

    /// Detect both shakes of one column.
    fn detect_column(&self, frame: &Frame, column: &str) -> SyncResult<(SyncPoint, SyncPoint)> {
        let first = frame.first_valid(column)?.ok_or_else(|| {
            SyncError::DataShape(format!("column '{column}' has no valid samples"))
        })?;
        let last = frame.last_valid(column)?.ok_or_else(|| {
            SyncError::DataShape(format!("column '{column}' has no valid samples"))
        })?;

        let duration = last - first;
        if self.config.start_window + self.config.end_window > duration {
            return Err(SyncError::WindowConfiguration {
                source: column.to_string(),
                start_window: self.config.start_window,
                end_window: self.config.end_window,
                duration,
            });
        }

        let start_boundary = first + self.config.start_window;
        let end_boundary = last - self.config.end_window;

        let index = frame.index();
        let values = frame.values(column)?;

        // The middle region between the two windows is never searched.
        let mut peaks = find_peaks(index, values, first, start_boundary, self.config.threshold);
        peaks.extend(find_peaks(index, values, end_boundary, last, self.config.threshold));
        tracing::debug!(
            column,
            peak_count = peaks.len(),
            threshold = self.config.threshold,
            "peaks found in detection windows"
        );

        let sequences = merge_sequences(index, &peaks, self.config.distance);
        let sequences: Vec<_> = sequences
            .into_iter()
            .filter(|seq| seq.len() >= self.config.min_length)
            .collect();
        tracing::debug!(
            column,
            sequence_count = sequences.len(),
            min_length = self.config.min_length,
            "peak sequences after merging and length filtering"
        );

        let mut start_shakes = Vec::new();
        let mut end_shakes = Vec::new();
        for seq in sequences {
            if index[seq[0]] < start_boundary {
                start_shakes.push(seq);
            } else if index[seq[seq.len() - 1]] > end_boundary {
                end_shakes.push(seq);
            }
            // Sequences straddling neither boundary are dropped.
        }

        let first_point = self.choose_sequence(frame, column, start_shakes, Segment::First)?;
        let second_point = self.choose_sequence(frame, column, end_shakes, Segment::Second)?;
        Ok((first_point, second_point))
    }

    /// Pick the highest-weight sequence and turn it into a buffered segment.
    fn choose_sequence(
        &self,
        frame: &Frame,
        column: &str,
        shakes: Vec<Vec<usize>>,
        segment: Segment,
    ) -> SyncResult<SyncPoint> {
        let values = frame.values(column)?;
        let best = shakes
            .into_iter()
            .max_by(|a, b| {
                let wa = sequence_weight(a, values);
                let wb = sequence_weight(b, values);
                wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| SyncError::missing_shake(column, segment, "start"))?;

        let index = frame.index();
        let start = index[frame.nearest_position(index[best[0]] - self.config.time_buffer)];
        let end =
            index[frame.nearest_position(index[best[best.len() - 1]] + self.config.time_buffer)];
        Ok(SyncPoint { start, end })
    }
}

impl Default for ShakeExtractor {
    fn default() -> Self {
        Self {
            config: ShakeConfig::default(),
        }
    }
}

impl SegmentExtractor for ShakeExtractor {
    fn segments(&self, frame: &Frame) -> SyncResult<SyncPairs> {
        let mut pairs = SyncPairs::new();
        for column in frame.column_names() {
            let (first, second) = self.detect_column(frame, column)?;
            tracing::info!(
                column,
                first_start = %first.start,
                first_end = %first.end,
                second_start = %second.start,
                second_end = %second.end,
                "shake segments detected"
            );
            pairs.insert(column, Segment::First, first);
            pairs.insert(column, Segment::Second, second);
        }
        Ok(pairs)
    }
}

/// Local maxima at or above `threshold` within `[window_start, window_end]`.
///
/// A peak must be strictly greater than both neighbors, and the neighbors
/// must lie inside the window as well, so the window edges never qualify.
fn find_peaks(
    index: &[DateTime<Utc>],
    values: &[f64],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    threshold: f64,
) -> Vec<usize> {
    let lo = index.partition_point(|&t| t < window_start);
    let hi = index.partition_point(|&t| t <= window_end);
    if hi - lo < 3 {
        return Vec::new();
    }

    (lo + 1..hi - 1)
        .filter(|&i| values[i] >= threshold && values[i] > values[i - 1] && values[i] > values[i + 1])
        .collect()
}

/// Merge peak positions into maximal runs with inter-peak gaps of at most
/// `distance`. A larger gap starts a new sequence.
fn merge_sequences(index: &[DateTime<Utc>], peaks: &[usize], distance: Duration) -> Vec<Vec<usize>> {
    let mut sequences: Vec<Vec<usize>> = Vec::new();
    for &peak in peaks {
        match sequences.last_mut() {
            Some(seq) if index[peak] - index[seq[seq.len() - 1]] <= distance => seq.push(peak),
            _ => sequences.push(vec![peak]),
        }
    }
    sequences
}

/// Score a sequence by `median(peak values) + mean(peak values)`.
fn sequence_weight(sequence: &[usize], values: &[f64]) -> f64 {
    let mut peaks: Vec<f64> = sequence.iter().map(|&i| values[i]).collect();
    peaks.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = peaks.len() / 2;
    let median = if peaks.len() % 2 == 1 {
        peaks[mid]
    } else {
        (peaks[mid - 1] + peaks[mid]) / 2.0
    };
    let mean = peaks.iter().sum::<f64>() / peaks.len() as f64;
    median + mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Series;
    use chrono::TimeZone;

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    /// 100 Hz signal of `secs` seconds with alternating-peak shakes over the
    /// given intervals. Peak amplitude can differ per shake.
    fn shake_signal(secs: i64, shakes: &[(f64, f64, f64)]) -> Series {
        let n = (secs * 100) as usize;
        let values: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / 100.0;
                for &(from, to, amp) in shakes {
                    if t >= from && t <= to {
                        return if i % 2 == 0 { amp } else { -amp };
                    }
                }
                0.01 * (t * 0.7).sin()
            })
            .collect();
        let index = (0..n).map(|i| ts(i as i64 * 10)).collect();
        Series::new("signal", index, values).unwrap()
    }

    fn extractor(threshold: f64, min_length: usize) -> ShakeExtractor {
        ShakeExtractor::new(ShakeConfig {
            start_window: Duration::seconds(15),
            end_window: Duration::seconds(15),
            threshold,
            min_length,
            ..ShakeConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn config_rejects_out_of_range_threshold() {
        for threshold in [0.0, 1.0, -1.0, 3.0] {
            let result = ShakeExtractor::new(ShakeConfig {
                threshold,
                ..ShakeConfig::default()
            });
            assert!(result.is_err(), "threshold {threshold} should be rejected");
        }
    }

    #[test]
    fn config_rejects_non_positive_windows() {
        let result = ShakeExtractor::new(ShakeConfig {
            start_window: Duration::zero(),
            ..ShakeConfig::default()
        });
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn config_rejects_zero_min_length() {
        let result = ShakeExtractor::new(ShakeConfig {
            min_length: 0,
            ..ShakeConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn detects_both_shakes() {
        let signal = shake_signal(60, &[(5.0, 8.0, 0.9), (52.0, 55.0, 0.9)]);
        let frame = Frame::from_series(&[signal]).unwrap();

        let pairs = extractor(0.5, 3).segments(&frame).unwrap();
        let first = pairs.point("signal", Segment::First).unwrap();
        let second = pairs.point("signal", Segment::Second).unwrap();

        // Peaks lie in [5, 8] and [52, 55], padded by the 1s time buffer.
        assert!(first.start >= ts(3_500) && first.start <= ts(4_500));
        assert!(first.end >= ts(8_500) && first.end <= ts(9_500));
        assert!(second.start >= ts(50_500) && second.start <= ts(51_500));
        assert!(second.end >= ts(55_500) && second.end <= ts(56_500));
    }

    #[test]
    fn windows_longer_than_recording_name_the_source() {
        let signal = shake_signal(20, &[(2.0, 4.0, 0.9), (16.0, 18.0, 0.9)]);
        let frame = Frame::from_series(&[signal]).unwrap();

        let err = extractor(0.5, 3).segments(&frame).unwrap_err();
        assert!(
            matches!(err, SyncError::WindowConfiguration { ref source, .. } if source == "signal"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn missing_end_shake_is_reported() {
        let signal = shake_signal(60, &[(5.0, 8.0, 0.9)]);
        let frame = Frame::from_series(&[signal]).unwrap();

        let err = extractor(0.5, 3).segments(&frame).unwrap_err();
        assert!(matches!(
            err,
            SyncError::ShakeDetection {
                segment: Segment::Second,
                ..
            }
        ));
    }

    #[test]
    fn missing_start_shake_is_reported() {
        let signal = shake_signal(60, &[(52.0, 55.0, 0.9)]);
        let frame = Frame::from_series(&[signal]).unwrap();

        let err = extractor(0.5, 3).segments(&frame).unwrap_err();
        assert!(matches!(
            err,
            SyncError::ShakeDetection {
                segment: Segment::First,
                ..
            }
        ));
    }

    #[test]
    fn short_sequences_are_discarded() {
        // Both shakes exist but carry few peaks; a high min_length rejects them.
        let signal = shake_signal(60, &[(5.0, 5.1, 0.9), (52.0, 52.1, 0.9)]);
        let frame = Frame::from_series(&[signal]).unwrap();

        let err = extractor(0.5, 50).segments(&frame).unwrap_err();
        assert!(matches!(err, SyncError::ShakeDetection { .. }));
    }

    #[test]
    fn strongest_sequence_wins() {
        // Two candidate shakes in the start window; the later one is stronger.
        let signal = shake_signal(60, &[(2.0, 4.0, 0.6), (9.0, 11.0, 0.95), (52.0, 55.0, 0.9)]);
        let frame = Frame::from_series(&[signal]).unwrap();

        let pairs = extractor(0.5, 3).segments(&frame).unwrap();
        let first = pairs.point("signal", Segment::First).unwrap();
        assert!(
            first.start >= ts(7_500),
            "should pick the stronger shake at 9s, got start {}",
            first.start
        );
    }

    #[test]
    fn segments_cover_every_column() {
        let a = shake_signal(60, &[(5.0, 8.0, 0.9), (52.0, 55.0, 0.9)]).renamed("a");
        let b = shake_signal(60, &[(5.0, 8.0, 0.9), (52.0, 55.0, 0.9)]).renamed("b");
        let frame = Frame::from_series(&[a, b]).unwrap();

        let pairs = extractor(0.5, 3).segments(&frame).unwrap();
        assert!(pairs.verify(["a", "b"]).is_ok());
    }

    #[test]
    fn merge_sequences_splits_on_large_gaps() {
        let index: Vec<_> = [0, 100, 200, 5_000, 5_100].iter().map(|&m| ts(m)).collect();
        let peaks = vec![0, 1, 2, 3, 4];
        let sequences = merge_sequences(&index, &peaks, Duration::milliseconds(1500));
        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0], vec![0, 1, 2]);
        assert_eq!(sequences[1], vec![3, 4]);
    }

    #[test]
    fn sequence_weight_is_median_plus_mean() {
        let values = vec![0.5, 0.7, 0.9];
        let weight = sequence_weight(&[0, 1, 2], &values);
        assert!((weight - (0.7 + 0.7)).abs() < 1e-12);
    }
}
