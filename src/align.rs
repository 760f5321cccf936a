//! Cross-correlation alignment and the stretch solve.
//!
//! Given the detected segments of a reference and a target column on one
//! equidistant frame, [`timeshift_pair`] finds the per-segment lag that
//! maximizes their cross-correlation, and [`stretch_factor`] converts the two
//! lags into the multiplicative clock-rate correction.
//!
//! Lag convention, fixed by test: `lag = argmax(correlation) - (len(target) - 1)`
//! in samples, positive when the target lags the reference. The lag is turned
//! into a timestamp by stepping along the frame's fixed grid from the
//! reference segment's start, with nearest-index ties broken toward the
//! earlier timestamp.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::errors::{SyncError, SyncResult};
use crate::frame::Frame;
use crate::types::{Segment, SyncPairs, Timeshift};

/// Full cross-correlation of two sequences.
///
/// Returns `reference.len() + target.len() - 1` values where entry `m`
/// corresponds to the lag `m - (target.len() - 1)`. Computed via FFT using
/// the convolution theorem: `corr(a, b) = IFFT(FFT(a) * conj(FFT(b)))`.
pub fn cross_correlation(reference: &[f64], target: &[f64]) -> Vec<f64> {
    let out_len = reference.len() + target.len() - 1;
    let fft_len = out_len.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_len);
    let ifft = planner.plan_fft_inverse(fft_len);

    let mut ref_complex: Vec<Complex<f64>> =
        reference.iter().map(|&x| Complex::new(x, 0.0)).collect();
    ref_complex.resize(fft_len, Complex::new(0.0, 0.0));

    let mut target_complex: Vec<Complex<f64>> =
        target.iter().map(|&x| Complex::new(x, 0.0)).collect();
    target_complex.resize(fft_len, Complex::new(0.0, 0.0));

    fft.process(&mut ref_complex);
    fft.process(&mut target_complex);

    let mut product: Vec<Complex<f64>> = ref_complex
        .iter()
        .zip(target_complex.iter())
        .map(|(a, b)| a * b.conj())
        .collect();
    ifft.process(&mut product);

    let scale = 1.0 / fft_len as f64;

    // Circular correlation has lag 0 at index 0 and negative lags wrapped to
    // the end; lay it out as [-(len_t - 1), ..., 0, ..., len_r - 1].
    let offset = target.len() as isize - 1;
    (0..out_len)
        .map(|m| {
            let lag = m as isize - offset;
            let idx = lag.rem_euclid(fft_len as isize) as usize;
            product[idx].re * scale
        })
        .collect()
}

/// Compute the per-segment timeshift that aligns `target_col` to `ref_col`.
///
/// Expects an equidistantly sampled frame and verified segment pairs for
/// both columns. The timeshift of a segment is the duration the target
/// segment's start must move to sit where correlation with the reference
/// segment is highest.
pub fn timeshift_pair(
    frame: &Frame,
    ref_col: &str,
    target_col: &str,
    pairs: &SyncPairs,
) -> SyncResult<Timeshift> {
    let mut shifts = [None, None];

    for (slot, segment) in Segment::ALL.into_iter().enumerate() {
        tracing::debug!(%segment, target_col, ref_col, "calculating segment timeshift");

        let ref_point = pairs.point(ref_col, segment)?;
        let target_point = pairs.point(target_col, segment)?;

        let ref_data = frame.segment_values(ref_col, ref_point.start, ref_point.end)?;
        let target_data = frame.segment_values(target_col, target_point.start, target_point.end)?;
        if ref_data.is_empty() || target_data.is_empty() {
            return Err(SyncError::DataShape(format!(
                "empty {segment} segment data for '{ref_col}' or '{target_col}'"
            )));
        }

        let correlation = cross_correlation(&ref_data, &target_data);
        let (argmax, peak) = correlation
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, &v)| (i, v))
            .unwrap_or((0, 0.0));
        let lag = argmax as isize - (target_data.len() as isize - 1);

        let ref_start_pos = frame.nearest_position(ref_point.start) as isize;
        let aligned_pos = ref_start_pos + lag;
        if aligned_pos < 0 || aligned_pos >= frame.num_rows() as isize {
            return Err(SyncError::DataShape(format!(
                "correlation lag of {lag} samples for the {segment} segment of \
                 '{target_col}' leaves the resampled index"
            )));
        }

        let aligned_ts = frame.index()[aligned_pos as usize];
        tracing::debug!(
            %segment,
            target_col,
            lag,
            peak,
            aligned_start = %aligned_ts,
            "highest correlation found"
        );

        shifts[slot] = Some(aligned_ts - target_point.start);
    }

    // Both slots are filled, the loop covers Segment::ALL.
    Ok(Timeshift {
        first: shifts[0].unwrap_or_else(chrono::Duration::zero),
        second: shifts[1].unwrap_or_else(chrono::Duration::zero),
    })
}

/// Solve for the stretch factor that makes the target's inter-segment span
/// match the reference's.
///
/// `old_length` is the target's own un-shifted span between segment starts;
/// stretching it by the returned factor makes one constant offset align both
/// segments at once.
pub fn stretch_factor(source: &str, pairs: &SyncPairs, shifts: &Timeshift) -> SyncResult<f64> {
    let first = pairs.point(source, Segment::First)?;
    let second = pairs.point(source, Segment::Second)?;

    let old_length = (second.start - first.start).num_nanoseconds().unwrap_or(0);
    if old_length == 0 {
        return Err(SyncError::DegenerateSegment {
            source: source.to_string(),
        });
    }

    let delta = (shifts.second - shifts.first).num_nanoseconds().unwrap_or(0);
    let new_length = old_length as f64 + delta as f64;
    Ok(new_length / old_length as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Series;
    use crate::types::SyncPoint;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn point(start_ms: i64, end_ms: i64) -> SyncPoint {
        SyncPoint {
            start: ts(start_ms),
            end: ts(end_ms),
        }
    }

    #[test]
    fn cross_correlation_peaks_at_zero_lag_for_identical_signals() {
        let signal: Vec<f64> = (0..256).map(|i| (i as f64 * 0.1).sin()).collect();
        let correlation = cross_correlation(&signal, &signal);

        assert_eq!(correlation.len(), 511);
        let argmax = correlation
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let lag = argmax as isize - (signal.len() as isize - 1);
        assert_eq!(lag, 0);
    }

    #[test]
    fn cross_correlation_recovers_known_lag() {
        let base: Vec<f64> = (0..200).map(|i| (i as f64 * 0.13).sin()).collect();
        // Target contains the same content 30 samples later.
        let mut target = vec![0.0; 30];
        target.extend(&base[..170]);

        let correlation = cross_correlation(&base, &target);
        let argmax = correlation
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let lag = argmax as isize - (target.len() as isize - 1);
        assert_eq!(lag, -30, "reference content leads the target by 30 samples");
    }

    #[test]
    fn stretch_factor_halves_for_shrinking_shifts() {
        let mut pairs = SyncPairs::new();
        pairs.insert("b", Segment::First, point(1_000, 3_000));
        pairs.insert("b", Segment::Second, point(11_000, 14_000));

        let shifts = Timeshift {
            first: Duration::seconds(5),
            second: Duration::seconds(0),
        };
        let factor = stretch_factor("b", &pairs, &shifts).unwrap();
        assert!((factor - 0.5).abs() < 1e-12, "expected 0.5, got {factor}");
    }

    #[test]
    fn stretch_factor_doubles_for_growing_shifts() {
        let mut pairs = SyncPairs::new();
        pairs.insert("b", Segment::First, point(1_000, 3_000));
        pairs.insert("b", Segment::Second, point(11_000, 14_000));

        let shifts = Timeshift {
            first: Duration::seconds(0),
            second: Duration::seconds(10),
        };
        let factor = stretch_factor("b", &pairs, &shifts).unwrap();
        assert!((factor - 2.0).abs() < 1e-12, "expected 2.0, got {factor}");
    }

    #[test]
    fn coinciding_segments_are_degenerate() {
        let mut pairs = SyncPairs::new();
        pairs.insert("b", Segment::First, point(1_000, 3_000));
        pairs.insert("b", Segment::Second, point(1_000, 3_000));

        let shifts = Timeshift {
            first: Duration::zero(),
            second: Duration::zero(),
        };
        let err = stretch_factor("b", &pairs, &shifts).unwrap_err();
        assert!(matches!(err, SyncError::DegenerateSegment { ref source } if source == "b"));
    }

    #[test]
    fn timeshift_pair_is_zero_for_identical_columns() {
        let n = 2_000usize;
        let values: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / 100.0;
                if (2.0..4.0).contains(&t) || (16.0..18.0).contains(&t) {
                    if i % 2 == 0 {
                        0.9
                    } else {
                        -0.9
                    }
                } else {
                    0.0
                }
            })
            .collect();
        let index: Vec<_> = (0..n).map(|i| ts(i as i64 * 10)).collect();
        let a = Series::new("a", index.clone(), values.clone()).unwrap();
        let b = Series::new("b", index, values).unwrap();
        let frame = Frame::from_series(&[a, b]).unwrap();

        let mut pairs = SyncPairs::new();
        for col in ["a", "b"] {
            pairs.insert(col, Segment::First, point(1_500, 4_500));
            pairs.insert(col, Segment::Second, point(15_500, 18_500));
        }

        let shifts = timeshift_pair(&frame, "a", "b", &pairs).unwrap();
        assert_eq!(shifts.first, Duration::zero());
        assert_eq!(shifts.second, Duration::zero());
    }

    #[test]
    fn timeshift_pair_requires_segments_for_both_columns() {
        let index: Vec<_> = (0..10).map(|i| ts(i * 10)).collect();
        let a = Series::new("a", index.clone(), vec![1.0; 10]).unwrap();
        let b = Series::new("b", index, vec![1.0; 10]).unwrap();
        let frame = Frame::from_series(&[a, b]).unwrap();

        let mut pairs = SyncPairs::new();
        pairs.insert("a", Segment::First, point(0, 50));
        pairs.insert("a", Segment::Second, point(60, 90));

        let err = timeshift_pair(&frame, "a", "b", &pairs).unwrap_err();
        assert!(matches!(err, SyncError::ShakeDetection { ref source, .. } if source == "b"));
    }
}
