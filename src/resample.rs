//! Equidistant resampling and sampling-frequency inference.
//!
//! Cross-correlation only makes sense on a fixed-period grid, so before any
//! alignment the reference signals are projected onto a common equidistant
//! index via nearest-neighbor selection. The target frequency defaults to
//! the fastest reference channel so no source loses resolution.

use chrono::Duration;

use crate::errors::{SyncError, SyncResult};
use crate::frame::{Column, Frame, Series};

/// Infer the sampling frequency of a series as `1 / median(consecutive deltas)`.
pub fn infer_frequency(series: &Series) -> SyncResult<f64> {
    if series.len() < 2 {
        return Err(SyncError::DataShape(format!(
            "cannot infer the sampling frequency of '{}' from fewer than 2 samples",
            series.name()
        )));
    }

    let mut deltas: Vec<i64> = series
        .index()
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_nanoseconds().unwrap_or(i64::MAX))
        .collect();
    deltas.sort_unstable();

    let mid = deltas.len() / 2;
    let median_ns = if deltas.len() % 2 == 1 {
        deltas[mid] as f64
    } else {
        (deltas[mid - 1] as f64 + deltas[mid] as f64) / 2.0
    };

    Ok(1e9 / median_ns)
}

/// The maximum inferred frequency across a set of reference series.
pub fn max_frequency(series: &[Series]) -> SyncResult<f64> {
    if series.is_empty() {
        return Err(SyncError::DataShape(
            "cannot infer a sampling frequency from 0 signals".into(),
        ));
    }
    let mut max = f64::MIN;
    for s in series {
        max = max.max(infer_frequency(s)?);
    }
    Ok(max)
}

/// Resample every column of `frame` onto one fixed-period grid.
///
/// The grid spans `[global min, global max]` of the input index with a period
/// of `1 / frequency`. Each column is filled by nearest-neighbor selection
/// within its own valid range and stays NaN outside of it, so a late-starting
/// source does not invent samples before its recording began.
pub fn equidistant(frame: &Frame, frequency: f64) -> SyncResult<Frame> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return Err(SyncError::Configuration(format!(
            "sampling frequency must be a positive finite number, got {frequency}"
        )));
    }
    let period_ns = (1e9 / frequency).round() as i64;
    if period_ns < 1 {
        return Err(SyncError::Configuration(format!(
            "sampling frequency {frequency} Hz is below the nanosecond resolution limit"
        )));
    }

    let (start, end) = match (frame.min_timestamp(), frame.max_timestamp()) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(SyncError::DataShape(
                "cannot resample an empty frame".into(),
            ))
        }
    };

    let span_ns = (end - start).num_nanoseconds().unwrap_or(i64::MAX);
    let steps = span_ns / period_ns;
    let grid: Vec<_> = (0..=steps)
        .map(|i| start + Duration::nanoseconds(period_ns * i))
        .collect();

    let mut columns = Vec::with_capacity(frame.num_columns());
    for name in frame.column_names() {
        let series = frame.series(name)?;
        columns.push(Column {
            name: name.to_string(),
            values: nearest_fill(&series, &grid),
        });
    }

    Frame::new(grid, columns)
}

/// Nearest-neighbor value for each grid point within the series' valid range.
fn nearest_fill(series: &Series, grid: &[chrono::DateTime<chrono::Utc>]) -> Vec<f64> {
    let index = series.index();
    let values = series.values();
    let mut filled = vec![f64::NAN; grid.len()];
    if index.is_empty() {
        return filled;
    }

    let first = index[0];
    let last = index[index.len() - 1];
    let mut cursor = 0usize;

    for (pos, &ts) in grid.iter().enumerate() {
        if ts < first || ts > last {
            continue;
        }
        // Advance while the next sample is strictly closer, keeping the
        // earlier sample on exact ties.
        while cursor + 1 < index.len() && index[cursor + 1] - ts < ts - index[cursor] {
            cursor += 1;
        }
        filled[pos] = values[cursor];
    }

    filled
}
