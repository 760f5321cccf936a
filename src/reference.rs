//! Reference signal preparation.
//!
//! Each source designates one channel on which shakes are detected. This
//! module pulls those channels out, names them after their source, and
//! normalizes them so that peak detection thresholds are comparable across
//! devices with different value ranges.

use crate::errors::{SyncError, SyncResult};
use crate::frame::{Frame, Series};

/// Normalize values in place to mean 0 and range [-1, 1].
///
/// Fails with [`SyncError::DataShape`] for fewer than 2 samples and with
/// [`SyncError::DegenerateSignal`] when the centered signal is all zero.
pub fn normalize(source: &str, values: &mut [f64]) -> SyncResult<()> {
    if values.len() < 2 {
        return Err(SyncError::DataShape(format!(
            "cannot normalize '{}' with fewer than 2 samples (got {})",
            source,
            values.len()
        )));
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    for v in values.iter_mut() {
        *v -= mean;
    }

    let max_abs = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if max_abs == 0.0 {
        return Err(SyncError::DegenerateSignal {
            source: source.to_string(),
        });
    }

    for v in values.iter_mut() {
        *v /= max_abs;
    }
    Ok(())
}

/// Extract a source's reference channel as a normalized series named after
/// the source itself.
pub fn reference_series(source: &str, data: &Frame, ref_column: &str) -> SyncResult<Series> {
    let series = data.series(ref_column)?;
    let mut values = series.values().to_vec();
    normalize(source, &mut values)?;
    Series::new(source, series.index().to_vec(), values)
}
