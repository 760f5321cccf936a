//! Time-indexed signal containers.
//!
//! A [`Series`] is one irregularly sampled channel; a [`Frame`] is a wide
//! table of channels over one shared, strictly increasing timestamp index.
//! Missing samples are represented as NaN, so every column of a frame has
//! the same length as the index.
//!
//! All operations are pure and fully materialized in memory; there is no
//! streaming path.

use chrono::{DateTime, Duration, Utc};

use crate::errors::{SyncError, SyncResult};

/// One named, irregularly sampled signal.
#[derive(Debug, Clone)]
pub struct Series {
    name: String,
    index: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl Series {
    /// Create a series, dropping NaN samples and validating the index.
    ///
    /// The index must be strictly increasing after NaN removal.
    pub fn new(
        name: impl Into<String>,
        index: Vec<DateTime<Utc>>,
        values: Vec<f64>,
    ) -> SyncResult<Self> {
        let name = name.into();
        if index.len() != values.len() {
            return Err(SyncError::DataShape(format!(
                "series '{}' has {} timestamps but {} values",
                name,
                index.len(),
                values.len()
            )));
        }

        let mut kept_index = Vec::with_capacity(index.len());
        let mut kept_values = Vec::with_capacity(values.len());
        for (ts, value) in index.into_iter().zip(values) {
            if value.is_nan() {
                continue;
            }
            if let Some(&last) = kept_index.last() {
                if ts <= last {
                    return Err(SyncError::DataShape(format!(
                        "index of '{name}' must be strictly increasing and free of duplicates"
                    )));
                }
            }
            kept_index.push(ts);
            kept_values.push(value);
        }

        Ok(Self {
            name,
            index: kept_index,
            values: kept_values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.index.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.index.last().copied()
    }

    /// Return the same samples under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Stretch the timestamp index by `factor`, anchored at `anchor`.
    ///
    /// Sample values are untouched; only their distances to the anchor scale.
    pub fn stretch(&self, factor: f64, anchor: DateTime<Utc>) -> SyncResult<Series> {
        let index = stretch_timestamps(&self.index, factor, anchor)?;
        Series::new(self.name.clone(), index, self.values.clone())
    }
}

/// One named column of a [`Frame`]. NaN marks an absent sample.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

/// A wide table of signals over one shared timestamp index.
#[derive(Debug, Clone)]
pub struct Frame {
    index: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

impl Frame {
    /// Create a frame from an index and matching columns.
    pub fn new(index: Vec<DateTime<Utc>>, columns: Vec<Column>) -> SyncResult<Self> {
        for pair in index.windows(2) {
            if pair[1] <= pair[0] {
                return Err(SyncError::DataShape(
                    "frame index must be strictly increasing and free of duplicates".into(),
                ));
            }
        }
        for column in &columns {
            if column.values.len() != index.len() {
                return Err(SyncError::DataShape(format!(
                    "column '{}' has {} values for an index of length {}",
                    column.name,
                    column.values.len(),
                    index.len()
                )));
            }
        }
        Ok(Self { index, columns })
    }

    /// Outer-join a set of series into one wide frame.
    ///
    /// The index becomes the sorted union of all series' timestamps; a column
    /// holds NaN wherever its series has no sample.
    pub fn from_series(series: &[Series]) -> SyncResult<Self> {
        for (pos, s) in series.iter().enumerate() {
            if series[..pos].iter().any(|other| other.name() == s.name()) {
                return Err(SyncError::DataShape(format!(
                    "duplicate column name '{}' in join",
                    s.name()
                )));
            }
        }

        let mut index: Vec<DateTime<Utc>> = series.iter().flat_map(|s| s.index.iter().copied()).collect();
        index.sort_unstable();
        index.dedup();

        let columns = series
            .iter()
            .map(|s| {
                let mut values = vec![f64::NAN; index.len()];
                for (ts, value) in s.index.iter().zip(&s.values) {
                    // Always found, the union contains every series timestamp.
                    if let Ok(pos) = index.binary_search(ts) {
                        values[pos] = *value;
                    }
                }
                Column {
                    name: s.name().to_string(),
                    values,
                }
            })
            .collect();

        Frame::new(index, columns)
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// All values of a column, NaN where the column has no sample.
    pub fn values(&self, name: &str) -> SyncResult<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| SyncError::DataShape(format!("unknown column '{name}'")))
    }

    /// Extract a column as a series, dropping NaN samples.
    pub fn series(&self, name: &str) -> SyncResult<Series> {
        let values = self.values(name)?.to_vec();
        Series::new(name, self.index.clone(), values)
    }

    pub fn min_timestamp(&self) -> Option<DateTime<Utc>> {
        self.index.first().copied()
    }

    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        self.index.last().copied()
    }

    /// Timestamp of the first non-NaN sample of a column.
    pub fn first_valid(&self, name: &str) -> SyncResult<Option<DateTime<Utc>>> {
        let values = self.values(name)?;
        Ok(values
            .iter()
            .position(|v| !v.is_nan())
            .map(|pos| self.index[pos]))
    }

    /// Timestamp of the last non-NaN sample of a column.
    pub fn last_valid(&self, name: &str) -> SyncResult<Option<DateTime<Utc>>> {
        let values = self.values(name)?;
        Ok(values
            .iter()
            .rposition(|v| !v.is_nan())
            .map(|pos| self.index[pos]))
    }

    /// Position of the index entry nearest to `ts`, ties broken toward the
    /// earlier timestamp.
    pub fn nearest_position(&self, ts: DateTime<Utc>) -> usize {
        if self.index.is_empty() {
            return 0;
        }
        let upper = self.index.partition_point(|&t| t < ts);
        if upper == 0 {
            return 0;
        }
        if upper == self.index.len() {
            return self.index.len() - 1;
        }
        let before = ts - self.index[upper - 1];
        let after = self.index[upper] - ts;
        if after < before {
            upper
        } else {
            upper - 1
        }
    }

    /// Non-NaN values of a column within `[start, end]`, in index order.
    pub fn segment_values(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<Vec<f64>> {
        let values = self.values(name)?;
        let lo = self.index.partition_point(|&t| t < start);
        let hi = self.index.partition_point(|&t| t <= end);
        Ok(values[lo..hi].iter().copied().filter(|v| !v.is_nan()).collect())
    }

    /// Stretch the timestamp index by `factor`, anchored at `anchor`.
    pub fn stretch_index(&self, factor: f64, anchor: DateTime<Utc>) -> SyncResult<Frame> {
        let index = stretch_timestamps(&self.index, factor, anchor)?;
        Frame::new(index, self.columns.clone())
    }

    /// Shift the timestamp index by a constant duration.
    pub fn shift_index(&self, by: Duration) -> Frame {
        Frame {
            index: self.index.iter().map(|&ts| ts + by).collect(),
            columns: self.columns.clone(),
        }
    }
}

/// Euclidean magnitude across a set of columns, e.g. to collapse a 3-axis
/// accelerometer into one reference channel. NaN samples are skipped; rows
/// with no valid sample at all are dropped.
pub fn magnitude(frame: &Frame, columns: &[&str], name: &str) -> SyncResult<Series> {
    let mut selected = Vec::with_capacity(columns.len());
    for column in columns {
        selected.push(frame.values(column)?);
    }

    let values = (0..frame.num_rows())
        .map(|row| {
            let mut sum = 0.0;
            let mut seen = false;
            for values in &selected {
                let v = values[row];
                if !v.is_nan() {
                    sum += v * v;
                    seen = true;
                }
            }
            if seen {
                sum.sqrt()
            } else {
                f64::NAN
            }
        })
        .collect();

    Series::new(name, frame.index().to_vec(), values)
}

fn stretch_timestamps(
    index: &[DateTime<Utc>],
    factor: f64,
    anchor: DateTime<Utc>,
) -> SyncResult<Vec<DateTime<Utc>>> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(SyncError::Configuration(format!(
            "stretch factor must be a positive finite number, got {factor}"
        )));
    }
    index
        .iter()
        .map(|&ts| {
            let offset = (ts - anchor).num_nanoseconds().ok_or_else(|| {
                SyncError::DataShape("timestamp too far from stretch anchor".into())
            })?;
            let scaled = (offset as f64 * factor).round() as i64;
            Ok(anchor + Duration::nanoseconds(scaled))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn series(name: &str, points: &[(i64, f64)]) -> Series {
        Series::new(
            name,
            points.iter().map(|&(t, _)| ts(t)).collect(),
            points.iter().map(|&(_, v)| v).collect(),
        )
        .unwrap()
    }

    #[test]
    fn series_drops_nan_samples() {
        let s = series("a", &[(0, 1.0), (100, f64::NAN), (200, 3.0)]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.values(), &[1.0, 3.0]);
    }

    #[test]
    fn series_rejects_duplicate_timestamps() {
        let result = Series::new("a", vec![ts(0), ts(0)], vec![1.0, 2.0]);
        assert!(matches!(result, Err(SyncError::DataShape(_))));
    }

    #[test]
    fn series_rejects_unsorted_index() {
        let result = Series::new("a", vec![ts(100), ts(0)], vec![1.0, 2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn outer_join_unions_timestamps() {
        let a = series("a", &[(0, 1.0), (200, 2.0)]);
        let b = series("b", &[(100, 10.0), (200, 20.0)]);

        let frame = Frame::from_series(&[a, b]).unwrap();
        assert_eq!(frame.num_rows(), 3);
        assert_eq!(frame.index(), &[ts(0), ts(100), ts(200)]);

        let a_vals = frame.values("a").unwrap();
        assert_eq!(a_vals[0], 1.0);
        assert!(a_vals[1].is_nan());
        assert_eq!(a_vals[2], 2.0);
    }

    #[test]
    fn outer_join_rejects_duplicate_names() {
        let a = series("a", &[(0, 1.0), (100, 2.0)]);
        let b = series("a", &[(0, 1.0), (100, 2.0)]);
        assert!(Frame::from_series(&[a, b]).is_err());
    }

    #[test]
    fn nearest_position_breaks_ties_toward_earlier() {
        let s = series("a", &[(0, 1.0), (100, 2.0), (200, 3.0)]);
        let frame = Frame::from_series(&[s]).unwrap();

        // 50ms is equidistant from 0 and 100; the earlier one wins.
        assert_eq!(frame.nearest_position(ts(50)), 0);
        assert_eq!(frame.nearest_position(ts(51)), 1);
        assert_eq!(frame.nearest_position(ts(-500)), 0);
        assert_eq!(frame.nearest_position(ts(9000)), 2);
    }

    #[test]
    fn first_and_last_valid_skip_nan() {
        let a = series("a", &[(100, 1.0), (200, 2.0)]);
        let b = series("b", &[(0, 5.0), (100, 6.0)]);
        let frame = Frame::from_series(&[a, b]).unwrap();

        assert_eq!(frame.first_valid("a").unwrap(), Some(ts(100)));
        assert_eq!(frame.last_valid("a").unwrap(), Some(ts(200)));
        assert_eq!(frame.last_valid("b").unwrap(), Some(ts(100)));
    }

    #[test]
    fn segment_values_are_inclusive() {
        let s = series("a", &[(0, 1.0), (100, 2.0), (200, 3.0), (300, 4.0)]);
        let frame = Frame::from_series(&[s]).unwrap();

        let values = frame.segment_values("a", ts(100), ts(200)).unwrap();
        assert_eq!(values, vec![2.0, 3.0]);
    }

    #[test]
    fn stretch_index_scales_offsets_from_anchor() {
        let s = series("a", &[(0, 1.0), (100, 2.0), (200, 3.0)]);
        let stretched = s.stretch(2.0, ts(0)).unwrap();
        assert_eq!(stretched.index(), &[ts(0), ts(200), ts(400)]);
    }

    #[test]
    fn stretch_rejects_non_positive_factor() {
        let s = series("a", &[(0, 1.0), (100, 2.0)]);
        assert!(s.stretch(0.0, ts(0)).is_err());
        assert!(s.stretch(-1.0, ts(0)).is_err());
    }

    #[test]
    fn shift_index_moves_all_timestamps() {
        let s = series("a", &[(0, 1.0), (100, 2.0)]);
        let frame = Frame::from_series(&[s]).unwrap();
        let shifted = frame.shift_index(Duration::milliseconds(250));
        assert_eq!(shifted.index(), &[ts(250), ts(350)]);
    }

    #[test]
    fn magnitude_combines_columns() {
        let x = series("x", &[(0, 3.0), (100, 1.0)]);
        let y = series("y", &[(0, 4.0), (100, 0.0)]);
        let frame = Frame::from_series(&[x, y]).unwrap();

        let mag = magnitude(&frame, &["x", "y"], "mag").unwrap();
        assert_eq!(mag.name(), "mag");
        assert!((mag.values()[0] - 5.0).abs() < 1e-12);
        assert!((mag.values()[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn magnitude_skips_missing_samples() {
        let x = series("x", &[(0, 3.0)]);
        let y = series("y", &[(100, 4.0)]);
        let frame = Frame::from_series(&[x, y]).unwrap();

        let mag = magnitude(&frame, &["x", "y"], "mag").unwrap();
        assert_eq!(mag.len(), 2);
        assert!((mag.values()[0] - 3.0).abs() < 1e-12);
        assert!((mag.values()[1] - 4.0).abs() < 1e-12);
    }
}
