//! The synchronization orchestrator.
//!
//! [`Synchronizer`] runs the two-pass stretch-then-shift procedure over all
//! non-reference sources:
//!
//! 1. **Stretch pass**: resample the normalized reference signals onto one
//!    equidistant grid, detect shake segments, and solve a stretch factor per
//!    source from the two segment lags. Each source's reference signal is
//!    stretched about the shared global start time and substituted back.
//! 2. **Shift pass**: re-resample the stretched signals, detect segments
//!    again, and take the first segment's lag as the final timeshift. After
//!    a correct stretch both lags should nearly coincide; a larger residual
//!    is logged as a precision warning, never an error.
//!
//! Results are memoized; a repeated read returns the cached parameters
//! unless recalculation is explicitly requested. The orchestrator is the
//! single writer of per-source parameters and must not be invoked
//! concurrently on the same session.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::align;
use crate::errors::{SyncError, SyncResult};
use crate::extract::{SegmentExtractor, ShakeExtractor};
use crate::frame::{Frame, Series};
use crate::reference;
use crate::resample;
use crate::types::{SyncPairs, SyncParams};

/// Caller-provided description of one source.
pub struct SourceSpec {
    /// Full-resolution time-indexed table of the source.
    pub data: Frame,
    /// Name of the channel to run shake detection on.
    pub ref_column: String,
}

/// A source under synchronization.
///
/// The `params` field is written exactly once per calculation by the
/// orchestrator; the reference source always ends up with the identity.
pub struct SourceRecord {
    data: Frame,
    ref_column: String,
    params: Option<SyncParams>,
}

impl SourceRecord {
    pub fn data(&self) -> &Frame {
        &self.data
    }

    pub fn ref_column(&self) -> &str {
        &self.ref_column
    }

    pub fn params(&self) -> Option<&SyncParams> {
        self.params.as_ref()
    }
}

/// Removes clock offset and clock-rate error between sensor recordings by
/// stretching and shifting them onto the reference source's timeline.
pub struct Synchronizer {
    sources: BTreeMap<String, SourceRecord>,
    reference: String,
    extractor: Box<dyn SegmentExtractor>,
    sampling_freq: f64,
    ref_series: Vec<Series>,
    params: Option<BTreeMap<String, SyncParams>>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("reference", &self.reference)
            .field("sampling_freq", &self.sampling_freq)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    /// Create a synchronizer session over the given sources.
    ///
    /// Validates the source mapping, prepares the normalized reference
    /// signals, and infers the working sampling frequency as the maximum
    /// across all reference channels. Shake detection uses a default
    /// [`ShakeExtractor`] unless [`with_extractor`](Self::with_extractor)
    /// substitutes another strategy.
    pub fn new(
        specs: BTreeMap<String, SourceSpec>,
        reference_source: impl Into<String>,
    ) -> SyncResult<Self> {
        let reference = reference_source.into();
        if specs.is_empty() {
            return Err(SyncError::DataShape(
                "at least one source is required".into(),
            ));
        }
        if !specs.contains_key(&reference) {
            return Err(SyncError::DataShape(format!(
                "reference source '{reference}' is not among the sources"
            )));
        }

        let mut sources = BTreeMap::new();
        let mut ref_series = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            if !spec.data.has_column(&spec.ref_column) {
                return Err(SyncError::DataShape(format!(
                    "source '{name}' has no column '{}' to use as reference channel",
                    spec.ref_column
                )));
            }
            ref_series.push(reference::reference_series(
                &name,
                &spec.data,
                &spec.ref_column,
            )?);
            sources.insert(
                name,
                SourceRecord {
                    data: spec.data,
                    ref_column: spec.ref_column,
                    params: None,
                },
            );
        }

        let sampling_freq = resample::max_frequency(&ref_series)?;
        tracing::debug!(sampling_freq, "inferred working sampling frequency");

        Ok(Self {
            sources,
            reference,
            extractor: Box::new(ShakeExtractor::default()),
            sampling_freq,
            ref_series,
            params: None,
        })
    }

    /// Substitute the segment extraction strategy.
    pub fn with_extractor(mut self, extractor: Box<dyn SegmentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Override the sampling frequency used for the equidistant grids.
    pub fn with_sampling_frequency(mut self, frequency: f64) -> SyncResult<Self> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(SyncError::Configuration(format!(
                "sampling frequency must be a positive finite number, got {frequency}"
            )));
        }
        self.sampling_freq = frequency;
        Ok(self)
    }

    pub fn reference_source(&self) -> &str {
        &self.reference
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_freq
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn record(&self, source: &str) -> Option<&SourceRecord> {
        self.sources.get(source)
    }

    /// Resample the reference signals and run segment detection once,
    /// without touching any cached state. Intended for diagnostic overlays.
    pub fn detect_segments(&self) -> SyncResult<(Frame, SyncPairs)> {
        let frame = Frame::from_series(&self.ref_series)?;
        let equi = resample::equidistant(&frame, self.sampling_freq)?;
        let pairs = self.extractor.segments(&equi)?;
        Ok((equi, pairs))
    }

    /// Get the synchronization parameters for every source.
    ///
    /// Parameters are calculated on first use and cached; pass
    /// `recalculate` to force both passes to run again from scratch.
    pub fn sync_params(&mut self, recalculate: bool) -> SyncResult<BTreeMap<String, SyncParams>> {
        if recalculate || self.params.is_none() {
            let params = self.compute_params()?;
            for (name, record) in &mut self.sources {
                record.params = params.get(name).cloned();
            }
            self.params = Some(params);
        }
        Ok(self.params.clone().unwrap_or_default())
    }

    /// Apply the solved parameters to each source's full-resolution data.
    ///
    /// The reference source passes through unmodified. Stretching anchors at
    /// the same shared global start time used during the stretch pass.
    pub fn synced_data(&mut self, recalculate: bool) -> SyncResult<BTreeMap<String, Frame>> {
        let params = self.sync_params(recalculate)?;
        let start_time = self.global_start()?;

        let mut synced = BTreeMap::new();
        for (name, record) in &self.sources {
            let p = params
                .get(name)
                .cloned()
                .unwrap_or_else(SyncParams::reference);
            let mut data = record.data.clone();
            if p.stretch_factor != 1.0 {
                data = data.stretch_index(p.stretch_factor, start_time)?;
            }
            if let Some(shift) = p.timeshift {
                data = data.shift_index(shift);
            }
            synced.insert(name.clone(), data);
        }
        Ok(synced)
    }

    /// Minimum timestamp across all reference signals: the shared anchor
    /// every stretch operates from.
    fn global_start(&self) -> SyncResult<DateTime<Utc>> {
        self.ref_series
            .iter()
            .filter_map(|s| s.first_timestamp())
            .min()
            .ok_or_else(|| SyncError::DataShape("no reference samples available".into()))
    }

    fn compute_params(&self) -> SyncResult<BTreeMap<String, SyncParams>> {
        let start_time = self.global_start()?;
        let columns: Vec<String> = self.ref_series.iter().map(|s| s.name().to_string()).collect();

        // Pass 1: solve stretch factors and stretch the working signals.
        let frame = Frame::from_series(&self.ref_series)?;
        let equi = resample::equidistant(&frame, self.sampling_freq)?;
        let pairs = self.extractor.segments(&equi)?;
        pairs.verify(columns.iter().map(String::as_str))?;

        let mut working = self.ref_series.clone();
        let mut factors: BTreeMap<String, f64> = BTreeMap::new();
        for source in &columns {
            if *source == self.reference {
                continue;
            }
            let shifts = align::timeshift_pair(&equi, &self.reference, source, &pairs)?;
            tracing::debug!(
                source = source.as_str(),
                delta = %(shifts.first - shifts.second),
                "segment shift delta before stretching"
            );

            let factor = align::stretch_factor(source, &pairs, &shifts)?;
            tracing::info!(source = source.as_str(), factor, "stretch factor solved");

            if let Some(pos) = working.iter().position(|s| s.name() == source) {
                working[pos] = working[pos].stretch(factor, start_time)?;
            }
            factors.insert(source.clone(), factor);
        }

        // Pass 2: re-detect on the stretched signals and solve the shift.
        let frame = Frame::from_series(&working)?;
        let equi = resample::equidistant(&frame, self.sampling_freq)?;
        let pairs = self.extractor.segments(&equi)?;
        pairs.verify(columns.iter().map(String::as_str))?;

        let tolerance = Duration::nanoseconds((1e9 / self.sampling_freq).round() as i64);
        let mut params = BTreeMap::new();
        params.insert(self.reference.clone(), SyncParams::reference());
        for source in &columns {
            if *source == self.reference {
                continue;
            }
            let shifts = align::timeshift_pair(&equi, &self.reference, source, &pairs)?;

            let residual = shifts.first - shifts.second;
            if residual > tolerance || residual < -tolerance {
                tracing::warn!(
                    source = source.as_str(),
                    %residual,
                    "residual between segment shifts after stretching; the offset \
                     to the reference should be equal at both segments, so the \
                     alignment will be imperfect"
                );
            }

            tracing::info!(source = source.as_str(), timeshift = %shifts.first, "timeshift solved");
            params.insert(
                source.clone(),
                SyncParams {
                    stretch_factor: factors.get(source).copied().unwrap_or(1.0),
                    timeshift: Some(shifts.first),
                },
            );
        }

        Ok(params)
    }
}
