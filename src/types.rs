//! Core types shared across the synchronization pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{SyncError, SyncResult};

/// Which of the two synchronization markers a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    /// The shake performed at the start of the recording.
    First,
    /// The shake performed at the end of the recording.
    Second,
}

impl Segment {
    /// Both segments, in detection order.
    pub const ALL: [Segment; 2] = [Segment::First, Segment::Second];
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::First => write!(f, "first"),
            Segment::Second => write!(f, "second"),
        }
    }
}

/// One detected shake interval in a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPoint {
    /// Timestamp of the first sample belonging to the shake (buffer included).
    pub start: DateTime<Utc>,
    /// Timestamp of the last sample belonging to the shake (buffer included).
    pub end: DateTime<Utc>,
}

/// The first and second shake of one source.
///
/// Both slots are optional while detection is in flight; alignment only runs
/// on pairs that [`SyncPairs::verify`] has confirmed to be complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPair {
    pub first: Option<SyncPoint>,
    pub second: Option<SyncPoint>,
}

impl SyncPair {
    fn get(&self, segment: Segment) -> Option<&SyncPoint> {
        match segment {
            Segment::First => self.first.as_ref(),
            Segment::Second => self.second.as_ref(),
        }
    }
}

/// Detected shake pairs for every source column, keyed by source name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPairs {
    pairs: BTreeMap<String, SyncPair>,
}

impl SyncPairs {
    /// Create an empty pair collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a detected segment for a source.
    pub fn insert(&mut self, source: impl Into<String>, segment: Segment, point: SyncPoint) {
        let pair = self.pairs.entry(source.into()).or_default();
        match segment {
            Segment::First => pair.first = Some(point),
            Segment::Second => pair.second = Some(point),
        }
    }

    /// Look up a detected segment, failing with a [`SyncError::ShakeDetection`]
    /// that names the missing source and segment.
    pub fn point(&self, source: &str, segment: Segment) -> SyncResult<&SyncPoint> {
        self.pairs
            .get(source)
            .and_then(|pair| pair.get(segment))
            .ok_or_else(|| SyncError::missing_shake(source, segment, "start"))
    }

    /// Check that both segments exist for every requested source.
    pub fn verify<'a>(&self, sources: impl IntoIterator<Item = &'a str>) -> SyncResult<()> {
        for source in sources {
            for segment in Segment::ALL {
                self.point(source, segment)?;
            }
        }
        Ok(())
    }

    /// Iterate over all sources with at least one detected segment.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    /// Number of sources with at least one detected segment.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no segments have been detected at all.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Per-segment lag that moves a target segment's start onto the reference's.
#[derive(Debug, Clone, Copy)]
pub struct Timeshift {
    pub first: Duration,
    pub second: Duration,
}

/// Final synchronization parameters for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncParams {
    /// Multiplicative correction to the timestamp deltas. 1.0 for the reference.
    pub stretch_factor: f64,
    /// Additive correction applied after stretching. `None` for the reference.
    #[serde(with = "duration_ns")]
    pub timeshift: Option<Duration>,
}

impl SyncParams {
    /// Parameters of the reference source, which is never modified.
    pub fn reference() -> Self {
        Self {
            stretch_factor: 1.0,
            timeshift: None,
        }
    }
}

/// Serialize an optional timeshift as integer nanoseconds.
mod duration_ns {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        value
            .map(|d| d.num_nanoseconds().unwrap_or(i64::MAX))
            .serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<i64>::deserialize(de)?.map(Duration::nanoseconds))
    }
}
