//! Error types for the synchronization pipeline.
//!
//! Every failure is synchronous and surfaced directly to the caller of the
//! parameter- or data-retrieval operation. There is no retry path: fixing a
//! detection failure means adjusting the extractor parameters and invoking
//! the synchronizer again.

use std::fmt;

use chrono::Duration;

use crate::types::Segment;

/// Errors produced while detecting shakes and solving for sync parameters.
///
/// `Display` and `Error` are implemented by hand because several variants
/// carry a `source: String` field naming the sensor source, which the
/// `thiserror` derive would unconditionally treat as an error cause.
#[derive(Debug)]
pub enum SyncError {
    /// Invalid configuration: out-of-range extractor parameters,
    /// reserved output-table names, unknown export columns.
    Configuration(String),

    /// Malformed input data: bad index, missing column, too few samples.
    DataShape(String),

    /// A centered signal is uniformly zero, so normalization is undefined.
    DegenerateSignal { source: String },

    /// A detection window is longer than the recording it should cover.
    WindowConfiguration {
        source: String,
        start_window: Duration,
        end_window: Duration,
        duration: Duration,
    },

    /// No qualifying peak sequence was found for a segment of a source.
    ShakeDetection {
        source: String,
        segment: Segment,
        part: &'static str,
    },

    /// First and second segments coincide, so the stretch factor is undefined.
    DegenerateSegment { source: String },

    /// I/O error while exporting results.
    Io(std::io::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            Self::DataShape(msg) => write!(f, "malformed input data: {msg}"),
            Self::DegenerateSignal { source } => write!(
                f,
                "signal '{source}' is constant, cannot normalize an all-zero centered signal"
            ),
            Self::WindowConfiguration {
                source,
                start_window,
                end_window,
                duration,
            } => write!(
                f,
                "start ({start_window}) plus end ({end_window}) window lengths exceed \
                 the recorded duration of '{source}' ({duration}); \
                 each window must cover only the start or the end, never both"
            ),
            Self::ShakeDetection {
                source,
                segment,
                part,
            } => write!(f, "no {segment} shake detected for '{source}', missing the {part}"),
            Self::DegenerateSegment { source } => write!(
                f,
                "first and second segments of '{source}' start at the same timestamp, \
                 stretch factor is undefined; bad window lengths, maybe?"
            ),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl SyncError {
    /// Shorthand for a [`SyncError::ShakeDetection`] naming a missing segment.
    pub fn missing_shake(source: impl Into<String>, segment: Segment, part: &'static str) -> Self {
        Self::ShakeDetection {
            source: source.into(),
            segment,
            part,
        }
    }
}

/// Type alias for synchronization results.
pub type SyncResult<T> = Result<T, SyncError>;
