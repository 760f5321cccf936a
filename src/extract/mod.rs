//! Segment extraction strategies.
//!
//! The orchestrator only depends on the [`SegmentExtractor`] capability, so
//! alternative strategies (e.g. manually tagged markers) can substitute for
//! shake detection without touching any alignment logic.

mod shake;

pub use shake::{ShakeConfig, ShakeExtractor};

use crate::errors::SyncResult;
use crate::frame::Frame;
use crate::types::SyncPairs;

/// Locates the first and second synchronization segment of every column in
/// a frame of normalized reference signals.
pub trait SegmentExtractor {
    /// Detect both segments per column, including the reference column.
    fn segments(&self, frame: &Frame) -> SyncResult<SyncPairs>;
}
