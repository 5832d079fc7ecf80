//! Unified error type for segmentation, feature extraction and dataset I/O.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors produced by the preparation pipeline.
#[derive(Debug, Error)]
pub enum PrepError {
    /// Two consecutive points share a timestamp, so velocity is undefined.
    #[error(
        "zero elapsed time between points {} and {index} at {timestamp}",
        .index.saturating_sub(1)
    )]
    ZeroElapsedTime {
        index: usize,
        timestamp: NaiveDateTime,
    },

    /// A segment too short for feature computation reached a stage that needs it.
    #[error(
        "segment {segment_id} has {point_count} points, at least {minimum_required} required"
    )]
    DegenerateSegment {
        segment_id: String,
        point_count: usize,
        minimum_required: usize,
    },

    /// Labels or points are not in the order the segmenter relies on.
    #[error("ordering violation in {context} at index {index}: {detail}")]
    OrderingViolation {
        context: String,
        index: usize,
        detail: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A field could not be interpreted.
    #[error("parse error in {} line {line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("failed to write report {}: {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PrepError>;

impl PrepError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrepError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        PrepError::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn ordering(
        context: impl Into<String>,
        index: usize,
        detail: impl Into<String>,
    ) -> Self {
        PrepError::OrderingViolation {
            context: context.into(),
            index,
            detail: detail.into(),
        }
    }
}

/// Extension trait for turning a missing value into a [`PrepError::DegenerateSegment`].
pub trait OptionExt<T> {
    fn ok_or_degenerate(
        self,
        segment_id: &str,
        point_count: usize,
        minimum_required: usize,
    ) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_degenerate(
        self,
        segment_id: &str,
        point_count: usize,
        minimum_required: usize,
    ) -> Result<T> {
        self.ok_or_else(|| PrepError::DegenerateSegment {
            segment_id: segment_id.to_string(),
            point_count,
            minimum_required,
        })
    }
}
