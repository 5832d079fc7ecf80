//! # trajmode
//!
//! Preparation of Geolife GPS trajectories for transportation-mode classification.
//!
//! This library provides:
//! - Label-driven segmentation of cleaned trajectories into one sub-trajectory per
//!   travel-mode interval
//! - Per-point kinematics (distance, velocity, acceleration, bearing, steering angle)
//! - A fixed 33-value statistical feature vector per segment
//! - Filesystem readers/writers for the Geolife subject layout
//! - A batch pipeline that processes subjects in parallel
//!
//! ## Features
//!
//! - **`parallel`** - Process subjects concurrently with rayon
//! - **`synthetic`** - Deterministic synthetic subjects for benches and stress tests
//! - **`cli`** - The `trajmode-cli` binary
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use trajmode::{LabelInterval, TrajectoryFile, TrajectoryPoint};
//! use trajmode::features::extract_feature_vector;
//! use trajmode::segmentation::segment_in_memory;
//!
//! let t0 = NaiveDate::from_ymd_opt(2008, 10, 23).unwrap().and_hms_opt(9, 0, 0).unwrap();
//! let points: Vec<TrajectoryPoint> = (0..10)
//!     .map(|i| {
//!         TrajectoryPoint::new(
//!             39.98 + i as f64 * 0.0001,
//!             116.31,
//!             50.0,
//!             t0 + chrono::Duration::seconds(i * 5),
//!         )
//!     })
//!     .collect();
//!
//! let labels = vec![LabelInterval::new(
//!     t0,
//!     t0 + chrono::Duration::seconds(45),
//!     "walk",
//! )];
//! let files = vec![TrajectoryFile::new("20081023090000", points)];
//!
//! let (segments, _stats) = segment_in_memory("010", &labels, files).unwrap();
//! assert_eq!(segments.len(), 1);
//!
//! let features = extract_feature_vector(&segments[0].points).unwrap();
//! assert_eq!(features.as_slice().len(), 33);
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, PrepError, Result};

// Explicit stage configuration
pub mod config;
pub use config::{PipelineConfig, SegmenterConfig};

// Point-to-point kinematics and per-point profiles
pub mod kinematics;
pub use kinematics::{
    KinematicProfile, acceleration, bearing, elapsed_seconds, haversine_distance, steering_angle,
    velocity,
};

// Column statistics and the 33-value feature vector
pub mod features;
pub use features::{ColumnSummary, FeatureVector, extract_feature_vector};

// Label-driven segmentation state machine
pub mod segmentation;
pub use segmentation::{
    InMemorySource, SegmentationStats, Segmenter, TrajectorySource, Transition, next_transition,
    segment_in_memory,
};

// Geolife directory layout, readers and writers
pub mod dataset;
pub use dataset::DirectorySource;

// Batch driver over subjects
pub mod pipeline;
pub use pipeline::{PipelineReport, SegmentExtent, Stage, SubjectReport, run_pipeline};

// Synthetic subjects for benchmarking
#[cfg(feature = "synthetic")]
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// A single cleaned GPS fix.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use trajmode::TrajectoryPoint;
///
/// let ts = NaiveDate::from_ymd_opt(2008, 10, 23).unwrap().and_hms_opt(2, 53, 4).unwrap();
/// let point = TrajectoryPoint::new(39.984702, 116.318417, 492.0, ts); // Beijing
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude as recorded by the logger (Geolife uses feet)
    pub altitude: f64,
    pub timestamp: NaiveDateTime,
}

impl TrajectoryPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64, timestamp: NaiveDateTime) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            timestamp,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A time range tagged with a travel mode.
///
/// Both ends are inclusive when matching points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInterval {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Travel mode, e.g. "walk", "bus", "subway"
    pub mode: String,
}

impl LabelInterval {
    pub fn new(start_time: NaiveDateTime, end_time: NaiveDateTime, mode: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            mode: mode.into(),
        }
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start_time <= timestamp && timestamp <= self.end_time
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.end_time - self.start_time).num_seconds()
    }
}

/// The cleaned points of one raw log file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryFile {
    /// File stem, e.g. "20081023025304"
    pub file_id: String,
    pub points: Vec<TrajectoryPoint>,
}

impl TrajectoryFile {
    pub fn new(file_id: impl Into<String>, points: Vec<TrajectoryPoint>) -> Self {
        Self {
            file_id: file_id.into(),
            points,
        }
    }
}

/// A contiguous run of points from one trajectory file, tagged with one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Subject (volunteer) id, e.g. "010"
    pub subject: String,
    /// File stem of the trajectory file the points came from
    pub source_file: String,
    /// Running counter within the source file, starting at 1
    pub sequence: u32,
    pub mode: String,
    pub points: Vec<TrajectoryPoint>,
}

impl Segment {
    /// Provenance id: `{subject}_{source_file}_{sequence}_{mode}`.
    pub fn id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.subject, self.source_file, self.sequence, self.mode
        )
    }

    /// Output file name for this segment.
    pub fn file_name(&self) -> String {
        format!("{}.txt", self.id())
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        self.points.last().map(|p| p.timestamp)
    }
}
