//! Stage configuration.
//!
//! Every path and threshold the pipeline uses is carried here and passed into
//! each stage explicitly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Smallest segment the feature stage can summarise.
pub const MIN_FEATURE_POINTS: usize = 2;

/// Configuration for the label-driven segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Minimum number of points an emitted segment must have.
    /// Values below 2 are treated as 2. Default: 2
    pub min_segment_points: usize,

    /// Reject unsorted or overlapping labels and decreasing point timestamps
    /// instead of segmenting them. Default: true
    pub validate_ordering: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_segment_points: MIN_FEATURE_POINTS,
            validate_ordering: true,
        }
    }
}

impl SegmenterConfig {
    /// Effective minimum, never below [`MIN_FEATURE_POINTS`].
    pub fn effective_min_points(&self) -> usize {
        self.min_segment_points.max(MIN_FEATURE_POINTS)
    }
}

/// Configuration for a full batch run.
///
/// Input layout is the Geolife one: `<input_dir>/<subject>/<label_file_name>` and
/// `<input_dir>/<subject>/<trajectory_dir_name>/*.txt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root holding one directory per subject.
    pub input_dir: PathBuf,

    /// Segment files are written to `<segment_dir>/<subject>/`.
    pub segment_dir: PathBuf,

    /// Feature vectors are written to `<feature_dir>/<subject>/`.
    pub feature_dir: PathBuf,

    /// When set, per-point kinematic tables are written to `<annotated_dir>/<subject>/`.
    pub annotated_dir: Option<PathBuf>,

    /// Label file inside each subject directory. Default: "labels.txt"
    pub label_file_name: String,

    /// Trajectory sub-directory inside each subject directory. Default: "Trajectory"
    pub trajectory_dir_name: String,

    /// Accepted trajectory file extensions (without the dot). Default: ["txt"]
    pub trajectory_extensions: Vec<String>,

    /// Restrict the run to these subject ids. Empty means all subjects.
    pub subjects: Vec<String>,

    pub segmenter: SegmenterConfig,

    /// Write a `report_<stage>.json` into `segment_dir` after a run. Default: true
    pub write_report: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/cleaned"),
            segment_dir: PathBuf::from("data/segments"),
            feature_dir: PathBuf::from("data/features"),
            annotated_dir: None,
            label_file_name: "labels.txt".to_string(),
            trajectory_dir_name: "Trajectory".to_string(),
            trajectory_extensions: vec!["txt".to_string()],
            subjects: Vec::new(),
            segmenter: SegmenterConfig::default(),
            write_report: true,
        }
    }
}

impl PipelineConfig {
    /// Config with the three main directories set and everything else defaulted.
    pub fn new(
        input_dir: impl Into<PathBuf>,
        segment_dir: impl Into<PathBuf>,
        feature_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            segment_dir: segment_dir.into(),
            feature_dir: feature_dir.into(),
            ..Self::default()
        }
    }

    pub fn subject_dir(&self, subject: &str) -> PathBuf {
        self.input_dir.join(subject)
    }

    pub fn label_path(&self, subject: &str) -> PathBuf {
        self.subject_dir(subject).join(&self.label_file_name)
    }

    pub fn trajectory_dir(&self, subject: &str) -> PathBuf {
        self.subject_dir(subject).join(&self.trajectory_dir_name)
    }

    pub fn subject_segment_dir(&self, subject: &str) -> PathBuf {
        self.segment_dir.join(subject)
    }

    pub fn subject_feature_dir(&self, subject: &str) -> PathBuf {
        self.feature_dir.join(subject)
    }

    pub fn subject_annotated_dir(&self, subject: &str) -> Option<PathBuf> {
        self.annotated_dir.as_ref().map(|dir| dir.join(subject))
    }

    pub fn accepts_extension(&self, extension: &str) -> bool {
        self.trajectory_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    pub fn wants_subject(&self, subject: &str) -> bool {
        self.subjects.is_empty() || self.subjects.iter().any(|s| s == subject)
    }
}
