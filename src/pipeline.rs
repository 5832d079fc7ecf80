//! Batch driver over subjects.
//!
//! A subject's labels and files are always processed in order by a single
//! [`Segmenter`]. Subjects are independent of one another and write to their own
//! output directories, so with the `parallel` feature they run concurrently.
//! A failing subject is recorded in its [`SubjectReport`] and never stops the others.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use geo::{BoundingRect, LineString};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::dataset::{self, DirectorySource};
use crate::error::{PrepError, Result};
use crate::features::extract_segment_features;
use crate::segmentation::{SegmentationStats, Segmenter};
use crate::Segment;

/// Which stages a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Label-driven segmentation only
    Segment,
    /// Feature extraction from previously written segment files
    Features,
    /// Segmentation followed by feature extraction, in one pass
    All,
}

impl Stage {
    /// Name of the report a run of this stage writes into the segment directory.
    pub fn report_file_name(self) -> &'static str {
        match self {
            Stage::Segment => "report_segment.json",
            Stage::Features => "report_features.json",
            Stage::All => "report_all.json",
        }
    }
}

/// Where and when one segment lies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentExtent {
    pub segment_id: String,
    pub mode: String,
    pub point_count: usize,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
    /// Sum of per-point distances, once features have been computed
    pub total_distance: Option<f64>,
}

impl SegmentExtent {
    pub fn of(segment: &Segment) -> Self {
        let line: LineString<f64> = segment
            .points
            .iter()
            .map(|p| (p.longitude, p.latitude))
            .collect::<Vec<_>>()
            .into();
        let (min_lat, max_lat, min_lng, max_lng) = match line.bounding_rect() {
            Some(rect) => (rect.min().y, rect.max().y, rect.min().x, rect.max().x),
            None => (0.0, 0.0, 0.0, 0.0),
        };

        Self {
            segment_id: segment.id(),
            mode: segment.mode.clone(),
            point_count: segment.points.len(),
            start_time: segment.start_time(),
            end_time: segment.end_time(),
            min_lat,
            max_lat,
            min_lng,
            max_lng,
            total_distance: None,
        }
    }
}

/// A segment whose features could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFailure {
    pub segment_id: String,
    pub reason: String,
}

/// Outcome of processing one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectReport {
    pub subject: String,
    pub segmentation: SegmentationStats,
    pub segments_written: usize,
    pub features_written: usize,
    pub annotated_written: usize,
    pub feature_failures: Vec<FeatureFailure>,
    pub segments: Vec<SegmentExtent>,
    /// Set when the subject could not be processed at all
    pub error: Option<String>,
}

impl SubjectReport {
    fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub stage: Stage,
    pub subjects: Vec<SubjectReport>,
}

impl PipelineReport {
    pub fn total_segments(&self) -> usize {
        self.subjects.iter().map(|s| s.segments_written).sum()
    }

    pub fn total_features(&self) -> usize {
        self.subjects.iter().map(|s| s.features_written).sum()
    }

    pub fn failed_subjects(&self) -> Vec<&SubjectReport> {
        self.subjects.iter().filter(|s| !s.is_ok()).collect()
    }

    pub fn subject(&self, subject: &str) -> Option<&SubjectReport> {
        self.subjects.iter().find(|s| s.subject == subject)
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PrepError::io(parent, e))?;
        }
        let file = std::fs::File::create(path).map_err(|e| PrepError::io(path, e))?;
        serde_json::to_writer_pretty(file, self).map_err(|source| PrepError::Report {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Compute and write the features of one segment.
///
/// Bad kinematics (repeated or backwards timestamps) are recorded in the report
/// and skipped; only write failures are returned as errors.
fn write_segment_features(
    config: &PipelineConfig,
    segment: &Segment,
    extent: &mut SegmentExtent,
    report: &mut SubjectReport,
) -> Result<()> {
    let (profile, features) = match extract_segment_features(segment) {
        Ok(result) => result,
        Err(e) => {
            warn!("[Features] Skipping {}: {}", segment.id(), e);
            report.feature_failures.push(FeatureFailure {
                segment_id: segment.id(),
                reason: e.to_string(),
            });
            return Ok(());
        }
    };

    dataset::write_feature_vector(
        &config.subject_feature_dir(&segment.subject),
        &segment.file_name(),
        &features,
    )?;
    report.features_written += 1;
    extent.total_distance = Some(features.total_distance());

    if let Some(dir) = config.subject_annotated_dir(&segment.subject) {
        dataset::write_annotated_segment(&dir, segment, &profile)?;
        report.annotated_written += 1;
    }
    Ok(())
}

/// Segment one subject, writing segment files and, when `with_features` is set,
/// their feature vectors.
pub fn segment_subject(
    config: &PipelineConfig,
    subject: &str,
    with_features: bool,
) -> Result<SubjectReport> {
    let mut report = SubjectReport::new(subject);
    segment_into(config, subject, with_features, &mut report)?;
    Ok(report)
}

/// Fills `report` as segments are written, so it stays accurate up to a failure.
fn segment_into(
    config: &PipelineConfig,
    subject: &str,
    with_features: bool,
    report: &mut SubjectReport,
) -> Result<()> {
    let labels = dataset::read_labels(&config.label_path(subject))?;
    let source = DirectorySource::for_subject(config, subject)?;
    info!(
        "[Pipeline] {}: {} label intervals, {} trajectory files",
        subject,
        labels.len(),
        source.files().len()
    );

    let segment_dir = config.subject_segment_dir(subject);
    let mut segmenter = Segmenter::new(subject, source, config.segmenter.clone());

    let result = segmenter.run(&labels, |segment| {
        dataset::write_segment(&segment_dir, &segment)?;
        report.segments_written += 1;

        let mut extent = SegmentExtent::of(&segment);
        let written = if with_features {
            write_segment_features(config, &segment, &mut extent, report)
        } else {
            Ok(())
        };
        // The segment file exists either way
        report.segments.push(extent);
        written
    });
    report.segmentation = segmenter.stats().clone();
    result?;

    info!(
        "[Pipeline] {}: {} segments, {} feature vectors",
        subject, report.segments_written, report.features_written
    );
    Ok(())
}

/// Segment one subject and compute every segment's features in the same pass.
pub fn process_subject(config: &PipelineConfig, subject: &str) -> Result<SubjectReport> {
    segment_subject(config, subject, true)
}

/// Compute feature vectors for the segment files already written for a subject.
///
/// A file that cannot be read as a segment is recorded as a [`FeatureFailure`]
/// and the remaining files are still processed.
pub fn extract_features_for_subject(
    config: &PipelineConfig,
    subject: &str,
) -> Result<SubjectReport> {
    let mut report = SubjectReport::new(subject);
    features_into(config, subject, &mut report)?;
    Ok(report)
}

fn features_into(config: &PipelineConfig, subject: &str, report: &mut SubjectReport) -> Result<()> {
    for path in dataset::list_segment_files(&config.subject_segment_dir(subject))? {
        let segment = match dataset::read_segment(&path) {
            Ok(segment) => segment,
            Err(e) => {
                warn!("[Features] Skipping {}: {}", path.display(), e);
                report.feature_failures.push(FeatureFailure {
                    segment_id: path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let mut extent = SegmentExtent::of(&segment);
        let written = write_segment_features(config, &segment, &mut extent, report);
        report.segments.push(extent);
        written?;
    }

    info!(
        "[Pipeline] {}: {} feature vectors from {} segment files",
        subject,
        report.features_written,
        report.segments.len()
    );
    Ok(())
}

/// Run one stage for one subject, capturing any failure in the report.
///
/// Whatever was written before the failure stays counted in the report.
pub fn run_subject(config: &PipelineConfig, subject: &str, stage: Stage) -> SubjectReport {
    let mut report = SubjectReport::new(subject);
    let result = match stage {
        Stage::Segment => segment_into(config, subject, false, &mut report),
        Stage::All => segment_into(config, subject, true, &mut report),
        Stage::Features => features_into(config, subject, &mut report),
    };

    if let Err(e) = result {
        warn!(
            "[Pipeline] {} failed after {} segments: {}",
            subject, report.segments_written, e
        );
        report.error = Some(e.to_string());
    }
    report
}

/// Subjects a stage should visit.
fn subjects_for(config: &PipelineConfig, stage: Stage) -> Result<Vec<String>> {
    match stage {
        Stage::Segment | Stage::All => dataset::discover_subjects(config),
        Stage::Features => {
            let mut subjects = Vec::new();
            for path in segment_subject_dirs(&config.segment_dir)? {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if config.wants_subject(name) {
                        subjects.push(name.to_string());
                    }
                }
            }
            Ok(subjects)
        }
    }
}

fn segment_subject_dirs(segment_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(segment_dir)
        .map_err(|e| PrepError::io(segment_dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Run a stage over every subject.
///
/// Only failing to enumerate subjects or to write the report is an error;
/// per-subject failures are reported in [`SubjectReport::error`].
pub fn run_pipeline(config: &PipelineConfig, stage: Stage) -> Result<PipelineReport> {
    let subjects = subjects_for(config, stage)?;
    info!("[Pipeline] {:?} stage over {} subjects", stage, subjects.len());

    #[cfg(feature = "parallel")]
    let reports: Vec<SubjectReport> = {
        use rayon::prelude::*;
        subjects
            .par_iter()
            .map(|subject| run_subject(config, subject, stage))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let reports: Vec<SubjectReport> = subjects
        .iter()
        .map(|subject| run_subject(config, subject, stage))
        .collect();

    let report = PipelineReport {
        stage,
        subjects: reports,
    };

    let failed = report.failed_subjects().len();
    info!(
        "[Pipeline] Done: {} segments, {} feature vectors, {} failed subjects",
        report.total_segments(),
        report.total_features(),
        failed
    );

    if config.write_report {
        let path = config.segment_dir.join(stage.report_file_name());
        report.write_json(&path)?;
        info!("[Pipeline] Report written to {}", path.display());
    }

    Ok(report)
}
