//! Geolife directory layout and tabular file formats.
//!
//! Input, per subject:
//! - `labels.txt`: tab separated, one header row, `start<TAB>end<TAB>mode`
//! - `Trajectory/*.txt`: comma separated, no header, `lat,lon,alt,timestamp`
//!   (the 7-column layout `lat,lon,0,alt,days,date,time` is accepted too)
//!
//! Output:
//! - segment files: `latitude,longitude,altitude,timestamp` with a header row
//! - annotated files: segment columns plus the per-point kinematics
//! - feature files: one header-less row of 33 values

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::warn;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{PrepError, Result};
use crate::features::FeatureVector;
use crate::kinematics::KinematicProfile;
use crate::segmentation::TrajectorySource;
use crate::{LabelInterval, Segment, TrajectoryFile, TrajectoryPoint};

/// Timestamp format written to every output file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp format of Geolife label files.
pub const LABEL_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Timestamp formats accepted on input.
const INPUT_TIMESTAMP_FORMATS: [&str; 3] =
    ["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a timestamp in any of the accepted input formats.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    INPUT_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_error(path: &Path, line: u64, message: impl Into<String>) -> PrepError {
    PrepError::Parse {
        path: path.to_path_buf(),
        line,
        message: message.into(),
    }
}

fn parse_f64(path: &Path, line: u64, field: &str, name: &str) -> Result<f64> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| parse_error(path, line, format!("invalid {name} '{field}'")))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn open_reader(path: &Path, delimiter: u8, has_headers: bool) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| PrepError::io(path, e))?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

// ============================================================================
// Readers
// ============================================================================

/// Read a subject's label file.
pub fn read_labels(path: &Path) -> Result<Vec<LabelInterval>> {
    let mut reader = open_reader(path, b'\t', true)?;
    let mut labels = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| PrepError::csv(path, e))?;
        let line = record.position().map_or(0, |p| p.line());
        if record.len() < 3 {
            return Err(parse_error(
                path,
                line,
                format!("expected 3 columns, found {}", record.len()),
            ));
        }

        let start_time = parse_timestamp(&record[0])
            .ok_or_else(|| parse_error(path, line, format!("invalid start '{}'", &record[0])))?;
        let end_time = parse_timestamp(&record[1])
            .ok_or_else(|| parse_error(path, line, format!("invalid end '{}'", &record[1])))?;

        labels.push(LabelInterval::new(start_time, end_time, &record[2]));
    }

    Ok(labels)
}

/// Read the points of a trajectory or segment file.
///
/// A first row whose latitude is not numeric is taken as a header and skipped.
pub fn read_points(path: &Path) -> Result<Vec<TrajectoryPoint>> {
    let mut reader = open_reader(path, b',', false)?;
    let mut points = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PrepError::csv(path, e))?;
        let line = record.position().map_or(row as u64 + 1, |p| p.line());

        if row == 0 && record.get(0).is_some_and(|f| f.parse::<f64>().is_err()) {
            continue;
        }

        let (lat, lon, alt, timestamp) = match record.len() {
            // lat, lon, 0, alt, fractional days, date, time
            7 => (
                &record[0],
                &record[1],
                &record[3],
                parse_timestamp(&format!("{} {}", &record[5], &record[6])),
            ),
            n if n >= 4 => (
                &record[0],
                &record[1],
                &record[2],
                parse_timestamp(&record[3]),
            ),
            n => {
                return Err(parse_error(
                    path,
                    line,
                    format!("expected 4 or 7 columns, found {n}"),
                ));
            }
        };

        let timestamp =
            timestamp.ok_or_else(|| parse_error(path, line, "invalid timestamp".to_string()))?;
        points.push(TrajectoryPoint::new(
            parse_f64(path, line, lat, "latitude")?,
            parse_f64(path, line, lon, "longitude")?,
            parse_f64(path, line, alt, "altitude")?,
            timestamp,
        ));
    }

    Ok(points)
}

/// Read one cleaned trajectory file; its id is the file stem.
pub fn read_trajectory(path: &Path) -> Result<TrajectoryFile> {
    Ok(TrajectoryFile::new(file_stem(path), read_points(path)?))
}

/// Parts of a segment file name `{subject}_{source}_{sequence}_{mode}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName {
    pub subject: String,
    pub source_file: String,
    pub sequence: u32,
    pub mode: String,
}

impl SegmentName {
    /// Parse a file stem. Returns `None` unless it has exactly four `_`-separated parts
    /// with a numeric sequence.
    pub fn parse(stem: &str) -> Option<Self> {
        let parts: Vec<&str> = stem.split('_').collect();
        let [subject, source_file, sequence, mode] = parts.as_slice() else {
            return None;
        };
        Some(Self {
            subject: subject.to_string(),
            source_file: source_file.to_string(),
            sequence: sequence.parse().ok()?,
            mode: mode.to_string(),
        })
    }
}

/// Read a segment file written by [`write_segment`].
pub fn read_segment(path: &Path) -> Result<Segment> {
    let stem = file_stem(path);
    let name = SegmentName::parse(&stem).ok_or_else(|| {
        parse_error(
            path,
            0,
            format!("'{stem}' is not named subject_source_sequence_mode"),
        )
    })?;

    Ok(Segment {
        subject: name.subject,
        source_file: name.source_file,
        sequence: name.sequence,
        mode: name.mode,
        points: read_points(path)?,
    })
}

/// Read a single-row feature file.
pub fn read_feature_vector(path: &Path) -> Result<FeatureVector> {
    let mut reader = open_reader(path, b',', false)?;
    let record = reader
        .records()
        .next()
        .ok_or_else(|| parse_error(path, 1, "empty feature file"))?
        .map_err(|e| PrepError::csv(path, e))?;

    let values = record
        .iter()
        .map(|field| parse_f64(path, 1, field, "feature"))
        .collect::<Result<Vec<f64>>>()?;

    let count = values.len();
    FeatureVector::from_values(&values).ok_or_else(|| {
        parse_error(
            path,
            1,
            format!("expected {} values, found {count}", FeatureVector::LEN),
        )
    })
}

// ============================================================================
// Writers
// ============================================================================

#[derive(Serialize)]
struct PointRow {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    timestamp: String,
}

#[derive(Serialize)]
struct AnnotatedRow {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    timestamp: String,
    distance: f64,
    velocity: f64,
    acceleration: f64,
    bearing: f64,
    steering_angle: f64,
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PrepError::io(dir, e))
}

fn writer_for(path: &Path, has_headers: bool) -> Result<csv::Writer<File>> {
    let file = File::create(path).map_err(|e| PrepError::io(path, e))?;
    Ok(csv::WriterBuilder::new()
        .has_headers(has_headers)
        .from_writer(file))
}

/// Write a segment to `dir/{segment file name}` and return the path.
pub fn write_segment(dir: &Path, segment: &Segment) -> Result<PathBuf> {
    create_dir(dir)?;
    let path = dir.join(segment.file_name());
    let mut writer = writer_for(&path, true)?;

    for p in &segment.points {
        writer
            .serialize(PointRow {
                latitude: p.latitude,
                longitude: p.longitude,
                altitude: p.altitude,
                timestamp: format_timestamp(&p.timestamp),
            })
            .map_err(|e| PrepError::csv(&path, e))?;
    }
    writer.flush().map_err(|e| PrepError::io(&path, e))?;
    Ok(path)
}

/// Write a segment with its per-point kinematic columns appended.
pub fn write_annotated_segment(
    dir: &Path,
    segment: &Segment,
    profile: &KinematicProfile,
) -> Result<PathBuf> {
    create_dir(dir)?;
    let path = dir.join(segment.file_name());
    let mut writer = writer_for(&path, true)?;

    for (p, k) in segment.points.iter().zip(profile.rows()) {
        writer
            .serialize(AnnotatedRow {
                latitude: p.latitude,
                longitude: p.longitude,
                altitude: p.altitude,
                timestamp: format_timestamp(&p.timestamp),
                distance: k.distance,
                velocity: k.velocity,
                acceleration: k.acceleration,
                bearing: k.bearing,
                steering_angle: k.steering_angle,
            })
            .map_err(|e| PrepError::csv(&path, e))?;
    }
    writer.flush().map_err(|e| PrepError::io(&path, e))?;
    Ok(path)
}

/// Write a feature vector as a single header-less row to `dir/file_name`.
pub fn write_feature_vector(
    dir: &Path,
    file_name: &str,
    features: &FeatureVector,
) -> Result<PathBuf> {
    create_dir(dir)?;
    let path = dir.join(file_name);
    let mut writer = writer_for(&path, false)?;

    writer
        .write_record(features.as_slice().iter().map(|v| v.to_string()))
        .map_err(|e| PrepError::csv(&path, e))?;
    writer.flush().map_err(|e| PrepError::io(&path, e))?;
    Ok(path)
}

/// Write a label file in the Geolife layout (tab-separated, with header).
pub fn write_labels(path: &Path, labels: &[LabelInterval]) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    let file = File::create(path).map_err(|e| PrepError::io(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(file);

    writer
        .write_record(["Start Time", "End Time", "Transportation Mode"])
        .map_err(|e| PrepError::csv(path, e))?;
    for label in labels {
        writer
            .write_record([
                label.start_time.format(LABEL_TIMESTAMP_FORMAT).to_string(),
                label.end_time.format(LABEL_TIMESTAMP_FORMAT).to_string(),
                label.mode.clone(),
            ])
            .map_err(|e| PrepError::csv(path, e))?;
    }
    writer.flush().map_err(|e| PrepError::io(path, e))
}

/// Write a cleaned trajectory file to `dir/{file_id}.txt` and return the path.
pub fn write_trajectory(dir: &Path, trajectory: &TrajectoryFile) -> Result<PathBuf> {
    create_dir(dir)?;
    let path = dir.join(format!("{}.txt", trajectory.file_id));
    // Cleaned trajectory files carry no header row
    let mut writer = writer_for(&path, false)?;

    for p in &trajectory.points {
        writer
            .serialize(PointRow {
                latitude: p.latitude,
                longitude: p.longitude,
                altitude: p.altitude,
                timestamp: format_timestamp(&p.timestamp),
            })
            .map_err(|e| PrepError::csv(&path, e))?;
    }
    writer.flush().map_err(|e| PrepError::io(&path, e))?;
    Ok(path)
}

// ============================================================================
// Directory layout
// ============================================================================

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)
        .map_err(|e| PrepError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| PrepError::io(dir, e))?;
    paths.sort();
    Ok(paths)
}

/// Subject ids under the input directory, sorted.
///
/// A subject is a directory holding a label file. Other directories are
/// skipped with a warning, plain files silently.
pub fn discover_subjects(config: &PipelineConfig) -> Result<Vec<String>> {
    let mut subjects = Vec::new();

    for path in sorted_entries(&config.input_dir)? {
        if !path.is_dir() {
            continue;
        }
        let Some(subject) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !config.wants_subject(subject) {
            continue;
        }
        if !path.join(&config.label_file_name).is_file() {
            warn!(
                "[Dataset] Skipping {}: no {}",
                path.display(),
                config.label_file_name
            );
            continue;
        }
        subjects.push(subject.to_string());
    }

    Ok(subjects)
}

/// Trajectory files of a subject, sorted by name (Geolife names are start times).
pub fn list_trajectory_files(config: &PipelineConfig, subject: &str) -> Result<Vec<PathBuf>> {
    let dir = config.trajectory_dir(subject);
    Ok(sorted_entries(&dir)?
        .into_iter()
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| config.accepts_extension(e))
        })
        .collect())
}

/// Segment files (`*.txt`) in a directory, sorted.
pub fn list_segment_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == "txt"))
        .collect())
}

/// A [`TrajectorySource`] reading files from disk as the segmenter reaches them.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    files: Vec<PathBuf>,
}

impl DirectorySource {
    /// Source over the given files, in the given order.
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    /// Source over a subject's trajectory directory.
    pub fn for_subject(config: &PipelineConfig, subject: &str) -> Result<Self> {
        Ok(Self::new(list_trajectory_files(config, subject)?))
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl TrajectorySource for DirectorySource {
    fn file_count(&self) -> usize {
        self.files.len()
    }

    fn file_id(&self, index: usize) -> String {
        self.files
            .get(index)
            .map(|p| file_stem(p))
            .unwrap_or_default()
    }

    fn load(&mut self, index: usize) -> Result<Vec<TrajectoryPoint>> {
        match self.files.get(index) {
            Some(path) => read_points(path),
            None => Ok(Vec::new()),
        }
    }
}
