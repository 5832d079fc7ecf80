//! Label-driven trajectory segmentation.
//!
//! Merges two ordered streams, the label intervals of one subject and the
//! points of that subject's trajectory files, using two cursors:
//! - the interval cursor walks the labels in order
//! - the point cursor marks the first unconsumed point of the current file
//!
//! Each step is decided by [`next_transition`], a pure function of the current
//! interval and the unconsumed points, so the merge logic can be tested without
//! any I/O. [`Segmenter`] applies the transitions, loads files on demand through
//! a [`TrajectorySource`] and hands every emitted [`Segment`] to a sink.
//!
//! Points are consumed at most once: whatever lies before the end of a matched
//! window is gone for later intervals, whether or not it became a segment.

use chrono::NaiveDateTime;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::SegmenterConfig;
use crate::error::{PrepError, Result};
use crate::{LabelInterval, Segment, TrajectoryFile, TrajectoryPoint};

/// Outcome of testing one label interval against the unconsumed points of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The interval starts at or after the file's last point; move to the next file.
    AdvanceFile,
    /// The interval ends before the file's first unconsumed point; move to the next interval.
    SkipInterval,
    /// Points `start..=end` lie inside the interval and form a segment.
    EmitSegment { start: usize, end: usize },
    /// At most one point lies inside the interval; discard points `0..=through`.
    DropPoints { through: usize },
}

/// Decide what to do with `interval` given the unconsumed points of the current file.
///
/// Indices in the result are relative to `remaining`.
pub fn next_transition(interval: &LabelInterval, remaining: &[TrajectoryPoint]) -> Transition {
    let (Some(first), Some(last)) = (remaining.first(), remaining.last()) else {
        return Transition::AdvanceFile;
    };

    if interval.start_time >= last.timestamp {
        return Transition::AdvanceFile;
    }
    if interval.end_time < first.timestamp {
        return Transition::SkipInterval;
    }

    // The first point is known to be <= end_time, so `end` is always assigned
    let mut start = 0;
    let mut end = 0;
    for (index, point) in remaining.iter().enumerate() {
        if point.timestamp > interval.end_time {
            break;
        }
        if point.timestamp < interval.start_time {
            start = index + 1;
        }
        end = index;
    }

    if start < end {
        Transition::EmitSegment { start, end }
    } else {
        Transition::DropPoints { through: end }
    }
}

/// Ordered trajectory files of one subject, loaded on demand.
pub trait TrajectorySource {
    /// Number of files.
    fn file_count(&self) -> usize;

    /// Identifier used in segment names, normally the file stem.
    fn file_id(&self, index: usize) -> String;

    /// Load the points of file `index`.
    fn load(&mut self, index: usize) -> Result<Vec<TrajectoryPoint>>;
}

/// A [`TrajectorySource`] over files already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    files: Vec<TrajectoryFile>,
}

impl InMemorySource {
    pub fn new(files: Vec<TrajectoryFile>) -> Self {
        Self { files }
    }
}

impl TrajectorySource for InMemorySource {
    fn file_count(&self) -> usize {
        self.files.len()
    }

    fn file_id(&self, index: usize) -> String {
        self.files
            .get(index)
            .map(|f| f.file_id.clone())
            .unwrap_or_default()
    }

    fn load(&mut self, index: usize) -> Result<Vec<TrajectoryPoint>> {
        // Each file is loaded once, so hand the points over instead of cloning
        Ok(self
            .files
            .get_mut(index)
            .map(|f| std::mem::take(&mut f.points))
            .unwrap_or_default())
    }
}

/// Counters collected while segmenting one subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationStats {
    pub intervals_total: usize,
    /// Intervals that produced at least one segment
    pub intervals_matched: usize,
    /// Intervals that were tested against data but produced nothing
    pub intervals_empty: usize,
    /// Intervals dropped because no trajectory files were left
    pub intervals_unmatched: usize,
    pub segments_emitted: usize,
    /// Windows with 2+ points that were still shorter than `min_segment_points`
    pub segments_below_minimum: usize,
    /// Windows that matched exactly one point
    pub single_point_matches: usize,
    /// Points consumed or passed over without ending up in a segment
    pub points_unassigned: usize,
    pub files_loaded: usize,
}

/// Whether the segmenter can keep going after an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalOutcome {
    /// The interval is finished; the next one can be processed.
    Completed,
    /// Every trajectory file has been consumed.
    FilesExhausted,
}

/// Two-cursor merge of label intervals against trajectory files.
pub struct Segmenter<S: TrajectorySource> {
    subject: String,
    config: SegmenterConfig,
    source: S,
    file_index: usize,
    file_id: String,
    points: Vec<TrajectoryPoint>,
    cursor: usize,
    needs_load: bool,
    sequence: u32,
    previous_file_end: Option<NaiveDateTime>,
    stats: SegmentationStats,
}

impl<S: TrajectorySource> Segmenter<S> {
    pub fn new(subject: impl Into<String>, source: S, config: SegmenterConfig) -> Self {
        Self {
            subject: subject.into(),
            config,
            source,
            file_index: 0,
            file_id: String::new(),
            points: Vec::new(),
            cursor: 0,
            needs_load: true,
            sequence: 1,
            previous_file_end: None,
            stats: SegmentationStats::default(),
        }
    }

    /// Index of the file the point cursor is in.
    pub fn file_index(&self) -> usize {
        self.file_index
    }

    /// Unconsumed points of the current file.
    pub fn remaining(&self) -> &[TrajectoryPoint] {
        self.points.get(self.cursor..).unwrap_or_default()
    }

    pub fn stats(&self) -> &SegmentationStats {
        &self.stats
    }

    /// Segment every interval in order, passing each segment to `emit`.
    ///
    /// Stops early once the trajectory files run out; the intervals left over
    /// are counted in [`SegmentationStats::intervals_unmatched`].
    pub fn run<F>(&mut self, labels: &[LabelInterval], mut emit: F) -> Result<SegmentationStats>
    where
        F: FnMut(Segment) -> Result<()>,
    {
        if self.config.validate_ordering {
            validate_labels(labels)?;
        }
        self.stats.intervals_total += labels.len();

        for (index, interval) in labels.iter().enumerate() {
            let emitted_before = self.stats.segments_emitted;
            let outcome = self.process_interval(interval, &mut emit)?;

            let matched = self.stats.segments_emitted > emitted_before;
            if matched {
                self.stats.intervals_matched += 1;
            }

            if outcome == IntervalOutcome::FilesExhausted {
                let dropped = labels.len() - index - usize::from(matched);
                self.stats.intervals_unmatched += dropped;
                if dropped > 0 {
                    info!(
                        "[Segmenter] {}: trajectory files exhausted, dropping {} label intervals",
                        self.subject, dropped
                    );
                }
                break;
            }

            if !matched {
                self.stats.intervals_empty += 1;
            }
        }

        Ok(self.stats.clone())
    }

    /// Apply transitions for one interval until it is finished or the files run out.
    pub fn process_interval<F>(
        &mut self,
        interval: &LabelInterval,
        emit: &mut F,
    ) -> Result<IntervalOutcome>
    where
        F: FnMut(Segment) -> Result<()>,
    {
        loop {
            if self.needs_load && !self.load_current()? {
                return Ok(IntervalOutcome::FilesExhausted);
            }

            match next_transition(interval, self.remaining()) {
                Transition::AdvanceFile => self.advance_file(),
                Transition::SkipInterval => return Ok(IntervalOutcome::Completed),
                Transition::EmitSegment { start, end } => {
                    let window = &self.remaining()[start..=end];
                    if window.len() >= self.config.effective_min_points() {
                        let segment = Segment {
                            subject: self.subject.clone(),
                            source_file: self.file_id.clone(),
                            sequence: self.sequence,
                            mode: interval.mode.clone(),
                            points: window.to_vec(),
                        };
                        debug!(
                            "[Segmenter] {} -> {} points",
                            segment.id(),
                            segment.points.len()
                        );
                        self.sequence += 1;
                        self.stats.segments_emitted += 1;
                        self.stats.points_unassigned += start;
                        emit(segment)?;
                    } else {
                        self.stats.segments_below_minimum += 1;
                        self.stats.points_unassigned += end + 1;
                    }
                    self.consume_through(end);
                }
                Transition::DropPoints { through } => {
                    let single_match = self.remaining()[..=through]
                        .iter()
                        .any(|p| interval.contains(p.timestamp));
                    if single_match {
                        self.stats.single_point_matches += 1;
                    }
                    self.stats.points_unassigned += through + 1;
                    self.consume_through(through);
                }
            }
        }
    }

    /// Load the file at `file_index`. Returns `false` when no files are left.
    fn load_current(&mut self) -> Result<bool> {
        if self.file_index >= self.source.file_count() {
            return Ok(false);
        }

        let file_id = self.source.file_id(self.file_index);
        let points = self.source.load(self.file_index)?;

        if self.config.validate_ordering {
            validate_points(&file_id, &points)?;
            if let (Some(previous_end), Some(first)) = (self.previous_file_end, points.first()) {
                if first.timestamp < previous_end {
                    return Err(PrepError::ordering(
                        file_id,
                        0,
                        format!(
                            "file starts at {} before the previous file ended at {}",
                            first.timestamp, previous_end
                        ),
                    ));
                }
            }
        }
        if let Some(last) = points.last() {
            self.previous_file_end = Some(last.timestamp);
        }

        debug!(
            "[Segmenter] {}: loaded {} ({} points)",
            self.subject,
            file_id,
            points.len()
        );

        self.file_id = file_id;
        self.points = points;
        self.cursor = 0;
        self.sequence = 1;
        self.needs_load = false;
        self.stats.files_loaded += 1;
        Ok(true)
    }

    fn advance_file(&mut self) {
        self.stats.points_unassigned += self.remaining().len();
        self.file_index += 1;
        self.needs_load = true;
    }

    fn consume_through(&mut self, through: usize) {
        self.cursor += through + 1;
        // A lone point can never form a segment on its own
        if self.remaining().len() < 2 {
            self.advance_file();
        }
    }
}

/// Segment in-memory files and collect the segments.
///
/// # Example
/// ```
/// use chrono::{Duration, NaiveDate};
/// use trajmode::{LabelInterval, TrajectoryFile, TrajectoryPoint, segment_in_memory};
///
/// let t0 = NaiveDate::from_ymd_opt(2009, 3, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let points = (0..5)
///     .map(|i| TrajectoryPoint::new(40.0, 116.3 + i as f64 * 1e-4, 0.0, t0 + Duration::seconds(i)))
///     .collect();
/// let labels = vec![LabelInterval::new(t0, t0 + Duration::seconds(2), "bike")];
///
/// let (segments, _) =
///     segment_in_memory("128", &labels, vec![TrajectoryFile::new("20090301080000", points)]).unwrap();
/// assert_eq!(segments[0].id(), "128_20090301080000_1_bike");
/// assert_eq!(segments[0].points.len(), 3);
/// ```
pub fn segment_in_memory(
    subject: &str,
    labels: &[LabelInterval],
    files: Vec<TrajectoryFile>,
) -> Result<(Vec<Segment>, SegmentationStats)> {
    segment_in_memory_with_config(subject, labels, files, SegmenterConfig::default())
}

/// [`segment_in_memory`] with an explicit configuration.
pub fn segment_in_memory_with_config(
    subject: &str,
    labels: &[LabelInterval],
    files: Vec<TrajectoryFile>,
    config: SegmenterConfig,
) -> Result<(Vec<Segment>, SegmentationStats)> {
    let mut segmenter = Segmenter::new(subject, InMemorySource::new(files), config);
    let mut segments = Vec::new();
    let stats = segmenter.run(labels, |segment| {
        segments.push(segment);
        Ok(())
    })?;
    Ok((segments, stats))
}

/// Check that intervals are well-formed, sorted and non-overlapping.
///
/// An interval may start exactly when the previous one ends.
pub fn validate_labels(labels: &[LabelInterval]) -> Result<()> {
    for (index, interval) in labels.iter().enumerate() {
        if interval.end_time < interval.start_time {
            return Err(PrepError::ordering(
                "labels",
                index,
                format!(
                    "interval ends at {} before it starts at {}",
                    interval.end_time, interval.start_time
                ),
            ));
        }
        if index > 0 {
            let previous = &labels[index - 1];
            if interval.start_time < previous.end_time {
                return Err(PrepError::ordering(
                    "labels",
                    index,
                    format!(
                        "interval starting {} overlaps previous interval ending {}",
                        interval.start_time, previous.end_time
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Check that point timestamps never go backwards.
///
/// Repeated timestamps pass here; they only matter for kinematics.
pub fn validate_points(context: &str, points: &[TrajectoryPoint]) -> Result<()> {
    match points
        .windows(2)
        .position(|w| w[1].timestamp < w[0].timestamp)
    {
        Some(position) => Err(PrepError::ordering(
            context,
            position + 1,
            format!(
                "timestamp {} precedes previous point {}",
                points[position + 1].timestamp,
                points[position].timestamp
            ),
        )),
        None => Ok(()),
    }
}
