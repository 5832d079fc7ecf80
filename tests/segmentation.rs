//! Tests for segmentation module

use chrono::{Duration, NaiveDate, NaiveDateTime};
use trajmode::segmentation::*;
use trajmode::{
    LabelInterval, PrepError, Segment, SegmenterConfig, TrajectoryFile, TrajectoryPoint,
};

fn ts(seconds: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2008, 10, 23)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
        + Duration::seconds(seconds)
}

fn file(id: &str, times: impl IntoIterator<Item = i64>) -> TrajectoryFile {
    let points = times
        .into_iter()
        .map(|t| TrajectoryPoint::new(39.98, 116.30 + t as f64 * 1e-5, 50.0, ts(t)))
        .collect();
    TrajectoryFile::new(id, points)
}

fn label(start: i64, end: i64, mode: &str) -> LabelInterval {
    LabelInterval::new(ts(start), ts(end), mode)
}

fn ids(segments: &[Segment]) -> Vec<String> {
    segments.iter().map(|s| s.id()).collect()
}

fn times(segment: &Segment) -> Vec<NaiveDateTime> {
    segment.points.iter().map(|p| p.timestamp).collect()
}

#[test]
fn test_gap_between_labels_is_not_assigned() {
    let files = vec![file("f1", (0..=4).chain(10..=14).chain(100..=104))];
    let labels = vec![label(0, 4, "walk"), label(100, 104, "bus")];

    let (segments, stats) = segment_in_memory("010", &labels, files).unwrap();

    assert_eq!(ids(&segments), vec!["010_f1_1_walk", "010_f1_2_bus"]);
    assert_eq!(times(&segments[0]), (0..=4).map(ts).collect::<Vec<_>>());
    assert_eq!(times(&segments[1]), (100..=104).map(ts).collect::<Vec<_>>());
    assert_eq!(stats.segments_emitted, 2);
    assert_eq!(stats.intervals_matched, 2);
    assert_eq!(stats.points_unassigned, 5);
}

#[test]
fn test_continuous_file_gap_case() {
    // One file covering both labels and the gap between them at 1 s spacing
    let files = vec![file("f1", -1..=105)];
    let labels = vec![label(0, 4, "walk"), label(100, 104, "bus")];

    let (segments, _) = segment_in_memory("010", &labels, files).unwrap();

    assert_eq!(segments.len(), 2);
    assert!(segments[0].points.iter().all(|p| p.timestamp >= ts(0) && p.timestamp <= ts(4)));
    assert!(
        segments[1]
            .points
            .iter()
            .all(|p| p.timestamp >= ts(100) && p.timestamp <= ts(104))
    );
    assert_eq!(segments[0].points.len(), 5);
    assert_eq!(segments[1].points.len(), 5);
}

#[test]
fn test_interval_before_first_point_keeps_file() {
    let source = InMemorySource::new(vec![file("f1", 10..=20)]);
    let mut segmenter = Segmenter::new("010", source, SegmenterConfig::default());
    let mut emitted = Vec::new();

    let outcome = segmenter
        .process_interval(&label(0, 5, "walk"), &mut |s: Segment| {
            emitted.push(s);
            Ok(())
        })
        .unwrap();

    assert_eq!(outcome, IntervalOutcome::Completed);
    assert!(emitted.is_empty());
    assert_eq!(segmenter.file_index(), 0);
    assert_eq!(segmenter.remaining().len(), 11);

    segmenter
        .process_interval(&label(10, 15, "bike"), &mut |s: Segment| {
            emitted.push(s);
            Ok(())
        })
        .unwrap();
    assert_eq!(ids(&emitted), vec!["010_f1_1_bike"]);
    assert_eq!(segmenter.remaining().len(), 5);
}

#[test]
fn test_single_point_match_is_consumed() {
    let files = vec![file("f1", [0, 1, 5, 10, 11])];
    let labels = vec![label(4, 6, "walk"), label(10, 11, "car")];

    let (segments, stats) = segment_in_memory("010", &labels, files).unwrap();

    assert_eq!(ids(&segments), vec!["010_f1_1_car"]);
    assert_eq!(segments[0].points.len(), 2);
    assert_eq!(stats.single_point_matches, 1);
    assert_eq!(stats.intervals_empty, 1);
    assert_eq!(stats.points_unassigned, 3);
}

#[test]
fn test_interval_with_no_points_inside_consumes_preceding_points() {
    let files = vec![file("f1", [0, 1, 10, 11, 12])];
    let labels = vec![label(3, 5, "walk"), label(0, 1, "bus"), label(10, 12, "bike")];

    // Validation would reject the out-of-order second label
    let config = SegmenterConfig {
        validate_ordering: false,
        ..SegmenterConfig::default()
    };
    let (segments, _) = segment_in_memory_with_config("010", &labels, files, config).unwrap();

    // Points 0 and 1 were dropped by the first interval and never reach "bus"
    assert_eq!(ids(&segments), vec!["010_f1_1_bike"]);
}

#[test]
fn test_interval_spanning_two_files() {
    let files = vec![file("a", 0..=5), file("b", 10..=15)];
    let labels = vec![label(3, 12, "train")];

    let (segments, stats) = segment_in_memory("010", &labels, files).unwrap();

    assert_eq!(ids(&segments), vec!["010_a_1_train", "010_b_1_train"]);
    assert_eq!(times(&segments[0]), vec![ts(3), ts(4), ts(5)]);
    assert_eq!(times(&segments[1]), vec![ts(10), ts(11), ts(12)]);
    assert_eq!(stats.intervals_matched, 1);
    assert_eq!(stats.segments_emitted, 2);
}

#[test]
fn test_sequence_counts_per_file() {
    let files = vec![file("a", 0..=5), file("b", 10..=13)];
    let labels = vec![
        label(0, 1, "walk"),
        label(2, 3, "bike"),
        label(10, 12, "car"),
    ];

    let (segments, stats) = segment_in_memory("010", &labels, files).unwrap();

    assert_eq!(
        ids(&segments),
        vec!["010_a_1_walk", "010_a_2_bike", "010_b_1_car"]
    );
    assert_eq!(stats.files_loaded, 2);
    assert_eq!(stats.intervals_unmatched, 0);
}

#[test]
fn test_interval_starting_at_last_point_moves_on() {
    let files = vec![file("a", 0..=3), file("b", 10..=13)];
    let labels = vec![label(3, 5, "walk"), label(10, 13, "bus")];

    let (segments, stats) = segment_in_memory("010", &labels, files).unwrap();

    assert_eq!(ids(&segments), vec!["010_b_1_bus"]);
    assert_eq!(stats.intervals_empty, 1);
}

#[test]
fn test_interval_in_gap_between_files() {
    let files = vec![file("a", 0..=5), file("b", 100..=105)];
    let labels = vec![label(50, 60, "walk"), label(100, 105, "bus")];

    let (segments, stats) = segment_in_memory("010", &labels, files).unwrap();

    assert_eq!(ids(&segments), vec!["010_b_1_bus"]);
    assert_eq!(segments[0].points.len(), 6);
    assert_eq!(stats.intervals_empty, 1);
    assert_eq!(stats.intervals_matched, 1);
}

#[test]
fn test_exhausted_files_drop_remaining_intervals() {
    let files = vec![file("a", 0..=5)];
    let labels = vec![
        label(0, 3, "walk"),
        label(20, 30, "bus"),
        label(40, 50, "car"),
    ];

    let (segments, stats) = segment_in_memory("010", &labels, files).unwrap();

    assert_eq!(ids(&segments), vec!["010_a_1_walk"]);
    assert_eq!(stats.intervals_total, 3);
    assert_eq!(stats.intervals_matched, 1);
    assert_eq!(stats.intervals_unmatched, 2);
}

#[test]
fn test_no_files_drops_every_interval() {
    let labels = vec![label(0, 3, "walk"), label(5, 8, "bus")];
    let (segments, stats) = segment_in_memory("010", &labels, Vec::new()).unwrap();
    assert!(segments.is_empty());
    assert_eq!(stats.intervals_unmatched, 2);
    assert_eq!(stats.files_loaded, 0);
}

#[test]
fn test_no_labels_loads_nothing() {
    let (segments, stats) = segment_in_memory("010", &[], vec![file("a", 0..=5)]).unwrap();
    assert!(segments.is_empty());
    assert_eq!(stats.files_loaded, 0);
}

#[test]
fn test_empty_file_is_skipped() {
    let files = vec![file("a", Vec::new()), file("b", 0..=5)];
    let labels = vec![label(0, 5, "walk")];

    let (segments, _) = segment_in_memory("010", &labels, files).unwrap();
    assert_eq!(ids(&segments), vec!["010_b_1_walk"]);
}

#[test]
fn test_min_segment_points() {
    let files = vec![file("a", 0..=9)];
    let labels = vec![label(0, 2, "walk"), label(5, 9, "bus")];
    let config = SegmenterConfig {
        min_segment_points: 4,
        ..SegmenterConfig::default()
    };

    let (segments, stats) = segment_in_memory_with_config("010", &labels, files, config).unwrap();

    assert_eq!(ids(&segments), vec!["010_a_1_bus"]);
    assert_eq!(segments[0].points.len(), 5);
    assert_eq!(stats.segments_below_minimum, 1);
}

#[test]
fn test_min_segment_points_never_below_two() {
    let config = SegmenterConfig {
        min_segment_points: 0,
        ..SegmenterConfig::default()
    };
    assert_eq!(config.effective_min_points(), 2);
}

#[test]
fn test_emitted_segments_have_two_points() {
    let files = vec![file("a", [0, 1, 2, 4, 6, 7, 20, 21, 22])];
    let labels = vec![
        label(0, 0, "walk"),
        label(1, 2, "bike"),
        label(3, 5, "bus"),
        label(6, 8, "car"),
        label(20, 22, "walk"),
    ];

    let (segments, _) = segment_in_memory("010", &labels, files).unwrap();
    assert!(!segments.is_empty());
    assert!(segments.iter().all(|s| s.points.len() >= 2));
}

#[test]
fn test_overlapping_labels_rejected() {
    let files = vec![file("a", 0..=10)];
    let labels = vec![label(0, 5, "walk"), label(3, 8, "bus")];

    let err = segment_in_memory("010", &labels, files).unwrap_err();
    assert!(matches!(err, PrepError::OrderingViolation { index: 1, .. }));
}

#[test]
fn test_overlapping_labels_allowed_without_validation() {
    let files = vec![file("a", 0..=10)];
    let labels = vec![label(0, 5, "walk"), label(3, 8, "bus")];
    let config = SegmenterConfig {
        validate_ordering: false,
        ..SegmenterConfig::default()
    };

    let (segments, _) = segment_in_memory_with_config("010", &labels, files, config).unwrap();
    assert_eq!(ids(&segments), vec!["010_a_1_walk", "010_a_2_bus"]);
    assert_eq!(times(&segments[1]), vec![ts(6), ts(7), ts(8)]);
}

#[test]
fn test_backwards_points_rejected() {
    let files = vec![file("a", [0, 1, 3, 2, 4])];
    let labels = vec![label(0, 4, "walk")];

    let err = segment_in_memory("010", &labels, files).unwrap_err();
    match err {
        PrepError::OrderingViolation { context, index, .. } => {
            assert_eq!(context, "a");
            assert_eq!(index, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_files_out_of_order_rejected() {
    let files = vec![file("a", 10..=20), file("b", 5..=30)];
    let labels = vec![label(10, 12, "walk"), label(25, 30, "bus")];

    let err = segment_in_memory("010", &labels, files).unwrap_err();
    assert!(matches!(err, PrepError::OrderingViolation { .. }));
}

#[test]
fn test_sink_error_stops_run() {
    let source = InMemorySource::new(vec![file("a", 0..=9)]);
    let mut segmenter = Segmenter::new("010", source, SegmenterConfig::default());
    let labels = vec![label(0, 2, "walk"), label(5, 9, "bus")];
    let mut seen = 0;

    let result = segmenter.run(&labels, |segment| {
        seen += 1;
        Err(PrepError::DegenerateSegment {
            segment_id: segment.id(),
            point_count: segment.points.len(),
            minimum_required: 99,
        })
    });

    assert!(result.is_err());
    assert_eq!(seen, 1);
}
