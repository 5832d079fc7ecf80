//! Tests for pipeline module

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tempfile::TempDir;
use trajmode::dataset::{list_segment_files, read_feature_vector, write_labels, write_trajectory};
use trajmode::pipeline::{extract_features_for_subject, process_subject, segment_subject};
use trajmode::{
    LabelInterval, PipelineConfig, PipelineReport, Stage, TrajectoryFile, TrajectoryPoint,
    run_pipeline,
};

fn ts(seconds: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2008, 10, 23)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
        + Duration::seconds(seconds)
}

fn trajectory(id: &str, times: impl IntoIterator<Item = i64>) -> TrajectoryFile {
    let points = times
        .into_iter()
        .map(|t| {
            TrajectoryPoint::new(
                39.98 + t as f64 * 2e-5,
                116.31 + (t % 7) as f64 * 1e-5,
                50.0,
                ts(t),
            )
        })
        .collect();
    TrajectoryFile::new(id, points)
}

fn label(start: i64, end: i64, mode: &str) -> LabelInterval {
    LabelInterval::new(ts(start), ts(end), mode)
}

fn write_subject(
    config: &PipelineConfig,
    subject: &str,
    files: &[TrajectoryFile],
    labels: &[LabelInterval],
) {
    write_labels(&config.label_path(subject), labels).unwrap();
    for file in files {
        write_trajectory(&config.trajectory_dir(subject), file).unwrap();
    }
}

fn config_in(root: &Path) -> PipelineConfig {
    PipelineConfig::new(
        root.join("cleaned"),
        root.join("segments"),
        root.join("features"),
    )
}

/// Two files and three labels, giving three segments.
fn commuter(config: &PipelineConfig, subject: &str) {
    write_subject(
        config,
        subject,
        &[
            trajectory("20081023090000", 0..=20),
            trajectory("20081023100000", 3600..=3630),
        ],
        &[
            label(0, 5, "walk"),
            label(10, 20, "bus"),
            label(3600, 3610, "car"),
        ],
    );
}

fn file_names(dir: &Path) -> Vec<String> {
    list_segment_files(dir)
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_run_all_writes_segments_and_features() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    commuter(&config, "010");

    let report = run_pipeline(&config, Stage::All).unwrap();

    assert_eq!(report.total_segments(), 3);
    assert_eq!(report.total_features(), 3);
    assert!(report.failed_subjects().is_empty());

    let expected = vec![
        "010_20081023090000_1_walk.txt",
        "010_20081023090000_2_bus.txt",
        "010_20081023100000_1_car.txt",
    ];
    assert_eq!(file_names(&config.subject_segment_dir("010")), expected);
    assert_eq!(file_names(&config.subject_feature_dir("010")), expected);

    let subject = report.subject("010").unwrap();
    assert_eq!(subject.segmentation.intervals_matched, 3);
    assert_eq!(subject.segments.len(), 3);
    assert_eq!(subject.segments[1].point_count, 11);
    assert!(subject.segments.iter().all(|e| e.total_distance.is_some()));
}

#[test]
fn test_segment_extent_bounds_points() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    commuter(&config, "010");

    let report = segment_subject(&config, "010", false).unwrap();
    let walk = &report.segments[0];

    assert_eq!(walk.segment_id, "010_20081023090000_1_walk");
    assert_eq!(walk.mode, "walk");
    assert_eq!(walk.start_time, Some(ts(0)));
    assert_eq!(walk.end_time, Some(ts(5)));
    assert!((walk.min_lat - 39.98).abs() < 1e-9);
    assert!((walk.max_lat - (39.98 + 5.0 * 2e-5)).abs() < 1e-9);
    assert!((walk.min_lng - 116.31).abs() < 1e-9);
    assert!((walk.max_lng - (116.31 + 5.0 * 1e-5)).abs() < 1e-9);
    assert!(walk.total_distance.is_none());
    assert_eq!(report.features_written, 0);
}

#[test]
fn test_two_stage_run_matches_single_pass() {
    let single = TempDir::new().unwrap();
    let staged = TempDir::new().unwrap();
    let single_config = config_in(single.path());
    let staged_config = config_in(staged.path());
    commuter(&single_config, "010");
    commuter(&staged_config, "010");

    run_pipeline(&single_config, Stage::All).unwrap();
    let segmented = run_pipeline(&staged_config, Stage::Segment).unwrap();
    assert_eq!(segmented.total_features(), 0);
    let featured = run_pipeline(&staged_config, Stage::Features).unwrap();
    assert_eq!(featured.total_features(), 3);

    for name in file_names(&single_config.subject_feature_dir("010")) {
        let a = read_feature_vector(&single_config.subject_feature_dir("010").join(&name)).unwrap();
        let b = read_feature_vector(&staged_config.subject_feature_dir("010").join(&name)).unwrap();
        assert_eq!(a, b, "{name}");
    }
}

#[test]
fn test_failing_subject_does_not_stop_others() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    commuter(&config, "010");

    let broken = config.label_path("011");
    fs::create_dir_all(broken.parent().unwrap()).unwrap();
    fs::write(
        &broken,
        "Start Time\tEnd Time\tTransportation Mode\nnot a time\t2008/10/23 09:00:05\twalk\n",
    )
    .unwrap();

    let report = run_pipeline(&config, Stage::All).unwrap();

    assert_eq!(report.subjects.len(), 2);
    assert!(report.subject("010").unwrap().is_ok());
    let failed = report.failed_subjects();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].subject, "011");
    assert!(failed[0].error.as_deref().unwrap().contains("labels.txt"));
    assert_eq!(report.total_segments(), 3);
}

#[test]
fn test_feature_failure_is_recorded_and_skipped() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_subject(
        &config,
        "020",
        &[trajectory("20081023090000", [0, 1, 1, 2, 3, 10, 11, 12])],
        &[label(0, 3, "walk"), label(10, 12, "bike")],
    );

    let report = run_pipeline(&config, Stage::All).unwrap();
    let subject = report.subject("020").unwrap();

    assert!(subject.is_ok());
    assert_eq!(subject.segments_written, 2);
    assert_eq!(subject.features_written, 1);
    assert_eq!(subject.feature_failures.len(), 1);
    assert_eq!(subject.feature_failures[0].segment_id, "020_20081023090000_1_walk");
    assert!(subject.feature_failures[0].reason.contains("zero elapsed time"));
    assert_eq!(
        file_names(&config.subject_feature_dir("020")),
        vec!["020_20081023090000_2_bike.txt"]
    );
}

#[test]
fn test_annotated_tables_written_when_configured() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.annotated_dir = Some(dir.path().join("annotated"));
    commuter(&config, "010");

    let report = run_pipeline(&config, Stage::All).unwrap();

    assert_eq!(report.subject("010").unwrap().annotated_written, 3);
    let annotated: PathBuf = config.subject_annotated_dir("010").unwrap();
    assert_eq!(file_names(&annotated).len(), 3);
}

#[test]
fn test_report_json_written() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    commuter(&config, "010");

    run_pipeline(&config, Stage::All).unwrap();

    let text = fs::read_to_string(config.segment_dir.join("report_all.json")).unwrap();
    let report: PipelineReport = serde_json::from_str(&text).unwrap();
    assert_eq!(report.stage, Stage::All);
    assert_eq!(report.total_segments(), 3);
    assert_eq!(report.subjects[0].subject, "010");
}

#[test]
fn test_report_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.write_report = false;
    commuter(&config, "010");

    run_pipeline(&config, Stage::Segment).unwrap();
    assert!(!config.segment_dir.join("report_segment.json").exists());
}

#[test]
fn test_subject_filter() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    commuter(&config, "010");
    commuter(&config, "011");
    config.subjects = vec!["011".to_string()];

    let report = run_pipeline(&config, Stage::Segment).unwrap();
    assert_eq!(report.subjects.len(), 1);
    assert_eq!(report.subjects[0].subject, "011");
    assert!(!config.subject_segment_dir("010").exists());
}

#[test]
fn test_features_without_segments_fails_subject_only() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    let result = extract_features_for_subject(&config, "404");
    assert!(result.is_err());
}

#[cfg(feature = "synthetic")]
#[test]
fn test_synthetic_subjects_end_to_end() {
    use trajmode::synthetic::{SyntheticScenario, generate_subjects};

    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let base = SyntheticScenario {
        file_count: 2,
        trips_per_file: 3,
        points_per_trip: (10, 30),
        ..SyntheticScenario::default()
    };
    let subjects = generate_subjects(&base, 3);
    for subject in &subjects {
        subject.write_to(&config).unwrap();
    }

    let report = run_pipeline(&config, Stage::All).unwrap();

    assert_eq!(report.subjects.len(), 3);
    assert!(report.failed_subjects().is_empty());
    for (generated, result) in subjects.iter().zip(&report.subjects) {
        assert_eq!(result.subject, generated.subject);
        assert_eq!(result.segments_written, generated.metadata.trip_count);
        assert_eq!(result.features_written, generated.metadata.trip_count);
    }
}

#[test]
fn test_process_subject_single_pass() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    commuter(&config, "010");

    let report = process_subject(&config, "010").unwrap();

    assert_eq!(report.segments_written, 3);
    assert_eq!(report.features_written, 3);
    assert!(report.feature_failures.is_empty());
    // Running a single subject never writes the batch report
    assert!(!config.segment_dir.join("report_all.json").exists());
}

#[test]
fn test_staged_runs_keep_one_report_per_stage() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    commuter(&config, "010");

    run_pipeline(&config, Stage::Segment).unwrap();
    run_pipeline(&config, Stage::Features).unwrap();

    let read = |name: &str| -> PipelineReport {
        serde_json::from_str(&fs::read_to_string(config.segment_dir.join(name)).unwrap()).unwrap()
    };
    let segmented = read("report_segment.json");
    let featured = read("report_features.json");
    assert_eq!(segmented.stage, Stage::Segment);
    assert_eq!(segmented.total_segments(), 3);
    assert_eq!(featured.stage, Stage::Features);
    assert_eq!(featured.total_features(), 3);
}

#[test]
fn test_unreadable_segment_file_does_not_stop_subject() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    commuter(&config, "010");
    run_pipeline(&config, Stage::Segment).unwrap();
    fs::write(config.subject_segment_dir("010").join("notes.txt"), "not a segment\n").unwrap();

    let report = run_pipeline(&config, Stage::Features).unwrap();
    let subject = report.subject("010").unwrap();

    assert!(subject.is_ok());
    assert_eq!(subject.features_written, 3);
    assert_eq!(subject.feature_failures.len(), 1);
    assert_eq!(subject.feature_failures[0].segment_id, "notes");
    assert_eq!(file_names(&config.subject_feature_dir("010")).len(), 3);
}

#[test]
fn test_mid_run_failure_keeps_written_segments_in_report() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    // The second file starts before the first one ends
    write_subject(
        &config,
        "030",
        &[
            trajectory("20081023090000", 0..=10),
            trajectory("20081023090005", 5..=15),
        ],
        &[label(0, 3, "walk"), label(5, 8, "bus"), label(12, 14, "car")],
    );

    let report = run_pipeline(&config, Stage::All).unwrap();
    let subject = report.subject("030").unwrap();

    assert!(!subject.is_ok());
    assert!(subject.error.as_deref().unwrap().contains("20081023090005"));
    assert_eq!(subject.segments_written, 2);
    assert_eq!(subject.features_written, 2);

    let on_disk = file_names(&config.subject_segment_dir("030"));
    let reported: Vec<String> = subject
        .segments
        .iter()
        .map(|e| format!("{}.txt", e.segment_id))
        .collect();
    assert_eq!(reported, on_disk);
    assert_eq!(report.total_segments(), on_disk.len());
}
