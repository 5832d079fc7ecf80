//! Tests for error module

use chrono::NaiveDate;
use trajmode::error::{OptionExt, PrepError};

#[test]
fn test_error_display() {
    let err = PrepError::DegenerateSegment {
        segment_id: "010_20081023025304_1_walk".to_string(),
        point_count: 1,
        minimum_required: 2,
    };
    assert!(err.to_string().contains("010_20081023025304_1_walk"));
    assert!(err.to_string().contains("1 points"));
}

#[test]
fn test_zero_elapsed_time_names_both_points() {
    let err = PrepError::ZeroElapsedTime {
        index: 4,
        timestamp: NaiveDate::from_ymd_opt(2008, 10, 23)
            .unwrap()
            .and_hms_opt(2, 53, 4)
            .unwrap(),
    };
    let message = err.to_string();
    assert!(message.contains("points 3 and 4"));
    assert!(message.contains("2008-10-23 02:53:04"));
}

#[test]
fn test_io_error_keeps_source() {
    use std::error::Error;

    let err = PrepError::Io {
        path: "data/010/labels.txt".into(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
    };
    assert!(err.to_string().contains("data/010/labels.txt"));
    assert!(err.source().is_some());
}

#[test]
fn test_option_ext() {
    let none: Option<i32> = None;
    let result = none.ok_or_degenerate("test", 0, 2);
    assert!(matches!(
        result,
        Err(PrepError::DegenerateSegment {
            point_count: 0,
            minimum_required: 2,
            ..
        })
    ));
    assert_eq!(Some(7).ok_or_degenerate("test", 1, 2).unwrap(), 7);
}
