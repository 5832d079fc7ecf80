//! Synthetic Geolife subjects for stress testing and benchmarking.
//!
//! Generates trajectory files made of labelled trips separated by unlabelled
//! stretches, together with the matching label file, so segmentation output
//! is known in advance: every trip becomes exactly one segment.
//!
//! Feature-gated behind `synthetic`, not included in production builds.
//!
//! # Example
//!
//! ```rust
//! use trajmode::synthetic::SyntheticScenario;
//! use trajmode::segmentation::segment_in_memory;
//!
//! let scenario = SyntheticScenario {
//!     file_count: 3,
//!     trips_per_file: 4,
//!     seed: 7,
//!     ..SyntheticScenario::default()
//! };
//!
//! let subject = scenario.generate();
//! assert_eq!(subject.labels.len(), 12);
//!
//! let (segments, _) = segment_in_memory(&subject.subject, &subject.labels, subject.files).unwrap();
//! assert_eq!(segments.len(), 12);
//! ```

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use crate::config::PipelineConfig;
use crate::dataset;
use crate::error::Result;
use crate::{LabelInterval, TrajectoryFile, TrajectoryPoint};

// ============================================================================
// Types
// ============================================================================

/// Scenario configuration for one synthetic subject.
#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    /// Subject id used in segment names.
    pub subject: String,
    /// Latitude all trips wander around.
    pub origin_lat: f64,
    /// Longitude all trips wander around.
    pub origin_lng: f64,
    /// Timestamp of the first point.
    pub start: NaiveDateTime,
    /// Number of trajectory files.
    pub file_count: usize,
    /// Labelled trips per file.
    pub trips_per_file: usize,
    /// Inclusive range of points per trip.
    pub points_per_trip: (usize, usize),
    /// Points recorded between two trips that no label covers.
    pub unlabelled_points: usize,
    /// Travel modes drawn from for each trip.
    pub modes: Vec<String>,
    /// GPS noise standard deviation in meters.
    pub gps_noise_sigma_meters: f64,
    /// RNG seed for deterministic reproduction.
    pub seed: u64,
}

/// Metadata about a generated subject.
#[derive(Debug, Clone, Default)]
pub struct SubjectMetadata {
    /// Points across all files.
    pub total_points: usize,
    /// Points covered by some label.
    pub labelled_points: usize,
    /// Number of labelled trips.
    pub trip_count: usize,
}

/// A generated subject: its trajectory files and label file.
#[derive(Debug, Clone)]
pub struct SyntheticSubject {
    pub subject: String,
    pub labels: Vec<LabelInterval>,
    pub files: Vec<TrajectoryFile>,
    pub metadata: SubjectMetadata,
}

impl Default for SyntheticScenario {
    fn default() -> Self {
        Self {
            subject: "000".to_string(),
            // Haidian, Beijing
            origin_lat: 39.984702,
            origin_lng: 116.318417,
            start: NaiveDate::from_ymd_opt(2008, 10, 23)
                .and_then(|d| d.and_hms_opt(2, 53, 4))
                .unwrap_or_default(),
            file_count: 4,
            trips_per_file: 3,
            points_per_trip: (40, 200),
            unlabelled_points: 10,
            modes: ["walk", "bike", "bus", "car", "subway"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            gps_noise_sigma_meters: 3.0,
            seed: 42,
        }
    }
}

// ============================================================================
// Coordinate Helpers
// ============================================================================

/// Meters per degree of latitude (approximately constant).
const METERS_PER_DEG_LAT: f64 = 111_320.0;

fn meters_to_deg_lat(meters: f64) -> f64 {
    meters / METERS_PER_DEG_LAT
}

fn meters_to_deg_lng(meters: f64, latitude: f64) -> f64 {
    let meters_per_deg_lng = METERS_PER_DEG_LAT * latitude.to_radians().cos();
    if meters_per_deg_lng.abs() < 1e-10 {
        return 0.0;
    }
    meters / meters_per_deg_lng
}

/// Typical speed for a mode in m/s.
fn mode_speed(mode: &str) -> f64 {
    match mode {
        "walk" => 1.4,
        "bike" => 4.5,
        "bus" => 8.0,
        "car" | "taxi" => 12.0,
        "subway" => 15.0,
        "train" => 25.0,
        _ => 5.0,
    }
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

// ============================================================================
// Generation
// ============================================================================

/// Walks a position forward in time, recording noisy fixes.
struct Walker {
    lat: f64,
    lng: f64,
    heading: f64,
    time: NaiveDateTime,
}

impl Walker {
    /// Advance by a 1-5 s step at roughly `speed` m/s and return the recorded fix.
    fn step(&mut self, speed: f64, noise_sigma: f64, rng: &mut StdRng) -> TrajectoryPoint {
        let dt = rng.gen_range(1..=5);
        self.time += Duration::seconds(dt);

        self.heading += rng.gen_range(-0.2..0.2);
        let meters = speed * rng.gen_range(0.6..1.4) * dt as f64;
        self.lat += meters_to_deg_lat(meters * self.heading.sin());
        self.lng += meters_to_deg_lng(meters * self.heading.cos(), self.lat);

        let noise_lat = meters_to_deg_lat(gaussian(rng) * noise_sigma);
        let noise_lng = meters_to_deg_lng(gaussian(rng) * noise_sigma, self.lat);
        TrajectoryPoint::new(
            self.lat + noise_lat,
            self.lng + noise_lng,
            rng.gen_range(100.0..200.0),
            self.time,
        )
    }
}

impl SyntheticScenario {
    /// Generate the subject. The same seed always yields the same data.
    pub fn generate(&self) -> SyntheticSubject {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let (min_points, max_points) = (
            self.points_per_trip.0.max(2),
            self.points_per_trip.1.max(self.points_per_trip.0.max(2)),
        );

        let mut walker = Walker {
            lat: self.origin_lat,
            lng: self.origin_lng,
            heading: rng.gen_range(0.0..2.0 * PI),
            time: self.start,
        };
        let mut labels = Vec::new();
        let mut files = Vec::with_capacity(self.file_count);
        let mut metadata = SubjectMetadata::default();

        for _ in 0..self.file_count {
            // Files start hours apart, so their names sort chronologically
            walker.time += Duration::seconds(rng.gen_range(3_600..10_800));
            let file_id = (walker.time + Duration::seconds(1))
                .format("%Y%m%d%H%M%S")
                .to_string();
            let mut points = Vec::new();

            for _ in 0..self.trips_per_file {
                for _ in 0..self.unlabelled_points {
                    points.push(walker.step(0.5, self.gps_noise_sigma_meters, &mut rng));
                }
                // Keep unlabelled fixes clear of the labels on either side
                walker.time += Duration::seconds(rng.gen_range(30..300));

                let mode = if self.modes.is_empty() {
                    "walk".to_string()
                } else {
                    self.modes[rng.gen_range(0..self.modes.len())].clone()
                };
                let speed = mode_speed(&mode);
                let count = rng.gen_range(min_points..=max_points);

                let first = points.len();
                for _ in 0..count {
                    points.push(walker.step(speed, self.gps_noise_sigma_meters, &mut rng));
                }
                labels.push(LabelInterval::new(
                    points[first].timestamp,
                    points[points.len() - 1].timestamp,
                    mode,
                ));

                walker.time += Duration::seconds(rng.gen_range(30..300));
                metadata.labelled_points += count;
                metadata.trip_count += 1;
            }

            metadata.total_points += points.len();
            files.push(TrajectoryFile::new(file_id, points));
        }

        SyntheticSubject {
            subject: self.subject.clone(),
            labels,
            files,
            metadata,
        }
    }
}

impl SyntheticSubject {
    /// Write the label file and trajectory files into the input layout of `config`.
    pub fn write_to(&self, config: &PipelineConfig) -> Result<()> {
        dataset::write_labels(&config.label_path(&self.subject), &self.labels)?;
        let dir = config.trajectory_dir(&self.subject);
        for file in &self.files {
            dataset::write_trajectory(&dir, file)?;
        }
        Ok(())
    }
}

/// Generate `count` subjects named "000", "001", ... from one base scenario.
pub fn generate_subjects(base: &SyntheticScenario, count: usize) -> Vec<SyntheticSubject> {
    (0..count)
        .map(|i| {
            SyntheticScenario {
                subject: format!("{i:03}"),
                seed: base.seed.wrapping_add(i as u64),
                ..base.clone()
            }
            .generate()
        })
        .collect()
}
