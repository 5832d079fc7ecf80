//! Statistical feature vectors for classifier input.
//!
//! Each segment is reduced to 33 values:
//!
//! | index  | content                         |
//! |--------|---------------------------------|
//! | 0      | total distance (m)              |
//! | 1..9   | velocity summary                |
//! | 9..17  | acceleration summary            |
//! | 17..25 | bearing summary                 |
//! | 25..33 | steering angle summary          |
//!
//! Every summary block is `[max, p95, p75, p50, p25, mean, variance, range]`.

use crate::error::{OptionExt, Result};
use crate::kinematics::{KinematicProfile, LINEAR_DECIMALS, round_to};
use crate::{Segment, TrajectoryPoint};

/// Statistic names of one summary block, in output order.
pub const SUMMARY_STATS: [&str; ColumnSummary::LEN] =
    ["max", "p95", "p75", "p50", "p25", "mean", "var", "range"];

/// Per-point columns summarised into the vector, in output order.
pub const SUMMARISED_COLUMNS: [&str; 4] = ["velocity", "acceleration", "bearing", "steering"];

/// Number of values in a [`FeatureVector`].
pub const FEATURE_VECTOR_LEN: usize = 1 + SUMMARISED_COLUMNS.len() * ColumnSummary::LEN;

/// Fixed statistical summary of one per-point column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSummary {
    pub max: f64,
    pub p95: f64,
    pub p75: f64,
    pub p50: f64,
    pub p25: f64,
    pub mean: f64,
    /// Sample variance (n - 1 denominator)
    pub variance: f64,
    /// max - min
    pub range: f64,
}

impl ColumnSummary {
    pub const LEN: usize = 8;

    /// Summarise a column. `None` for fewer than 2 values, where sample variance is undefined.
    pub fn of(column: &[f64]) -> Option<Self> {
        if column.len() < 2 {
            return None;
        }

        let mut sorted = column.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len() as f64;
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

        let r = |v: f64| round_to(v, LINEAR_DECIMALS);
        Some(Self {
            max: r(max),
            p95: r(quantile(&sorted, 0.95)),
            p75: r(quantile(&sorted, 0.75)),
            p50: r(quantile(&sorted, 0.50)),
            p25: r(quantile(&sorted, 0.25)),
            mean: r(mean),
            variance: r(variance),
            range: r(max - min),
        })
    }

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [
            self.max,
            self.p95,
            self.p75,
            self.p50,
            self.p25,
            self.mean,
            self.variance,
            self.range,
        ]
    }
}

/// Quantile of an ascending slice, interpolating linearly between the closest ranks.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let position = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

/// The 33-value feature vector of one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_VECTOR_LEN],
}

impl FeatureVector {
    pub const LEN: usize = FEATURE_VECTOR_LEN;

    /// Assemble the vector from a kinematic profile.
    pub fn from_profile(profile: &KinematicProfile) -> Result<Self> {
        Self::assemble(profile, "unnamed")
    }

    fn assemble(profile: &KinematicProfile, segment_id: &str) -> Result<Self> {
        let columns = [
            &profile.velocity,
            &profile.acceleration,
            &profile.bearing,
            &profile.steering,
        ];

        let mut values = [0.0; Self::LEN];
        values[0] = profile.total_distance();

        for (block, column) in columns.into_iter().enumerate() {
            let summary = ColumnSummary::of(column).ok_or_degenerate(
                segment_id,
                column.len(),
                crate::config::MIN_FEATURE_POINTS,
            )?;
            let offset = 1 + block * ColumnSummary::LEN;
            values[offset..offset + ColumnSummary::LEN].copy_from_slice(&summary.to_array());
        }

        Ok(Self { values })
    }

    /// Rebuild a vector from stored values. `None` unless exactly 33 values are given.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let values: [f64; Self::LEN] = values.try_into().ok()?;
        Some(Self { values })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn total_distance(&self) -> f64 {
        self.values[0]
    }

    /// Summary block for one of [`SUMMARISED_COLUMNS`].
    pub fn summary(&self, column: &str) -> Option<ColumnSummary> {
        let block = SUMMARISED_COLUMNS.iter().position(|c| *c == column)?;
        let v = &self.values[1 + block * ColumnSummary::LEN..][..ColumnSummary::LEN];
        Some(ColumnSummary {
            max: v[0],
            p95: v[1],
            p75: v[2],
            p50: v[3],
            p25: v[4],
            mean: v[5],
            variance: v[6],
            range: v[7],
        })
    }

    /// Column names matching [`as_slice`](Self::as_slice), e.g. `velocity_p95`.
    pub fn column_names() -> Vec<String> {
        let mut names = Vec::with_capacity(Self::LEN);
        names.push("distance_total".to_string());
        for column in SUMMARISED_COLUMNS {
            for stat in SUMMARY_STATS {
                names.push(format!("{column}_{stat}"));
            }
        }
        names
    }
}

/// Compute the feature vector for a point sequence.
///
/// # Errors
/// Fails for fewer than 2 points, repeated timestamps, or timestamps going backwards.
pub fn extract_feature_vector(points: &[TrajectoryPoint]) -> Result<FeatureVector> {
    let profile = KinematicProfile::from_points(points)?;
    FeatureVector::from_profile(&profile)
}

/// Compute the profile and feature vector for a segment, naming it in any error.
pub fn extract_segment_features(segment: &Segment) -> Result<(KinematicProfile, FeatureVector)> {
    let profile = KinematicProfile::from_segment(segment)?;
    let features = FeatureVector::assemble(&profile, &segment.id())?;
    Ok((profile, features))
}
