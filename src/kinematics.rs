//! Point-to-point kinematics.
//!
//! Pure functions for the quantities derived from consecutive fixes, and
//! [`KinematicProfile`], which lays them out as per-point columns:
//! - the first point has distance, velocity, acceleration and steering of 0
//! - the last point has bearing and steering of 0
//! - every other value is computed from the neighbouring fixes

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, PrepError, Result};
use crate::TrajectoryPoint;

/// WGS-84 equatorial radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// Decimal places kept for distance, velocity and acceleration.
pub const LINEAR_DECIMALS: i32 = 4;

/// Decimal places kept for bearing and steering angle.
pub const ANGULAR_DECIMALS: i32 = 3;

/// Round to `decimals` places, ties to even.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Seconds from `t1` to `t2`. Zero or negative when the fixes are not strictly ordered.
pub fn elapsed_seconds(t1: NaiveDateTime, t2: NaiveDateTime) -> f64 {
    (t2 - t1).num_milliseconds() as f64 / 1000.0
}

/// Great-circle distance in meters using the haversine formula.
///
/// Uses the equatorial radius rather than the mean radius, so results are
/// about 0.1% longer than most haversine implementations.
///
/// # Example
/// ```
/// use trajmode::haversine_distance;
/// let d = haversine_distance(0.0, 0.0, 0.0, 1.0);
/// assert!((d - 111_319.4908).abs() < 1e-3);
/// ```
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards asin against a hair above 1.0 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    round_to(c * EARTH_RADIUS_METERS, LINEAR_DECIMALS)
}

/// Average velocity in m/s over `dt` seconds. `None` when `dt` is zero.
pub fn velocity(distance: f64, dt: f64) -> Option<f64> {
    if dt == 0.0 {
        return None;
    }
    Some(round_to(distance / dt, LINEAR_DECIMALS))
}

/// Acceleration in m/s² going from `v1` to `v2` over `dt` seconds. `None` when `dt` is zero.
pub fn acceleration(v1: f64, v2: f64, dt: f64) -> Option<f64> {
    if dt == 0.0 {
        return None;
    }
    Some(round_to((v2 - v1) / dt, LINEAR_DECIMALS))
}

/// Forward azimuth from the first fix to the second, degrees clockwise from north in `[0, 360)`.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let x = dlon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let degrees = x.atan2(y).to_degrees();

    let rounded = round_to((degrees + 360.0) % 360.0, ANGULAR_DECIMALS);
    // 359.9996 rounds up to 360.0, which is north again
    if rounded >= 360.0 { 0.0 } else { rounded }
}

/// Change of heading between two legs, in degrees.
///
/// Wraps only when the second bearing is more than 180° clockwise of the
/// first, so `steering_angle(10.0, 350.0)` is 20 while `steering_angle(350.0, 10.0)`
/// is 340. Stored feature statistics depend on this asymmetry.
pub fn steering_angle(bearing1: f64, bearing2: f64) -> f64 {
    let angle = if bearing2 > bearing1 + 180.0 {
        (360.0 + bearing1 - bearing2).abs() % 360.0
    } else {
        (bearing1 - bearing2).abs()
    };
    round_to(angle, ANGULAR_DECIMALS)
}

/// Haversine distance between two fixes.
pub fn point_distance(a: &TrajectoryPoint, b: &TrajectoryPoint) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Bearing from one fix to the next.
pub fn point_bearing(a: &TrajectoryPoint, b: &TrajectoryPoint) -> f64 {
    bearing(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Kinematic values attached to one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointKinematics {
    pub distance: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub bearing: f64,
    pub steering_angle: f64,
}

/// Per-point kinematic columns for a point sequence.
///
/// All columns have the same length as the input sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KinematicProfile {
    pub distance: Vec<f64>,
    pub velocity: Vec<f64>,
    pub acceleration: Vec<f64>,
    pub bearing: Vec<f64>,
    pub steering: Vec<f64>,
}

impl KinematicProfile {
    /// Build the profile for an unnamed point sequence.
    ///
    /// # Errors
    /// - [`PrepError::DegenerateSegment`] for fewer than 2 points
    /// - [`PrepError::ZeroElapsedTime`] when two consecutive points share a timestamp
    /// - [`PrepError::OrderingViolation`] when timestamps go backwards
    pub fn from_points(points: &[TrajectoryPoint]) -> Result<Self> {
        Self::build(points, "unnamed")
    }

    /// Build the profile for a segment, naming it in any error.
    pub fn from_segment(segment: &crate::Segment) -> Result<Self> {
        Self::build(&segment.points, &segment.id())
    }

    fn build(points: &[TrajectoryPoint], segment_id: &str) -> Result<Self> {
        let n = points.len();
        let second = points
            .get(1)
            .ok_or_degenerate(segment_id, n, crate::config::MIN_FEATURE_POINTS)?;

        let mut profile = Self {
            distance: Vec::with_capacity(n),
            velocity: Vec::with_capacity(n),
            acceleration: Vec::with_capacity(n),
            bearing: Vec::with_capacity(n),
            steering: Vec::with_capacity(n),
        };

        profile.distance.push(0.0);
        profile.velocity.push(0.0);
        profile.acceleration.push(0.0);
        profile.bearing.push(point_bearing(&points[0], second));
        profile.steering.push(0.0);

        for i in 1..n {
            let prev = &points[i - 1];
            let curr = &points[i];

            let dt = elapsed_seconds(prev.timestamp, curr.timestamp);
            if dt < 0.0 {
                return Err(PrepError::ordering(
                    segment_id,
                    i,
                    format!(
                        "timestamp {} precedes previous point {}",
                        curr.timestamp, prev.timestamp
                    ),
                ));
            }
            let zero_dt = || PrepError::ZeroElapsedTime {
                index: i,
                timestamp: curr.timestamp,
            };

            let distance = point_distance(prev, curr);
            let v = velocity(distance, dt).ok_or_else(zero_dt)?;
            let a = acceleration(profile.velocity[i - 1], v, dt).ok_or_else(zero_dt)?;

            profile.distance.push(distance);
            profile.velocity.push(v);
            profile.acceleration.push(a);

            if let Some(next) = points.get(i + 1) {
                let b = point_bearing(curr, next);
                let steer = steering_angle(profile.bearing[i - 1], b);
                profile.bearing.push(b);
                profile.steering.push(steer);
            } else {
                profile.bearing.push(0.0);
                profile.steering.push(0.0);
            }
        }

        Ok(profile)
    }

    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }

    /// Sum of the per-point distances in meters.
    pub fn total_distance(&self) -> f64 {
        self.distance.iter().sum()
    }

    /// Values for the point at `index`.
    pub fn row(&self, index: usize) -> Option<PointKinematics> {
        Some(PointKinematics {
            distance: *self.distance.get(index)?,
            velocity: *self.velocity.get(index)?,
            acceleration: *self.acceleration.get(index)?,
            bearing: *self.bearing.get(index)?,
            steering_angle: *self.steering.get(index)?,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = PointKinematics> + '_ {
        (0..self.len()).filter_map(|i| self.row(i))
    }
}
