//! # Check-in Distance Gate
//!
//! A check-in counts only when the device is close to the place it checks
//! in to. Distance is great-circle (haversine) on a sphere of the mean
//! Earth radius; at 20 m the error against the ellipsoid is far below GPS
//! noise.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{EARTH_RADIUS_M, MAX_CHECKIN_DISTANCE_M};
use crate::recovery::Recovery;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CheckInError {
    /// The device is farther from the target than the threshold.
    #[error("too far from check-in point: {distance_m:.1} m (max {max_m} m)")]
    TooFar { distance_m: f64, max_m: f64 },

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

impl CheckInError {
    pub fn recovery(&self) -> Recovery {
        match self {
            // The user can walk closer.
            CheckInError::TooFar { .. } => Recovery::Retry,
            CheckInError::InvalidCoordinates(_) => Recovery::DoNotRetry,
        }
    }
}

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CheckInError> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    fn validate(&self) -> Result<(), CheckInError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CheckInError::InvalidCoordinates(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CheckInError::InvalidCoordinates(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Great-circle distance to `other`, in meters.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        haversine_m(self, other)
    }
}

/// Haversine distance in meters.
pub fn haversine_m(a: &Coordinates, b: &Coordinates) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points.
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Admits check-ins within a fixed radius of the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckInGate {
    max_distance_m: f64,
}

impl Default for CheckInGate {
    fn default() -> Self {
        Self {
            max_distance_m: MAX_CHECKIN_DISTANCE_M,
        }
    }
}

impl CheckInGate {
    pub fn with_radius(max_distance_m: f64) -> Self {
        Self { max_distance_m }
    }

    pub fn max_distance_m(&self) -> f64 {
        self.max_distance_m
    }

    /// Distance from `device` to `target` if within the radius.
    ///
    /// The boundary is inclusive: exactly at the radius passes.
    pub fn check(&self, device: &Coordinates, target: &Coordinates) -> Result<f64, CheckInError> {
        device.validate()?;
        target.validate()?;
        let distance_m = haversine_m(device, target);
        if distance_m > self.max_distance_m {
            tracing::debug!(distance_m, max_m = self.max_distance_m, "check-in refused");
            return Err(CheckInError::TooFar {
                distance_m,
                max_m: self.max_distance_m,
            });
        }
        Ok(distance_m)
    }
}
