use std::time::Duration;

use chrono::{DateTime, Utc};
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{error::LocateError, prelude::*};

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

/// Identifier the platform hands out for a running position watch
pub type WatchId = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// A point on the globe in decimal degrees
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and inside the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in meters
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        Haversine::distance(self.as_point(), other.as_point())
    }

    fn as_point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// A position sample as emitted by [crate::PositionTracker]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Instantaneous speed, [None] when the platform couldn't measure it
    pub speed_mps: Option<f64>,
    pub timestamp: UtcDT,
}

impl Position {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

impl From<RawReading> for Position {
    fn from(raw: RawReading) -> Self {
        Self {
            latitude: raw.latitude,
            longitude: raw.longitude,
            // Platforms report -1 (or NaN) when speed isn't known
            speed_mps: raw.speed.filter(|s| s.is_finite() && *s >= 0.0),
            timestamp: raw.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// A reading straight from the platform, before any filtering
pub struct RawReading {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub timestamp: UtcDT,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// Throttling applied to a continuous position watch
pub struct WatchOptions {
    /// Minimum time between two delivered samples
    #[serde(with = "millis")]
    pub min_interval: Duration,
    /// Minimum movement between two delivered samples
    pub min_distance_meters: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            min_distance_meters: 1.0,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionState {
    Granted,
    Denied,
}

/// A running platform watch, readings arrive on `readings` until the watch is cleared
pub struct WatchStream {
    pub id: WatchId,
    pub readings: mpsc::Receiver<RawReading>,
}

/// The device's location service
pub trait LocationService: Send + Sync + 'static {
    /// Ask for foreground location access
    fn request_permission(&self) -> impl Future<Output = Result<PermissionState>> + Send;
    /// Read the position once
    fn current_position(&self) -> impl Future<Output = Result<RawReading>> + Send;
    /// Begin a continuous watch honoring `options`
    fn watch_position(
        &self,
        options: WatchOptions,
    ) -> impl Future<Output = Result<WatchStream>> + Send;
    /// Release a watch started with [LocationService::watch_position]
    fn clear_watch(&self, id: WatchId);
}

pub(crate) fn permission_error(err: anyhow::Error) -> LocateError {
    LocateError::PositionUnavailable(LocateError::describe(
        &err.context("Failed to request location permission"),
    ))
}
