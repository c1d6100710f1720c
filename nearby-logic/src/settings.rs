use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::LocateError,
    location::{Coordinate, WatchOptions},
    query::{CategoryTag, default_categories},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Tunables for an [crate::Explorer] session, anything left out takes its default
pub struct ExplorerSettings {
    /// Throttling for the live position watch
    pub tracking: WatchOptions,
    /// Search radius around the discovery center
    pub radius_meters: u32,
    /// Which kinds of places to look for
    pub categories: BTreeSet<CategoryTag>,
    /// How far the live position has to move before places are refreshed
    pub rediscover_distance_meters: f64,
    /// Retry a discovery cycle once if the network call fails
    pub retry_discovery: bool,
    /// Number of samples averaged into the displayed speed, 1 shows the raw value
    pub speed_window: usize,
    /// Where the map starts before the first fix arrives
    pub fallback_center: Coordinate,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            tracking: WatchOptions::default(),
            radius_meters: 1000,
            categories: default_categories(),
            rediscover_distance_meters: 100.0,
            retry_discovery: true,
            speed_window: 1,
            fallback_center: Coordinate::new(37.78825, -122.4324),
        }
    }
}

impl ExplorerSettings {
    /// Reject values that would stall or flood live discovery
    pub fn validate(&self) -> Result<(), LocateError> {
        let distance = self.rediscover_distance_meters;
        if !distance.is_finite() || distance < 0.0 {
            return Err(LocateError::invalid(format!(
                "Rediscover distance must be zero or more meters, got {distance}"
            )));
        }
        let min_distance = self.tracking.min_distance_meters;
        if !min_distance.is_finite() || min_distance < 0.0 {
            return Err(LocateError::invalid(format!(
                "Tracking distance must be zero or more meters, got {min_distance}"
            )));
        }
        if self.radius_meters == 0 {
            return Err(LocateError::invalid("Radius must be positive, got 0"));
        }
        if !self.fallback_center.is_valid() {
            return Err(LocateError::invalid(format!(
                "Fallback center ({}, {}) is not a valid coordinate",
                self.fallback_center.latitude, self.fallback_center.longitude
            )));
        }
        Ok(())
    }
}
