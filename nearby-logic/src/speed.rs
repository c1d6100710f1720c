use std::{collections::VecDeque, fmt};

use serde::{Deserialize, Serialize};

use crate::location::Position;

const MPS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
/// Speed ready to be shown to the user
pub struct DisplaySpeed {
    pub km_per_hour: f64,
}

impl fmt::Display for DisplaySpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} km/h", self.km_per_hour)
    }
}

/// Convert the instantaneous speed of a sample, absent speed shows as 0
pub fn estimate(position: &Position) -> DisplaySpeed {
    let kmh = position.speed_mps.unwrap_or(0.0) * MPS_TO_KMH;
    DisplaySpeed {
        km_per_hour: if kmh.is_finite() { kmh.max(0.0) } else { 0.0 },
    }
}

/// Averages [estimate] over the last `capacity` samples.
///
/// With a capacity of 1 this is exactly [estimate]. The window never grows past its
/// capacity so the displayed value trails the real one by at most `capacity` samples.
#[derive(Debug, Clone)]
pub struct SpeedWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl SpeedWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, position: &Position) -> DisplaySpeed {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(estimate(position).km_per_hour);
        self.current()
    }

    pub fn current(&self) -> DisplaySpeed {
        if self.samples.is_empty() {
            return DisplaySpeed::default();
        }
        let sum = self.samples.iter().sum::<f64>();
        DisplaySpeed {
            km_per_hour: sum / self.samples.len() as f64,
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn pos(speed_mps: Option<f64>) -> Position {
        Position {
            latitude: 0.0,
            longitude: 0.0,
            speed_mps,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_estimate() {
        assert_eq!(estimate(&pos(None)).km_per_hour, 0.0);
        assert_eq!(estimate(&pos(Some(0.0))).km_per_hour, 0.0);
        assert!((estimate(&pos(Some(10.0))).km_per_hour - 36.0).abs() < 1e-9);
        // Negative should never reach here, but still never shows below zero
        assert_eq!(estimate(&pos(Some(-3.0))).km_per_hour, 0.0);
    }

    #[test]
    fn test_estimate_never_negative() {
        for raw in [None, Some(0.0), Some(0.5), Some(2.0), Some(33.3), Some(-1.0)] {
            let speed = estimate(&pos(raw));
            assert!(speed.km_per_hour >= 0.0, "{raw:?} gave {speed:?}");
            if let Some(raw) = raw.filter(|r| *r >= 0.0) {
                assert!((speed.km_per_hour - raw * 3.6).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_display() {
        let speed = estimate(&pos(Some(1.95)));
        assert_eq!(speed.to_string(), "7 km/h");
    }

    #[test]
    fn test_window_is_bounded() {
        let mut window = SpeedWindow::new(2);
        window.push(&pos(Some(10.0)));
        window.push(&pos(Some(20.0)));
        let speed = window.push(&pos(Some(30.0)));
        // Only 20 and 30 m/s remain
        assert!((speed.km_per_hour - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_of_one_matches_estimate() {
        let mut window = SpeedWindow::new(0);
        window.push(&pos(Some(5.0)));
        let speed = window.push(&pos(None));
        assert_eq!(speed, estimate(&pos(None)));
    }
}
