//! Obstacle zones — left / center / right thirds of the frame.

use crate::types::DetectedObject;
use serde::Serialize;
use std::fmt;

/// Horizontal region of the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Zone {
    Left,
    Center,
    Right,
}

impl Zone {
    /// Zone for a horizontal pixel position.
    ///
    /// Boundaries use integer thirds of the frame width. A position exactly on
    /// either boundary belongs to the center.
    pub fn for_center_x(center_x: i64, frame_width: u32) -> Zone {
        let third = i64::from(frame_width / 3);
        let two_thirds = i64::from(2 * frame_width / 3);

        if center_x < third {
            Zone::Left
        } else if center_x > two_thirds {
            Zone::Right
        } else {
            Zone::Center
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Zone::Left => "left",
            Zone::Center => "center",
            Zone::Right => "right",
        })
    }
}

/// Objects seen in one zone during a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ZoneSummary {
    pub count: usize,
    /// Distinct labels, in the order first seen.
    pub labels: Vec<String>,
}

impl ZoneSummary {
    fn record(&mut self, label: &str) {
        self.count += 1;
        if !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Labels joined for speech, e.g. `"chair, door"`.
    pub fn spoken_labels(&self) -> String {
        self.labels.join(", ")
    }
}

/// Per-zone aggregation of one cycle's detections. Rebuilt every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ZoneTally {
    pub left: ZoneSummary,
    pub center: ZoneSummary,
    pub right: ZoneSummary,
}

impl ZoneTally {
    /// Assign every object to a zone by its horizontal center.
    pub fn classify(objects: &[DetectedObject], frame_width: u32) -> Self {
        let mut tally = ZoneTally::default();
        for obj in objects {
            let zone = Zone::for_center_x(obj.center_x(), frame_width);
            tally.zone_mut(zone).record(&obj.label);
        }
        tally
    }

    pub fn zone(&self, zone: Zone) -> &ZoneSummary {
        match zone {
            Zone::Left => &self.left,
            Zone::Center => &self.center,
            Zone::Right => &self.right,
        }
    }

    fn zone_mut(&mut self, zone: Zone) -> &mut ZoneSummary {
        match zone {
            Zone::Left => &mut self.left,
            Zone::Center => &mut self.center,
            Zone::Right => &mut self.right,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.center.is_empty() && self.right.is_empty()
    }
}
