use serde::{Deserialize, Serialize};
use std::fmt;

/// Canvas the reference pipeline resized both images to.
pub const DEFAULT_CANVAS_SIDE: f64 = 750.0;

/// A landmark position normalized to [0, 1] within its face box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A face region normalized to [0, 1] relative to the full image extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Intersection-over-Union with another box in the same frame.
    pub fn iou(&self, other: &NormalizedBox) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.width * self.height + other.width * other.height - inter;

        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// A face box expressed in canvas units. Produced by [`crate::map_box`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsoluteBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A landmark position in canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsolutePoint {
    pub x: f64,
    pub y: f64,
}

impl AbsolutePoint {
    /// Replays a stored canvas point. Normal code obtains points from
    /// [`crate::map_points`].
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &AbsolutePoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Ordered landmarks of one face. Index `i` names the same anatomical
/// landmark in every set produced by the same backend.
pub type LandmarkSet = Vec<NormalizedPoint>;

/// The absolute coordinate space both faces are mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self::new(DEFAULT_CANVAS_SIDE, DEFAULT_CANVAS_SIDE)
    }
}

impl fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One of the two comparator holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Reference,
    Candidate,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Reference => f.write_str("reference"),
            Slot::Candidate => f.write_str("candidate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Same,
    Different,
}

/// Outcome of scoring a reference point set against a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Mean per-landmark Euclidean distance, in canvas units.
    pub mean_distance: f64,
    pub classification: Classification,
    /// Threshold the mean distance was classified against.
    pub threshold: f64,
    pub point_count: usize,
}

impl ComparisonResult {
    pub fn is_same(&self) -> bool {
        self.classification == Classification::Same
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_point_distance() {
        let a = AbsolutePoint::new(0.0, 0.0);
        let b = AbsolutePoint::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert!((b.distance(&a) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_iou_identical() {
        let a = NormalizedBox::new(0.1, 0.1, 0.5, 0.5);
        assert!((a.iou(&a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_iou_partial() {
        let a = NormalizedBox::new(0.0, 0.0, 0.2, 0.2);
        let b = NormalizedBox::new(0.1, 0.0, 0.2, 0.2);
        // Overlap: 0.1x0.2 = 0.02, union: 0.04+0.04-0.02 = 0.06
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_degenerate() {
        let a = NormalizedBox::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn test_canvas_validity() {
        assert!(CanvasSize::default().is_valid());
        assert!(!CanvasSize::new(0.0, 750.0).is_valid());
        assert!(!CanvasSize::new(750.0, f64::NAN).is_valid());
    }

    #[test]
    fn test_result_serializes_lowercase() {
        let r = ComparisonResult {
            mean_distance: 0.5,
            classification: Classification::Different,
            threshold: 0.13,
            point_count: 1,
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"classification\":\"different\""), "{json}");
        assert_eq!(Slot::Reference.to_string(), "reference");
    }
}
