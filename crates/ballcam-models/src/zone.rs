//! Exit zones in normalized frame coordinates and their routing targets.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::CameraId;

/// Axis-aligned rectangle in normalized coordinates, `x1 < x2`, `y1 < y2`,
/// all within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Errors raised while constructing zones.
#[derive(Debug, Error, PartialEq)]
pub enum ZoneError {
    #[error("degenerate zone: ({0}, {1}, {2}, {3})")]
    Degenerate(f64, f64, f64, f64),

    #[error("zone outside [0,1]: ({0}, {1}, {2}, {3})")]
    OutOfRange(f64, f64, f64, f64),
}

impl Zone {
    /// Create a validated zone.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, ZoneError> {
        if x1 >= x2 || y1 >= y2 {
            return Err(ZoneError::Degenerate(x1, y1, x2, y2));
        }
        if !(0.0..=1.0).contains(&x1)
            || !(0.0..=1.0).contains(&y1)
            || !(0.0..=1.0).contains(&x2)
            || !(0.0..=1.0).contains(&y2)
        {
            return Err(ZoneError::OutOfRange(x1, y1, x2, y2));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Does the zone contain the normalized point?
    pub fn contains(&self, nx: f64, ny: f64) -> bool {
        nx >= self.x1 && nx <= self.x2 && ny >= self.y1 && ny <= self.y2
    }

    /// Zone area in normalized units.
    pub fn area(&self) -> f64 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// Euclidean distance from a normalized point to the zone rectangle
    /// (zero inside).
    pub fn distance_to(&self, nx: f64, ny: f64) -> f64 {
        let dx = (self.x1 - nx).max(0.0).max(nx - self.x2);
        let dy = (self.y1 - ny).max(0.0).max(ny - self.y2);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Label of an exit zone. Closed set so decision handling stays
/// exhaustive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneLabel {
    Left,
    Right,
    LeftTop,
    LeftBottom,
    RightTop,
    RightBottom,
    Top,
    Bottom,
    /// Central tie-break zone on MIDDLE cameras.
    Equal,
}

impl ZoneLabel {
    /// Horizontal side of the zone: -1 for left-leaning, +1 for
    /// right-leaning, 0 for zones with no horizontal exit direction.
    pub fn horizontal_side(&self) -> i8 {
        match self {
            ZoneLabel::Left | ZoneLabel::LeftTop | ZoneLabel::LeftBottom => -1,
            ZoneLabel::Right | ZoneLabel::RightTop | ZoneLabel::RightBottom => 1,
            ZoneLabel::Top | ZoneLabel::Bottom | ZoneLabel::Equal => 0,
        }
    }

    /// Whether the zone exits through the top or bottom edge.
    pub fn is_vertical(&self) -> bool {
        matches!(self, ZoneLabel::Top | ZoneLabel::Bottom)
    }
}

impl fmt::Display for ZoneLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZoneLabel::Left => "LEFT",
            ZoneLabel::Right => "RIGHT",
            ZoneLabel::LeftTop => "LEFT_TOP",
            ZoneLabel::LeftBottom => "LEFT_BOTTOM",
            ZoneLabel::RightTop => "RIGHT_TOP",
            ZoneLabel::RightBottom => "RIGHT_BOTTOM",
            ZoneLabel::Top => "TOP",
            ZoneLabel::Bottom => "BOTTOM",
            ZoneLabel::Equal => "EQUAL",
        };
        write!(f, "{}", s)
    }
}

/// Where a zone routes when the ball occupies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    /// Always switch to this camera.
    Fixed(CameraId),
    /// Route by sign of horizontal velocity: `vx < 0` goes to `neg`,
    /// otherwise to `pos`.
    ByVelocitySign { neg: CameraId, pos: CameraId },
}

impl RouteTarget {
    /// Resolve the target camera given the current horizontal velocity.
    pub fn resolve(&self, vx: f64) -> CameraId {
        match self {
            RouteTarget::Fixed(id) => *id,
            RouteTarget::ByVelocitySign { neg, pos } => {
                if vx < 0.0 {
                    *neg
                } else {
                    *pos
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_validation() {
        assert!(Zone::new(0.85, 0.0, 1.0, 1.0).is_ok());
        assert!(Zone::new(0.9, 0.0, 0.9, 1.0).is_err());
        assert!(Zone::new(0.5, 0.0, 1.2, 1.0).is_err());
    }

    #[test]
    fn test_zone_contains() {
        let z = Zone::new(0.85, 0.0, 1.0, 1.0).unwrap();
        assert!(z.contains(0.9, 0.5));
        assert!(!z.contains(0.5, 0.5));
        // Boundary points count as inside
        assert!(z.contains(0.85, 0.0));
    }

    #[test]
    fn test_zone_distance() {
        let z = Zone::new(0.85, 0.0, 1.0, 1.0).unwrap();
        assert_eq!(z.distance_to(0.9, 0.5), 0.0);
        assert!((z.distance_to(0.80, 0.5) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_horizontal_side() {
        assert_eq!(ZoneLabel::RightTop.horizontal_side(), 1);
        assert_eq!(ZoneLabel::LeftBottom.horizontal_side(), -1);
        assert_eq!(ZoneLabel::Top.horizontal_side(), 0);
        assert_eq!(ZoneLabel::Equal.horizontal_side(), 0);
    }

    #[test]
    fn test_route_resolve() {
        let route = RouteTarget::ByVelocitySign {
            neg: CameraId(0),
            pos: CameraId(2),
        };
        assert_eq!(route.resolve(-0.01), CameraId(0));
        assert_eq!(route.resolve(0.0), CameraId(2));
        assert_eq!(RouteTarget::Fixed(CameraId(1)).resolve(-1.0), CameraId(1));
    }
}
