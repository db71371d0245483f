use serde::{Deserialize, Serialize};

/// Dimensionality of identity embeddings produced by the external encoder.
pub const EMBEDDING_DIM: usize = 128;

/// A point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Face bounding region in (top, right, bottom, left) pixel order,
/// matching the detector contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Region {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Centre of the bounding box.
    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) as f32 / 2.0,
            (self.top + self.bottom) as f32 / 2.0,
        )
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Six contour points per eye in the canonical p1..p6 order expected by
/// the eye-aspect-ratio formula: p1/p4 are the horizontal corners,
/// p2/p6 and p3/p5 the upper/lower lid pairs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
}

/// Detector output for a single face in a single frame, as delivered by
/// the external capture driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameObservation {
    pub region: Region,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub landmarks: Option<EyeLandmarks>,
}

/// Attendance action. Strictly alternating per employee, starting with
/// punch-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    PunchIn,
    PunchOut,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::PunchIn => "punch-in",
            Action::PunchOut => "punch-out",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        match s {
            "punch-in" => Some(Action::PunchIn),
            "punch-out" => Some(Action::PunchOut),
            _ => None,
        }
    }

    /// The action that follows this one under strict alternation.
    pub fn opposite(&self) -> Action {
        match self {
            Action::PunchIn => Action::PunchOut,
            Action::PunchOut => Action::PunchIn,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_center() {
        let r = Region::new(10, 110, 90, 30);
        let c = r.center();
        assert_eq!(c.x, 70.0);
        assert_eq!(c.y, 50.0);
    }

    #[test]
    fn point_distance_is_euclidean() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn action_roundtrip() {
        assert_eq!(Action::parse("punch-in"), Some(Action::PunchIn));
        assert_eq!(Action::parse("punch-out"), Some(Action::PunchOut));
        assert_eq!(Action::parse("lunch"), None);
        assert_eq!(Action::PunchIn.opposite(), Action::PunchOut);
        assert_eq!(Action::PunchOut.opposite(), Action::PunchIn);
    }
}
