//! Planar angle and tolerance helpers shared by gestures, the person
//! locator and the mode controller.
//!
//! All angles are degrees in (-180, 180].  Functions are pure.

/// Projection plane for a joint-to-joint angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    /// Frontal plane: angle measured from +x toward +y.
    Xy,
    /// Sagittal plane: angle measured from +y toward +z.
    Yz,
}

impl Plane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xy => "xy",
            Self::Yz => "yz",
        }
    }
}

/// Angle of the segment `a -> b` projected onto `plane`.
///
/// Returns `None` when the projected segment has zero length or a
/// coordinate is not finite.
pub fn try_angle_in_plane(a: &[f64; 3], b: &[f64; 3], plane: Plane) -> Option<f64> {
    let (first, second) = match plane {
        Plane::Xy => (b[0] - a[0], b[1] - a[1]),
        Plane::Yz => (b[1] - a[1], b[2] - a[2]),
    };
    atan2_deg(second, first)
}

/// Like [`try_angle_in_plane`] but degenerate segments resolve to `0.0`.
pub fn angle_in_plane(a: &[f64; 3], b: &[f64; 3], plane: Plane) -> f64 {
    try_angle_in_plane(a, b, plane).unwrap_or(0.0)
}

/// Horizontal bearing from the sensor origin to `position`.
///
/// Positive means the point is to the right of the sensor's forward axis.
/// A point on the vertical axis through the sensor has no bearing.
pub fn try_bearing_deg(position: &[f64; 3]) -> Option<f64> {
    atan2_deg(position[0], position[2])
}

/// Bearing with the degenerate case resolved to "straight ahead".
pub fn bearing_deg(position: &[f64; 3]) -> f64 {
    try_bearing_deg(position).unwrap_or(0.0)
}

/// Plain arithmetic distance check.
pub fn within_tolerance(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance
}

/// Distance check on the circle: 179 and -179 are 2 degrees apart.
pub fn within_angular_tolerance(actual: f64, expected: f64, tolerance: f64) -> bool {
    angular_distance(actual, expected) <= tolerance
}

/// Smallest absolute difference between two angles, in [0, 180].
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

fn atan2_deg(y: f64, x: f64) -> Option<f64> {
    if !(x.is_finite() && y.is_finite()) || (x == 0.0 && y == 0.0) {
        return None;
    }
    let deg = y.atan2(x).to_degrees();
    // atan2 yields -180 for (-0.0, negative); fold into (-180, 180].
    Some(if deg <= -180.0 { 180.0 } else { deg })
}
