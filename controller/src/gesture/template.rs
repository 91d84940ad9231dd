//! Geometric pose templates: a fixed list of joint-angle checks that must
//! all hold for the pose to match.

use crate::geometry::{try_angle_in_plane, within_angular_tolerance, within_tolerance, Plane};
use crate::skeleton::{JointKind, SkeletonFrame};

/// How a sampled angle is compared with its expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Bare joint angle: plain arithmetic difference.
    Joint,
    /// Limb orientation relative to a body plane: wraps at ±180.
    Plane,
}

/// One angle constraint of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleCheck {
    /// Segment start joint.
    pub from: JointKind,
    /// Segment end joint.
    pub to: JointKind,
    /// Plane the segment is projected onto.
    pub plane: Plane,
    /// Expected angle in degrees.
    pub expected_deg: f64,
    /// Maximum accepted deviation in degrees (inclusive).
    pub tolerance_deg: f64,
    pub comparison: Comparison,
}

impl AngleCheck {
    pub fn joint(from: JointKind, to: JointKind, expected_deg: f64, tolerance_deg: f64) -> Self {
        Self {
            from,
            to,
            plane: Plane::Xy,
            expected_deg,
            tolerance_deg,
            comparison: Comparison::Joint,
        }
    }

    pub fn plane(from: JointKind, to: JointKind, expected_deg: f64, tolerance_deg: f64) -> Self {
        Self {
            from,
            to,
            plane: Plane::Yz,
            expected_deg,
            tolerance_deg,
            comparison: Comparison::Plane,
        }
    }

    /// Sample the angle for this check.  `None` for a degenerate segment.
    pub fn sample(&self, frame: &SkeletonFrame) -> Option<f64> {
        try_angle_in_plane(frame.joint(self.from), frame.joint(self.to), self.plane)
    }

    /// Whether the frame satisfies this check.  Degenerate segments fail.
    pub fn passes(&self, frame: &SkeletonFrame) -> bool {
        let Some(actual) = self.sample(frame) else {
            return false;
        };
        match self.comparison {
            Comparison::Joint => within_tolerance(actual, self.expected_deg, self.tolerance_deg),
            Comparison::Plane => {
                within_angular_tolerance(actual, self.expected_deg, self.tolerance_deg)
            }
        }
    }
}

/// An immutable recognisable pose.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureTemplate {
    name: String,
    checks: Vec<AngleCheck>,
}

impl GestureTemplate {
    pub fn new(name: impl Into<String>, checks: Vec<AngleCheck>) -> Self {
        Self {
            name: name.into(),
            checks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All checks pass.  An empty template never matches.
    pub fn matches(&self, frame: &SkeletonFrame) -> bool {
        !self.checks.is_empty() && self.checks.iter().all(|c| c.passes(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{make_frame, set_joint};

    #[test]
    fn test_joint_check_no_wraparound() {
        let mut frame = make_frame(0.0, 2000.0);
        // Forearm pointing left and slightly up: +175 degrees.
        set_joint(&mut frame, JointKind::ElbowLeft, 0.0, 0.0, 2000.0);
        set_joint(&mut frame, JointKind::WristLeft, -100.0, 8.75, 2000.0);
        let check = AngleCheck::joint(JointKind::ElbowLeft, JointKind::WristLeft, -180.0, 30.0);
        assert!(!check.passes(&frame));

        let wrapped = AngleCheck {
            comparison: Comparison::Plane,
            plane: Plane::Xy,
            ..check
        };
        assert!(wrapped.passes(&frame));
    }

    #[test]
    fn test_degenerate_segment_fails() {
        let frame = SkeletonFrame::new([0.0, 0.0, 2000.0]);
        let check = AngleCheck::plane(JointKind::ElbowRight, JointKind::WristRight, 0.0, 180.0);
        assert_eq!(check.sample(&frame), None);
        assert!(!check.passes(&frame));
    }

    #[test]
    fn test_empty_template_never_matches() {
        let template = GestureTemplate::new("nothing", Vec::new());
        assert!(!template.matches(&make_frame(0.0, 2000.0)));
    }

    #[test]
    fn test_all_checks_must_pass() {
        let frame = make_frame(0.0, 2000.0);
        let down = AngleCheck::joint(JointKind::ElbowRight, JointKind::WristRight, -90.0, 10.0);
        let up = AngleCheck::joint(JointKind::ElbowLeft, JointKind::WristLeft, 90.0, 10.0);
        assert!(GestureTemplate::new("down", vec![down.clone()]).matches(&frame));
        assert!(!GestureTemplate::new("mixed", vec![down, up]).matches(&frame));
    }
}
