//! Built-in pose templates.

use super::template::{AngleCheck, GestureTemplate};
use crate::skeleton::JointKind::*;

pub const LEFT_ARM_OUT_RIGHT_ARM_UP: &str = "left-arm-out-right-arm-up";
pub const UP_UP: &str = "up-up";
pub const RIGHT_ARM_UP: &str = "right-arm-up";

const JOINT_TOLERANCE_DEG: f64 = 30.0;
const PLANE_TOLERANCE_DEG: f64 = 45.0;

/// Left arm straight out to the side, right arm straight up.
pub fn left_arm_out_right_arm_up() -> GestureTemplate {
    GestureTemplate::new(
        LEFT_ARM_OUT_RIGHT_ARM_UP,
        vec![
            AngleCheck::joint(ElbowLeft, WristLeft, -180.0, JOINT_TOLERANCE_DEG),
            AngleCheck::joint(ShoulderLeft, ElbowLeft, -180.0, JOINT_TOLERANCE_DEG),
            AngleCheck::joint(ElbowRight, WristRight, 90.0, JOINT_TOLERANCE_DEG),
            AngleCheck::joint(ShoulderRight, ElbowRight, 90.0, JOINT_TOLERANCE_DEG),
            AngleCheck::plane(ElbowLeft, WristLeft, 90.0, PLANE_TOLERANCE_DEG),
            AngleCheck::plane(ElbowRight, WristRight, 0.0, PLANE_TOLERANCE_DEG),
            AngleCheck::plane(ShoulderRight, ElbowRight, 0.0, PLANE_TOLERANCE_DEG),
        ],
    )
}

/// Both arms straight up.
pub fn up_up() -> GestureTemplate {
    GestureTemplate::new(
        UP_UP,
        vec![
            AngleCheck::joint(ElbowLeft, WristLeft, 90.0, JOINT_TOLERANCE_DEG),
            AngleCheck::joint(ShoulderLeft, ElbowLeft, 90.0, JOINT_TOLERANCE_DEG),
            AngleCheck::joint(ElbowRight, WristRight, 90.0, JOINT_TOLERANCE_DEG),
            AngleCheck::joint(ShoulderRight, ElbowRight, 90.0, JOINT_TOLERANCE_DEG),
            AngleCheck::plane(ElbowLeft, WristLeft, 0.0, PLANE_TOLERANCE_DEG),
            AngleCheck::plane(ElbowRight, WristRight, 0.0, PLANE_TOLERANCE_DEG),
        ],
    )
}

/// Right arm straight up, left arm unconstrained.
pub fn right_arm_up() -> GestureTemplate {
    GestureTemplate::new(
        RIGHT_ARM_UP,
        vec![
            AngleCheck::joint(ElbowRight, WristRight, 90.0, JOINT_TOLERANCE_DEG),
            AngleCheck::joint(ShoulderRight, ElbowRight, 90.0, JOINT_TOLERANCE_DEG),
        ],
    )
}

/// Every built-in template, in registration order.
pub fn all() -> Vec<GestureTemplate> {
    vec![left_arm_out_right_arm_up(), up_up(), right_arm_up()]
}


#[cfg(test)]
mod tests {
    use super::poses::*;
    use super::*;
    use crate::skeleton::make_frame;

    #[test]
    fn test_left_out_right_up_matches() {
        let template = left_arm_out_right_arm_up();
        assert!(template.matches(&left_out_right_up(0.0, 2000.0)));
        assert!(!template.matches(&make_frame(0.0, 2000.0)));
        assert!(!template.matches(&both_up(0.0, 2000.0)));
    }

    #[test]
    fn test_up_up_matches() {
        let template = up_up();
        assert!(template.matches(&both_up(300.0, 1800.0)));
        assert!(!template.matches(&left_out_right_up(300.0, 1800.0)));
        assert!(!template.matches(&make_frame(300.0, 1800.0)));
    }

    #[test]
    fn test_right_arm_up_is_single_limb() {
        let template = right_arm_up();
        assert!(template.matches(&both_up(0.0, 2000.0)));
        assert!(template.matches(&left_out_right_up(0.0, 2000.0)));
        assert!(!template.matches(&make_frame(0.0, 2000.0)));
    }

    #[test]
    fn test_builtin_names() {
        let names: Vec<String> = all().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec![LEFT_ARM_OUT_RIGHT_ARM_UP, UP_UP, RIGHT_ARM_UP]);
    }
}
