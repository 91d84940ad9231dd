//! Skeleton frame data as delivered by the depth sensor.
//!
//! Models the 20 joints of a full-body tracked skeleton.  Positions are
//! in sensor space: x right, y up, z forward, in millimetres.

// ── Joint definitions ──────────────────────────────────────

/// Tracked body joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointKind {
    HipCenter,
    Spine,
    ShoulderCenter,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
}

/// Total number of joints per skeleton.
pub const JOINT_COUNT: usize = 20;

/// All joints in index order.
pub const ALL_JOINTS: [JointKind; JOINT_COUNT] = [
    JointKind::HipCenter,
    JointKind::Spine,
    JointKind::ShoulderCenter,
    JointKind::Head,
    JointKind::ShoulderLeft,
    JointKind::ElbowLeft,
    JointKind::WristLeft,
    JointKind::HandLeft,
    JointKind::ShoulderRight,
    JointKind::ElbowRight,
    JointKind::WristRight,
    JointKind::HandRight,
    JointKind::HipLeft,
    JointKind::KneeLeft,
    JointKind::AnkleLeft,
    JointKind::FootLeft,
    JointKind::HipRight,
    JointKind::KneeRight,
    JointKind::AnkleRight,
    JointKind::FootRight,
];

impl JointKind {
    /// Convert joint enum to array index (0-19).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// String representation used in replay files and IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HipCenter => "hip-center",
            Self::Spine => "spine",
            Self::ShoulderCenter => "shoulder-center",
            Self::Head => "head",
            Self::ShoulderLeft => "shoulder-left",
            Self::ElbowLeft => "elbow-left",
            Self::WristLeft => "wrist-left",
            Self::HandLeft => "hand-left",
            Self::ShoulderRight => "shoulder-right",
            Self::ElbowRight => "elbow-right",
            Self::WristRight => "wrist-right",
            Self::HandRight => "hand-right",
            Self::HipLeft => "hip-left",
            Self::KneeLeft => "knee-left",
            Self::AnkleLeft => "ankle-left",
            Self::FootLeft => "foot-left",
            Self::HipRight => "hip-right",
            Self::KneeRight => "knee-right",
            Self::AnkleRight => "ankle-right",
            Self::FootRight => "foot-right",
        }
    }

    /// Parse a joint name as produced by [`JointKind::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        ALL_JOINTS.iter().copied().find(|j| j.as_str() == s)
    }
}

// ── Skeleton frame ─────────────────────────────────────────

/// One snapshot of the tracked person.
///
/// A frame always carries every joint; "tracking lost" is modelled by the
/// absence of a frame (`Option<&SkeletonFrame>`), never by a partial one.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonFrame {
    /// Joint positions indexed by `JointKind`.
    pub joints: [[f64; 3]; JOINT_COUNT],
    /// Reference position of the whole skeleton (centre of mass).
    pub position: [f64; 3],
    /// Sensor timestamp in milliseconds.
    pub timestamp_ms: u64,
}

impl SkeletonFrame {
    /// A frame with every joint collapsed onto `position`.
    pub fn new(position: [f64; 3]) -> Self {
        Self {
            joints: [position; JOINT_COUNT],
            position,
            timestamp_ms: 0,
        }
    }

    pub fn joint(&self, kind: JointKind) -> &[f64; 3] {
        &self.joints[kind.index()]
    }

    pub fn set_joint(&mut self, kind: JointKind, position: [f64; 3]) {
        self.joints[kind.index()] = position;
    }

    /// Forward distance from the sensor to the person.
    pub fn distance(&self) -> f64 {
        self.position[2]
    }

    /// Whether every coordinate in the frame is finite.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|c| c.is_finite())
            && self.joints.iter().flatten().all(|c| c.is_finite())
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:timestamp {} :position ({:.1} {:.1} {:.1}))",
            self.timestamp_ms, self.position[0], self.position[1], self.position[2],
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

/// Frame with a person standing at `(x, 0, z)` and arms hanging down.
#[cfg(test)]
pub(crate) fn make_frame(x: f64, z: f64) -> SkeletonFrame {
    let mut frame = SkeletonFrame::new([x, 0.0, z]);
    set_joint(&mut frame, JointKind::Head, x, 700.0, z);
    set_joint(&mut frame, JointKind::ShoulderCenter, x, 500.0, z);
    set_joint(&mut frame, JointKind::ShoulderLeft, x - 200.0, 500.0, z);
    set_joint(&mut frame, JointKind::ElbowLeft, x - 220.0, 220.0, z);
    set_joint(&mut frame, JointKind::WristLeft, x - 230.0, -50.0, z);
    set_joint(&mut frame, JointKind::ShoulderRight, x + 200.0, 500.0, z);
    set_joint(&mut frame, JointKind::ElbowRight, x + 220.0, 220.0, z);
    set_joint(&mut frame, JointKind::WristRight, x + 230.0, -50.0, z);
    frame
}

#[cfg(test)]
pub(crate) fn set_joint(frame: &mut SkeletonFrame, joint: JointKind, x: f64, y: f64, z: f64) {
    frame.set_joint(joint, [x, y, z]);
}

// ── Tests ──────────────────────────────────────────────────
