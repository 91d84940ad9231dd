//! Drive modes: per-frame conversion of the tracked skeleton into motion
//! commands.
//!
//! The current mode is shared through an atomic cell with exactly one
//! writer ([`ModeWriter`], not `Clone`) and any number of readers.  The
//! controller reads the mode once per tick, so a change takes effect on
//! the next frame.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::actuator::{Actuator, MotionCommand};
use crate::geometry::bearing_deg;
use crate::skeleton::SkeletonFrame;

// ── Mode ───────────────────────────────────────────────────

/// Driving behaviour selected by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    /// Ignore the person.
    None = 0,
    /// Keep the person centered and close the distance to the standoff.
    Follow = 1,
    /// Reserved.
    Avoid = 2,
    /// Reserved.
    Drinking = 3,
    /// Turn in place to keep the person centered.
    Center = 4,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Follow => "follow",
            Self::Avoid => "avoid",
            Self::Drinking => "drinking",
            Self::Center => "center",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "follow" => Some(Self::Follow),
            "avoid" => Some(Self::Avoid),
            "drinking" => Some(Self::Drinking),
            "center" => Some(Self::Center),
            _ => None,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Follow,
            2 => Self::Avoid,
            3 => Self::Drinking,
            4 => Self::Center,
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create the shared mode cell.
pub fn mode_cell(initial: Mode) -> (ModeWriter, ModeReader) {
    let cell = Arc::new(AtomicU8::new(initial as u8));
    (ModeWriter(Arc::clone(&cell)), ModeReader(cell))
}

/// The single writer of the current mode.
#[derive(Debug)]
pub struct ModeWriter(Arc<AtomicU8>);

impl ModeWriter {
    /// Replace the mode, returning the previous one.
    pub fn set(&self, mode: Mode) -> Mode {
        Mode::from_u8(self.0.swap(mode as u8, Ordering::AcqRel))
    }

    pub fn get(&self) -> Mode {
        Mode::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Read-only view of the current mode.
#[derive(Debug, Clone)]
pub struct ModeReader(Arc<AtomicU8>);

impl ModeReader {
    pub fn get(&self) -> Mode {
        Mode::from_u8(self.0.load(Ordering::Acquire))
    }
}

// ── Config ─────────────────────────────────────────────────

/// Motion limits and follow parameters.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Forward distance (mm) kept from a followed person.
    pub standoff_mm: f64,
    /// Velocity (mm/s) for forward drives.
    pub default_velocity: i32,
    /// Velocity cap (mm/s) for every command.
    pub max_velocity: i32,
    /// Longest single forward drive (mm).
    pub max_drive_distance_mm: f64,
    /// Largest single spin (degrees).
    pub max_spin_deg: f64,
    /// Bearing magnitude (degrees, inclusive) that needs no correction.
    pub centered_tolerance_deg: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            standoff_mm: 1500.0,
            default_velocity: 200,
            max_velocity: 500,
            max_drive_distance_mm: 1000.0,
            max_spin_deg: 180.0,
            centered_tolerance_deg: 10.0,
        }
    }
}

// ── Controller ─────────────────────────────────────────────

/// Routes each frame to the behaviour of the current mode.
pub struct ModeController {
    pub config: DriveConfig,
    mode: ModeReader,
    /// A spin went out and the person has not been centered since.
    correcting: bool,
}

impl ModeController {
    pub fn new(config: DriveConfig, mode: ModeReader) -> Self {
        Self {
            config,
            mode,
            correcting: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// Commands for one frame under the given mode.  Absent frames issue
    /// nothing and leave the correction state alone.
    pub fn commands(&mut self, mode: Mode, frame: Option<&SkeletonFrame>) -> Vec<MotionCommand> {
        let Some(frame) = frame else {
            return Vec::new();
        };
        match mode {
            Mode::None => Vec::new(),
            Mode::Center => self.center(frame).into_iter().collect(),
            Mode::Follow => self.follow(frame),
            Mode::Avoid => self.avoid(frame),
            Mode::Drinking => self.drinking(frame),
        }
    }

    /// Read the mode once and send the resulting commands to `actuator`.
    /// Returns the mode that was applied.
    pub fn dispatch(&mut self, frame: Option<&SkeletonFrame>, actuator: &mut dyn Actuator) -> Mode {
        let mode = self.mode.get();
        for command in self.commands(mode, frame) {
            debug!("{} -> {}", mode, command.to_sexp());
            if let Err(e) = command.apply(actuator) {
                warn!("actuator rejected {:?}: {:#}", command, e);
            }
        }
        mode
    }

    /// Spin toward an off-center person.  The first centered frame after a
    /// spin halts the base.
    fn center(&mut self, frame: &SkeletonFrame) -> Option<MotionCommand> {
        match self.spin_toward(frame) {
            Some(spin) => {
                self.correcting = true;
                Some(spin)
            }
            None if self.correcting => {
                self.correcting = false;
                Some(MotionCommand::Stop)
            }
            None => None,
        }
    }

    fn spin_toward(&self, frame: &SkeletonFrame) -> Option<MotionCommand> {
        let angle = bearing_deg(&frame.position);
        if angle.abs() <= self.config.centered_tolerance_deg {
            return None;
        }
        let max_spin = self.config.max_spin_deg.abs();
        let degrees = angle.clamp(-max_spin, max_spin).round() as i32;
        if degrees == 0 {
            return None;
        }
        Some(MotionCommand::Spin {
            velocity: degrees.signum() * self.config.max_velocity.abs(),
            degrees,
        })
    }

    fn follow(&mut self, frame: &SkeletonFrame) -> Vec<MotionCommand> {
        let mut commands: Vec<MotionCommand> = self.center(frame).into_iter().collect();
        let distance = frame.distance();
        if distance > self.config.standoff_mm {
            let travel = (distance - self.config.standoff_mm).min(self.config.max_drive_distance_mm);
            let travel = travel as i32;
            if travel > 0 {
                commands.push(MotionCommand::Drive {
                    velocity: self.config.default_velocity.min(self.config.max_velocity),
                    distance: travel,
                });
            }
        }
        commands
    }

    fn avoid(&self, _frame: &SkeletonFrame) -> Vec<MotionCommand> {
        Vec::new()
    }

    fn drinking(&self, _frame: &SkeletonFrame) -> Vec<MotionCommand> {
        Vec::new()
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:mode :{} :correcting {} :standoff {:.0} :max-velocity {} :max-drive {:.0} :max-spin {:.0})",
            self.mode.get(),
            if self.correcting { "t" } else { "nil" },
            self.config.standoff_mm,
            self.config.max_velocity,
            self.config.max_drive_distance_mm,
            self.config.max_spin_deg,
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
