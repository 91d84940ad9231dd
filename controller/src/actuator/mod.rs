//! Actuator facade: motion primitives for the wheeled base.
//!
//! Provides:
//! - `Actuator`: drive distance, spin angle, stop
//! - `console`: logs every primitive (no hardware)
//! - `create`: iRobot Create Open Interface byte encoding over any `Write`
//! - `RecordingActuator`: keeps issued commands in memory
//!
//! The controller treats every actuator as fire-and-forget: a failed
//! command is logged by the caller and never retried.

pub mod console;
pub mod create;

use std::path::PathBuf;

pub use console::ConsoleActuator;
pub use create::CreateActuator;

/// Motion primitives accepted by the wheeled base.
///
/// Units: velocity in mm/s, distance in mm, angles in whole degrees.
/// Positive degrees turn clockwise (toward the sensor's right).
pub trait Actuator: Send {
    /// Drive straight for `distance` (negative reverses).
    fn drive_distance(&mut self, velocity: i32, distance: i32) -> anyhow::Result<()>;

    /// Spin in place by `degrees`; only the magnitude of `velocity` is used.
    fn spin_angle(&mut self, velocity: i32, degrees: i32) -> anyhow::Result<()>;

    /// Halt both wheels.
    fn stop(&mut self) -> anyhow::Result<()>;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn drive_distance(&mut self, velocity: i32, distance: i32) -> anyhow::Result<()> {
        (**self).drive_distance(velocity, distance)
    }

    fn spin_angle(&mut self, velocity: i32, degrees: i32) -> anyhow::Result<()> {
        (**self).spin_angle(velocity, degrees)
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        (**self).stop()
    }
}

/// A single primitive, as issued by the mode controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    Drive { velocity: i32, distance: i32 },
    Spin { velocity: i32, degrees: i32 },
    Stop,
}

impl MotionCommand {
    /// Forward this command to an actuator.
    pub fn apply(self, actuator: &mut dyn Actuator) -> anyhow::Result<()> {
        match self {
            Self::Drive { velocity, distance } => actuator.drive_distance(velocity, distance),
            Self::Spin { velocity, degrees } => actuator.spin_angle(velocity, degrees),
            Self::Stop => actuator.stop(),
        }
    }

    pub fn to_sexp(&self) -> String {
        match self {
            Self::Drive { velocity, distance } => {
                format!("(:drive :velocity {} :distance {})", velocity, distance)
            }
            Self::Spin { velocity, degrees } => {
                format!("(:spin :velocity {} :degrees {})", velocity, degrees)
            }
            Self::Stop => "(:stop)".to_string(),
        }
    }
}

/// Actuator that records every command.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingActuator {
    pub commands: Vec<MotionCommand>,
}

#[cfg(test)]
impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all recorded commands, leaving the log empty.
    pub fn drain(&mut self) -> Vec<MotionCommand> {
        std::mem::take(&mut self.commands)
    }
}

#[cfg(test)]
impl Actuator for RecordingActuator {
    fn drive_distance(&mut self, velocity: i32, distance: i32) -> anyhow::Result<()> {
        self.commands.push(MotionCommand::Drive { velocity, distance });
        Ok(())
    }

    fn spin_angle(&mut self, velocity: i32, degrees: i32) -> anyhow::Result<()> {
        self.commands.push(MotionCommand::Spin { velocity, degrees });
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.commands.push(MotionCommand::Stop);
        Ok(())
    }
}

/// Actuator selection from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorKind {
    /// Log commands only.
    Console,
    /// Open Interface bytes written to a serial device or file.
    Create(PathBuf),
}

impl ActuatorKind {
    /// Parse `console` or `create:<path>`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "console" => Some(Self::Console),
            _ => {
                let path = s.strip_prefix("create:")?;
                if path.is_empty() {
                    None
                } else {
                    Some(Self::Create(PathBuf::from(path)))
                }
            }
        }
    }

    /// Open the selected actuator.  Failure here is fatal at startup.
    pub fn open(&self) -> anyhow::Result<Box<dyn Actuator>> {
        match self {
            Self::Console => Ok(Box::new(ConsoleActuator::new())),
            Self::Create(path) => Ok(Box::new(CreateActuator::open_path(path)?)),
        }
    }
}
