//! iRobot Create Open Interface encoding.
//!
//! Each primitive becomes a short script: a drive command, a wait for the
//! travelled distance or turned angle, then a drive with zero velocity.
//! All 16-bit fields are big-endian two's complement.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use super::Actuator;

const OP_START: u8 = 128;
const OP_FULL: u8 = 132;
const OP_DRIVE: u8 = 137;
const OP_WAIT_DISTANCE: u8 = 156;
const OP_WAIT_ANGLE: u8 = 157;

/// Radius value meaning "drive straight".
const RADIUS_STRAIGHT: i16 = i16::MIN;
/// Radius values for turning in place.
const RADIUS_SPIN_CLOCKWISE: i16 = -1;
const RADIUS_SPIN_COUNTER_CLOCKWISE: i16 = 1;

/// Wheel velocity limit accepted by the Open Interface (mm/s).
pub const VELOCITY_MAX: i32 = 500;

/// Open Interface encoder writing to any byte sink.
pub struct CreateActuator<W: Write + Send> {
    out: W,
}

impl CreateActuator<std::fs::File> {
    /// Open a serial device (or plain file) and put the robot in full mode.
    pub fn open_path(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .with_context(|| format!("opening Create serial device {}", path.display()))?;
        info!("Create actuator on {}", path.display());
        Self::new(file)
    }
}

impl<W: Write + Send> CreateActuator<W> {
    /// Wrap a byte sink and send the start/full-mode handshake.
    pub fn new(mut out: W) -> anyhow::Result<Self> {
        out.write_all(&[OP_START, OP_FULL])
            .context("sending Open Interface start")?;
        out.flush()?;
        Ok(Self { out })
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn send(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        debug!("OI <- {:?}", bytes);
        self.out
            .write_all(bytes)
            .context("writing Open Interface command")?;
        self.out.flush()?;
        Ok(())
    }
}

fn drive_bytes(velocity: i16, radius: i16) -> [u8; 5] {
    let [v_hi, v_lo] = velocity.to_be_bytes();
    let [r_hi, r_lo] = radius.to_be_bytes();
    [OP_DRIVE, v_hi, v_lo, r_hi, r_lo]
}

fn wait_bytes(opcode: u8, value: i16) -> [u8; 3] {
    let [hi, lo] = value.to_be_bytes();
    [opcode, hi, lo]
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32 + 1, i16::MAX as i32) as i16
}

fn speed(velocity: i32) -> i16 {
    velocity.unsigned_abs().min(VELOCITY_MAX as u32) as i16
}

impl<W: Write + Send> Actuator for CreateActuator<W> {
    fn drive_distance(&mut self, velocity: i32, distance: i32) -> anyhow::Result<()> {
        if distance == 0 {
            return self.stop();
        }
        let speed = speed(velocity);
        let signed = if distance < 0 { -speed } else { speed };
        let mut script = Vec::with_capacity(13);
        script.extend_from_slice(&drive_bytes(signed, RADIUS_STRAIGHT));
        script.extend_from_slice(&wait_bytes(OP_WAIT_DISTANCE, clamp_i16(distance)));
        script.extend_from_slice(&drive_bytes(0, 0));
        self.send(&script)
    }

    fn spin_angle(&mut self, velocity: i32, degrees: i32) -> anyhow::Result<()> {
        if degrees == 0 {
            return self.stop();
        }
        let radius = if degrees > 0 {
            RADIUS_SPIN_CLOCKWISE
        } else {
            RADIUS_SPIN_COUNTER_CLOCKWISE
        };
        let mut script = Vec::with_capacity(13);
        script.extend_from_slice(&drive_bytes(speed(velocity), radius));
        // The Open Interface counts counter-clockwise angles as positive.
        script.extend_from_slice(&wait_bytes(OP_WAIT_ANGLE, clamp_i16(-degrees)));
        script.extend_from_slice(&drive_bytes(0, 0));
        self.send(&script)
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.send(&drive_bytes(0, 0))
    }
}
