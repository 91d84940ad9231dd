//! Skeleton sources: where frames come from.
//!
//! A replay file holds one frame per line, either `nil` (nobody tracked)
//! or a plist:
//!
//! ```text
//! (:timestamp 33
//!  :position (120 0 2100)
//!  :joints (:head (120 700 2100) :wrist-right (350 950 2100)))
//! ```
//!
//! Joints left out of `:joints` sit on the reference position.  Blank
//! lines and `;` comments are skipped.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{bail, Context};
use lexpr::Value;
use tracing::{debug, info};

use crate::sexp;
use crate::skeleton::{JointKind, SkeletonFrame};

/// A stream of per-tick observations.
pub trait SkeletonSource: Send {
    /// Next observation.  `Some(None)` means nobody is tracked this tick;
    /// `None` means the stream has ended.
    fn next_frame(&mut self) -> Option<Option<SkeletonFrame>>;
}

/// Frames preloaded from a replay file.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    frames: Vec<Option<SkeletonFrame>>,
    cursor: usize,
    looping: bool,
}

impl ReplaySource {
    pub fn load(path: &Path, frame_interval: Duration) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading replay {}", path.display()))?;
        let source = Self::parse(&text, frame_interval)
            .with_context(|| format!("parsing replay {}", path.display()))?;
        info!("Loaded {} replay frame(s) from {}", source.len(), path.display());
        Ok(source)
    }

    /// Parse replay text.  Frames without `:timestamp` are stamped at
    /// `index * frame_interval`.
    pub fn parse(text: &str, frame_interval: Duration) -> anyhow::Result<Self> {
        let step = frame_interval.as_millis() as u64;
        let mut frames = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let default_ts = frames.len() as u64 * step;
            let frame = parse_frame(line, default_ts)
                .with_context(|| format!("line {}", lineno + 1))?;
            frames.push(frame);
        }
        Ok(Self {
            frames,
            cursor: 0,
            looping: false,
        })
    }

    /// Restart from the first frame when the end is reached.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl SkeletonSource for ReplaySource {
    fn next_frame(&mut self) -> Option<Option<SkeletonFrame>> {
        if self.cursor >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return None;
            }
            debug!("Replay wrapped");
            self.cursor = 0;
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        Some(frame)
    }
}

/// Parse one replay line.
pub fn parse_frame(line: &str, default_timestamp_ms: u64) -> anyhow::Result<Option<SkeletonFrame>> {
    let value = lexpr::from_str(line).context("malformed s-expression")?;
    if sexp::is_nil(&value) {
        return Ok(None);
    }
    if !matches!(value, Value::Cons(_)) {
        bail!("expected nil or a frame plist, got {}", value);
    }

    let position = sexp::get_value(&value, "position")
        .and_then(sexp::triple)
        .context(":position must be a list of three numbers")?;
    let mut frame = SkeletonFrame::new(position);
    frame.timestamp_ms = match sexp::get_value(&value, "timestamp") {
        Some(ts) => sexp::number(ts)
            .filter(|t| *t >= 0.0)
            .context(":timestamp must be a non-negative number")? as u64,
        None => default_timestamp_ms,
    };

    if let Some(joints) = sexp::get_value(&value, "joints") {
        for (name, coords) in sexp::plist_pairs(joints) {
            let joint = JointKind::parse(name)
                .with_context(|| format!("unknown joint :{}", name))?;
            let xyz = sexp::triple(coords)
                .with_context(|| format!("joint :{} must be a list of three numbers", name))?;
            frame.set_joint(joint, xyz);
        }
    }

    if !frame.is_finite() {
        bail!("frame contains non-finite coordinates");
    }
    Ok(Some(frame))
}

/// Drive `source` on its own thread, one frame per `interval`, until the
/// stream ends, the receiver hangs up, or `shutdown` is raised.
pub fn spawn_sensor(
    mut source: Box<dyn SkeletonSource>,
    interval: Duration,
    frames: Sender<Option<SkeletonFrame>>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("asimov-sensor".into())
        .spawn(move || {
            let mut sent: u64 = 0;
            while !shutdown.load(Ordering::SeqCst) {
                let Some(frame) = source.next_frame() else {
                    info!("Skeleton stream ended after {} frame(s)", sent);
                    break;
                };
                if frames.send(frame).is_err() {
                    debug!("Frame receiver closed, stopping sensor");
                    break;
                }
                sent += 1;
                std::thread::sleep(interval);
            }
        })
        .context("spawning sensor thread")?;
    Ok(handle)
}
