//! Gesture recognition from full-body skeleton frames.
//!
//! Each gesture owns an immutable [`GestureTemplate`] and its own debounce
//! state.  A gesture fires at most once per debounce interval while its
//! pose is held; gestures never share state, so one gesture's cadence
//! cannot delay another's.

pub mod builtin;
pub mod template;

use std::time::{Duration, Instant};

use tracing::debug;

use crate::skeleton::SkeletonFrame;

pub use template::{AngleCheck, Comparison, GestureTemplate};

// ── Events ─────────────────────────────────────────────────

/// Emitted when a gesture's pose is recognised.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureEvent {
    /// Template name, e.g. "up-up".
    pub gesture: String,
    /// Timestamp of the frame that triggered the event.
    pub timestamp_ms: u64,
}

impl GestureEvent {
    pub fn to_sexp(&self) -> String {
        format!(
            "(:gesture \"{}\" :timestamp {})",
            self.gesture, self.timestamp_ms
        )
    }
}

// ── Config ─────────────────────────────────────────────────

/// Configuration for gesture recognition.
#[derive(Debug, Clone)]
pub struct GestureConfig {
    /// Enable gesture recognition.
    pub enabled: bool,
    /// Minimum time (ms) between two firings of the same gesture.
    pub debounce_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 2000,
        }
    }
}

impl GestureConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// ── Debounce ───────────────────────────────────────────────

/// Wait measured since the last actual fire, not the last match.
#[derive(Debug, Clone)]
pub struct Debounce {
    interval: Duration,
    last_fire: Option<Instant>,
}

impl Debounce {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fire: None,
        }
    }

    /// Record a fire at `now` if the interval has elapsed since the last
    /// one.  Returns whether the caller should emit.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_fire {
            if now.saturating_duration_since(last) <= self.interval {
                return false;
            }
        }
        self.last_fire = Some(now);
        true
    }

    #[cfg(test)]
    pub fn last_fire(&self) -> Option<Instant> {
        self.last_fire
    }
}

// ── Gesture capability ─────────────────────────────────────

/// A recognisable gesture.
pub trait Gesture: Send {
    /// Stable name used in events and IPC.
    fn name(&self) -> &str;

    /// Evaluate one frame.  `None` frames never fire and never change state.
    fn update(&mut self, frame: Option<&SkeletonFrame>, now: Instant) -> Option<GestureEvent>;
}

/// Gesture backed by a static joint-angle template.
#[derive(Debug, Clone)]
pub struct TemplateGesture {
    template: GestureTemplate,
    debounce: Debounce,
}

impl TemplateGesture {
    pub fn new(template: GestureTemplate, debounce: Duration) -> Self {
        Self {
            template,
            debounce: Debounce::new(debounce),
        }
    }

    #[cfg(test)]
    pub fn last_fire(&self) -> Option<Instant> {
        self.debounce.last_fire()
    }
}

impl Gesture for TemplateGesture {
    fn name(&self) -> &str {
        self.template.name()
    }

    fn update(&mut self, frame: Option<&SkeletonFrame>, now: Instant) -> Option<GestureEvent> {
        let frame = frame?;
        if !self.template.matches(frame) {
            return None;
        }
        if !self.debounce.try_fire(now) {
            return None;
        }
        debug!("Gesture recognized: {}", self.template.name());
        Some(GestureEvent {
            gesture: self.template.name().to_string(),
            timestamp_ms: frame.timestamp_ms,
        })
    }
}

// ── Set ────────────────────────────────────────────────────

/// Every registered gesture, evaluated independently per frame.
pub struct GestureSet {
    config: GestureConfig,
    gestures: Vec<Box<dyn Gesture>>,
}

impl GestureSet {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            gestures: Vec::new(),
        }
    }

    /// Set populated with every built-in template.
    pub fn with_builtins(config: GestureConfig) -> Self {
        let mut set = Self::new(config);
        for template in builtin::all() {
            set.add_template(template);
        }
        set
    }

    pub fn add_template(&mut self, template: GestureTemplate) {
        let debounce = self.config.debounce();
        self.add(Box::new(TemplateGesture::new(template, debounce)));
    }

    /// Register a gesture.  Replaces any gesture with the same name.
    pub fn add(&mut self, gesture: Box<dyn Gesture>) {
        self.gestures.retain(|g| g.name() != gesture.name());
        self.gestures.push(gesture);
    }

    pub fn names(&self) -> Vec<&str> {
        self.gestures.iter().map(|g| g.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.gestures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty()
    }

    /// Evaluate every gesture against one frame.
    pub fn update(&mut self, frame: Option<&SkeletonFrame>, now: Instant) -> Vec<GestureEvent> {
        if !self.config.enabled {
            return Vec::new();
        }
        self.gestures
            .iter_mut()
            .filter_map(|g| g.update(frame, now))
            .collect()
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let names: Vec<String> = self.names().iter().map(|n| format!("\"{}\"", n)).collect();
        format!(
            "(:enabled {} :debounce-ms {} :gestures ({}))",
            if self.config.enabled { "t" } else { "nil" },
            self.config.debounce_ms,
            names.join(" "),
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
