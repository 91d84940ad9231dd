//! Runtime configuration.
//!
//! Every value has a built-in default; an optional s-expression plist file
//! overrides any subset of them:
//!
//! ```text
//! (:debounce-ms 1500
//!  :centered-tolerance 8
//!  :standoff 1200)
//! ```
//!
//! Unknown keys are logged and ignored.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use lexpr::Value;
use tracing::{debug, warn};

use crate::gesture::GestureConfig;
use crate::locator::LocatorConfig;
use crate::mode::DriveConfig;
use crate::sexp;

/// Default replay pacing (about 30 frames per second).
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 33;

/// Complete controller configuration.
#[derive(Debug, Clone)]
pub struct AsimovConfig {
    pub gesture: GestureConfig,
    pub locator: LocatorConfig,
    pub drive: DriveConfig,
    /// Delay between replayed frames.
    pub frame_interval_ms: u64,
}

impl Default for AsimovConfig {
    fn default() -> Self {
        Self {
            gesture: GestureConfig::default(),
            locator: LocatorConfig::default(),
            drive: DriveConfig::default(),
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
        }
    }
}

impl AsimovConfig {
    /// Read and apply a config file on top of the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_sexp(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parse a config plist on top of the defaults.
    pub fn from_sexp(text: &str) -> anyhow::Result<Self> {
        let mut config = Self::default();
        let value = lexpr::from_str(text).context("malformed s-expression")?;
        if !matches!(value, Value::Cons(_) | Value::Null) {
            bail!("config must be a plist, got {}", value);
        }
        for (key, val) in sexp::plist_pairs(&value) {
            config.apply(key, val)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, key: &str, val: &Value) -> anyhow::Result<()> {
        let float = || sexp::number(val).with_context(|| format!(":{} expects a number", key));
        match key {
            "gestures-enabled" => self.gesture.enabled = !sexp::is_nil(val),
            "debounce-ms" => self.gesture.debounce_ms = non_negative(key, float()?)? as u64,
            "centered-tolerance" => {
                let tol = non_negative(key, float()?)?;
                self.locator.centered_tolerance_deg = tol;
                self.drive.centered_tolerance_deg = tol;
            }
            "release-tolerance" => {
                self.locator.release_tolerance_deg = if sexp::is_nil(val) {
                    None
                } else {
                    Some(non_negative(key, float()?)?)
                };
            }
            "standoff" => self.drive.standoff_mm = non_negative(key, float()?)?,
            "default-velocity" => self.drive.default_velocity = float()?.round() as i32,
            "max-velocity" => self.drive.max_velocity = non_negative(key, float()?)?.round() as i32,
            "max-drive" => self.drive.max_drive_distance_mm = non_negative(key, float()?)?,
            "max-spin" => self.drive.max_spin_deg = non_negative(key, float()?)?,
            "frame-interval-ms" => self.frame_interval_ms = non_negative(key, float()?)? as u64,
            other => {
                warn!("ignoring unknown config key :{}", other);
                return Ok(());
            }
        }
        debug!("config :{} = {}", key, val);
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(release) = self.locator.release_tolerance_deg {
            if release < self.locator.centered_tolerance_deg {
                bail!(
                    ":release-tolerance ({}) must not be below :centered-tolerance ({})",
                    release,
                    self.locator.centered_tolerance_deg
                );
            }
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Generate s-expression describing the effective configuration.
    pub fn to_sexp(&self) -> String {
        let release = self
            .locator
            .release_tolerance_deg
            .map(|r| format!("{}", r))
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:gestures-enabled {} :debounce-ms {} :centered-tolerance {} :release-tolerance {} \
             :standoff {} :default-velocity {} :max-velocity {} :max-drive {} :max-spin {} \
             :frame-interval-ms {})",
            if self.gesture.enabled { "t" } else { "nil" },
            self.gesture.debounce_ms,
            self.locator.centered_tolerance_deg,
            release,
            self.drive.standoff_mm,
            self.drive.default_velocity,
            self.drive.max_velocity,
            self.drive.max_drive_distance_mm,
            self.drive.max_spin_deg,
            self.frame_interval_ms,
        )
    }
}

fn non_negative(key: &str, value: f64) -> anyhow::Result<f64> {
    if !value.is_finite() || value < 0.0 {
        bail!(":{} must be a non-negative number, got {}", key, value);
    }
    Ok(value)
}
