//! Person locator: classifies each frame as centered or not, relative to
//! the sensor's forward axis.

use tracing::debug;

use crate::geometry::bearing_deg;
use crate::skeleton::SkeletonFrame;

/// Per-frame centering classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CenteringEvent {
    /// Person is within the centering tolerance.
    Centered,
    /// Person is off-axis; positive offset means to the right.
    NotCentered { offset_deg: f64 },
}

impl CenteringEvent {
    pub fn to_sexp(&self) -> String {
        match self {
            Self::Centered => "(:centered t)".to_string(),
            Self::NotCentered { offset_deg } => {
                format!("(:centered nil :offset {:.1})", offset_deg)
            }
        }
    }
}

/// Configuration for the person locator.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    /// Maximum bearing magnitude (degrees, inclusive) classified as centered.
    pub centered_tolerance_deg: f64,
    /// Wider band used once centered.  `None` keeps a single threshold.
    pub release_tolerance_deg: Option<f64>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            centered_tolerance_deg: 10.0,
            release_tolerance_deg: None,
        }
    }
}

/// Emits one [`CenteringEvent`] per present frame.
pub struct PersonLocator {
    pub config: LocatorConfig,
    /// Only consulted when a release band is configured.
    centered: bool,
}

impl PersonLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            config,
            centered: false,
        }
    }

    /// Classify one frame.  Absent frames produce no event.
    pub fn update(&mut self, frame: Option<&SkeletonFrame>) -> Option<CenteringEvent> {
        let frame = frame?;
        let offset_deg = bearing_deg(&frame.position);

        let band = match self.config.release_tolerance_deg {
            Some(release) if self.centered => release.max(self.config.centered_tolerance_deg),
            _ => self.config.centered_tolerance_deg,
        };

        let event = if offset_deg.abs() <= band {
            CenteringEvent::Centered
        } else {
            CenteringEvent::NotCentered { offset_deg }
        };
        self.centered = matches!(event, CenteringEvent::Centered);
        debug!("Locator offset {:.1} deg -> {:?}", offset_deg, event);
        Some(event)
    }

    #[cfg(test)]
    pub fn is_centered(&self) -> bool {
        self.centered
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:centered {} :tolerance {:.1} :release {})",
            if self.centered { "t" } else { "nil" },
            self.config.centered_tolerance_deg,
            self.config
                .release_tolerance_deg
                .map(|r| format!("{:.1}", r))
                .unwrap_or_else(|| "nil".to_string()),
        )
    }
}
