//! Per-frame pipeline: locator, gestures, then mode dispatch.
//!
//! One [`Pipeline::tick`] is the unit of work for a frame and runs to
//! completion before the next frame is looked at.  Frames arrive over an
//! `mpsc` channel so the sensor thread never waits on actuation.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::actuator::Actuator;
use crate::config::AsimovConfig;
use crate::events::{EventBus, RobotEvent};
use crate::gesture::{GestureEvent, GestureSet};
use crate::locator::{CenteringEvent, PersonLocator};
use crate::mode::{Mode, ModeController, ModeReader};
use crate::skeleton::SkeletonFrame;

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Mode read for this tick.
    pub mode: Mode,
    pub centering: Option<CenteringEvent>,
    pub gestures: Vec<GestureEvent>,
}

/// Running counters, returned when the pipeline thread exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub absent: u64,
    pub rejected: u64,
    pub gestures: u64,
}

/// Latest pipeline status, rendered after every tick and read by the
/// control endpoint without touching the pipeline thread.
#[derive(Debug, Default)]
pub struct StatusBoard {
    snapshot: Mutex<String>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, status: String) {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn snapshot(&self) -> String {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub struct Pipeline<A: Actuator> {
    locator: PersonLocator,
    gestures: GestureSet,
    controller: ModeController,
    actuator: A,
    bus: Arc<EventBus>,
    status: Arc<StatusBoard>,
    last_seen: Option<SkeletonFrame>,
    tracking: bool,
    stats: TickStats,
}

impl<A: Actuator> Pipeline<A> {
    pub fn new(config: &AsimovConfig, mode: ModeReader, actuator: A, bus: Arc<EventBus>) -> Self {
        let pipeline = Self {
            locator: PersonLocator::new(config.locator.clone()),
            gestures: GestureSet::with_builtins(config.gesture.clone()),
            controller: ModeController::new(config.drive.clone(), mode),
            actuator,
            bus,
            status: Arc::new(StatusBoard::new()),
            last_seen: None,
            tracking: false,
            stats: TickStats::default(),
        };
        pipeline.status.publish(pipeline.status_sexp());
        pipeline
    }

    /// Handle on the status snapshot, kept current by every tick.
    pub fn status_board(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.status)
    }

    /// Process one observation.  An absent frame, or one with non-finite
    /// coordinates, issues no commands and publishes no events.
    pub fn tick(&mut self, frame: Option<&SkeletonFrame>, now: Instant) -> TickOutcome {
        self.stats.ticks += 1;

        let frame = match frame {
            Some(f) if !f.is_finite() => {
                warn!("Dropping frame {} with non-finite coordinates", f.timestamp_ms);
                self.stats.rejected += 1;
                None
            }
            None => {
                self.stats.absent += 1;
                None
            }
            present => present,
        };
        self.note_tracking(frame.is_some());
        if let Some(f) = frame {
            self.last_seen = Some(f.clone());
        }

        let centering = self.locator.update(frame);
        if let Some(event) = centering {
            debug!("centering {}", event.to_sexp());
            self.bus.publish(RobotEvent::Centering(event));
        }

        let gestures = self.gestures.update(frame, now);
        for event in &gestures {
            debug!("gesture {}", event.to_sexp());
            self.stats.gestures += 1;
            self.bus.publish(RobotEvent::Gesture(event.clone()));
        }

        let mode = self.controller.dispatch(frame, &mut self.actuator);
        self.status.publish(self.status_sexp());

        TickOutcome {
            mode,
            centering,
            gestures,
        }
    }

    fn note_tracking(&mut self, present: bool) {
        if present != self.tracking {
            if present {
                info!("Person acquired");
            } else {
                info!("Person lost");
            }
            self.tracking = present;
        }
    }

    /// Consume frames until the sender hangs up, then halt the base.
    pub fn run(mut self, frames: Receiver<Option<SkeletonFrame>>) -> TickStats {
        info!(
            "Pipeline running ({} gesture(s), mode {})",
            self.gestures.len(),
            self.controller.mode()
        );
        for frame in frames.iter() {
            let outcome = self.tick(frame.as_ref(), Instant::now());
            debug!("tick {} -> {:?}", self.stats.ticks, outcome);
        }
        if let Err(e) = self.actuator.stop() {
            warn!("Failed to stop actuator on shutdown: {:#}", e);
        }
        info!(
            "Pipeline stopped after {} tick(s) ({} absent, {} rejected, {} gesture(s))",
            self.stats.ticks, self.stats.absent, self.stats.rejected, self.stats.gestures
        );
        self.stats
    }

    #[cfg(test)]
    pub fn stats(&self) -> TickStats {
        self.stats
    }

    #[cfg(test)]
    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:tracking {} :ticks {} :person {} :locator {} :gestures {} :drive {})",
            if self.tracking { "t" } else { "nil" },
            self.stats.ticks,
            self.last_seen
                .as_ref()
                .map(SkeletonFrame::status_sexp)
                .unwrap_or_else(|| "nil".to_string()),
            self.locator.status_sexp(),
            self.gestures.status_sexp(),
            self.controller.status_sexp(),
        )
    }
}

impl<A: Actuator + 'static> Pipeline<A> {
    /// Run the pipeline on its own thread.
    pub fn spawn(self, frames: Receiver<Option<SkeletonFrame>>) -> anyhow::Result<JoinHandle<TickStats>> {
        std::thread::Builder::new()
            .name("asimov-pipeline".into())
            .spawn(move || self.run(frames))
            .context("spawning pipeline thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{MotionCommand, RecordingActuator};
    use crate::gesture::builtin::{self, poses::both_up};
    use crate::mode::{mode_cell, ModeWriter};
    use crate::skeleton::make_frame;
    use std::time::Duration;

    fn pipeline(initial: Mode) -> (ModeWriter, Arc<EventBus>, Pipeline<RecordingActuator>) {
        let (writer, reader) = mode_cell(initial);
        let bus = Arc::new(EventBus::new());
        let p = Pipeline::new(
            &AsimovConfig::default(),
            reader,
            RecordingActuator::new(),
            Arc::clone(&bus),
        );
        (writer, bus, p)
    }

    #[test]
    fn test_absent_frame_is_a_no_op() {
        let (_writer, bus, mut p) = pipeline(Mode::Follow);
        let events = bus.subscribe();
        let outcome = p.tick(None, Instant::now());
        assert_eq!(outcome.centering, None);
        assert!(outcome.gestures.is_empty());
        assert!(p.actuator_mut().commands.is_empty());
        assert!(events.try_recv().is_err());
        assert_eq!(p.stats().absent, 1);
    }

    #[test]
    fn test_absent_frame_keeps_debounce() {
        let (_writer, _bus, mut p) = pipeline(Mode::None);
        let frame = both_up(0.0, 2000.0);
        let t0 = Instant::now();
        assert!(!p.tick(Some(&frame), t0).gestures.is_empty());
        p.tick(None, t0 + Duration::from_millis(500));
        // Debounce still counts from t0.
        assert!(p.tick(Some(&frame), t0 + Duration::from_millis(1000)).gestures.is_empty());
    }

    #[test]
    fn test_events_published() {
        let (_writer, bus, mut p) = pipeline(Mode::None);
        let events = bus.subscribe();
        p.tick(Some(&both_up(0.0, 2000.0)), Instant::now());

        let received: Vec<RobotEvent> = events.try_iter().collect();
        assert_eq!(received[0], RobotEvent::Centering(CenteringEvent::Centered));
        let names: Vec<&str> = received
            .iter()
            .filter_map(|e| match e {
                RobotEvent::Gesture(g) => Some(g.gesture.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&builtin::UP_UP), "got {:?}", names);
    }

    #[test]
    fn test_non_finite_frame_rejected() {
        let (_writer, bus, mut p) = pipeline(Mode::Center);
        let events = bus.subscribe();
        let mut frame = make_frame(1000.0, 1000.0);
        frame.position[0] = f64::NAN;
        let outcome = p.tick(Some(&frame), Instant::now());
        assert_eq!(outcome.centering, None);
        assert!(p.actuator_mut().commands.is_empty());
        assert!(events.try_recv().is_err());
        assert_eq!(p.stats().rejected, 1);
        assert_eq!(p.stats().absent, 0);

        p.tick(None, Instant::now());
        assert_eq!(p.stats().rejected, 1);
        assert_eq!(p.stats().absent, 1);
    }

    #[test]
    fn test_mode_switch_takes_effect_next_tick() {
        let (writer, _bus, mut p) = pipeline(Mode::None);
        let frame = make_frame(0.0, 1550.0);
        let t0 = Instant::now();

        assert_eq!(p.tick(Some(&frame), t0).mode, Mode::None);
        assert!(p.actuator_mut().drain().is_empty());

        writer.set(Mode::Follow);
        assert_eq!(p.tick(Some(&frame), t0).mode, Mode::Follow);
        assert_eq!(
            p.actuator_mut().drain(),
            vec![MotionCommand::Drive { velocity: 200, distance: 50 }]
        );
    }

    #[test]
    fn test_demo_replay_in_follow_mode() {
        use crate::sensor::{ReplaySource, SkeletonSource};

        let text = include_str!("../../demos/up-up.sexp");
        let mut source = ReplaySource::parse(text, Duration::from_millis(33)).unwrap();
        let (_writer, _bus, mut p) = pipeline(Mode::Follow);
        let t0 = Instant::now();

        let mut fired = Vec::new();
        while let Some(frame) = source.next_frame() {
            let ts = frame.as_ref().map(|f| f.timestamp_ms).unwrap_or(0);
            let outcome = p.tick(frame.as_ref(), t0 + Duration::from_millis(ts));
            fired.extend(outcome.gestures.into_iter().map(|g| g.gesture));
        }

        assert_eq!(
            fired.iter().filter(|g| g.as_str() == builtin::UP_UP).count(),
            1,
            "fired {:?}",
            fired
        );
        let commands = p.actuator_mut().drain();
        assert_eq!(commands.len(), 18, "{:?}", commands);
        assert_eq!(commands[0], MotionCommand::Drive { velocity: 200, distance: 500 });
        let spins: Vec<&MotionCommand> = commands
            .iter()
            .filter(|c| matches!(c, MotionCommand::Spin { .. }))
            .collect();
        assert_eq!(spins.len(), 4);
        assert_eq!(*spins[0], MotionCommand::Spin { velocity: 500, degrees: 19 });
        assert_eq!(p.stats().absent, 3);
    }

    #[test]
    fn test_run_drains_until_disconnect() {
        let (_writer, _bus, p) = pipeline(Mode::None);
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(None).unwrap();
        tx.send(Some(make_frame(0.0, 2000.0))).unwrap();
        drop(tx);
        let stats = p.run(rx);
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.absent, 1);
    }

    #[test]
    fn test_status_sexp() {
        let (_writer, _bus, mut p) = pipeline(Mode::Center);
        p.tick(Some(&make_frame(0.0, 2000.0)), Instant::now());
        let sexp = p.status_sexp();
        assert!(sexp.starts_with("(:tracking t :ticks 1"));
        assert!(sexp.contains(":position (0.0 0.0 2000.0)"), "{}", sexp);
        assert!(sexp.contains(":mode :center"));
        assert!(lexpr::from_str(&sexp).is_ok());
    }

    #[test]
    fn test_status_board_follows_ticks() {
        let (_writer, _bus, mut p) = pipeline(Mode::Follow);
        let board = p.status_board();
        assert!(board.snapshot().starts_with("(:tracking nil :ticks 0 :person nil"));

        p.tick(Some(&make_frame(0.0, 1800.0)), Instant::now());
        assert!(board.snapshot().starts_with("(:tracking t :ticks 1"));

        // Losing the person keeps the last known position.
        p.tick(None, Instant::now());
        let snapshot = board.snapshot();
        assert!(snapshot.starts_with("(:tracking nil :ticks 2"), "{}", snapshot);
        assert!(snapshot.contains(":position (0.0 0.0 1800.0)"));
    }

    #[test]
    fn test_centering_after_spin_stops_base() {
        let (_writer, _bus, mut p) = pipeline(Mode::Center);
        let t0 = Instant::now();
        let off = p.tick(Some(&make_frame(1000.0, 1000.0)), t0);
        assert!(matches!(off.centering, Some(CenteringEvent::NotCentered { .. })));
        let on = p.tick(Some(&make_frame(0.0, 1000.0)), t0);
        assert_eq!(on.centering, Some(CenteringEvent::Centered));
        assert_eq!(
            p.actuator_mut().drain(),
            vec![
                MotionCommand::Spin { velocity: 500, degrees: 45 },
                MotionCommand::Stop,
            ]
        );
    }
}
