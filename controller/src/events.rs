//! Event fan-out from the pipeline to any number of observers.
//!
//! Producers never wait on consumers: each subscriber gets its own
//! unbounded channel, and subscribers that hung up are pruned on the next
//! publish.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use tracing::debug;

use crate::gesture::GestureEvent;
use crate::locator::CenteringEvent;
use crate::mode::Mode;

/// Everything observable from outside the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotEvent {
    Gesture(GestureEvent),
    Centering(CenteringEvent),
    ModeChanged { from: Mode, to: Mode },
}

impl RobotEvent {
    /// Event name used on the control socket.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gesture(_) => "gesture",
            Self::Centering(CenteringEvent::Centered) => "person-centered",
            Self::Centering(CenteringEvent::NotCentered { .. }) => "person-not-centered",
            Self::ModeChanged { .. } => "mode-changed",
        }
    }

    /// Generate s-expression for IPC event delivery.
    pub fn to_sexp(&self) -> String {
        match self {
            Self::Gesture(e) => format!(
                "(:type :event :event :{} :gesture \"{}\" :timestamp {})",
                self.kind(),
                e.gesture,
                e.timestamp_ms
            ),
            Self::Centering(CenteringEvent::Centered) => {
                format!("(:type :event :event :{})", self.kind())
            }
            Self::Centering(CenteringEvent::NotCentered { offset_deg }) => format!(
                "(:type :event :event :{} :offset {:.1})",
                self.kind(),
                offset_deg
            ),
            Self::ModeChanged { from, to } => format!(
                "(:type :event :event :{} :from :{} :to :{})",
                self.kind(),
                from,
                to
            ),
        }
    }
}

/// Publish/subscribe point for [`RobotEvent`]s.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<RobotEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> Receiver<RobotEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: RobotEvent) {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        let dropped = before - subscribers.len();
        if dropped > 0 {
            debug!("Event bus: pruned {} closed subscriber(s)", dropped);
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<RobotEvent>>> {
        // A panicking subscriber cannot leave the sender list half-updated.
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture(name: &str) -> RobotEvent {
        RobotEvent::Gesture(GestureEvent {
            gesture: name.to_string(),
            timestamp_ms: 5,
        })
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(gesture("up-up"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_fan_out() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(gesture("up-up"));
        assert_eq!(a.try_recv().unwrap(), gesture("up-up"));
        assert_eq!(b.try_recv().unwrap(), gesture("up-up"));
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn test_closed_subscriber_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(RobotEvent::Centering(CenteringEvent::Centered));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn test_event_sexp() {
        assert_eq!(
            gesture("up-up").to_sexp(),
            "(:type :event :event :gesture :gesture \"up-up\" :timestamp 5)"
        );
        assert_eq!(
            RobotEvent::Centering(CenteringEvent::NotCentered { offset_deg: 20.0 }).to_sexp(),
            "(:type :event :event :person-not-centered :offset 20.0)"
        );
        assert_eq!(
            RobotEvent::ModeChanged {
                from: Mode::None,
                to: Mode::Follow
            }
            .to_sexp(),
            "(:type :event :event :mode-changed :from :none :to :follow)"
        );
    }
}
