//! Control message dispatch: parse s-expressions and route to handlers.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lexpr::Value;
use tracing::{debug, info, warn};

use crate::events::{EventBus, RobotEvent};
use crate::mode::{Mode, ModeWriter};
use crate::pipeline::StatusBoard;
use crate::sexp::{error_response, get_int, get_keyword, ok_response};

/// State shared by every control client.
pub struct ControlContext {
    pub mode: ModeWriter,
    pub bus: Arc<EventBus>,
    /// Effective configuration, pre-rendered.
    pub config_sexp: String,
    /// Pipeline snapshot, refreshed every tick.
    pub status: Arc<StatusBoard>,
}

/// Per-connection state.
#[derive(Default)]
pub struct Session {
    /// Live event feed, present after `:subscribe`.
    pub events: Option<Receiver<RobotEvent>>,
}

/// Parse a message and dispatch it.  Returns the response s-expression.
pub fn handle_message(ctx: &ControlContext, session: &mut Session, client_id: u64, raw: &str) -> String {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(client_id, "malformed s-expression: {}", e);
            return error_response(0, &format!("malformed s-expression: {e}"));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);
    debug!(client_id, msg_id, "control message {:?}", msg_type);

    match msg_type.as_deref() {
        Some("ping") => handle_ping(msg_id, &value),
        Some("set-mode") => handle_set_mode(ctx, client_id, msg_id, &value),
        Some("mode-status") => handle_mode_status(ctx, msg_id),
        Some("config-status") => handle_config_status(ctx, msg_id),
        Some("status") => handle_status(ctx, msg_id),
        Some("subscribe") => handle_subscribe(ctx, session, client_id, msg_id),
        Some("unsubscribe") => handle_unsubscribe(session, msg_id),
        Some(other) => error_response(msg_id, &format!("unknown message type: {other}")),
        None => error_response(msg_id, "missing :type field"),
    }
}

// ── Handlers ────────────────────────────────────────────────

fn handle_ping(msg_id: i64, value: &Value) -> String {
    let client_ts = get_int(value, "timestamp").unwrap_or(0);
    let server_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!(
        "(:type :response :id {} :status :ok :client-timestamp {} :server-timestamp {})",
        msg_id, client_ts, server_ts
    )
}

fn handle_set_mode(ctx: &ControlContext, client_id: u64, msg_id: i64, value: &Value) -> String {
    let Some(name) = get_keyword(value, "mode") else {
        return error_response(msg_id, "missing :mode");
    };
    let Some(mode) = Mode::parse(&name) else {
        return error_response(msg_id, &format!("unknown mode: {name}"));
    };
    let previous = ctx.mode.set(mode);
    if previous != mode {
        info!(client_id, "Mode {} -> {}", previous, mode);
        ctx.bus.publish(RobotEvent::ModeChanged {
            from: previous,
            to: mode,
        });
    }
    ok_response(msg_id)
}

fn handle_mode_status(ctx: &ControlContext, msg_id: i64) -> String {
    format!(
        "(:type :response :id {} :status :ok :mode :{})",
        msg_id,
        ctx.mode.get()
    )
}

fn handle_config_status(ctx: &ControlContext, msg_id: i64) -> String {
    format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id, ctx.config_sexp
    )
}

fn handle_status(ctx: &ControlContext, msg_id: i64) -> String {
    format!(
        "(:type :response :id {} :status :ok :pipeline {})",
        msg_id,
        ctx.status.snapshot()
    )
}

fn handle_subscribe(ctx: &ControlContext, session: &mut Session, client_id: u64, msg_id: i64) -> String {
    if session.events.is_none() {
        debug!(client_id, "client subscribed to events");
        session.events = Some(ctx.bus.subscribe());
    }
    ok_response(msg_id)
}

fn handle_unsubscribe(session: &mut Session, msg_id: i64) -> String {
    session.events = None;
    ok_response(msg_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{mode_cell, ModeReader};
    use crate::sexp::{get_value, number};

    fn context(initial: Mode) -> (ControlContext, ModeReader) {
        let (writer, reader) = mode_cell(initial);
        let ctx = ControlContext {
            mode: writer,
            bus: Arc::new(EventBus::new()),
            config_sexp: "(:standoff 1500)".to_string(),
            status: Arc::new(StatusBoard::new()),
        };
        (ctx, reader)
    }

    fn send(ctx: &ControlContext, session: &mut Session, raw: &str) -> Value {
        let reply = handle_message(ctx, session, 1, raw);
        lexpr::from_str(&reply).unwrap_or_else(|e| panic!("bad reply {}: {}", reply, e))
    }

    #[test]
    fn test_set_mode() {
        let (ctx, reader) = context(Mode::None);
        let mut session = Session::default();
        let reply = send(&ctx, &mut session, "(:type :set-mode :id 3 :mode :follow)");
        assert_eq!(get_keyword(&reply, "status"), Some("ok".to_string()));
        assert_eq!(get_int(&reply, "id"), Some(3));
        assert_eq!(reader.get(), Mode::Follow);
    }

    #[test]
    fn test_set_mode_publishes_change() {
        let (ctx, _reader) = context(Mode::None);
        let events = ctx.bus.subscribe();
        let mut session = Session::default();
        send(&ctx, &mut session, "(:type :set-mode :id 1 :mode :center)");
        send(&ctx, &mut session, "(:type :set-mode :id 2 :mode :center)");
        assert_eq!(
            events.try_recv().unwrap(),
            RobotEvent::ModeChanged {
                from: Mode::None,
                to: Mode::Center
            }
        );
        // Setting the same mode again is not a change.
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_set_mode_rejects_unknown() {
        let (ctx, reader) = context(Mode::Center);
        let mut session = Session::default();
        let reply = send(&ctx, &mut session, "(:type :set-mode :id 4 :mode :dance)");
        assert_eq!(get_keyword(&reply, "status"), Some("error".to_string()));
        assert_eq!(get_keyword(&reply, "reason"), Some("unknown mode: dance".to_string()));
        assert_eq!(reader.get(), Mode::Center);

        let reply = send(&ctx, &mut session, "(:type :set-mode :id 5)");
        assert_eq!(get_keyword(&reply, "reason"), Some("missing :mode".to_string()));
    }

    #[test]
    fn test_mode_status() {
        let (ctx, _reader) = context(Mode::Follow);
        let mut session = Session::default();
        let reply = send(&ctx, &mut session, "(:type :mode-status :id 9)");
        assert_eq!(get_keyword(&reply, "mode"), Some("follow".to_string()));
        assert_eq!(get_int(&reply, "id"), Some(9));
    }

    #[test]
    fn test_ping_echoes_timestamp() {
        let (ctx, _reader) = context(Mode::None);
        let mut session = Session::default();
        let reply = send(&ctx, &mut session, "(:type :ping :id 2 :timestamp 1234)");
        assert_eq!(get_keyword(&reply, "status"), Some("ok".to_string()));
        assert_eq!(get_int(&reply, "client-timestamp"), Some(1234));
        assert!(get_int(&reply, "server-timestamp").unwrap_or(0) > 0);
    }

    #[test]
    fn test_config_status() {
        let (ctx, _reader) = context(Mode::None);
        let mut session = Session::default();
        let reply = send(&ctx, &mut session, "(:type :config-status :id 6)");
        let config = get_value(&reply, "config").unwrap();
        assert_eq!(get_value(config, "standoff").and_then(number), Some(1500.0));
    }

    #[test]
    fn test_status_serves_latest_snapshot() {
        let (ctx, _reader) = context(Mode::None);
        let mut session = Session::default();
        ctx.status.publish("(:tracking t :ticks 12)".to_string());

        let reply = send(&ctx, &mut session, "(:type :status :id 11)");
        assert_eq!(get_keyword(&reply, "status"), Some("ok".to_string()));
        let pipeline = get_value(&reply, "pipeline").unwrap();
        assert_eq!(get_int(pipeline, "ticks"), Some(12));

        ctx.status.publish("(:tracking nil :ticks 13)".to_string());
        let reply = send(&ctx, &mut session, "(:type :status :id 12)");
        let pipeline = get_value(&reply, "pipeline").unwrap();
        assert_eq!(get_int(pipeline, "ticks"), Some(13));
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let (ctx, _reader) = context(Mode::None);
        let mut session = Session::default();
        send(&ctx, &mut session, "(:type :subscribe :id 1)");
        send(&ctx, &mut session, "(:type :subscribe :id 2)");
        assert_eq!(ctx.bus.subscriber_count(), 1);

        send(&ctx, &mut session, "(:type :set-mode :id 3 :mode :follow)");
        let feed = session.events.as_ref().unwrap();
        assert_eq!(feed.try_recv().unwrap().kind(), "mode-changed");

        send(&ctx, &mut session, "(:type :unsubscribe :id 4)");
        assert!(session.events.is_none());
    }

    #[test]
    fn test_errors() {
        let (ctx, _reader) = context(Mode::None);
        let mut session = Session::default();

        let reply = send(&ctx, &mut session, "(:type :warp :id 7)");
        assert_eq!(get_keyword(&reply, "reason"), Some("unknown message type: warp".to_string()));

        let reply = send(&ctx, &mut session, "(:id 8)");
        assert_eq!(get_keyword(&reply, "reason"), Some("missing :type field".to_string()));

        let reply = handle_message(&ctx, &mut session, 1, "(:type :ping");
        assert!(reply.contains(":status :error"));
        assert!(reply.contains("malformed"));
    }
}
