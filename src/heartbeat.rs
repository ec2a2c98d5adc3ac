//! Process-wide heartbeat scheduler.
//!
//! One periodic task ticks every `heartbeat_interval` and walks the live
//! sessions: each connected session gets a HEARTBEAT packet enqueued (flushed
//! immediately on streaming transports, on the next poll otherwise), and any
//! session whose last ack is older than `heartbeat_timeout` is torn down.
//!
//! The task holds only a [`Weak`] engine reference: dropping the engine ends
//! the ticker, and a tick racing a removed session is a harmless no-op.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;

use crate::{
    engine::SocketIo,
    handler::SocketIoHandler,
    packet::Packet,
    session::{DisconnectReason, SessionState},
};

pub(crate) fn spawn_scheduler<H: SocketIoHandler>(engine: &Arc<SocketIo<H>>) -> JoinHandle<()> {
    let interval = engine.config.heartbeat_interval;
    let timeout = engine.config.heartbeat_timeout;
    let engine: Weak<SocketIo<H>> = Arc::downgrade(engine);

    tokio::spawn(async move {
        tracing::debug!(?interval, "heartbeat scheduler started");
        let mut tick = tokio::time::interval(interval);
        tick.tick().await; // the first tick completes immediately
        loop {
            tick.tick().await;
            let Some(engine) = engine.upgrade() else {
                break;
            };
            for session in engine.sessions_snapshot() {
                match session.state() {
                    SessionState::Connected => {
                        if session.since_last_heartbeat() > timeout {
                            tracing::debug!(sid = ?session.sid, "heartbeat timeout");
                            engine.close_session(session.sid, DisconnectReason::HeartbeatTimeout);
                        } else {
                            session.send(Packet::heartbeat()).ok();
                        }
                    }
                    // handshaken but never bound: reap after the same timeout
                    SessionState::Connecting => {
                        if session.since_last_heartbeat() > timeout {
                            tracing::debug!(sid = ?session.sid, "session never bound a transport");
                            engine.close_session(session.sid, DisconnectReason::HeartbeatTimeout);
                        }
                    }
                    _ => {}
                }
            }
        }
        tracing::debug!("heartbeat scheduler stopped");
    })
}
