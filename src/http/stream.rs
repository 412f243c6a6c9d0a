//! SSE stream sessions and heartbeat production.
//!
//! Each open `/mcp/stream` connection gets its own session and heartbeat
//! timer; sessions share nothing with the correlator or the supervisor, so
//! a stalled subprocess never delays a heartbeat.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Payload of one heartbeat event.
#[derive(Debug, Serialize)]
struct Heartbeat {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: i64,
}

/// One session per open SSE connection.
pub struct StreamSession {
    pub session_id: Uuid,
    pub opened_at: DateTime<Utc>,
    token: CancellationToken,
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        debug!(session_id = %self.session_id, "stream session closed");
    }
}

/// Manages long-lived SSE connections and server-side cancellation.
pub struct StreamChannel {
    heartbeat_interval: Duration,
    shutdown: CancellationToken,
}

impl StreamChannel {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn open(&self) -> StreamSession {
        let session = StreamSession {
            session_id: Uuid::new_v4(),
            opened_at: Utc::now(),
            token: self.shutdown.child_token(),
        };
        info!(session_id = %session.session_id, "stream session opened");
        session
    }

    /// End every open session. Streams terminate cleanly, not with an error.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// An infinite heartbeat stream for one session. The first event fires
    /// immediately; the stream ends when the session is cancelled (client
    /// disconnect drops it, server shutdown cancels its token).
    pub fn heartbeat_stream(
        &self,
        session: StreamSession,
    ) -> impl Stream<Item = std::result::Result<Event, Infallible>> + Send + 'static {
        let interval = tokio::time::interval(self.heartbeat_interval);
        futures::stream::unfold((session, interval), |(session, mut interval)| async move {
            tokio::select! {
                biased;
                _ = session.token.cancelled() => None,
                _ = interval.tick() => {
                    let payload = Heartbeat {
                        kind: "heartbeat",
                        timestamp: Utc::now().timestamp(),
                    };
                    let data = serde_json::to_string(&payload).unwrap_or_default();
                    Some((Ok(Event::default().data(data)), (session, interval)))
                }
            }
        })
    }
}
