#[cfg(test)]
#[path = "stream_session_test.rs"]
mod tests;

use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Local;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        return *self != SessionStatus::Active;
    }
}

/// Shared view of a session's cancellation signal. Cloning hands the same
/// signal to the transport or UI side.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> CancelHandle {
        return CancelHandle::default();
    }

    /// Safe to call any number of times, from anywhere.
    pub fn request_cancellation(&self) {
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        return self.token.is_cancelled();
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// One streaming generation from request to terminal state.
#[derive(Debug)]
pub struct StreamSession {
    id: String,
    text: String,
    status: SessionStatus,
    cancel: CancelHandle,
    started_at: DateTime<Local>,
    ended_at: Option<DateTime<Local>>,
    clock: Instant,
    elapsed: Option<Duration>,
}

impl Default for StreamSession {
    fn default() -> StreamSession {
        return StreamSession::new();
    }
}

impl StreamSession {
    pub fn new() -> StreamSession {
        return StreamSession {
            id: StreamSession::create_id(),
            text: "".to_string(),
            status: SessionStatus::Active,
            cancel: CancelHandle::new(),
            started_at: Local::now(),
            ended_at: None,
            clock: Instant::now(),
            elapsed: None,
        };
    }

    pub fn create_id() -> String {
        return Uuid::new_v4()
            .to_string()
            .split('-')
            .take(2)
            .collect::<Vec<&str>>()
            .join("-");
    }

    pub fn id(&self) -> &str {
        return &self.id;
    }

    pub fn text(&self) -> &str {
        return &self.text;
    }

    pub fn status(&self) -> SessionStatus {
        return self.status;
    }

    pub fn started_at(&self) -> DateTime<Local> {
        return self.started_at;
    }

    pub fn ended_at(&self) -> Option<DateTime<Local>> {
        return self.ended_at;
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        return self.cancel.clone();
    }

    pub fn is_cancel_requested(&self) -> bool {
        return self.cancel.is_requested();
    }

    /// Appends a delta while the session is active. Returns false once the
    /// session is frozen.
    pub fn append(&mut self, delta: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        self.text += delta;
        return true;
    }

    /// Moves the session into its terminal state. Only the first call wins.
    pub fn finish(&mut self, status: SessionStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }

        self.status = status;
        self.ended_at = Some(Local::now());
        self.elapsed = Some(self.clock.elapsed());
        return true;
    }

    /// Time spent so far, frozen at the terminal transition.
    pub fn elapsed(&self) -> Duration {
        if let Some(elapsed) = self.elapsed {
            return elapsed;
        }

        return self.clock.elapsed();
    }
}

/// What the terminal callback receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOutcome {
    pub session_id: String,
    pub text: String,
    pub status: SessionStatus,
    pub elapsed: Duration,
    pub warnings: usize,
}

impl StreamOutcome {
    pub fn from_session(session: &StreamSession, warnings: usize) -> StreamOutcome {
        return StreamOutcome {
            session_id: session.id().to_string(),
            text: session.text().to_string(),
            status: session.status(),
            elapsed: session.elapsed(),
            warnings,
        };
    }
}
