#[cfg(test)]
#[path = "decoder_test.rs"]
mod tests;

use std::io;

use futures::TryStreamExt;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

use crate::domain::models::ChunkStream;
use crate::domain::models::DecodeWarning;
use crate::domain::models::Event;
use crate::domain::models::SessionStatus;
use crate::domain::models::StreamError;
use crate::domain::models::StreamEvent;
use crate::domain::models::StreamOutcome;
use crate::domain::models::StreamSession;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Recovers the transport error carried through the line reader.
fn transport_error(err: io::Error) -> StreamError {
    let message = err.to_string();
    match err.into_inner().map(|inner| return inner.downcast::<StreamError>()) {
        Some(Ok(stream_err)) => return *stream_err,
        _ => return StreamError::transport(message),
    }
}

#[derive(Debug, PartialEq)]
pub enum Frame {
    Delta(StreamEvent),
    Done,
    Skipped(DecodeWarning),
}

/// Classifies a single line. Blank lines and lines without the `data: `
/// prefix yield `None`.
pub fn parse_line(line: &str) -> Option<Frame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let payload = trimmed.strip_prefix(DATA_PREFIX)?;
    if payload == DONE_SENTINEL {
        return Some(Frame::Done);
    }

    let event = StreamEvent::parse(payload);
    if let Err(warning) = event.text_delta() {
        return Some(Frame::Skipped(warning));
    }

    return Some(Frame::Delta(event));
}

enum Flow {
    Continue,
    Stop(SessionStatus),
}

/// Drives one [`StreamSession`] from a raw chunk stream to a terminal state,
/// emitting a `StreamDelta` per decoded delta and a single `StreamFinished`.
pub struct StreamingCompletionDecoder<'a> {
    session: &'a mut StreamSession,
    tx: &'a mpsc::UnboundedSender<Event>,
    warnings: usize,
}

impl<'a> StreamingCompletionDecoder<'a> {
    pub fn new(
        session: &'a mut StreamSession,
        tx: &'a mpsc::UnboundedSender<Event>,
    ) -> StreamingCompletionDecoder<'a> {
        return StreamingCompletionDecoder {
            session,
            tx,
            warnings: 0,
        };
    }

    /// Consumes `stream` until the sentinel, end of stream, cancellation, or
    /// a transport error. Only the latter is returned as an error.
    pub async fn decode(mut self, stream: ChunkStream) -> Result<StreamOutcome, StreamError> {
        let cancel = self.session.cancel_handle();
        // Lines stay raw bytes until complete, so a multi-byte character cut
        // by a chunk boundary is never decoded early. The unterminated tail
        // comes back once the producer ends.
        let reader = StreamReader::new(stream.map_err(io::Error::from).map_ok(io::Cursor::new));
        let mut lines = reader.split(b'\n');

        loop {
            if cancel.is_requested() {
                return Ok(self.finish(SessionStatus::Cancelled));
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.finish(SessionStatus::Cancelled));
                }
                next = lines.next_segment() => next,
            };

            match next {
                Ok(None) => {
                    return Ok(self.finish(SessionStatus::Completed));
                }
                Err(err) => {
                    let err = transport_error(err);
                    tracing::error!(
                        session = self.session.id(),
                        error = %err,
                        "Stream dropped before completion"
                    );
                    self.finish(SessionStatus::Failed);
                    return Err(err);
                }
                Ok(Some(segment)) => {
                    let line = String::from_utf8_lossy(&segment);
                    if let Flow::Stop(status) = self.process_line(&line) {
                        return Ok(self.finish(status));
                    }
                }
            }
        }
    }

    /// Ends a session whose cancellation arrived before the stream opened.
    pub fn cancel(mut self) -> StreamOutcome {
        return self.finish(SessionStatus::Cancelled);
    }

    /// Ends a session whose stream could not be opened.
    pub fn fail(mut self, err: StreamError) -> StreamError {
        tracing::error!(session = self.session.id(), error = %err, "Stream failed to open");
        self.finish(SessionStatus::Failed);
        return err;
    }

    fn process_line(&mut self, line: &str) -> Flow {
        if self.session.is_cancel_requested() {
            return Flow::Stop(SessionStatus::Cancelled);
        }

        match parse_line(line) {
            None => {
                return Flow::Continue;
            }
            Some(Frame::Done) => {
                return Flow::Stop(SessionStatus::Completed);
            }
            Some(Frame::Skipped(warning)) => {
                self.warnings += 1;
                tracing::warn!(
                    session = self.session.id(),
                    reason = warning.reason.as_str(),
                    line = warning.line.as_str(),
                    "Skipped stream event"
                );
                return Flow::Continue;
            }
            Some(Frame::Delta(event)) => {
                let delta = event.delta.unwrap_or_default();
                self.session.append(&delta);
                tracing::debug!(session = self.session.id(), delta = delta.as_str(), "Stream delta");

                self.emit(Event::StreamDelta {
                    session_id: self.session.id().to_string(),
                    delta,
                    accumulated: self.session.text().to_string(),
                });
                return Flow::Continue;
            }
        }
    }

    fn finish(&mut self, status: SessionStatus) -> StreamOutcome {
        self.session.finish(status);

        let outcome = StreamOutcome::from_session(self.session, self.warnings);
        tracing::debug!(
            session = outcome.session_id.as_str(),
            status = %outcome.status,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            warnings = outcome.warnings,
            "Stream finished"
        );

        self.emit(Event::StreamFinished(outcome.clone()));
        return outcome;
    }

    fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::debug!(session = self.session.id(), "No listener for stream events");
        }
    }
}
