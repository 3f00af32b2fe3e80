#[cfg(test)]
#[path = "stream_event_test.rs"]
mod tests;

use serde_json::Value;

use super::DecodeWarning;

const DELTA_POINTER: &str = "/choices/0/delta/content";

/// One `data:` payload pulled off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub raw: String,
    pub body: Option<Value>,
    pub delta: Option<String>,
}

impl StreamEvent {
    /// Parses a payload without ever failing. Anything other than a string at
    /// `choices[0].delta.content` leaves `delta` empty.
    pub fn parse(payload: &str) -> StreamEvent {
        let body = serde_json::from_str::<Value>(payload).ok();
        let delta = body
            .as_ref()
            .and_then(|value| return value.pointer(DELTA_POINTER))
            .and_then(|content| return content.as_str())
            .map(|content| return content.to_string());

        return StreamEvent {
            raw: payload.to_string(),
            body,
            delta,
        };
    }

    /// The delta when it carries text, otherwise the reason it was skipped.
    pub fn text_delta(&self) -> Result<&str, DecodeWarning> {
        if self.body.is_none() {
            return Err(DecodeWarning::new(&self.raw, "payload is not valid JSON"));
        }

        match self.delta.as_deref() {
            Some(delta) if !delta.is_empty() => return Ok(delta),
            Some(_) => return Err(DecodeWarning::new(&self.raw, "delta content is empty")),
            None => {
                return Err(DecodeWarning::new(
                    &self.raw,
                    "missing choices[0].delta.content",
                ))
            }
        }
    }
}
