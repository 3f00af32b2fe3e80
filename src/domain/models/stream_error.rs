use std::fmt;
use std::io;

/// Failures that end a stream session. Only transport failures surface to the
/// caller; everything that goes wrong inside a single frame is a
/// [`DecodeWarning`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("{}", describe_transport(.status, .message))]
    Transport {
        status: Option<u16>,
        message: String,
    },
}

fn describe_transport(status: &Option<u16>, message: &str) -> String {
    if let Some(code) = status {
        return format!("transport error (HTTP {code}): {message}");
    }

    return format!("transport error: {message}");
}

impl StreamError {
    pub fn transport(message: impl Into<String>) -> StreamError {
        return StreamError::Transport {
            status: None,
            message: message.into(),
        };
    }

    pub fn status(status: u16, message: impl Into<String>) -> StreamError {
        return StreamError::Transport {
            status: Some(status),
            message: message.into(),
        };
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> StreamError {
        return StreamError::Transport {
            status: err.status().map(|status| return status.as_u16()),
            message: err.to_string(),
        };
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> io::Error {
        return io::Error::new(io::ErrorKind::Other, err);
    }
}

/// A single frame that could not be turned into a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    pub line: String,
    pub reason: String,
}

impl DecodeWarning {
    pub fn new(line: &str, reason: impl Into<String>) -> DecodeWarning {
        return DecodeWarning {
            line: line.to_string(),
            reason: reason.into(),
        };
    }
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}: {}", self.reason, self.line);
    }
}
