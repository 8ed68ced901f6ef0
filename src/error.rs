//! Error types crossing the request pipeline boundary.

use std::error::Error;
use std::fmt;

/// Failure of a single remote call.
///
/// Exactly one attempt is made per call; none of these variants trigger an
/// automatic retry. Mutation code converts them into a notification after
/// rollback; they are not re-thrown past the mutation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Transport-level failure: no response was received at all.
    Network(String),
    /// The server responded with a non-success status. `message` carries the
    /// server's structured `error` field verbatim when present, so callers
    /// can present it as-is.
    Rejected { status: u16, message: Option<String> },
    /// The call succeeded but the success payload did not decode into the
    /// expected shape.
    Decode(String),
}

impl RequestError {
    /// The server-provided error message, if the server sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            RequestError::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Network(reason) => write!(f, "network error: {}", reason),
            RequestError::Rejected { status, message } => match message {
                Some(msg) => write!(f, "request rejected ({}): {}", status, msg),
                None => write!(f, "request rejected ({})", status),
            },
            RequestError::Decode(reason) => write!(f, "malformed response: {}", reason),
        }
    }
}

impl Error for RequestError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_server_message() {
        let err = RequestError::Rejected {
            status: 422,
            message: Some("title is required".into()),
        };
        assert_eq!(err.to_string(), "request rejected (422): title is required");
        assert_eq!(err.server_message(), Some("title is required"));
    }

    #[test]
    fn network_error_has_no_server_message() {
        let err = RequestError::Network("connection refused".into());
        assert_eq!(err.server_message(), None);
    }
}
