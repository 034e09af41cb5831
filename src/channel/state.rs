//! Observable channel state and the error taxonomy

use thiserror::Error;

use super::events::Reading;

/// What a caller of the channel observes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelState {
    pub reading: Option<Reading>,
    pub connecting: bool,
    pub error: Option<String>,
}

/// Lifecycle of the current session
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// No session: inputs incomplete or channel closed
    Idle,
    Connecting,
    /// Authenticated, subscribe request sent
    Subscribing,
    Active,
    /// Closed cleanly by either side; not an error
    Closed,
    Failed(ChannelError),
}

/// Terminal failures of a session, rendered as user-facing strings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Authentication failed: your session is missing, expired or was rejected. Please sign in again.")]
    Authentication,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Disconnected: {0}")]
    Disconnected(String),
}

/// Substrings that mark a connect failure as an authentication problem
const AUTH_MARKERS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "authenticat",
    "authoriz",
    "token",
    "jwt",
    "expired",
];

/// Disconnect reasons that are a normal close rather than a failure
pub const CLEAN_DISCONNECT_REASONS: &[&str] = &["io client disconnect", "io server disconnect"];

/// Classify a connect failure message.
pub fn classify_connect_error(message: &str) -> ChannelError {
    let lowered = message.to_lowercase();
    if AUTH_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        ChannelError::Authentication
    } else {
        ChannelError::Connection(message.to_string())
    }
}

pub fn is_clean_disconnect(reason: &str) -> bool {
    CLEAN_DISCONNECT_REASONS.contains(&reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_empty() {
        let state = ChannelState::default();
        assert_eq!(state.reading, None);
        assert!(!state.connecting);
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_auth_failures_are_classified() {
        for message in [
            "Unexpected response 401",
            "HTTP error: 403 Forbidden",
            "Unauthorized",
            "jwt expired",
            "Invalid token",
            "Authentication error",
        ] {
            assert_eq!(
                classify_connect_error(message),
                ChannelError::Authentication,
                "{message}"
            );
        }
    }

    #[test]
    fn test_other_failures_are_connection_errors() {
        let err = classify_connect_error("Connection refused (os error 111)");
        assert_eq!(
            err,
            ChannelError::Connection("Connection refused (os error 111)".to_string())
        );
        assert!(err.to_string().starts_with("Connection error:"));
    }

    #[test]
    fn test_certificate_authority_is_not_an_auth_failure() {
        let message = "invalid peer certificate: unknown certificate authority";
        assert_eq!(
            classify_connect_error(message),
            ChannelError::Connection(message.to_string())
        );
        assert_eq!(
            classify_connect_error("Not authorized to read this device"),
            ChannelError::Authentication
        );
    }

    #[test]
    fn test_clean_disconnect_reasons() {
        assert!(is_clean_disconnect("io client disconnect"));
        assert!(is_clean_disconnect("io server disconnect"));
        assert!(!is_clean_disconnect("transport close"));
        assert!(!is_clean_disconnect("ping timeout"));
    }
}
