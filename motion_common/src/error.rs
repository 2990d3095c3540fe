//! Error types shared across the workspace.
//!
//! Mirrors the hand-rolled `Display`/`Error` style used throughout this
//! codebase rather than a derive macro: each variant carries a short,
//! human-readable message so logs read the same whether they come from
//! configuration loading, wire decoding, or the top-level server.

use std::fmt;

/// Errors that can occur while loading or validating `motion_server.toml`.
#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "ERR_CONFIG_IO: {msg}"),
            Self::Parse(msg) => write!(f, "ERR_CONFIG_PARSE: {msg}"),
            Self::Validation(msg) => write!(f, "ERR_CONFIG_VALIDATION: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors that can occur while decoding or encoding a `SimpleMessage` frame.
#[derive(Debug)]
pub enum ProtocolError {
    /// `header.msg_type` did not match any recognized message type.
    UnknownMessageType(u32),
    /// Fewer bytes were available than the message type requires.
    ShortRead { expected: usize, got: usize },
    /// The declared `prefix.length` does not fit in the receive buffer.
    MessageTooLarge { length: usize, max: usize },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMessageType(t) => write!(f, "ERR_PROTOCOL_UNKNOWN_MSGTYPE: {t}"),
            Self::ShortRead { expected, got } => {
                write!(f, "ERR_PROTOCOL_SHORT_READ: expected {expected}, got {got}")
            }
            Self::MessageTooLarge { length, max } => {
                write!(f, "ERR_PROTOCOL_MSGSIZE: length {length} exceeds max {max}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Top-level error type returned from `main` and from session setup.
#[derive(Debug)]
pub enum ServerError {
    Config(ConfigError),
    Protocol(ProtocolError),
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Protocol(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "ERR_IO: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ProtocolError> for ServerError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let e = ConfigError::Validation("cycle_time_us out of range".to_string());
        assert_eq!(e.to_string(), "ERR_CONFIG_VALIDATION: cycle_time_us out of range");
    }

    #[test]
    fn protocol_error_display() {
        let e = ProtocolError::ShortRead { expected: 44, got: 10 };
        assert_eq!(e.to_string(), "ERR_PROTOCOL_SHORT_READ: expected 44, got 10");
    }

    #[test]
    fn server_error_from_conversions() {
        let e: ServerError = ConfigError::Io("missing file".to_string()).into();
        assert!(matches!(e, ServerError::Config(ConfigError::Io(_))));

        let e: ServerError = ProtocolError::UnknownMessageType(99).into();
        assert!(matches!(e, ServerError::Protocol(ProtocolError::UnknownMessageType(99))));
    }
}
