use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use supersql_protocol::{ErrorResponse, ProtocolError};
use thiserror::Error;

use crate::session::SessionState;

/// Convenience alias for `Result<T, ClientError>`.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error classification callers branch on.
///
/// - `InvalidState` : operation illegal in the session's current state
/// - `NotFound`     : the engine reports the target table does not exist
/// - `Decode`       : a result value could not be decoded for its column type
/// - `EngineFailure`: any other engine-reported fault
/// - `Unsupported`  : operation has no meaning for this engine
/// - `Timeout`      : a caller deadline elapsed while waiting on the engine
/// - `Transport`    : I/O or framing failure talking to the engine
/// - `InvalidArgument`: bad address, parameters or configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidState,
    NotFound,
    Decode,
    EngineFailure,
    Unsupported,
    Timeout,
    Transport,
    InvalidArgument,
}

/// Raw failure payload as reported by the engine, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFault {
    pub code: u32,
    pub name: String,
    pub message: String,
}

impl From<ErrorResponse> for EngineFault {
    fn from(e: ErrorResponse) -> Self {
        Self {
            code: e.error_code,
            name: e.error_name,
            message: e.message,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid state: cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Not found: {object}")]
    NotFound { object: String, message: String },

    #[error("Decode error in column {column_index} ('{column_name}', wire type {wire_type}): {detail}")]
    Decode {
        column_index: usize,
        column_name: String,
        wire_type: i32,
        detail: String,
    },

    #[error("Engine failure [{}]: {}", .0.name, .0.message)]
    EngineFailure(EngineFault),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] ProtocolError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Transport(ProtocolError::Io(e))
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidState { .. } => ErrorKind::InvalidState,
            ClientError::NotFound { .. } => ErrorKind::NotFound,
            ClientError::Decode { .. } => ErrorKind::Decode,
            ClientError::EngineFailure(_) => ErrorKind::EngineFailure,
            ClientError::Unsupported(_) => ErrorKind::Unsupported,
            ClientError::Timeout { .. } => ErrorKind::Timeout,
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// The engine's own message for engine-originated errors.
    pub fn engine_message(&self) -> Option<&str> {
        match self {
            ClientError::NotFound { message, .. } => Some(message),
            ClientError::EngineFailure(fault) => Some(&fault.message),
            _ => None,
        }
    }

    /// Copy suitable for storing as a session's terminal error while the
    /// original is returned to the caller. I/O sources are flattened to text.
    pub(crate) fn duplicate(&self) -> ClientError {
        match self {
            ClientError::InvalidState { operation, state } => ClientError::InvalidState {
                operation,
                state: *state,
            },
            ClientError::NotFound { object, message } => ClientError::NotFound {
                object: object.clone(),
                message: message.clone(),
            },
            ClientError::Decode {
                column_index,
                column_name,
                wire_type,
                detail,
            } => ClientError::Decode {
                column_index: *column_index,
                column_name: column_name.clone(),
                wire_type: *wire_type,
                detail: detail.clone(),
            },
            ClientError::EngineFailure(fault) => ClientError::EngineFailure(fault.clone()),
            ClientError::Unsupported(s) => ClientError::Unsupported(s.clone()),
            ClientError::Timeout { operation, after } => ClientError::Timeout {
                operation,
                after: *after,
            },
            ClientError::Transport(e) => {
                ClientError::Transport(ProtocolError::Corruption(e.to_string()))
            }
            ClientError::InvalidArgument(s) => ClientError::InvalidArgument(s.clone()),
        }
    }
}

fn missing_table_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Table '(.*)' does not exist").unwrap())
}

/// Turn an engine fault into a typed error.
///
/// Only the `Table '<name>' does not exist` message shape becomes
/// `NotFound`. Everything else is an `EngineFailure` carrying the raw payload.
pub fn classify_engine_error(fault: EngineFault) -> ClientError {
    if let Some(caps) = missing_table_pattern().captures(&fault.message) {
        let object = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        return ClientError::NotFound {
            object,
            message: fault.message,
        };
    }
    ClientError::EngineFailure(fault)
}

/// Whether `message` reports that `table` (possibly catalog/schema
/// qualified by the engine) does not exist.
pub fn reports_missing_table(message: &str, table: &str) -> bool {
    let pattern = format!(r"Table '.*{}' does not exist", regex::escape(table));
    Regex::new(&pattern)
        .map(|re| re.is_match(message))
        .unwrap_or(false)
}
