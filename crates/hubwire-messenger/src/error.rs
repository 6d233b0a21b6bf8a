use std::time::Duration;

use hubwire_frame::{FrameError, GenericErrorMessage};
use hubwire_transport::TransportError;

use crate::task::PortCommandState;

/// Errors surfaced as the terminal error of a command.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    /// No settlement within one attempt's window, after all retries.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The hub rejected a command of this message type.
    #[error("hub rejected command: {0}")]
    Protocol(GenericErrorMessage),

    /// The physical write failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The message could not be framed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A port output command moved between states it must never connect.
    #[error("invalid port command transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: PortCommandState,
        to: PortCommandState,
    },

    /// The reply stream ended because the hub disconnected.
    #[error("hub disconnected")]
    Disconnected,

    /// The messenger or lane was disposed before the command could run.
    #[error("messenger disposed")]
    Disposed,

    /// Configuration value rejected.
    #[error("invalid {field}: {reason}")]
    Config { field: &'static str, reason: String },

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    ConfigLoad(String),
}

impl MessengerError {
    /// Whether the queue's retry policy applies to this error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, MessengerError>;
