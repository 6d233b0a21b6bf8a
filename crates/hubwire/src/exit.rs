use std::fmt;

use hubwire_frame::FrameError;
use hubwire_messenger::MessengerError;
use hubwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => CliError::new(INTERNAL, format!("{context}: {source}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn messenger_error(context: &str, err: MessengerError) -> CliError {
    match err {
        MessengerError::Transport(err) => transport_error(context, err),
        MessengerError::Frame(err) => frame_error(context, err),
        MessengerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        MessengerError::Config { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        MessengerError::ConfigLoad(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        MessengerError::Disconnected | MessengerError::Protocol(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
