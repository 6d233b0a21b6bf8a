use std::fmt;

use crate::codec::InboundMessage;
use crate::error::{FrameError, Result};
use crate::message_type::MessageType;

/// Reason code carried by a generic error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GenericErrorCode {
    Ack = 0x01,
    Mack = 0x02,
    BufferOverflow = 0x03,
    Timeout = 0x04,
    CommandNotRecognized = 0x05,
    InvalidUse = 0x06,
    Overcurrent = 0x07,
    InternalError = 0x08,
}

impl GenericErrorCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        let code = match value {
            0x01 => Self::Ack,
            0x02 => Self::Mack,
            0x03 => Self::BufferOverflow,
            0x04 => Self::Timeout,
            0x05 => Self::CommandNotRecognized,
            0x06 => Self::InvalidUse,
            0x07 => Self::Overcurrent,
            0x08 => Self::InternalError,
            _ => return None,
        };
        Some(code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Mack => "mack",
            Self::BufferOverflow => "buffer-overflow",
            Self::Timeout => "timeout",
            Self::CommandNotRecognized => "command-not-recognized",
            Self::InvalidUse => "invalid-use",
            Self::Overcurrent => "overcurrent",
            Self::InternalError => "internal-error",
        }
    }
}

/// Hub-reported rejection of a command type.
///
/// Carries no per-command identifier: it names the rejected message type
/// and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericErrorMessage {
    pub command_type: MessageType,
    pub code: GenericErrorCode,
}

impl GenericErrorMessage {
    /// Parse the `[command type, code]` payload.
    pub fn parse(message: &InboundMessage) -> Result<Self> {
        if message.message_type() != MessageType::GenericError {
            return Err(FrameError::UnexpectedMessageType {
                expected: MessageType::GenericError,
                actual: message.message_type(),
            });
        }

        let payload = message.payload.as_ref();
        if payload.len() < 2 {
            return Err(FrameError::Truncated {
                needed: 2,
                actual: payload.len(),
            });
        }

        let command_type = MessageType::from_u8(payload[0]).ok_or_else(|| {
            FrameError::InvalidPayload(format!("unknown command type 0x{:02x}", payload[0]))
        })?;
        let code = GenericErrorCode::from_u8(payload[1]).ok_or_else(|| {
            FrameError::InvalidPayload(format!("unknown error code 0x{:02x}", payload[1]))
        })?;

        Ok(Self { command_type, code })
    }
}

impl fmt::Display for GenericErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rejected: {}", self.command_type, self.code.name())
    }
}
