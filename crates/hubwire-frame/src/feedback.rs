use crate::codec::InboundMessage;
use crate::error::{FrameError, Result};
use crate::message_type::MessageType;

pub const BUFFER_EMPTY_COMMAND_IN_PROGRESS: u8 = 0x01;
pub const BUFFER_EMPTY_COMMAND_COMPLETED: u8 = 0x02;
pub const CURRENT_COMMAND_DISCARDED: u8 = 0x04;
pub const IDLE: u8 = 0x08;
pub const BUSY_OR_FULL: u8 = 0x10;
pub const EXECUTION_ERROR: u8 = 0x20;

/// Decoded feedback bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PortOutputCommandFeedback {
    pub buffer_empty_command_in_progress: bool,
    pub buffer_empty_command_completed: bool,
    pub current_command_discarded: bool,
    pub idle: bool,
    pub busy_or_full: bool,
    pub execution_error: bool,
}

impl PortOutputCommandFeedback {
    /// Decode a feedback byte. Unknown bits are ignored.
    pub fn from_byte(byte: u8) -> Self {
        Self {
            buffer_empty_command_in_progress: byte & BUFFER_EMPTY_COMMAND_IN_PROGRESS != 0,
            buffer_empty_command_completed: byte & BUFFER_EMPTY_COMMAND_COMPLETED != 0,
            current_command_discarded: byte & CURRENT_COMMAND_DISCARDED != 0,
            idle: byte & IDLE != 0,
            busy_or_full: byte & BUSY_OR_FULL != 0,
            execution_error: byte & EXECUTION_ERROR != 0,
        }
    }

    /// Re-encode the flags as a feedback byte.
    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.buffer_empty_command_in_progress {
            byte |= BUFFER_EMPTY_COMMAND_IN_PROGRESS;
        }
        if self.buffer_empty_command_completed {
            byte |= BUFFER_EMPTY_COMMAND_COMPLETED;
        }
        if self.current_command_discarded {
            byte |= CURRENT_COMMAND_DISCARDED;
        }
        if self.idle {
            byte |= IDLE;
        }
        if self.busy_or_full {
            byte |= BUSY_OR_FULL;
        }
        if self.execution_error {
            byte |= EXECUTION_ERROR;
        }
        byte
    }
}

/// Feedback for one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortFeedback {
    pub port_id: u8,
    pub feedback: PortOutputCommandFeedback,
}

/// A feedback notification. One message may report on several ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOutputCommandFeedbackMessage {
    pub feedbacks: Vec<PortFeedback>,
}

impl PortOutputCommandFeedbackMessage {
    /// Parse the `[port, feedback]*` payload.
    pub fn parse(message: &InboundMessage) -> Result<Self> {
        if message.message_type() != MessageType::PortOutputCommandFeedback {
            return Err(FrameError::UnexpectedMessageType {
                expected: MessageType::PortOutputCommandFeedback,
                actual: message.message_type(),
            });
        }

        let payload = message.payload.as_ref();
        if payload.is_empty() || payload.len() % 2 != 0 {
            return Err(FrameError::InvalidPayload(format!(
                "feedback payload must be non-empty port/feedback pairs, got {} bytes",
                payload.len()
            )));
        }

        let feedbacks = payload
            .chunks_exact(2)
            .map(|pair| PortFeedback {
                port_id: pair[0],
                feedback: PortOutputCommandFeedback::from_byte(pair[1]),
            })
            .collect();
        Ok(Self { feedbacks })
    }
}
