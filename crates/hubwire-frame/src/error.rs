use crate::message_type::MessageType;

/// Errors that can occur while framing or dissecting messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The message does not fit the single-byte length header.
    #[error("message too large (length {length}, must be below {max})")]
    MessageTooLarge { length: usize, max: usize },

    /// The buffer ended before the header or payload was complete.
    #[error("truncated message ({actual} bytes, need at least {needed})")]
    Truncated { needed: usize, actual: usize },

    /// The message type byte is not part of the protocol.
    #[error("unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),

    /// A parser was handed a message of the wrong type.
    #[error("expected {expected} message, got {actual}")]
    UnexpectedMessageType {
        expected: MessageType,
        actual: MessageType,
    },

    /// The payload does not match the layout of its message type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
