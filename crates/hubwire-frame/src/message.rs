use bytes::Bytes;

use crate::message_type::MessageType;

/// An outbound message before framing.
///
/// Built by feature-level factories and consumed once by the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message type byte.
    pub message_type: MessageType,
    /// Bytes following the message type.
    pub payload: Bytes,
}

impl RawMessage {
    /// Create a new message.
    pub fn new(message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
        }
    }
}

/// A port output command, routed to the lane of its port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPortOutputCommandMessage {
    /// The framed message (type is always [`MessageType::PortOutputCommand`]).
    pub message: RawMessage,
    /// Port the command addresses.
    pub port_id: u8,
    /// Whether the hub was asked to report command feedback.
    pub wait_for_feedback: bool,
}

impl RawPortOutputCommandMessage {
    /// Create a port output command from its payload.
    ///
    /// The payload starts with the port id and the startup/completion byte.
    pub fn new(port_id: u8, wait_for_feedback: bool, payload: impl Into<Bytes>) -> Self {
        Self {
            message: RawMessage::new(MessageType::PortOutputCommand, payload),
            port_id,
            wait_for_feedback,
        }
    }
}

impl From<RawPortOutputCommandMessage> for RawMessage {
    fn from(value: RawPortOutputCommandMessage) -> Self {
        value.message
    }
}
