use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::message::RawMessage;
use crate::message_type::MessageType;

/// Hub id byte. Always zero in this protocol profile.
pub const HUB_ID: u8 = 0x00;

/// Lengths at or above this value need the two-byte length header.
pub const MAX_SHORT_LENGTH: usize = 127;

/// Short header: length (1) + hub id (1) + message type (1).
pub const SHORT_HEADER_SIZE: usize = 3;

/// Decoded inbound header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message type byte.
    pub message_type: MessageType,
}

/// A dissected inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Decoded header.
    pub header: MessageHeader,
    /// Everything after the message type byte.
    pub payload: Bytes,
}

impl InboundMessage {
    /// Shorthand for `self.header.message_type`.
    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }
}

/// Encode a message into the short-header wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────┬──────────────┬──────────────────┐
/// │ Length (1B)  │ Hub (1B) │ Type (1B)    │ Payload          │
/// │ payload + 1  │ 0x00     │              │                  │
/// └──────────────┴──────────┴──────────────┴──────────────────┘
/// ```
///
/// The length byte counts the payload and the message type byte only.
/// Messages that need the two-byte length form fail with
/// [`FrameError::MessageTooLarge`].
pub fn encode_message(message: &RawMessage, dst: &mut BytesMut) -> Result<()> {
    let length = message.payload.len() + 1;
    if length >= MAX_SHORT_LENGTH {
        return Err(FrameError::MessageTooLarge {
            length,
            max: MAX_SHORT_LENGTH,
        });
    }

    dst.reserve(SHORT_HEADER_SIZE + message.payload.len());
    dst.put_u8(length as u8);
    dst.put_u8(HUB_ID);
    dst.put_u8(message.message_type.as_u8());
    dst.put_slice(&message.payload);
    Ok(())
}

/// Encode a message into a fresh packet.
pub fn frame_message(message: &RawMessage) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(SHORT_HEADER_SIZE + message.payload.len());
    encode_message(message, &mut buf)?;
    trace!(
        message_type = %message.message_type,
        len = buf.len(),
        "framed message"
    );
    Ok(buf.freeze())
}

/// Dissect one inbound notification buffer.
///
/// A first byte of 127 or more selects the two-byte length header. The hub
/// id byte follows the length header, then the message type; the payload
/// is everything after the type byte.
pub fn dissect(buf: Bytes) -> Result<InboundMessage> {
    let Some(&first) = buf.first() else {
        return Err(FrameError::Truncated {
            needed: SHORT_HEADER_SIZE,
            actual: 0,
        });
    };

    let header_len = if first as usize >= MAX_SHORT_LENGTH { 2 } else { 1 };
    let type_offset = header_len + 1;
    if buf.len() <= type_offset {
        return Err(FrameError::Truncated {
            needed: type_offset + 1,
            actual: buf.len(),
        });
    }

    let raw_type = buf[type_offset];
    let message_type =
        MessageType::from_u8(raw_type).ok_or(FrameError::UnknownMessageType(raw_type))?;

    Ok(InboundMessage {
        header: MessageHeader { message_type },
        payload: buf.slice(type_offset + 1..),
    })
}
