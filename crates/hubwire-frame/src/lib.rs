//! Packet framing and message codecs for the hub control protocol.
//!
//! Every outbound packet uses the short header form:
//! - 1 byte length (payload length + 1)
//! - 1 byte hub id (always `0x00`)
//! - 1 byte message type
//!
//! Messages whose length cannot be expressed in one byte are rejected rather
//! than framed with the long header. Inbound buffers are dissected with
//! either header form. This crate has no runtime dependencies.

pub mod codec;
pub mod error;
pub mod feedback;
pub mod generic_error;
pub mod hub_property;
pub mod message;
pub mod message_type;
pub mod parser;
pub mod port_output;

pub use codec::{
    dissect, encode_message, frame_message, InboundMessage, MessageHeader, HUB_ID,
    MAX_SHORT_LENGTH,
};
pub use error::{FrameError, Result};
pub use feedback::{PortFeedback, PortOutputCommandFeedback, PortOutputCommandFeedbackMessage};
pub use generic_error::{GenericErrorCode, GenericErrorMessage};
pub use hub_property::{HubProperty, HubPropertyOperation, HubPropertyReply, HubPropertyValue};
pub use message::{RawMessage, RawPortOutputCommandMessage};
pub use message_type::MessageType;
pub use parser::{
    FeedbackParser, GenericErrorParser, HubPropertyReplyParser, MessageParser,
};
pub use port_output::{
    CompletionMode, MotorEndState, MotorProfile, PortCommandOptions, StartupMode,
};
