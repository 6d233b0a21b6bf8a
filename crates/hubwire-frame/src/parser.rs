use crate::codec::InboundMessage;
use crate::error::Result;
use crate::feedback::PortOutputCommandFeedbackMessage;
use crate::generic_error::GenericErrorMessage;
use crate::hub_property::HubPropertyReply;
use crate::message_type::MessageType;

/// Turns one inbound message of a fixed type into a typed reply.
pub trait MessageParser: Send + Sync + 'static {
    /// Parsed output.
    type Output: Clone + Send + Sync + 'static;

    /// The only message type this parser accepts.
    const MESSAGE_TYPE: MessageType;

    /// Parse a message whose type equals [`Self::MESSAGE_TYPE`].
    fn parse(&self, message: &InboundMessage) -> Result<Self::Output>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenericErrorParser;

impl MessageParser for GenericErrorParser {
    type Output = GenericErrorMessage;
    const MESSAGE_TYPE: MessageType = MessageType::GenericError;

    fn parse(&self, message: &InboundMessage) -> Result<Self::Output> {
        GenericErrorMessage::parse(message)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackParser;

impl MessageParser for FeedbackParser {
    type Output = PortOutputCommandFeedbackMessage;
    const MESSAGE_TYPE: MessageType = MessageType::PortOutputCommandFeedback;

    fn parse(&self, message: &InboundMessage) -> Result<Self::Output> {
        PortOutputCommandFeedbackMessage::parse(message)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HubPropertyReplyParser;

impl MessageParser for HubPropertyReplyParser {
    type Output = HubPropertyReply;
    const MESSAGE_TYPE: MessageType = MessageType::HubProperties;

    fn parse(&self, message: &InboundMessage) -> Result<Self::Output> {
        HubPropertyReply::parse(message)
    }
}
