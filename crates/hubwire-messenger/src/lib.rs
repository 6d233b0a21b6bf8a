//! Outbound messaging core for the hub control protocol.
//!
//! Commands flow from the [`OutboundMessenger`] into a lane: the generic
//! lane, or the lane of the addressed port. Each lane runs its tasks one at
//! a time against a single [`OutboundChannel`], which serializes every
//! physical write. Inbound notifications are dissected once by the
//! [`ReplyDispatcher`] and fanned out as typed reply channels; port output
//! command feedback is matched back to the waiting command per port.
//!
//! All work runs on the ambient tokio runtime. Constructors spawn their
//! pumps, so they must be called from within a runtime.

pub mod channel;
pub mod config;
pub mod error;
mod feedback;
pub mod inbound;
pub mod lanes;
pub mod messenger;
pub mod queue;
pub mod result;
pub mod task;

pub use channel::{BeforeSend, OutboundChannel};
pub use config::{MessengerConfig, WriteMode};
pub use error::{MessengerError, Result};
pub use inbound::{ReplyChannel, ReplyDispatcher, ReplyStream};
pub use lanes::LaneTable;
pub use messenger::{OutboundMessenger, ResponseRequest};
pub use queue::TaskQueue;
pub use result::CommandResult;
pub use task::{PortCommandExecutionStatus, PortCommandState};
