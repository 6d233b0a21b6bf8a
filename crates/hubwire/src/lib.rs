//! Client-side core of a binary hub control protocol.
//!
//! The protocol runs over one unreliable, half-duplex characteristic. This
//! crate bundles the pieces needed to drive it: packet framing and
//! dissection, a serialized write channel, per-lane task queues with
//! timeout and retry, and feedback correlation for port output commands.
//!
//! # Crate Structure
//!
//! - [`transport`]: the byte-write / notification boundary and an in-memory transport
//! - [`frame`]: message types, packet framing, and payload codecs
//! - [`messenger`]: the async outbound messenger and its lanes

/// Re-export transport types.
pub mod transport {
    pub use hubwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hubwire_frame::*;
}

/// Re-export messenger types.
pub mod messenger {
    pub use hubwire_messenger::*;
}
