//! Byte-level transport boundary for a hub's command characteristic.
//!
//! The messenger core never touches BLE APIs directly. It depends on the
//! [`HubTransport`] shape defined here:
//! - a write primitive (with or without a confirmed response)
//! - a push stream of raw notification buffers
//!
//! This is the lowest layer of hubwire. Device discovery and GATT bootstrap
//! live outside this workspace and hand over an implementation of the trait.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{MemoryTransport, WriteBehavior, WriteRecord};
pub use traits::HubTransport;
