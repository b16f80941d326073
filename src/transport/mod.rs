//! Transport boundary to the pub/sub substrate

pub mod memory;
pub mod tcp;
mod traits;

pub use memory::{MemoryBroker, MemoryPublisher, MemoryTransport};
pub use tcp::{BridgeConfig, BridgePublisher, BridgeTransport};
pub use traits::{Publisher, Transport, TransportError, TransportEvent};
