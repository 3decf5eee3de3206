//! TabRelay wire layer: one peer, many concurrent requests.
//!
//! A single browser-extension peer holds a duplex text channel to the relay.
//! Any number of callers forward tasks to it at once; replies come back in any
//! order and are matched to their caller by correlation id.
//!
//! ## Architecture
//!
//! - **CorrelationRegistry**: id → pending waiter, the only shared map
//! - **PeerManager**: owns the active connection, its read loop and outbound sends
//! - **RequestBridge**: `forward(prompt, timeout)` over the asynchronous peer
//! - **RelayService**: wires the three together with a `start`/`stop` lifecycle

pub mod bridge;
pub mod message;
pub mod peer;
pub mod registry;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::{Completion, RequestBridge};
pub use message::{PeerReply, PeerTask};
pub use peer::{PeerInfo, PeerManager, PeerSink, PeerStream, WireError};
pub use registry::{CorrelationRegistry, RegistryStats};
pub use service::RelayService;
