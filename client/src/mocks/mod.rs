//! In-memory stand-ins for session storage and the realtime transport.
//!
//! Mirrors the production implementations closely enough to drive the
//! session store and the realtime channel end to end without a disk or a
//! broker.

mod storage;
mod transport;

pub use storage::MemoryStorage;
pub use transport::{MockBroker, MockConnection, MockPeer, MockTransport};
