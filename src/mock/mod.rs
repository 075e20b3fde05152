//! In-process test doubles
//!
//! Stand-ins for the pieces coldwire expects the embedding application to
//! supply, usable from unit tests, integration tests and demos:
//!
//! - `MemorySocket`: a text socket that records writes and can forward them
//! - `MockPeer`: a peer connection driven entirely by the caller
//! - `MockRelay`: a signaling relay routing `offer`, `join`, `answer`,
//!   `ice` and `fallback` between an initiator and a responder, with
//!   failure injection per method

mod peer;
mod relay;
mod socket;

pub use peer::MockPeer;
pub use relay::{MockRelay, RelayConnection};
pub use socket::MemorySocket;
