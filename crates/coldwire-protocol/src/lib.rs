//! Coldwire Protocol Types
//!
//! Defines the JSON-RPC message model shared by every coldwire channel and
//! its two wire encodings:
//!
//! - **Full**: one JSON object, `{"id", "method", "params", "result", "error", "jsonrpc": "2.0"}`
//! - **Reduced**: `method|id|json` for calls and `|id|json` for results,
//!   used where every byte counts (QR frames)

pub mod codec;
pub mod error;
pub mod message;
pub mod ops;

pub use codec::{decode, encode, try_decode, WireForm};
pub use error::DecodeError;
pub use message::{MessageId, RpcMessage};

/// JSON-RPC version tag carried by every Full-form message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Structural delimiter of the Reduced form.
pub const REDUCED_DELIMITER: char = '|';
