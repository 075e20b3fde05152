//! Fallback tunnel payload.

use serde::{Deserialize, Serialize};

/// `fallback` call parameters: one complete wire message of the tunnelled
/// session, carried as an opaque string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackParams {
    pub msg: String,
}
