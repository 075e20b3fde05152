//! Error types for the wire codec.

/// Reasons a piece of wire text could not be turned into a message.
///
/// Decoding never panics; callers on lossy media drop the frame and keep
/// reading.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Nothing to decode (empty or whitespace-only text).
    #[error("empty wire text")]
    Empty,

    /// The JSON payload (whole object, or the reduced data segment) is malformed.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Text starting with `{` did not parse to a JSON object.
    #[error("full-form message is not a JSON object")]
    NotAnObject,

    /// Reduced text is missing one of its two structural delimiters.
    #[error("reduced-form message needs two '|' delimiters, found {found}")]
    MissingDelimiter { found: usize },

    /// A response carried no id to correlate with.
    #[error("{kind} message has no id")]
    MissingId { kind: &'static str },

    /// The id segment is neither a number nor a non-empty string.
    #[error("invalid message id: {0:?}")]
    InvalidId(String),

    /// The object has none of `method`, `result` or `error`.
    #[error("message has none of method, result or error")]
    Unclassifiable,
}
