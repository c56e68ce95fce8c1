//! JSON codec for Bayeux message batches.
//!
//! Clients may send a single message object or an array of messages;
//! the server always answers with an array.

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::message::Message;

/// Maximum accepted batch size in bytes (16 MiB).
pub const MAX_BATCH_SIZE: usize = 16 * 1024 * 1024;

/// Errors that can occur while encoding or decoding batches.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Batch exceeds maximum size.
    #[error("Batch size {0} exceeds maximum {MAX_BATCH_SIZE}")]
    TooLarge(usize),

    /// Input was empty.
    #[error("Empty batch")]
    Empty,

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    Many(Vec<Message>),
    One(Box<Message>),
}

/// Decode a batch of messages from JSON bytes.
///
/// # Errors
///
/// Returns an error if the input is empty, too large or not a message
/// object/array.
pub fn decode(data: &[u8]) -> Result<Vec<Message>, CodecError> {
    if data.len() > MAX_BATCH_SIZE {
        return Err(CodecError::TooLarge(data.len()));
    }
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::Empty);
    }

    let messages = match serde_json::from_slice(data)? {
        Batch::Many(messages) => messages,
        Batch::One(message) => vec![*message],
    };
    Ok(messages)
}

/// Decode a batch of messages from a JSON string.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_str(data: &str) -> Result<Vec<Message>, CodecError> {
    decode(data.as_bytes())
}

/// Encode a batch of messages as a JSON array.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(messages: &[Message]) -> Result<Bytes, CodecError> {
    let payload = serde_json::to_vec(messages)?;
    Ok(Bytes::from(payload))
}

/// Encode a batch of messages as a JSON string.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_string(messages: &[Message]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(messages)?)
}
