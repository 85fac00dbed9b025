//! Opaque page cursors.
//!
//! Cursors are URL-safe base64 over a small JSON descriptor. They are
//! adapter-private: a cursor minted by one engine is rejected by the other,
//! and clients must treat the string as opaque.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Decoded cursor descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Engine that minted the cursor.
    pub engine: String,
    /// Absolute offset of the next window.
    pub offset: u64,
}

/// Cursor decoding failures. Surface as `bad-request` at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// Not valid base64 or not a valid descriptor.
    Undecodable,
    /// Minted by a different engine.
    WrongEngine { expected: String, found: String },
}

impl std::fmt::Display for CursorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CursorError::Undecodable => write!(f, "cursor is not decodable"),
            CursorError::WrongEngine { expected, found } => {
                write!(f, "cursor was issued by '{found}', not '{expected}'")
            }
        }
    }
}

impl std::error::Error for CursorError {}

/// Encode a cursor for the given engine and offset.
pub fn encode_cursor(engine: &str, offset: u64) -> String {
    let descriptor = PageCursor {
        engine: engine.to_string(),
        offset,
    };
    // serialization of a two-field struct cannot fail
    let json = serde_json::to_vec(&descriptor).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a cursor, checking it was minted by `engine`.
pub fn decode_cursor(engine: &str, cursor: &str) -> Result<PageCursor, CursorError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| CursorError::Undecodable)?;
    let descriptor: PageCursor =
        serde_json::from_slice(&bytes).map_err(|_| CursorError::Undecodable)?;
    if descriptor.engine != engine {
        return Err(CursorError::WrongEngine {
            expected: engine.to_string(),
            found: descriptor.engine,
        });
    }
    Ok(descriptor)
}
