//! Frame codec for the peripheral link
//!
//! The wire protocol is asymmetric:
//! - **Outbound** (client → peripheral): UTF-8 text terminated by `0x00`
//! - **Inbound** (peripheral → client): UTF-8 text terminated by `'\n'`
//!
//! The two directions are produced by independent programs (this client and
//! the peripheral firmware's serial printer), hence the different terminators.
//! No escaping is performed: a message containing its own terminator cannot
//! be framed unambiguously, so `Message::new` rejects `0x00`.

mod decoder;

pub use decoder::{decode_stream, FrameDecoder, Frames};

use crate::constants::OUTBOUND_DELIMITER;
use crate::error::SessionError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Outbound application message
///
/// Non-empty text without the outbound terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(String);

impl Message {
    /// Validate text as an outbound message
    pub fn new(text: impl Into<String>) -> Result<Self, SessionError> {
        let text = text.into();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if text.as_bytes().contains(&OUTBOUND_DELIMITER) {
            return Err(SessionError::EmbeddedTerminator);
        }
        Ok(Self(text))
    }

    /// Wrap text known to be a valid message
    pub(crate) fn from_static(text: &'static str) -> Self {
        debug_assert!(!text.is_empty() && !text.contains('\0'));
        Self(text.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a message as one outbound frame
///
/// Output is the raw message bytes followed by exactly one `0x00`.
pub fn encode(message: &Message) -> Bytes {
    let mut out = BytesMut::with_capacity(message.0.len() + 1);
    encode_into(message.as_str().as_bytes(), &mut out);
    out.freeze()
}

/// Append one outbound frame for `payload` to `output`
pub fn encode_into(payload: &[u8], output: &mut BytesMut) {
    output.reserve(payload.len() + 1);
    output.put_slice(payload);
    output.put_u8(OUTBOUND_DELIMITER);
}
