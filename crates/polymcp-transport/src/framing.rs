//! Stream framing: 4-byte big-endian length prefix, then exactly that many
//! bytes of UTF-8 JSON. Short reads surface as transport errors from the
//! codec; frames above [`MAX_FRAME_LEN`] are rejected before allocation.

use tokio_util::bytes::Bytes;
use tokio_util::codec::LengthDelimitedCodec;

use polymcp_core::protocol::{JsonRpcMessage, FRAME_HEADER_LEN, MAX_FRAME_LEN};

use crate::{Result, TransportError};

/// Build the codec used by every stream transport.
pub fn length_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(FRAME_HEADER_LEN)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Serialize a message into one frame body.
pub fn encode_message(message: &JsonRpcMessage) -> Result<Bytes> {
    let body = serde_json::to_vec(message).map_err(|e| TransportError::Serialization {
        message: format!("failed to serialize message: {e}"),
    })?;
    Ok(Bytes::from(body))
}

/// Parse one frame body into a message.
pub fn decode_message(body: &[u8]) -> Result<JsonRpcMessage> {
    serde_json::from_slice(body).map_err(|e| TransportError::Serialization {
        message: format!("failed to parse frame JSON: {e}"),
    })
}
