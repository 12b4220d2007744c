//! Content items returned from tool calls and resource reads.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of a tool-call or resource-read result.
///
/// Serialized with a `type` tag so the wire shape is
/// `{"type":"text","mimeType":"text/plain","text":"..."}` and friends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text {
        #[serde(rename = "mimeType")]
        mime_type: String,
        text: String,
    },
    Binary {
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// Payload bytes, base64 on the wire.
        data: String,
    },
    Json {
        #[serde(rename = "mimeType")]
        mime_type: String,
        json: Value,
    },
}

impl ContentItem {
    /// Plain-text item with the conventional MIME type.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            mime_type: "text/plain".to_string(),
            text: text.into(),
        }
    }

    pub fn text_with_mime(text: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Text {
            mime_type: mime_type.into(),
            text: text.into(),
        }
    }

    pub fn binary(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::Binary {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn json(value: Value) -> Self {
        Self::Json {
            mime_type: "application/json".to_string(),
            json: value,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            ContentItem::Text { mime_type, .. }
            | ContentItem::Binary { mime_type, .. }
            | ContentItem::Json { mime_type, .. } => mime_type,
        }
    }

    /// Decoded payload length in bytes.
    pub fn payload_len(&self) -> usize {
        match self {
            ContentItem::Text { text, .. } => text.len(),
            ContentItem::Binary { data, .. } => base64::engine::general_purpose::STANDARD
                .decode(data)
                .map(|b| b.len())
                .unwrap_or(0),
            ContentItem::Json { json, .. } => json.to_string().len(),
        }
    }

    /// Decode a binary item's payload. `None` for non-binary items or
    /// corrupt base64.
    pub fn decode_binary(&self) -> Option<Vec<u8>> {
        match self {
            ContentItem::Binary { data, .. } => base64::engine::general_purpose::STANDARD
                .decode(data)
                .ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_wire_shape() {
        let item = ContentItem::text("hello");
        let wire = serde_json::to_value(&item).expect("serialize");
        assert_eq!(
            wire,
            json!({"type": "text", "mimeType": "text/plain", "text": "hello"})
        );
    }

    #[test]
    fn test_binary_round_trip() {
        let payload = [0u8, 1, 2, 254, 255];
        let item = ContentItem::binary(&payload, "application/octet-stream");
        assert_eq!(item.payload_len(), payload.len());
        assert_eq!(item.decode_binary().expect("decode"), payload);

        let wire = serde_json::to_string(&item).expect("serialize");
        let back: ContentItem = serde_json::from_str(&wire).expect("deserialize");
        assert_eq!(back, item);
    }

    #[test]
    fn test_json_item() {
        let item = ContentItem::json(json!({"answer": 42}));
        assert_eq!(item.mime_type(), "application/json");
        let wire = serde_json::to_value(&item).expect("serialize");
        assert_eq!(wire["type"], "json");
        assert_eq!(wire["json"]["answer"], 42);
    }
}
