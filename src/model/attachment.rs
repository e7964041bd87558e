//! Decoded attachments.
//!
//! The payload is kept in its base64 transport form so a decoded [`Message`]
//! can be handed to a presentation layer (or serialized to JSON) as-is.
//!
//! [`Message`]: super::message::Message

use base64::Engine;

/// One attachment of a decoded message.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Attachment {
    /// Filename from `Content-Disposition` or the `name` parameter. May be empty.
    pub filename: String,

    /// MIME content type (e.g. `"image/png"`).
    pub content_type: String,

    /// Base64 (standard alphabet, padded) encoding of the payload.
    #[serde(serialize_with = "serialize_ascii")]
    pub content: Vec<u8>,
}

impl Attachment {
    /// Build an attachment from its raw payload.
    pub fn from_payload(filename: String, content_type: String, payload: &[u8]) -> Self {
        Self {
            filename,
            content_type,
            content: base64::engine::general_purpose::STANDARD
                .encode(payload)
                .into_bytes(),
        }
    }

    /// Decode the payload back to its original bytes.
    pub fn decoded(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.content)
    }

    /// Decoded payload size in bytes.
    pub fn size(&self) -> usize {
        let len = self.content.len();
        let padding = self.content.iter().rev().take_while(|&&b| b == b'=').count();
        ((len / 4) * 3).saturating_sub(padding.min(2))
    }
}

fn serialize_ascii<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip_and_size() {
        let payload = [0u8, 1, 2, 250, 251];
        let att = Attachment::from_payload("a.bin".into(), "application/octet-stream".into(), &payload);
        assert_eq!(att.content, b"AAEC+vs=");
        assert_eq!(att.decoded().unwrap(), payload);
        assert_eq!(att.size(), 5);
    }

    #[test]
    fn test_empty_payload() {
        let att = Attachment::from_payload(String::new(), "text/csv".into(), b"");
        assert!(att.content.is_empty());
        assert_eq!(att.size(), 0);
    }
}
