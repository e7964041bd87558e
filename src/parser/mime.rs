//! MIME message decoding: raw EML bytes → [`Message`].
//!
//! Multipart bodies are decoded one level deep. A part that is itself
//! `multipart/*` is kept as a single opaque attachment.

use tracing::{debug, warn};

use crate::error::{MailError, Result};
use crate::model::attachment::Attachment;
use crate::model::message::Message;
use crate::parser::eml::{split_header_body, split_multipart};
use crate::parser::header::{
    self, decode_encoded_words, get_all_headers, get_header, ContentType, Disposition,
};
use crate::parser::transfer::{self, TransferEncoding};

/// Revision of the decoding rules implemented by [`decode`].
pub const DECODER_VERSION: u32 = 1;

/// Decode a raw message.
///
/// Fails only when the header block or the top-level `Content-Type` cannot be
/// parsed. Problems inside individual parts are logged and the part skipped.
pub fn decode(raw: &[u8]) -> Result<Message> {
    let (mut message, fields, body) = decode_headers(raw)?;

    let content_type = match get_header(&fields, "content-type") {
        Some(value) => ContentType::parse(value)?,
        None => ContentType::text_plain(),
    };

    if content_type.is_multipart() {
        let boundary = content_type
            .param("boundary")
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                MailError::Parse(format!("{} without boundary", content_type.mime_type))
            })?;
        decode_multipart(&mut message, body, boundary);
    } else {
        match decode_entity(&fields, body, Scope::Message) {
            Ok(segment) => segment.merge_into(&mut message),
            Err(e) => warn!(error = %e, "Dropping undecodable single-part body"),
        }
    }

    Ok(message)
}

/// Decode a raw message, returning whatever could be read when [`decode`] fails.
pub fn decode_lenient(raw: &[u8]) -> Message {
    match decode(raw) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Message failed to decode, keeping headers only");
            decode_headers(raw)
                .map(|(message, _, _)| message)
                .unwrap_or_default()
        }
    }
}

/// Read the envelope headers into a [`Message`] and hand back the fields and body.
fn decode_headers(raw: &[u8]) -> Result<(Message, header::HeaderFields, &[u8])> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(MailError::Parse("empty message".into()));
    }

    let (header_bytes, body) = split_header_body(raw);
    let fields = header::parse_fields(header_bytes);
    if fields.is_empty() {
        return Err(MailError::Parse("no header fields found".into()));
    }

    let message = Message {
        from: get_header(&fields, "from")
            .map(decode_encoded_words)
            .unwrap_or_default(),
        subject: get_header(&fields, "subject")
            .map(decode_encoded_words)
            .unwrap_or_default(),
        to: get_all_headers(&fields, "to")
            .into_iter()
            .map(decode_encoded_words)
            .collect(),
        cc: Vec::new(),
        date: get_header(&fields, "date").unwrap_or_default().to_string(),
        ..Default::default()
    };

    Ok((message, fields, body))
}

fn decode_multipart(message: &mut Message, body: &[u8], boundary: &str) {
    let parts = split_multipart(body, boundary);
    if parts.is_empty() {
        warn!(boundary = boundary, "Multipart body contains no parts");
    }

    for (index, part) in parts.into_iter().enumerate() {
        let (part_headers, part_body) = split_header_body(part);
        let fields = header::parse_fields(part_headers);
        match decode_entity(&fields, part_body, Scope::Part) {
            Ok(segment) => segment.merge_into(message),
            Err(e) => warn!(part = index, error = %e, "Skipping malformed part"),
        }
    }
}

/// One decoded body entity.
enum Segment {
    Text(String),
    Html(String),
    Attachment(Attachment),
}

impl Segment {
    /// Text and HTML segments append, attachments keep encounter order.
    fn merge_into(self, message: &mut Message) {
        match self {
            Segment::Text(text) => message.text.push_str(&text),
            Segment::Html(html) => message.html.push_str(&html),
            Segment::Attachment(att) => message.attachments.push(att),
        }
    }
}

/// Where an entity sits in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// The whole body of a non-multipart message. Classified by media type
    /// alone; `Content-Disposition` only contributes a filename.
    Message,
    /// One part of a multipart body.
    Part,
}

/// Classify and decode one entity from its header fields and body.
fn decode_entity(fields: &[(String, String)], body: &[u8], scope: Scope) -> Result<Segment> {
    let content_type = match get_header(fields, "content-type") {
        Some(value) => ContentType::parse(value)?,
        None => ContentType::text_plain(),
    };
    let disposition = match scope {
        Scope::Part => get_header(fields, "content-disposition")
            .map(Disposition::parse)
            .transpose()?,
        Scope::Message => get_header(fields, "content-disposition")
            .and_then(|value| Disposition::parse(value).ok()),
    };

    let filename = disposition
        .as_ref()
        .and_then(Disposition::filename)
        .or_else(|| content_type.param("name"))
        .map(decode_encoded_words)
        .unwrap_or_default();

    if content_type.is_multipart() {
        debug!(mime_type = %content_type.mime_type, "Keeping nested multipart as attachment");
        return Ok(Segment::Attachment(Attachment::from_payload(
            filename,
            content_type.mime_type,
            body,
        )));
    }

    let encoding =
        TransferEncoding::parse_or_identity(get_header(fields, "content-transfer-encoding"));
    let payload = encoding
        .decode(body)
        .map_err(|e| MailError::Parse(format!("invalid base64 body: {e}")))?;

    let is_attachment = scope == Scope::Part
        && disposition
            .as_ref()
            .is_some_and(|d| d.is_attachment() || d.filename().is_some());

    if !is_attachment && content_type.mime_type == "text/plain" {
        return Ok(Segment::Text(decode_text(&content_type, &payload)));
    }
    if !is_attachment && content_type.mime_type == "text/html" {
        return Ok(Segment::Html(decode_text(&content_type, &payload)));
    }
    Ok(Segment::Attachment(Attachment::from_payload(
        filename,
        content_type.mime_type,
        &payload,
    )))
}

fn decode_text(content_type: &ContentType, payload: &[u8]) -> String {
    transfer::decode_charset(content_type.param("charset").unwrap_or(""), payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: =?UTF-8?B?Sm9zw6k=?= <jose@example.com>\r\n\
To: a@example.com\r\n\
To: b@example.com\r\n\
Subject: Report\r\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\r\n\
Content-Type: multipart/mixed; boundary=\"sep\"\r\n\
\r\n\
--sep\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=E9\r\n\
--sep\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>hi</p>\r\n\
--sep\r\n\
Content-Type: application/pdf; name=\"r.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--sep--\r\n";

    #[test]
    fn test_decode_multipart_message() {
        let msg = decode(MULTIPART.as_bytes()).unwrap();
        assert_eq!(msg.from, "José <jose@example.com>");
        assert_eq!(msg.to, vec!["a@example.com", "b@example.com"]);
        assert_eq!(msg.subject, "Report");
        assert_eq!(msg.date, "Thu, 04 Jan 2024 10:00:00 +0000");
        assert_eq!(msg.text, "café");
        assert_eq!(msg.html, "<p>hi</p>");
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].filename, "r.pdf");
        assert_eq!(msg.attachments[0].content_type, "application/pdf");
        assert_eq!(msg.attachments[0].decoded().unwrap(), b"%PDF-");
    }

    #[test]
    fn test_single_part_text_and_html() {
        let msg = decode(b"Subject: a\n\nplain body").unwrap();
        assert_eq!(msg.text, "plain body");
        assert!(msg.html.is_empty());

        let msg = decode(b"Content-Type: text/html\n\n<b>x</b>").unwrap();
        assert_eq!(msg.html, "<b>x</b>");
        assert!(msg.text.is_empty());
    }

    #[test]
    fn test_single_part_non_text_is_attachment() {
        let raw = b"Content-Type: image/png\nContent-Disposition: inline; filename=dot.png\nContent-Transfer-Encoding: base64\n\niVBORw==\n";
        let msg = decode(raw).unwrap();
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].filename, "dot.png");
        assert_eq!(msg.attachments[0].decoded().unwrap(), [0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_single_part_classified_by_media_type() {
        let raw = b"Content-Type: text/plain\nContent-Disposition: attachment; filename=x.txt\n\nhello";
        let msg = decode(raw).unwrap();
        assert_eq!(msg.text, "hello");
        assert!(msg.attachments.is_empty());

        let raw = b"Content-Type: text/html\nContent-Disposition: attachment; filename=x.html\n\n<i>hi</i>";
        let msg = decode(raw).unwrap();
        assert_eq!(msg.html, "<i>hi</i>");
        assert!(msg.attachments.is_empty());

        let raw = b"Content-Disposition: [bad]\n\nstill text";
        assert_eq!(decode(raw).unwrap().text, "still text");
    }

    #[test]
    fn test_text_segments_append() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\n\none \n--b\n\ntwo\n--b--\n";
        let msg = decode(raw).unwrap();
        assert_eq!(msg.text, "one two");
    }

    #[test]
    fn test_text_with_attachment_disposition() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\nContent-Disposition: attachment; filename=\"notes.txt\"\n\nnotes\n--b--\n";
        let msg = decode(raw).unwrap();
        assert!(msg.text.is_empty());
        assert_eq!(msg.attachments[0].filename, "notes.txt");
        assert_eq!(msg.attachments[0].content_type, "text/plain");
    }

    #[test]
    fn test_nested_multipart_is_opaque() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\n\n--outer\nContent-Type: multipart/alternative; boundary=inner\n\n--inner\n\nhidden\n--inner--\n--outer--\n";
        let msg = decode(raw).unwrap();
        assert!(msg.text.is_empty());
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].content_type, "multipart/alternative");
        let inner = msg.attachments[0].decoded().unwrap();
        assert!(String::from_utf8(inner).unwrap().contains("hidden"));
    }

    #[test]
    fn test_malformed_part_is_skipped() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\nContent-Type: garbage\n\nlost\n--b\nContent-Type: application/zip\nContent-Transfer-Encoding: base64\n\n*** not base64 ***\n--b\n\nkept\n--b--\n";
        let msg = decode(raw).unwrap();
        assert_eq!(msg.text, "kept");
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn test_unknown_transfer_encoding_is_verbatim() {
        let raw = b"Content-Transfer-Encoding: x-custom\n\n=41 stays";
        assert_eq!(decode(raw).unwrap().text, "=41 stays");
    }

    #[test]
    fn test_fatal_errors() {
        assert!(matches!(decode(b""), Err(MailError::Parse(_))));
        assert!(matches!(decode(b"just some words"), Err(MailError::Parse(_))));
        assert!(matches!(
            decode(b"Subject: x\nContent-Type: nonsense\n\nbody"),
            Err(MailError::Parse(_))
        ));
        assert!(matches!(
            decode(b"Subject: x\nContent-Type: multipart/mixed\n\nbody"),
            Err(MailError::Parse(_))
        ));
    }

    #[test]
    fn test_decode_lenient_keeps_headers() {
        let msg = decode_lenient(b"From: a@b.com\nSubject: broken\nContent-Type: ???\n\nbody");
        assert_eq!(msg.from, "a@b.com");
        assert_eq!(msg.subject, "broken");
        assert!(msg.text.is_empty());

        assert_eq!(decode_lenient(b""), Message::default());
    }
}
