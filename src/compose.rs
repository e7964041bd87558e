//! Outbound message composition: a [`Draft`] plus the provider's message id
//! rendered as a `multipart/alternative` EML byte stream.

use chrono::{DateTime, FixedOffset, Local};
use sha2::{Digest, Sha256};

use crate::parser::header::encode_word;

/// Domain appended to bare provider ids to form a `Message-ID`.
pub const MESSAGE_ID_DOMAIN: &str = "email.amazonses.com";

/// What the user wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub from: String,
    pub subject: String,
    /// HTML body. Sent as-is in both alternatives.
    pub body: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

/// Compose a draft stamped with the current local time.
pub fn compose(draft: &Draft, message_id: &str) -> Vec<u8> {
    compose_at(draft, message_id, Local::now().fixed_offset())
}

/// Compose a draft with an explicit `Date`.
///
/// Same inputs, same bytes: the boundary is derived from the message id.
pub fn compose_at(draft: &Draft, message_id: &str, date: DateTime<FixedOffset>) -> Vec<u8> {
    let boundary = boundary_for(message_id);
    let mut out = String::with_capacity(draft.body.len() * 2 + 512);

    push_header(&mut out, "MIME-Version", "1.0");
    push_header(&mut out, "From", &draft.from);
    push_header(&mut out, "Date", &date.to_rfc2822());
    push_header(&mut out, "Message-ID", &format_message_id(message_id));
    push_header(&mut out, "Subject", &encode_word(&single_line(&draft.subject)));
    push_header(&mut out, "To", &draft.to.join(", "));
    if !draft.cc.is_empty() {
        push_header(&mut out, "Cc", &draft.cc.join(", "));
    }
    push_header(
        &mut out,
        "Content-Type",
        &format!("multipart/alternative; boundary=\"{boundary}\""),
    );
    out.push_str("\r\n");

    for mime_type in ["text/plain", "text/html"] {
        out.push_str(&format!("--{boundary}\r\n"));
        push_header(&mut out, "Content-Type", &format!("{mime_type}; charset=\"UTF-8\""));
        push_header(&mut out, "Content-Transfer-Encoding", "8bit");
        out.push_str("\r\n");
        out.push_str(&draft.body);
        out.push_str("\r\n");
    }
    out.push_str(&format!("--{boundary}--\r\n"));

    out.into_bytes()
}

/// Writes one header line. Line breaks inside `value` become single spaces,
/// so a value can never end the header block or start a new field.
fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(&single_line(value));
    out.push_str("\r\n");
}

fn single_line(value: &str) -> String {
    let mut line = String::with_capacity(value.len());
    let mut in_break = false;
    for c in value.chars() {
        if c == '\r' || c == '\n' {
            if !in_break {
                line.push(' ');
            }
            in_break = true;
        } else {
            line.push(c);
            in_break = false;
        }
    }
    line
}

/// `<id>` as given, `<id>` for addresses, `<id@provider>` for bare ids.
pub fn format_message_id(id: &str) -> String {
    let id = id.trim();
    if id.starts_with('<') && id.ends_with('>') {
        id.to_string()
    } else if id.contains('@') {
        format!("<{id}>")
    } else {
        format!("<{id}@{MESSAGE_ID_DOMAIN}>")
    }
}

fn boundary_for(message_id: &str) -> String {
    let digest = Sha256::digest(message_id.as_bytes());
    let hex: String = digest[..12].iter().map(|b| format!("{b:02x}")).collect();
    format!("=_astromail_{hex}")
}
