//! The decoded message record.

use chrono::{DateTime, Utc};

use super::address::Mailbox;
use super::attachment::Attachment;
use crate::parser::header;

/// A message decoded from its raw EML bytes.
///
/// This is **not** stored anywhere. It is recomputed from the raw record on
/// every read.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Message {
    /// Decoded `From` header.
    pub from: String,

    /// Decoded `Subject` header.
    pub subject: String,

    /// One entry per `To` header occurrence, in header order.
    pub to: Vec<String>,

    /// Carbon-copy recipients. Only filled on the compose side.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,

    /// `Date` header text as sent.
    pub date: String,

    /// Plain-text body (all `text/plain` segments, concatenated).
    pub text: String,

    /// HTML body (all `text/html` segments, concatenated).
    pub html: String,

    /// Attachments in encounter order.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Parse the `Date` header leniently.
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        header::parse_date(&self.date)
    }

    /// Split the sender into display name and address.
    pub fn sender(&self) -> Mailbox {
        Mailbox::parse(&self.from)
    }

    /// First `max_chars` characters of the plain-text body, with `...` if cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self
            .text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if flat.chars().count() > max_chars {
            let cut: String = flat.chars().take(max_chars).collect();
            format!("{cut}...")
        } else {
            flat
        }
    }
}
