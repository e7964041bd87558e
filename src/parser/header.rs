//! RFC 5322 header handling: unfolding, encoded-words (RFC 2047), structured
//! `Content-Type`/`Content-Disposition` values (RFC 2045, RFC 2231) and dates.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::error::{MailError, Result};
use crate::parser::transfer;

/// Unfolded header fields as `(lowercase_name, value)` pairs, in order.
pub type HeaderFields = Vec<(String, String)>;

/// Decode raw header bytes and unfold them into fields.
pub fn parse_fields(raw_headers: &[u8]) -> HeaderFields {
    unfold_headers(&decode_header_bytes(raw_headers))
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Join continuation lines (starting with space or tab) onto the previous field.
fn unfold_headers(text: &str) -> HeaderFields {
    let mut result: HeaderFields = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            if name.is_empty() || name.contains(' ') {
                debug!(line = line, "Skipping malformed header line");
                continue;
            }
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// First value of a header (name must be lowercase).
pub fn get_header<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Every value of a repeated header, in order.
pub fn get_all_headers<'a>(fields: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .collect()
}

// ── Encoded words ───────────────────────────────────────────────

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// A token that fails to decode is kept as raw text.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some((text, consumed)) = try_decode_one_word(after_start) {
            result.push_str(&text);
            remaining = &after_start[consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=`. Returns the text and bytes consumed.
fn try_decode_one_word(s: &str) -> Option<(String, usize)> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    if encoded_text.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => transfer::decode_base64(encoded_text.as_bytes()).ok()?,
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    // RFC 2231 language suffix: "UTF-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);
    let consumed = first_q + 1 + second_q + 1 + end + 2;
    Some((transfer::decode_charset(charset, &bytes), consumed))
}

/// Q-encoding (RFC 2047 §4.2): underscores are spaces, `=XX` is a byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let underscored: Vec<u8> = input
        .bytes()
        .map(|b| if b == b'_' { b' ' } else { b })
        .collect();
    transfer::decode_quoted_printable(&underscored)
}

/// Encode a header value as RFC 2047 `B` words when it is not plain ASCII.
pub fn encode_word(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    // Keep each encoded word under the 75 character limit.
    const CHUNK: usize = 45;
    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        if chunk.len() + ch.len_utf8() > CHUNK {
            words.push(std::mem::take(&mut chunk));
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(chunk);
    }

    words
        .iter()
        .map(|w| format!("=?UTF-8?B?{}?=", transfer::encode_base64(w.as_bytes())))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Structured values ───────────────────────────────────────────

/// A parsed `Content-Type` value: `type/subtype; param=value; …`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lowercased `type/subtype`.
    pub mime_type: String,
    /// Parameters with lowercased names, RFC 2231 values already decoded.
    pub params: Vec<(String, String)>,
}

impl ContentType {
    /// Parse a `Content-Type` header value.
    pub fn parse(value: &str) -> Result<Self> {
        let (head, params) = split_structured(value);
        let mime_type = head.to_lowercase();

        let valid = match mime_type.split_once('/') {
            Some((main, sub)) => is_token(main) && is_token(sub),
            None => false,
        };
        if !valid {
            return Err(MailError::Parse(format!("invalid media type '{value}'")));
        }

        Ok(Self { mime_type, params })
    }

    /// The RFC 2045 default for parts without a `Content-Type`.
    pub fn text_plain() -> Self {
        Self {
            mime_type: "text/plain".to_string(),
            params: Vec::new(),
        }
    }

    /// Look up a parameter (name must be lowercase).
    pub fn param(&self, name: &str) -> Option<&str> {
        lookup(&self.params, name)
    }

    /// `true` for any `multipart/*` type.
    pub fn is_multipart(&self) -> bool {
        self.mime_type.starts_with("multipart/")
    }
}

/// A parsed `Content-Disposition` value: `inline` or `attachment` plus parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    /// Lowercased disposition type.
    pub kind: String,
    /// Parameters with lowercased names.
    pub params: Vec<(String, String)>,
}

impl Disposition {
    /// Parse a `Content-Disposition` header value.
    pub fn parse(value: &str) -> Result<Self> {
        let (head, params) = split_structured(value);
        let kind = head.to_lowercase();
        if !is_token(&kind) {
            return Err(MailError::Parse(format!("invalid disposition '{value}'")));
        }
        Ok(Self { kind, params })
    }

    /// `true` when the sender marked the part as a download.
    pub fn is_attachment(&self) -> bool {
        self.kind == "attachment"
    }

    /// The `filename` parameter, if any.
    pub fn filename(&self) -> Option<&str> {
        lookup(&self.params, "filename")
    }
}

fn lookup<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// RFC 2045 token characters: printable ASCII minus tspecials.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
        })
}

/// Split `head; a=1; b="x;y"` into the head and its parameters.
fn split_structured(value: &str) -> (String, Vec<(String, String)>) {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in value.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    segments.push(current);

    let mut iter = segments.into_iter();
    let head = iter.next().unwrap_or_default().trim().to_string();

    let mut params: Vec<(String, String)> = Vec::new();
    let mut extended: Vec<String> = Vec::new();
    for segment in iter {
        let Some((name, raw)) = segment.split_once('=') else {
            continue;
        };
        let name = name.trim().to_lowercase();
        let raw = unquote(raw.trim());
        match name.strip_suffix('*') {
            // An RFC 2231 value wins over a plain one with the same name.
            Some(base) => {
                let decoded = decode_rfc2231(&raw);
                match params.iter_mut().find(|(k, _)| k == base) {
                    Some(existing) => existing.1 = decoded,
                    None => params.push((base.to_string(), decoded)),
                }
                extended.push(base.to_string());
            }
            None if extended.contains(&name) => {}
            None => params.push((name, raw)),
        }
    }

    (head, params)
}

fn unquote(s: &str) -> String {
    let Some(inner) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return s.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Decode an RFC 2231 extended value: `charset'language'percent-encoded`.
fn decode_rfc2231(value: &str) -> String {
    let mut pieces = value.splitn(3, '\'');
    let (Some(charset), Some(_lang), Some(encoded)) = (pieces.next(), pieces.next(), pieces.next())
    else {
        return value.to_string();
    };

    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(byte) = hex_byte(bytes[i + 1], bytes[i + 2]) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    transfer::decode_charset(charset, &out)
}

fn hex_byte(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

// ── Dates ───────────────────────────────────────────────────────

/// Parse an email date string in the common real-world formats.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    const FORMATS: [&str; 5] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d-%b-%Y %H:%M:%S %z",
    ];

    let candidate = replace_named_tz(strip_day_of_week(trimmed));
    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Last resort: let `mail-parser` read a one-header message.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = mail_parser::MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Strip a leading `"Thu, "` or `"Thu "`.
fn strip_day_of_week(s: &str) -> &str {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim_start_matches(',').trim_start();
        }
    }
    s
}

/// Replace a trailing timezone abbreviation with its numeric offset.
fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 11] = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    for (name, offset) in ZONES {
        if let Some(rest) = s.strip_suffix(name) {
            return format!("{rest}{offset}");
        }
    }
    s.to_string()
}
