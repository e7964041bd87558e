//! Byte-level framing of EML messages: the header/body split and
//! multipart boundary splitting (RFC 2046 §5.1.1).

/// Split an entity into its header block and body at the first blank line.
///
/// An entity without a blank line is all headers. An entity that starts with
/// a blank line has no headers.
pub fn split_header_body(data: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = data.strip_prefix(b"\r\n") {
        return (&[], body);
    }
    if let Some(body) = data.strip_prefix(b"\n") {
        return (&[], body);
    }
    match find_header_end(data) {
        Some((pos, sep_len)) => (&data[..pos], &data[pos + sep_len..]),
        None => (data, &[]),
    }
}

/// Find where headers end: the offset of the blank-line separator and its length.
fn find_header_end(data: &[u8]) -> Option<(usize, usize)> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if data[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
    }
    None
}

/// Split a multipart body into its parts.
///
/// The preamble before the first delimiter and the epilogue after the close
/// delimiter are dropped. The line break before each delimiter belongs to the
/// delimiter, not to the part. A missing close delimiter ends the last part at
/// the end of the body.
pub fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| pos + p + 1)
            .unwrap_or(body.len());
        let line = trim_line_break(&body[pos..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter) {
            let closing = rest.starts_with(b"--");
            let tail = if closing { &rest[2..] } else { rest };
            // Anything but transport padding after the boundary means this is
            // a longer, different token.
            if tail.iter().all(|b| *b == b' ' || *b == b'\t') {
                if let Some(start) = part_start.take() {
                    parts.push(trim_line_break(&body[start..pos]));
                }
                if closing {
                    return parts;
                }
                part_start = Some(line_end);
            }
        }

        pos = line_end;
    }

    if let Some(start) = part_start {
        parts.push(trim_line_break(&body[start.min(body.len())..]));
    }
    parts
}

/// Remove one trailing `\n` or `\r\n`.
fn trim_line_break(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))
        .unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_header_body() {
        let (h, b) = split_header_body(b"From: a@b.com\nSubject: Hi\n\nBody\n");
        assert_eq!(h, b"From: a@b.com\nSubject: Hi");
        assert_eq!(b, b"Body\n");
    }

    #[test]
    fn test_split_header_body_crlf() {
        let (h, b) = split_header_body(b"From: a@b.com\r\nSubject: Hi\r\n\r\nBody\r\n");
        assert_eq!(h, b"From: a@b.com\r\nSubject: Hi");
        assert_eq!(b, b"Body\r\n");
    }

    #[test]
    fn test_split_header_body_edges() {
        assert_eq!(split_header_body(b"\r\nonly body"), (&b""[..], &b"only body"[..]));
        assert_eq!(split_header_body(b"X-Only: headers"), (&b"X-Only: headers"[..], &b""[..]));
    }

    #[test]
    fn test_split_multipart() {
        let body = b"preamble\r\n--XYZ\r\nContent-Type: text/plain\r\n\r\none\r\n--XYZ\r\n\r\ntwo\n\r\n--XYZ--\r\nepilogue\r\n";
        let parts = split_multipart(body, "XYZ");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], b"Content-Type: text/plain\r\n\r\none");
        assert_eq!(parts[1], b"\r\ntwo\n");
    }

    #[test]
    fn test_split_multipart_ignores_longer_boundary() {
        let body = b"--b\n\nkeep --b inline\n--bb\nstill part\n--b--\n";
        let parts = split_multipart(body, "b");
        assert_eq!(parts, vec![&b"\nkeep --b inline\n--bb\nstill part"[..]]);
    }

    #[test]
    fn test_split_multipart_without_close() {
        let body = b"--b\n\nfirst\n--b\n\nsecond\n";
        let parts = split_multipart(body, "b");
        assert_eq!(parts, vec![&b"\nfirst"[..], &b"\nsecond"[..]]);
    }
}
