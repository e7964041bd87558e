//! Email decoding: EML framing, header decoding, transfer encodings and MIME structure.

pub mod eml;
pub mod header;
pub mod mime;
pub mod transfer;
