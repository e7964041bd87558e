//! Core data model types: decoded messages, attachments, and sender mailboxes.

pub mod address;
pub mod attachment;
pub mod message;
