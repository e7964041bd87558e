//! `astromail` — receive, store and compose mail for a custom domain.
//!
//! Inbound messages are copied from the bucket the receiving service writes
//! into, stored once per id in an append-only folder store, and decoded from
//! their raw MIME bytes whenever they are read.

pub mod account;
pub mod compose;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod outbox;
pub mod pager;
pub mod parser;
pub mod store;
