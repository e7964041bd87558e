//! Ingestion: copy new objects from the receiving bucket into the store,
//! exactly once per message id.
//!
//! Ingestion is best-effort per object. A failed fetch, store or decode is
//! logged, recorded in the [`IngestReport`], and the batch moves on. Only a
//! failed listing aborts the run.

pub mod poll;
pub mod source;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::parser::mime;
use crate::store::{self, MailStore};
use source::ObjectSource;

/// Object id the receiving service writes when a receipt rule is set up.
/// It is not user mail.
pub const SETUP_NOTIFICATION_ID: &str = "AMAZON_SES_SETUP_NOTIFICATION";

/// Which step failed for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Store,
    Decode,
}

/// A per-object failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IngestFailure {
    pub key: String,
    pub stage: Stage,
    pub error: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    /// Objects returned by the listing.
    pub listed: usize,
    /// Records newly written to the store.
    pub stored: usize,
    /// Objects already in the store.
    pub duplicates: usize,
    /// Setup notifications skipped.
    pub sentinels: usize,
    /// Keys with no id (directory markers).
    pub skipped: usize,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    fn fail(&mut self, key: &str, stage: Stage, error: impl ToString) {
        self.failures.push(IngestFailure {
            key: key.to_string(),
            stage,
            error: error.to_string(),
        });
    }
}

/// The message id of an object: the last `/`-separated segment of its key.
pub fn message_id_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Copies objects from a source into one folder of a store.
pub struct Ingest<'a> {
    source: &'a dyn ObjectSource,
    store: &'a dyn MailStore,
    folder: String,
    sentinel_id: String,
}

impl<'a> Ingest<'a> {
    /// Ingest into [`store::INBOX`], skipping [`SETUP_NOTIFICATION_ID`].
    pub fn new(source: &'a dyn ObjectSource, store: &'a dyn MailStore) -> Self {
        Self {
            source,
            store,
            folder: store::INBOX.to_string(),
            sentinel_id: SETUP_NOTIFICATION_ID.to_string(),
        }
    }

    /// Target folder.
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Object id to ignore.
    pub fn sentinel_id(mut self, id: impl Into<String>) -> Self {
        self.sentinel_id = id.into();
        self
    }

    /// Ingest everything under `prefix`.
    pub fn run(&self, prefix: &str) -> Result<IngestReport> {
        self.run_with_progress(prefix, None)
    }

    /// Like [`run`](Self::run); `progress` receives `(done, total)` object counts.
    pub fn run_with_progress(
        &self,
        prefix: &str,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<IngestReport> {
        store::validate_folder(&self.folder)?;

        let mut objects = self.source.list(prefix)?;
        // Newest first; stable so equal timestamps keep the listing order.
        objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

        let total = objects.len() as u64;
        let mut report = IngestReport {
            listed: objects.len(),
            ..Default::default()
        };
        info!(prefix = prefix, folder = %self.folder, objects = objects.len(), "Ingesting");

        for (done, object) in objects.iter().enumerate() {
            if let Some(cb) = progress {
                cb(done as u64, total);
            }
            self.ingest_one(&object.key, &mut report);
        }
        if let Some(cb) = progress {
            cb(total, total);
        }

        info!(
            stored = report.stored,
            duplicates = report.duplicates,
            failures = report.failures.len(),
            "Ingestion finished"
        );
        Ok(report)
    }

    fn ingest_one(&self, key: &str, report: &mut IngestReport) {
        let id = message_id_from_key(key);
        if id.is_empty() {
            report.skipped += 1;
            return;
        }
        if id == self.sentinel_id {
            debug!(key = key, "Skipping setup notification");
            report.sentinels += 1;
            return;
        }

        let raw = match self.source.get(key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = key, error = %e, "Could not fetch object");
                report.fail(key, Stage::Fetch, e);
                return;
            }
        };

        match self.store.put(&self.folder, id, &raw) {
            Ok(()) => report.stored += 1,
            Err(e) if e.is_duplicate() => {
                debug!(id = id, "Already ingested");
                report.duplicates += 1;
                return;
            }
            Err(e) => {
                warn!(key = key, error = %e, "Could not store message");
                report.fail(key, Stage::Store, e);
                return;
            }
        }

        match mime::decode(&raw) {
            Ok(message) => info!(
                id = id,
                from = %message.from,
                subject = %message.subject,
                attachments = message.attachments.len(),
                "Ingested message"
            ),
            Err(e) => {
                warn!(id = id, error = %e, "Stored message does not decode");
                report.fail(key, Stage::Decode, e);
            }
        }
    }
}
