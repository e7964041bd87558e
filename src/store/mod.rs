//! Append-only message storage, partitioned by folder and keyed by message id.
//!
//! Records are written once and never changed. Inside a folder they are
//! iterated in id order, so a page number always maps to the same records.

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use crate::error::{MailError, Result};

/// Folder for received mail.
pub const INBOX: &str = "inbox";

/// Folder for mail we sent.
pub const SENT: &str = "sent";

/// One raw message as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub folder: String,
    pub id: String,
    /// Original, undecoded EML bytes.
    pub raw: Vec<u8>,
}

/// Keyed persistence for raw messages.
///
/// Implementations must make `put` atomic (a concurrent reader sees the whole
/// record or nothing) and first-writer-wins (of two racing `put`s on the same
/// new id, one fails with [`MailError::DuplicateId`]).
pub trait MailStore: Send + Sync {
    /// Insert a record. Fails with [`MailError::DuplicateId`], without
    /// touching the existing record, when `(folder, id)` is taken.
    fn put(&self, folder: &str, id: &str, raw: &[u8]) -> Result<()>;

    /// Records `[(page - 1) * page_size, page * page_size)` of the folder in
    /// id order. Past the end is an empty page. Unknown folder is
    /// [`MailError::NotFound`].
    fn get_page(&self, folder: &str, page: usize, page_size: usize) -> Result<Vec<StoredRecord>>;

    /// A single record.
    fn get(&self, folder: &str, id: &str) -> Result<StoredRecord>;

    /// Number of records in the folder.
    fn count(&self, folder: &str) -> Result<usize>;
}

/// Folder names are path components: `[A-Za-z0-9_-]+`.
pub fn validate_folder(folder: &str) -> Result<()> {
    let valid = !folder.is_empty()
        && folder
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(MailError::InvalidRequest(format!("invalid folder name '{folder}'")))
    }
}

pub(crate) fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        Err(MailError::InvalidRequest("empty message id".into()))
    } else {
        Ok(())
    }
}

/// Turn a 1-based page into a `(skip, take)` window.
pub(crate) fn page_window(page: usize, page_size: usize) -> Result<(usize, usize)> {
    if page == 0 {
        return Err(MailError::InvalidRequest("page numbers start at 1".into()));
    }
    if page_size == 0 {
        return Err(MailError::InvalidRequest("page size must be positive".into()));
    }
    let skip = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| MailError::InvalidRequest("page out of range".into()))?;
    Ok((skip, page_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_folder() {
        assert!(validate_folder("inbox").is_ok());
        assert!(validate_folder("team_2-archive").is_ok());
        assert!(validate_folder("").is_err());
        assert!(validate_folder("../etc").is_err());
        assert!(validate_folder("a b").is_err());
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 50).unwrap(), (0, 50));
        assert_eq!(page_window(3, 10).unwrap(), (20, 10));
        assert!(matches!(page_window(0, 10), Err(MailError::InvalidRequest(_))));
        assert!(matches!(page_window(1, 0), Err(MailError::InvalidRequest(_))));
        assert!(page_window(usize::MAX, 2).is_err());
    }
}
