//! In-process store, used for tests and short-lived sessions.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{MailError, Result};
use crate::store::{page_window, validate_folder, validate_id, MailStore, StoredRecord};

type Folder = BTreeMap<String, Arc<[u8]>>;

/// A [`MailStore`] kept in memory behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    folders: RwLock<BTreeMap<String, Folder>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Folder>> {
        // A panic elsewhere cannot leave a half-inserted record behind.
        self.folders.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl MailStore for MemoryStore {
    fn put(&self, folder: &str, id: &str, raw: &[u8]) -> Result<()> {
        validate_folder(folder)?;
        validate_id(id)?;

        let mut folders = self.folders.write().unwrap_or_else(|e| e.into_inner());
        let records = folders.entry(folder.to_string()).or_default();
        if records.contains_key(id) {
            return Err(MailError::DuplicateId {
                folder: folder.to_string(),
                id: id.to_string(),
            });
        }
        records.insert(id.to_string(), Arc::from(raw));
        Ok(())
    }

    fn get_page(&self, folder: &str, page: usize, page_size: usize) -> Result<Vec<StoredRecord>> {
        validate_folder(folder)?;
        let (skip, take) = page_window(page, page_size)?;

        let folders = self.read();
        let records = folders
            .get(folder)
            .ok_or_else(|| MailError::NotFound(format!("folder '{folder}'")))?;

        Ok(records
            .iter()
            .skip(skip)
            .take(take)
            .map(|(id, raw)| StoredRecord {
                folder: folder.to_string(),
                id: id.clone(),
                raw: raw.to_vec(),
            })
            .collect())
    }

    fn get(&self, folder: &str, id: &str) -> Result<StoredRecord> {
        validate_folder(folder)?;
        let folders = self.read();
        let raw = folders
            .get(folder)
            .and_then(|records| records.get(id))
            .ok_or_else(|| MailError::NotFound(format!("message '{id}' in '{folder}'")))?;
        Ok(StoredRecord {
            folder: folder.to_string(),
            id: id.to_string(),
            raw: raw.to_vec(),
        })
    }

    fn count(&self, folder: &str) -> Result<usize> {
        validate_folder(folder)?;
        self.read()
            .get(folder)
            .map(BTreeMap::len)
            .ok_or_else(|| MailError::NotFound(format!("folder '{folder}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_duplicate() {
        let store = MemoryStore::new();
        store.put("inbox", "a", b"first").unwrap();
        let err = store.put("inbox", "a", b"second").unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(store.get("inbox", "a").unwrap().raw, b"first");
        // Same id in another folder is a different key
        store.put("sent", "a", b"other").unwrap();
    }

    #[test]
    fn test_pages_in_id_order() {
        let store = MemoryStore::new();
        for id in ["c", "a", "e", "b", "d"] {
            store.put("inbox", id, id.as_bytes()).unwrap();
        }
        let ids = |page| -> Vec<String> {
            store
                .get_page("inbox", page, 2)
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect()
        };
        assert_eq!(ids(1), ["a", "b"]);
        assert_eq!(ids(2), ["c", "d"]);
        assert_eq!(ids(3), ["e"]);
        assert!(ids(4).is_empty());
        assert_eq!(store.count("inbox").unwrap(), 5);
    }

    #[test]
    fn test_missing_folder() {
        let store = MemoryStore::new();
        assert!(matches!(store.get_page("inbox", 1, 10), Err(MailError::NotFound(_))));
        assert!(matches!(store.count("inbox"), Err(MailError::NotFound(_))));
    }
}
