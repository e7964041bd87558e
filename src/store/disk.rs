//! On-disk store: one directory per folder, one `.eml` file per record.
//!
//! ```text
//! <root>/
//!   inbox/
//!     0100018f2a.eml
//!     msg%2F42.eml      (id "msg/42")
//!     ~3f9a...e1.eml    (id too long to escape into a file name)
//!     ~3f9a...e1.id     (that id, verbatim)
//!   sent/
//!     ...
//! ```
//!
//! Each record is staged in a temp file inside its folder and then linked
//! into place with `persist_noclobber`, so readers never see a partial file
//! and the first writer of an id wins. For hashed names the `.id` file is in
//! place before the record is linked.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{MailError, Result};
use crate::store::{page_window, validate_folder, validate_id, MailStore, StoredRecord};

const EXTENSION: &str = "eml";

/// Extension of the file holding the id behind a hashed name.
const ID_EXTENSION: &str = "id";

/// Longest escaped id used directly as a file stem. Common file systems cap
/// names at 255 bytes.
const MAX_STEM_LEN: usize = 200;

/// First character of hashed stems. Escaped ids never contain it.
const HASHED_MARK: char = '~';

/// A [`MailStore`] rooted at a directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| MailError::io(&root, e))?;
        info!(root = %root.display(), "Opened message store");
        Ok(Self { root })
    }

    /// Directory holding the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    fn record_path(&self, folder: &str, id: &str) -> PathBuf {
        self.folder_dir(folder)
            .join(format!("{}.{EXTENSION}", file_stem(id)))
    }

    /// Id behind a file stem found in a folder listing.
    fn id_for_stem(&self, dir: &Path, stem: &str) -> Option<String> {
        if !stem.starts_with(HASHED_MARK) {
            return unescape_id(stem);
        }
        let id_path = dir.join(format!("{stem}.{ID_EXTENSION}"));
        match std::fs::read_to_string(&id_path) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(path = %id_path.display(), error = %e, "Hashed record has no readable id");
                None
            }
        }
    }

    /// All ids of a folder, sorted, with their file paths.
    fn index(&self, folder: &str) -> Result<BTreeMap<String, PathBuf>> {
        let dir = self.folder_dir(folder);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MailError::NotFound(format!("folder '{folder}'")));
            }
            Err(e) => return Err(MailError::io(&dir, e)),
        };

        let mut index = BTreeMap::new();
        for entry in entries {
            let path = entry.map_err(|e| MailError::io(&dir, e))?.path();
            // Temp files start with '.' and have no .eml extension
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            if let Some(id) = self.id_for_stem(&dir, stem) {
                index.insert(id, path);
            }
        }
        Ok(index)
    }
}

impl MailStore for DiskStore {
    fn put(&self, folder: &str, id: &str, raw: &[u8]) -> Result<()> {
        validate_folder(folder)?;
        validate_id(id)?;

        let dir = self.folder_dir(folder);
        let target = self.record_path(folder, id);
        let duplicate = || MailError::DuplicateId {
            folder: folder.to_string(),
            id: id.to_string(),
        };

        if target.exists() {
            return Err(duplicate());
        }

        std::fs::create_dir_all(&dir).map_err(|e| MailError::io(&dir, e))?;
        let stem = file_stem(id);
        if stem.starts_with(HASHED_MARK) {
            // Same stem, same id: racing writers replace it with equal bytes
            let id_path = dir.join(format!("{stem}.{ID_EXTENSION}"));
            let staged = stage(&dir, id.as_bytes())?;
            staged
                .persist(&id_path)
                .map_err(|e| MailError::io(&id_path, e.error))?;
        }

        let staged = stage(&dir, raw)?;
        match staged.persist_noclobber(&target) {
            Ok(_) => {
                debug!(folder = folder, id = id, bytes = raw.len(), "Stored message");
                Ok(())
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Err(duplicate()),
            Err(e) => Err(MailError::io(&target, e.error)),
        }
    }

    fn get_page(&self, folder: &str, page: usize, page_size: usize) -> Result<Vec<StoredRecord>> {
        validate_folder(folder)?;
        let (skip, take) = page_window(page, page_size)?;

        self.index(folder)?
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|(id, path)| {
                let raw = std::fs::read(&path).map_err(|e| MailError::io(&path, e))?;
                Ok(StoredRecord {
                    folder: folder.to_string(),
                    id,
                    raw,
                })
            })
            .collect()
    }

    fn get(&self, folder: &str, id: &str) -> Result<StoredRecord> {
        validate_folder(folder)?;
        validate_id(id)?;

        let path = self.record_path(folder, id);
        match std::fs::read(&path) {
            Ok(raw) => Ok(StoredRecord {
                folder: folder.to_string(),
                id: id.to_string(),
                raw,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MailError::NotFound(
                format!("message '{id}' in '{folder}'"),
            )),
            Err(e) => Err(MailError::io(&path, e)),
        }
    }

    fn count(&self, folder: &str) -> Result<usize> {
        validate_folder(folder)?;
        Ok(self.index(folder)?.len())
    }
}

/// Write `bytes` to a synced temp file in `dir`.
fn stage(dir: &Path, bytes: &[u8]) -> Result<tempfile::NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix(".put-")
        .tempfile_in(dir)
        .map_err(|e| MailError::io(dir, e))?;
    staged
        .write_all(bytes)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|e| MailError::io(staged.path(), e))?;
    Ok(staged)
}

/// File stem for `id`: the escaped id, or `~` plus its SHA-256 when the
/// escaped form is too long for a file name.
fn file_stem(id: &str) -> String {
    let escaped = escape_id(id);
    if escaped.len() <= MAX_STEM_LEN {
        return escaped;
    }
    let digest = Sha256::digest(id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{HASHED_MARK}{hex}")
}

/// Percent-escape everything outside `[A-Za-z0-9_-]` so any id is a safe,
/// reversible file name. A leading '.' is always escaped.
fn escape_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn unescape_id(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
