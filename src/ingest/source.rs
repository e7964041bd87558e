//! Where inbound mail comes from: an object store the receiving service
//! writes one raw message per object into.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{MailError, Result};

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full object key, `/`-separated (e.g. `emails/0100018f2a`).
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Read access to the bucket the receiving service writes into.
///
/// Calls are blocking and are not retried by the caller.
pub trait ObjectSource {
    /// Objects whose key starts with `prefix`, most recently modified first.
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Full content of one object.
    fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// An [`ObjectSource`] over a local directory, e.g. a synced copy of the bucket.
///
/// Keys are paths relative to the root with `/` separators.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<ObjectInfo>) -> Result<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| transport(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| transport(dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| transport(&path, e))?;

            if file_type.is_dir() {
                self.walk(&path, prefix, out)?;
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let Some(key) = self.key_for(&path) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| transport(&path, e))?;
            out.push(ObjectInfo {
                key,
                last_modified: DateTime::<Utc>::from(modified),
            });
        }
        Ok(())
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }
}

impl ObjectSource for DirSource {
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        self.walk(&self.root, prefix, &mut objects)?;
        objects.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(objects)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        if key.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(MailError::Transport(format!("invalid object key '{key}'")));
        }
        let path = key.split('/').fold(self.root.clone(), |p, part| p.join(part));
        std::fs::read(&path).map_err(|e| transport(&path, e))
    }
}

fn transport(path: &Path, e: std::io::Error) -> MailError {
    MailError::Transport(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_dir_source_lists_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let emails = tmp.path().join("emails");
        std::fs::create_dir_all(&emails).unwrap();
        std::fs::write(tmp.path().join("other.txt"), b"x").unwrap();

        let base = SystemTime::now() - Duration::from_secs(3600);
        for (i, name) in ["old", "mid", "new"].iter().enumerate() {
            let path = emails.join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(base + Duration::from_secs(60 * i as u64)).unwrap();
        }

        let source = DirSource::new(tmp.path());
        let keys: Vec<_> = source
            .list("emails/")
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, ["emails/new", "emails/mid", "emails/old"]);
        assert_eq!(source.get("emails/mid").unwrap(), b"mid");
    }

    #[test]
    fn test_dir_source_errors_are_transport() {
        let tmp = tempfile::tempdir().unwrap();
        let source = DirSource::new(tmp.path());
        assert!(matches!(source.get("emails/missing"), Err(MailError::Transport(_))));
        assert!(matches!(source.get("../escape"), Err(MailError::Transport(_))));
        let missing = DirSource::new(tmp.path().join("nope"));
        assert!(matches!(missing.list(""), Err(MailError::Transport(_))));
    }
}
