//! Mail account state: the domain we receive for, the bucket inbound mail
//! lands in, and how far domain verification has got.
//!
//! Stored as `account.toml` in the data directory. Every change goes through
//! [`AccountFile::update`], which serializes writers within the process and
//! replaces the file atomically.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MailError, Result};

/// File name inside the data directory.
pub const ACCOUNT_FILE: &str = "account.toml";

/// Prefix of generated bucket names.
const BUCKET_PREFIX: &str = "AstroMail";

/// S3 bucket names are at most 63 characters.
const MAX_BUCKET_NAME: usize = 63;

static UPDATE_LOCK: Mutex<()> = Mutex::new(());

/// Domain identity verification state as reported by the mail service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    #[default]
    NotStarted,
    Pending,
    Success,
    Failed,
    TemporaryFailure,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::Pending => "Pending",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::TemporaryFailure => "TemporaryFailure",
        }
    }

    /// Mail can be received once the domain is verified.
    pub fn is_verified(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self> {
        let status = match s.trim().to_ascii_lowercase().as_str() {
            "notstarted" | "not-started" => Self::NotStarted,
            "pending" => Self::Pending,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "temporaryfailure" | "temporary-failure" => Self::TemporaryFailure,
            _ => {
                return Err(MailError::Config(format!(
                    "unknown verification status '{s}'"
                )))
            }
        };
        Ok(status)
    }
}

/// Settable fields of [`AccountState`], by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountField {
    Domain,
    Bucket,
    RoleArn,
    Status,
}

impl FromStr for AccountField {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "domain" => Ok(Self::Domain),
            "bucket" => Ok(Self::Bucket),
            "role_arn" | "role-arn" => Ok(Self::RoleArn),
            "status" => Ok(Self::Status),
            _ => Err(MailError::Config(format!("unknown account field '{s}'"))),
        }
    }
}

/// Persisted account state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountState {
    /// Domain mail is received for.
    pub domain: Option<String>,
    /// Bucket the receiving service writes into.
    pub bucket: Option<String>,
    /// Role the receiving service assumes to write into the bucket.
    pub role_arn: Option<String>,
    pub status: VerificationStatus,
}

impl AccountState {
    /// Current value of a field, if set.
    pub fn get(&self, field: AccountField) -> Option<String> {
        match field {
            AccountField::Domain => self.domain.clone(),
            AccountField::Bucket => self.bucket.clone(),
            AccountField::RoleArn => self.role_arn.clone(),
            AccountField::Status => Some(self.status.to_string()),
        }
    }

    /// Set a field from its text form.
    ///
    /// Setting the domain also fills in a bucket name when none is set.
    pub fn set(&mut self, field: AccountField, value: &str) -> Result<()> {
        let value = value.trim();
        match field {
            AccountField::Domain => {
                if value.is_empty() {
                    return Err(MailError::Config("domain must not be empty".into()));
                }
                if self.bucket.is_none() {
                    self.bucket = Some(bucket_name_for(value));
                }
                self.domain = Some(value.to_string());
            }
            AccountField::Bucket => self.bucket = non_empty(value),
            AccountField::RoleArn => self.role_arn = non_empty(value),
            AccountField::Status => self.status = value.parse()?,
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// The on-disk account state.
#[derive(Debug, Clone)]
pub struct AccountFile {
    path: PathBuf,
}

impl AccountFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `account.toml` inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(ACCOUNT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state. A missing file is the default state.
    pub fn load(&self) -> Result<AccountState> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No account file yet");
                return Ok(AccountState::default());
            }
            Err(e) => return Err(MailError::io(&self.path, e)),
        };
        toml::from_str(&contents)
            .map_err(|e| MailError::Config(format!("{}: {e}", self.path.display())))
    }

    /// Read, modify with `f`, and write back.
    ///
    /// Updates within this process run one at a time. The file is replaced
    /// atomically; if `f` fails nothing is written.
    pub fn update<F>(&self, f: F) -> Result<AccountState>
    where
        F: FnOnce(&mut AccountState) -> Result<()>,
    {
        let _guard = UPDATE_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut state = self.load()?;
        f(&mut state)?;
        self.write(&state)?;
        info!(path = %self.path.display(), "Updated account state");
        Ok(state)
    }

    /// Set one field by name.
    pub fn set(&self, field: AccountField, value: &str) -> Result<AccountState> {
        self.update(|state| state.set(field, value))
    }

    pub fn set_domain(&self, domain: &str) -> Result<AccountState> {
        self.set(AccountField::Domain, domain)
    }

    pub fn set_bucket(&self, bucket: &str) -> Result<AccountState> {
        self.set(AccountField::Bucket, bucket)
    }

    pub fn set_role_arn(&self, role_arn: &str) -> Result<AccountState> {
        self.set(AccountField::RoleArn, role_arn)
    }

    pub fn set_status(&self, status: VerificationStatus) -> Result<AccountState> {
        self.update(|state| {
            state.status = status;
            Ok(())
        })
    }

    fn write(&self, state: &AccountState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| MailError::io(&dir, e))?;

        let contents = toml::to_string_pretty(state)
            .map_err(|e| MailError::Config(format!("cannot serialize account state: {e}")))?;

        let mut staged =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| MailError::io(&dir, e))?;
        staged
            .write_all(contents.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| MailError::io(staged.path(), e))?;
        staged
            .persist(&self.path)
            .map_err(|e| MailError::io(&self.path, e.error))?;
        Ok(())
    }
}

/// A valid S3 bucket name for receiving mail for `domain`.
///
/// Lowercase; characters outside `[a-z0-9.-]` become `-`. A run of
/// separators collapses to one, and `.` wins over `-`, so the name never
/// contains `--`, `..`, `-.` or `.-`. Starts and ends with a letter or
/// digit; at most 63 characters.
pub fn bucket_name_for(domain: &str) -> String {
    let raw = format!("{BUCKET_PREFIX}-{domain}").to_lowercase();

    let mut name = String::with_capacity(raw.len());
    let mut pending: Option<char> = None;
    for c in raw.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if let Some(sep) = pending.take() {
                if !name.is_empty() {
                    name.push(sep);
                }
            }
            name.push(c);
        } else {
            let sep = if c == '.' { '.' } else { '-' };
            pending = match pending {
                Some('.') => Some('.'),
                _ => Some(sep),
            };
        }
    }

    // Only ASCII is left, so byte truncation is safe
    name.truncate(MAX_BUCKET_NAME);
    name.trim_end_matches(['-', '.']).to_string()
}
