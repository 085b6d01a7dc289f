//! External collaborators of the harvest worker.
//!
//! The worker loop talks to three services it does not own: a work queue
//! that hands out media keys, a media vault that stores the referenced
//! recordings, and an optional dataset uploader. Each is a trait so the
//! pipeline can be driven end to end with local file-backed stand-ins.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// One unit of work: a recording waiting to be harvested.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    /// Key of the recording within its storage provider.
    pub media_key: String,
    /// Storage provider that holds the recording.
    pub provider: String,
}

/// Hands out recordings to harvest, one at a time.
pub trait WorkQueue {
    /// Take the next item, or `None` when the queue is currently empty.
    fn pop(&mut self) -> Result<Option<WorkItem>>;
}

/// Stores the recordings the queue refers to.
pub trait MediaVault {
    /// Fetch the recording into a local file and return its path.
    fn fetch(&self, item: &WorkItem, scratch_dir: &Path) -> Result<PathBuf>;

    /// Remove the recording from the vault.
    fn delete(&self, item: &WorkItem) -> Result<()>;
}

/// Receives a finished dataset directory.
pub trait DatasetUploader {
    fn upload(&self, dataset_dir: &Path) -> Result<()>;
}

// ----------------------------------------------------------------------------
// File-backed queue
// ----------------------------------------------------------------------------

/// Work queue backed by a newline-delimited JSON spool file. Popping removes
/// the first line and rewrites the remainder, so a crash mid-video leaves the
/// item consumed rather than redelivered.
pub struct SpoolQueue {
    path: PathBuf,
}

impl SpoolQueue {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append an item to the end of the spool.
    pub fn push(&mut self, item: &WorkItem) -> Result<()> {
        let mut contents = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read spool {}", self.path.display()))
            }
        };
        contents.push_str(&serde_json::to_string(item)?);
        contents.push('\n');
        fs::write(&self.path, contents)
            .with_context(|| format!("write spool {}", self.path.display()))?;
        Ok(())
    }
}

impl WorkQueue for SpoolQueue {
    fn pop(&mut self) -> Result<Option<WorkItem>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read spool {}", self.path.display()))
            }
        };
        let mut lines = contents.lines();
        let Some(first) = lines.find(|line| !line.trim().is_empty()) else {
            return Ok(None);
        };
        let item: WorkItem = serde_json::from_str(first)
            .with_context(|| format!("invalid spool entry in {}", self.path.display()))?;
        let rest: String = lines
            .filter(|line| !line.trim().is_empty())
            .map(|line| format!("{line}\n"))
            .collect();
        fs::write(&self.path, rest)
            .with_context(|| format!("rewrite spool {}", self.path.display()))?;
        Ok(Some(item))
    }
}

// ----------------------------------------------------------------------------
// File-backed vault
// ----------------------------------------------------------------------------

/// Vault backed by a local media directory; the media key is a relative path.
pub struct LocalVault {
    media_dir: PathBuf,
}

impl LocalVault {
    pub fn new(media_dir: PathBuf) -> Self {
        Self { media_dir }
    }

    fn resolve(&self, item: &WorkItem) -> Result<PathBuf> {
        // Keys must stay inside the media directory.
        let key = Path::new(&item.media_key);
        if key.is_absolute() || key.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(anyhow!("media key '{}' escapes the media dir", item.media_key));
        }
        Ok(self.media_dir.join(key))
    }
}

impl MediaVault for LocalVault {
    fn fetch(&self, item: &WorkItem, _scratch_dir: &Path) -> Result<PathBuf> {
        let path = self.resolve(item)?;
        if !path.is_file() {
            return Err(anyhow!("media '{}' not found in vault", item.media_key));
        }
        Ok(path)
    }

    fn delete(&self, item: &WorkItem) -> Result<()> {
        let path = self.resolve(item)?;
        fs::remove_file(&path)
            .with_context(|| format!("delete media {}", path.display()))?;
        Ok(())
    }
}

/// Uploader that only logs; used when no training platform is wired up.
pub struct NoopUploader;

impl DatasetUploader for NoopUploader {
    fn upload(&self, dataset_dir: &Path) -> Result<()> {
        log::info!("upload skipped for {}", dataset_dir.display());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// HTTP vault (feature: vault-http)
// ----------------------------------------------------------------------------

#[cfg(feature = "vault-http")]
pub use http_vault::HttpVault;

#[cfg(feature = "vault-http")]
mod http_vault {
    use super::*;
    use std::io::Read;

    /// Vault reached over HTTP with per-request storage credentials carried in
    /// headers.
    pub struct HttpVault {
        base_url: url::Url,
        access_key: String,
        secret_key: String,
    }

    impl HttpVault {
        pub fn new(base_url: &str, access_key: String, secret_key: String) -> Result<Self> {
            let base_url = url::Url::parse(base_url)
                .with_context(|| format!("invalid vault url '{}'", base_url))?;
            Ok(Self {
                base_url,
                access_key,
                secret_key,
            })
        }

        fn request(&self, method: &str, path: &str, item: &WorkItem) -> ureq::Request {
            let url = format!("{}{}", self.base_url, path);
            ureq::request(method, &url)
                .set("X-Kerberos-Storage-FileName", &item.media_key)
                .set("X-Kerberos-Storage-Provider", &item.provider)
                .set("X-Kerberos-Storage-Access-Key", &self.access_key)
                .set("X-Kerberos-Storage-Secret-Key", &self.secret_key)
        }
    }

    impl MediaVault for HttpVault {
        fn fetch(&self, item: &WorkItem, scratch_dir: &Path) -> Result<PathBuf> {
            let response = self
                .request("GET", "storage/blob", item)
                .call()
                .with_context(|| format!("fetch media '{}'", item.media_key))?;
            let mut bytes = Vec::new();
            response
                .into_reader()
                .read_to_end(&mut bytes)
                .context("read vault response body")?;

            let file_name = item.media_key.replace('/', "_");
            let path = scratch_dir.join(file_name);
            fs::write(&path, bytes)
                .with_context(|| format!("write fetched media {}", path.display()))?;
            Ok(path)
        }

        fn delete(&self, item: &WorkItem) -> Result<()> {
            self.request("DELETE", "storage", item)
                .call()
                .with_context(|| format!("delete media '{}'", item.media_key))?;
            log::info!("deleted '{}' from vault", item.media_key);
            Ok(())
        }
    }
}
