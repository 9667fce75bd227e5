//! Durable tier: one payload file and one metadata sidecar per key
//!
//! Layout inside the cache directory:
//!
//! ```text
//! <key>.<ext>        payload bytes (ext from the content type)
//! <key>.meta.json    EntryMetadata
//! ```
//!
//! Each file is written to a temporary sibling and renamed into place. The
//! payload lands before the sidecar, so a readable sidecar always describes a
//! complete payload. A crash between the two renames leaves an orphaned
//! payload, which the sweeper removes once it is older than the TTL.

use crate::error::{CacheError, Result};
use crate::key::is_key;
use crate::types::{CacheEntry, EntryMetadata};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, warn};

const META_SUFFIX: &str = ".meta.json";
const TEMP_SUFFIX: &str = ".tmp";
const PAYLOAD_EXTENSIONS: &[&str] = &["png", "jpeg", "webp", "bin"];

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File extension used for a payload of the given content type
pub(crate) fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpeg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// A file found while scanning the cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DiskFile {
    Meta { key: String },
    Payload { key: String, path: PathBuf },
    Temp { path: PathBuf },
}

impl DiskFile {
    fn classify(dir: &Path, name: &str) -> Option<Self> {
        if name.ends_with(TEMP_SUFFIX) {
            return Some(DiskFile::Temp {
                path: dir.join(name),
            });
        }
        if let Some(key) = name.strip_suffix(META_SUFFIX) {
            return is_key(key).then(|| DiskFile::Meta {
                key: key.to_string(),
            });
        }
        let (key, ext) = name.split_once('.')?;
        (is_key(key) && PAYLOAD_EXTENSIONS.contains(&ext)).then(|| DiskFile::Payload {
            key: key.to_string(),
            path: dir.join(name),
        })
    }
}

pub(crate) struct DiskTier {
    dir: PathBuf,
}

impl DiskTier {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", key, META_SUFFIX))
    }

    fn payload_path(&self, key: &str, content_type: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, extension_for(content_type)))
    }

    fn payload_paths<'a>(&'a self, key: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        PAYLOAD_EXTENSIONS
            .iter()
            .map(move |ext| self.dir.join(format!("{}.{}", key, ext)))
    }

    /// Read and parse the sidecar for `key`. `Ok(None)` when it does not exist.
    pub async fn read_metadata(&self, key: &str) -> Result<Option<EntryMetadata>> {
        let raw = match fs::read(self.meta_path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Read the payload a sidecar describes. `Ok(None)` when it is missing.
    pub async fn read_payload(&self, key: &str, meta: &EntryMetadata) -> Result<Option<Vec<u8>>> {
        match fs::read(self.payload_path(key, &meta.content_type)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist payload then sidecar, each via rename.
    ///
    /// A payload left under another extension by an earlier write with a
    /// different content type is removed afterwards.
    pub async fn write(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let meta = serde_json::to_vec_pretty(&EntryMetadata::from(entry))?;
        let payload = self.payload_path(key, &entry.content_type);
        write_atomic(&payload, &entry.data).await?;
        write_atomic(&self.meta_path(key), &meta).await?;

        for stale in self.payload_paths(key).filter(|p| *p != payload) {
            if let Err(e) = remove_if_exists(&stale).await {
                warn!(path = ?stale, error = %e, "Failed to remove superseded payload");
            }
        }

        debug!(key = %key, size = entry.size, "Persisted entry to disk");
        Ok(())
    }

    /// Remove every file belonging to `key`. Missing files are fine.
    ///
    /// Every removal is attempted even when an earlier one fails.
    pub async fn remove(&self, key: &str) -> Result<()> {
        // Sidecar first so a concurrent reader never sees it without a payload
        let paths = std::iter::once(self.meta_path(key)).chain(self.payload_paths(key));

        let mut failed = 0;
        for path in paths {
            if let Err(e) = remove_if_exists(&path).await {
                warn!(path = ?path, error = %e, "Failed to remove cache file");
                failed += 1;
            }
        }
        match failed {
            0 => Ok(()),
            failed => Err(CacheError::Incomplete { failed }),
        }
    }

    /// Remove every regular file in the cache directory, plus anything
    /// occupying a cache file name. Returns how many were removed.
    ///
    /// Failures are logged and counted; the pass continues past them.
    pub async fn clear(&self) -> Result<usize> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        let mut failed = 0;
        loop {
            let item = match dir.next_entry().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to list cache directory");
                    failed += 1;
                    break;
                }
            };

            let path = item.path();
            let is_cache_file = item
                .file_name()
                .to_str()
                .and_then(|name| DiskFile::classify(&self.dir, name))
                .is_some();
            if !is_cache_file {
                match item.file_type().await {
                    Ok(kind) if kind.is_file() => {}
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(path = ?path, error = %e, "Failed to inspect cache file");
                        failed += 1;
                        continue;
                    }
                }
            }

            match remove_if_exists(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to remove cache file");
                    failed += 1;
                }
            }
        }

        match failed {
            0 => Ok(removed),
            failed => Err(CacheError::Incomplete { failed }),
        }
    }

    /// List recognizable files in the cache directory
    pub async fn scan(&self) -> Result<Vec<DiskFile>> {
        let mut files = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            if let Some(file) = name.to_str().and_then(|n| DiskFile::classify(&self.dir, n)) {
                files.push(file);
            }
        }
        Ok(files)
    }

    #[cfg(test)]
    pub async fn has_metadata(&self, key: &str) -> bool {
        fs::try_exists(self.meta_path(key)).await.unwrap_or(false)
    }
}

/// Last modification time of a file
pub(crate) async fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = fs::metadata(path).await?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

pub(crate) async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(
        "{}.{}-{}{}",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
        TEMP_SUFFIX
    ));

    fs::write(&temp, data).await?;
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}
