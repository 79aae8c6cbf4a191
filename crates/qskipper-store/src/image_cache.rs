//! Two-tier image cache.
//!
//! The memory tier is a byte-capped LRU map; the disk tier is one file per
//! [`CacheKey`] inside a dedicated directory, byte-capped with recency
//! tracked through file modification times. Reads fall through memory to
//! disk and promote disk hits. Writes go to both tiers, last write wins.
//!
//! Cache failures are never fatal for readers: an unreadable file is a miss.
//! Disk mutations (`put`, `clear`, promotion) are serialized by one lock, so
//! a sweep never races an in-flight write.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use qskipper_shared::{CacheKey, CachedImage};

use crate::error::Result;

/// Default memory tier cap (32 MiB).
pub const DEFAULT_MEMORY_CAP_BYTES: usize = 32 * 1024 * 1024;

/// Default disk tier cap (200 MiB).
pub const DEFAULT_DISK_CAP_BYTES: u64 = 200 * 1024 * 1024;

#[derive(Debug)]
struct MemoryEntry {
    bytes: Bytes,
    last_used: u64,
}

#[derive(Debug, Default)]
struct MemoryTier {
    entries: HashMap<CacheKey, MemoryEntry>,
    clock: u64,
    bytes: usize,
}

impl MemoryTier {
    fn get(&mut self, key: &CacheKey) -> Option<Bytes> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(key).map(|entry| {
            entry.last_used = clock;
            entry.bytes.clone()
        })
    }

    fn insert(&mut self, key: CacheKey, bytes: Bytes, cap: usize) {
        self.remove(&key);
        if bytes.len() > cap {
            debug!(key = %key, size = bytes.len(), "Image larger than memory tier, not kept in memory");
            return;
        }
        self.clock += 1;
        self.bytes += bytes.len();
        self.entries.insert(
            key,
            MemoryEntry {
                bytes,
                last_used: self.clock,
            },
        );

        while self.bytes > cap {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            debug!(key = %oldest, "Evicting image from memory tier");
            self.remove(&oldest);
        }
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(old) = self.entries.remove(key) {
            self.bytes -= old.bytes.len();
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }
}

/// Snapshot of the memory tier's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub entries: usize,
    pub bytes: usize,
}

#[derive(Debug)]
struct Inner {
    dir: PathBuf,
    memory: Mutex<MemoryTier>,
    /// Held across every disk mutation. Taken before `memory` when both are needed.
    disk: Mutex<()>,
    memory_cap: usize,
    disk_cap: u64,
}

/// Cloneable handle; clones share both tiers.
#[derive(Debug, Clone)]
pub struct ImageCache {
    inner: Arc<Inner>,
}

impl ImageCache {
    /// Open the cache over `dir`, creating the directory if needed. Files
    /// already present form the warm disk tier.
    pub async fn open(dir: PathBuf, memory_cap: usize, disk_cap: u64) -> Result<Self> {
        fs::create_dir_all(&dir).await?;

        info!(path = %dir.display(), memory_cap, disk_cap, "Image cache initialized");

        Ok(Self {
            inner: Arc::new(Inner {
                dir,
                memory: Mutex::new(MemoryTier::default()),
                disk: Mutex::new(()),
                memory_cap,
                disk_cap,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.inner.dir.join(key.as_str())
    }

    /// Memory tier, then disk tier with promotion. `None` means the caller
    /// has to fetch.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedImage> {
        if let Some(bytes) = self.inner.memory.lock().await.get(key) {
            return Some(CachedImage {
                key: key.clone(),
                bytes,
            });
        }

        let _disk = self.inner.disk.lock().await;
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable cached image, treating as miss");
                return None;
            }
        };

        touch(path).await;
        self.inner
            .memory
            .lock()
            .await
            .insert(key.clone(), bytes.clone(), self.inner.memory_cap);
        debug!(key = %key, size = bytes.len(), "Promoted image from disk tier");

        Some(CachedImage {
            key: key.clone(),
            bytes,
        })
    }

    /// Write both tiers unconditionally.
    pub async fn put(&self, key: &CacheKey, bytes: Bytes) -> Result<()> {
        let _disk = self.inner.disk.lock().await;
        self.inner
            .memory
            .lock()
            .await
            .insert(key.clone(), bytes.clone(), self.inner.memory_cap);

        if bytes.len() as u64 > self.inner.disk_cap {
            debug!(key = %key, size = bytes.len(), "Image larger than disk tier, kept in memory only");
            return Ok(());
        }

        // Write-then-rename so concurrent readers never see a partial file.
        let path = self.path_for(key);
        let tmp = self
            .inner
            .dir
            .join(format!(".{}.{}.tmp", key.as_str(), unique_suffix()));
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;

        debug!(key = %key, size = bytes.len(), "Stored image");

        self.enforce_disk_cap(key).await
    }

    /// Empty both tiers. Safe to call repeatedly and on a missing directory.
    pub async fn clear(&self) -> Result<()> {
        let _disk = self.inner.disk.lock().await;
        self.inner.memory.lock().await.clear();

        let mut entries = match fs::read_dir(&self.inner.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(removed, "Image cache cleared");
        Ok(())
    }

    pub async fn memory_stats(&self) -> MemoryStats {
        let memory = self.inner.memory.lock().await;
        MemoryStats {
            entries: memory.entries.len(),
            bytes: memory.bytes,
        }
    }

    /// Evict least-recently-used files until the disk tier fits its cap.
    /// The key just written is never evicted. Caller holds the disk lock.
    async fn enforce_disk_cap(&self, keep: &CacheKey) -> Result<()> {
        let mut files = Vec::new();
        let mut total: u64 = 0;
        let mut entries = fs::read_dir(&self.inner.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(CacheKey::from_hex) else {
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            total += meta.len();
            files.push((modified, key, meta.len()));
        }

        if total <= self.inner.disk_cap {
            return Ok(());
        }

        files.sort();
        for (_, key, len) in files {
            if total <= self.inner.disk_cap {
                break;
            }
            if &key == keep {
                continue;
            }
            match fs::remove_file(self.path_for(&key)).await {
                Ok(()) => {
                    total -= len;
                    debug!(key = %key, "Evicted image from disk tier");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => total -= len,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Mark a file as recently used. Runs on the blocking pool since tokio has
/// no async `set_modified`.
async fn touch(path: PathBuf) {
    let result = tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(SystemTime::now()))
            .map_err(|e| (path, e))
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err((path, e))) => {
            debug!(path = %path.display(), error = %e, "Could not bump cached image recency");
        }
        Err(e) => debug!(error = %e, "Recency update task failed"),
    }
}

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}
