//! On-disk package cache.
//!
//! Layout:
//!
//! ```text
//! <cache>/
//! ├── packages/<signature-key>/
//! │   ├── entry.json      # CacheEntry
//! │   └── pkg/            # fetched package contents
//! ├── refs/<hash>.json    # persisted candidate listings
//! ├── registry/<hash>.json
//! └── tmp/stage-*/        # in-progress fetches
//! ```
//!
//! A fetch writes into a staging directory and is published with a single
//! rename, so readers never observe a half-written entry.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::core::{Candidate, PackageMeta, Signature};
use crate::util::fs::{ensure_dir, read_to_string, remove_dir_all_if_exists, write_string};
use crate::util::hash::sha256_str;

const PACKAGES: &str = "packages";
const TMP: &str = "tmp";
const REFS: &str = "refs";
const ENTRY_FILE: &str = "entry.json";
const PKG_DIR: &str = "pkg";

/// A published cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub signature: Signature,

    /// Directory holding the package contents
    pub path: PathBuf,

    pub meta: PackageMeta,

    /// Seconds since the Unix epoch
    pub fetched_at: u64,

    /// Contents of a mutable ref may go stale
    pub mutable: bool,
}

/// A fetch in progress. Dropped without [`PackageCache::put`], it is
/// removed from disk.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    /// Where the resolver should place the package contents.
    pub fn package_dir(&self) -> PathBuf {
        self.dir.path().join("entry").join(PKG_DIR)
    }

    fn entry_dir(&self) -> PathBuf {
        self.dir.path().join("entry")
    }
}

/// Filesystem-backed cache keyed by [`Signature`].
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    /// Open (creating if needed) the cache rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let cache = PackageCache::at(root);
        ensure_dir(&cache.root.join(PACKAGES))?;
        ensure_dir(&cache.root.join(TMP))?;
        Ok(cache)
    }

    /// Refer to a cache without touching the filesystem.
    pub fn at(root: &Path) -> Self {
        PackageCache {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(PACKAGES).join(key)
    }

    /// Look up the entry for a signature.
    ///
    /// An unreadable or mismatched entry is reported and treated as a miss.
    pub fn lookup(&self, sig: &Signature) -> Result<Option<CacheEntry>> {
        let dir = self.entry_dir(sig.key());
        let entry_file = dir.join(ENTRY_FILE);
        if !entry_file.is_file() {
            return Ok(None);
        }

        let entry = match read_entry(&entry_file) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("ignoring corrupt cache entry {}: {:#}", dir.display(), e);
                return Ok(None);
            }
        };

        if entry.signature != *sig || !entry.path.is_dir() {
            tracing::warn!("ignoring stale cache entry {}", dir.display());
            return Ok(None);
        }

        tracing::debug!("cache hit: {}", sig);
        Ok(Some(entry))
    }

    /// Start a fetch.
    pub fn stage(&self) -> Result<Staging> {
        let tmp = self.root.join(TMP);
        ensure_dir(&tmp)?;

        let dir = tempfile::Builder::new()
            .prefix("stage-")
            .tempdir_in(&tmp)
            .with_context(|| format!("failed to create staging dir in {}", tmp.display()))?;
        ensure_dir(&dir.path().join("entry").join(PKG_DIR))?;

        Ok(Staging { dir })
    }

    /// Publish a staged fetch under `sig`, replacing any previous entry.
    pub fn put(
        &self,
        staging: Staging,
        sig: &Signature,
        mut meta: PackageMeta,
        mutable: bool,
    ) -> Result<CacheEntry> {
        let final_dir = self.entry_dir(sig.key());
        let path = final_dir.join(PKG_DIR);
        meta.source_path = path.clone();

        let entry = CacheEntry {
            signature: sig.clone(),
            path,
            meta,
            fetched_at: now(),
            mutable,
        };

        let json = serde_json::to_string_pretty(&entry)?;
        write_string(&staging.entry_dir().join(ENTRY_FILE), &json)?;

        remove_dir_all_if_exists(&final_dir)?;
        ensure_dir(&self.root.join(PACKAGES))?;

        if let Err(e) = std::fs::rename(staging.entry_dir(), &final_dir) {
            // Another process may have published the same signature first
            if let Some(existing) = self.lookup(sig)? {
                tracing::debug!("lost publish race for {}", sig);
                return Ok(existing);
            }
            return Err(e).with_context(|| {
                format!("failed to publish cache entry {}", final_dir.display())
            });
        }

        tracing::debug!("cached {} at {}", sig, entry.path.display());
        Ok(entry)
    }

    /// All readable entries, sorted by signature.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let dir = self.root.join(PACKAGES);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for item in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read {}", dir.display()))?
        {
            let entry_file = item?.path().join(ENTRY_FILE);
            if !entry_file.is_file() {
                continue;
            }
            match read_entry(&entry_file) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("skipping {}: {:#}", entry_file.display(), e),
            }
        }

        entries.sort_by(|a, b| a.signature.cmp(&b.signature));
        Ok(entries)
    }

    /// Remove one entry. Returns whether anything was removed.
    pub fn remove(&self, sig: &Signature) -> Result<bool> {
        let dir = self.entry_dir(sig.key());
        let existed = dir.exists();
        remove_dir_all_if_exists(&dir)?;
        Ok(existed)
    }

    /// Remove everything in the cache.
    pub fn clean(&self) -> Result<()> {
        tracing::info!("Cleaning cache at {}", self.root.display());
        remove_dir_all_if_exists(&self.root)?;
        ensure_dir(&self.root.join(PACKAGES))?;
        ensure_dir(&self.root.join(TMP))
    }

    /// Persist a candidate listing.
    pub fn store_refs(&self, listing_key: &str, candidates: &[Candidate]) -> Result<()> {
        self.store_json(REFS, listing_key, &candidates)
    }

    /// Load a persisted candidate listing.
    pub fn load_refs(&self, listing_key: &str) -> Result<Option<Vec<Candidate>>> {
        self.load_json(REFS, listing_key)
    }

    /// Persist a small JSON document under `namespace`.
    pub fn store_json<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        write_string(&self.json_path(namespace, key), &json)
    }

    /// Load a JSON document stored with [`store_json`](Self::store_json).
    pub fn load_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        let path = self.json_path(namespace, key);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = read_to_string(&path)?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    fn json_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.root
            .join(namespace)
            .join(format!("{}.json", &sha256_str(key)[..16]))
    }
}

fn read_entry(path: &Path) -> Result<CacheEntry> {
    let contents = read_to_string(path)?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
