//! Content-addressed cache of transcoded ES modules.

use super::bundler::Bundler;
use super::shim::{legacy_shim, named_prebundle_entry, prebundle_entry, scan_exports, ShimFile};
use crate::descriptor::Descriptor;
use crate::error::TranscodeError;
use crate::paths::{package_dir, NODE_MODULES};
use crate::resolver::{resolve_export, ResolutionKind};
use bundle_free_util::fs::{exists, promote, read_to_string_lossy, temp_sibling};
use bundle_free_util::hash::sha256_str;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Default directory (under `node_modules`) owning the cache.
pub const DEFAULT_VENDOR: &str = "@bundle-free";

/// Suffix added to the key string of whole-package prebundles.
const PREBUNDLE_SUFFIX: &str = "#prebundle";

/// How the bundler entry is built from the resolved source.
#[derive(Debug, Clone, Copy)]
enum EntryPlan {
    /// Bundle the source file itself.
    Source,
    /// Re-export the scanned names of a CommonJS source.
    LegacyShim,
    /// Re-export a whole ES package (`named` lists scanned names explicitly).
    Prebundle { named: bool },
}

/// On-demand ES module cache.
///
/// Entries live in `<node_modules>/<vendor>/bundle-free/cache/<sha256>.js`
/// and are never rewritten once present: the key covers package name,
/// version and resolved source file, so an existing file is always current.
#[derive(Debug)]
pub struct TranscodeCache {
    root: PathBuf,
    cache_dir: PathBuf,
    url_prefix: String,
    bundler: Arc<dyn Bundler>,
    prebundle_shim: bool,
    locks: LockMap,
}

impl TranscodeCache {
    /// Create a cache under the `node_modules` directory `root`.
    pub fn new(root: PathBuf, vendor: &str, bundler: Arc<dyn Bundler>) -> Self {
        let cache_dir = package_dir(&root, vendor).join("bundle-free").join("cache");
        Self {
            root,
            cache_dir,
            url_prefix: format!("{NODE_MODULES}/{vendor}/bundle-free/cache"),
            bundler,
            prebundle_shim: false,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Pass whole-package prebundles through the export scan as well.
    #[must_use]
    pub fn with_prebundle_shim(mut self, enabled: bool) -> Self {
        self.prebundle_shim = enabled;
        self
    }

    /// Directory holding the cached files.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Hex content key of one cache entry.
    #[must_use]
    pub fn cache_key(name: &str, version: &str, source: &str) -> String {
        sha256_str(&format!("{name}/{version}/{source}"))
    }

    fn prebundle_key(name: &str, version: &str, source: &str) -> String {
        sha256_str(&format!("{name}/{version}/{source}{PREBUNDLE_SUFFIX}"))
    }

    /// Get the URL (relative to the mount path) of an ES version of
    /// `subpath`, bundling it on first use.
    ///
    /// With `enumerate_exports` the CommonJS entry is resolved and wrapped in
    /// a shim naming its exports; without it the ES entry is preferred.
    /// Returns `None` when the package has no such entry or transcoding
    /// fails; failures are logged.
    pub async fn get_or_create(
        &self,
        descriptor: &Descriptor,
        subpath: Option<&str>,
        enumerate_exports: bool,
    ) -> Option<String> {
        let kind = if enumerate_exports {
            ResolutionKind::Require
        } else {
            ResolutionKind::Source
        };
        let Some(source) = resolve_export(descriptor, subpath, kind.conditions()) else {
            debug!(package = %descriptor.name, ?subpath, %kind, "no source entry to transcode");
            return None;
        };

        let key = Self::cache_key(&descriptor.name, &descriptor.version, &source);
        let plan = if enumerate_exports {
            EntryPlan::LegacyShim
        } else {
            EntryPlan::Source
        };
        self.get_or_bundle(descriptor, &source, key, plan).await
    }

    /// Get the URL of a single-module bundle of a whole ES package.
    pub async fn get_or_create_prebundle(&self, descriptor: &Descriptor) -> Option<String> {
        let import = ResolutionKind::Import.conditions();
        let Some(source) = resolve_export(descriptor, None, import) else {
            debug!(package = %descriptor.name, "no ES entry to prebundle");
            return None;
        };

        let key = Self::prebundle_key(&descriptor.name, &descriptor.version, &source);
        let plan = EntryPlan::Prebundle {
            named: self.prebundle_shim,
        };
        self.get_or_bundle(descriptor, &source, key, plan).await
    }

    async fn get_or_bundle(
        &self,
        descriptor: &Descriptor,
        source: &str,
        key: String,
        plan: EntryPlan,
    ) -> Option<String> {
        let source_path = self.source_path(descriptor, source);
        match self.fill(&key, &source_path, plan).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(
                    package = %descriptor.name,
                    source = %source,
                    error = %e,
                    "transcode failed"
                );
                None
            }
        }
    }

    /// Produce the cache file for `key` unless it already exists.
    async fn fill(
        &self,
        key: &str,
        source: &Path,
        plan: EntryPlan,
    ) -> Result<String, TranscodeError> {
        let file_name = format!("{key}.js");
        let output = self.cache_dir.join(&file_name);
        let url = format!("{}/{file_name}", self.url_prefix);

        if exists(&output).await {
            debug!(key, "transcode cache hit");
            return Ok(url);
        }

        let entry = self.lock_for(key);
        let _guard = entry.lock.lock().await;

        // Another request may have produced it while we waited
        if exists(&output).await {
            debug!(key, "transcode cache hit after wait");
            return Ok(url);
        }
        debug!(key, source = %source.display(), "transcode cache miss");

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| TranscodeError::CacheDir {
                path: self.cache_dir.clone(),
                source: e,
            })?;

        let shim = match plan {
            EntryPlan::Source => None,
            EntryPlan::LegacyShim | EntryPlan::Prebundle { .. } => {
                let text = read_to_string_lossy(source).await.map_err(|e| {
                    TranscodeError::SourceRead {
                        path: source.to_path_buf(),
                        source: e,
                    }
                })?;
                let scan = scan_exports(&text);
                let contents = match plan {
                    EntryPlan::Prebundle { named: true } => named_prebundle_entry(source, &scan),
                    EntryPlan::Prebundle { named: false } => {
                        prebundle_entry(source, scan.has_default)
                    }
                    _ => legacy_shim(source, &scan),
                };
                let shim_path = self.cache_dir.join(format!("exports-{file_name}"));
                Some(ShimFile::create(shim_path, &contents).await?)
            }
        };
        let entry = shim.as_ref().map_or(source, ShimFile::path);

        let temp = temp_sibling(&output);
        if let Err(e) = self.bundler.bundle(entry, &temp).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }
        promote(&temp, &output)
            .await
            .map_err(|e| TranscodeError::Rename {
                path: output.clone(),
                source: e,
            })?;

        debug!(key, url = %url, "transcoded module cached");
        Ok(url)
    }

    fn source_path(&self, descriptor: &Descriptor, source: &str) -> PathBuf {
        let relative = source.strip_prefix("./").unwrap_or(source);
        package_dir(&self.root, &descriptor.name).join(relative)
    }

    fn lock_for<'a>(&'a self, key: &'a str) -> KeyLock<'a> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let lock = locks.entry(key.to_string()).or_default().clone();
        KeyLock {
            locks: &self.locks,
            key,
            lock,
        }
    }
}

type LockMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// A per-key fill lock, dropped from the map by its last holder.
struct KeyLock<'a> {
    locks: &'a LockMap,
    key: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Clones are only taken under this mutex: two means the map and us
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(self.key);
        }
    }
}
