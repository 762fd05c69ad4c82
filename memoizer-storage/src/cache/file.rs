//! File-backed cache with an in-memory front layer.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<asof folder>/<call filename>.res.json
//! <root>/<asof folder>/<call filename>.metadata.json
//! ```
//!
//! The asof folder is the formatted asof with `:` replaced by `-`; the call
//! filename is the filesystem-safe form of the call identity. Writes go to
//! disk and then to the front layer. Reads prefer the front layer.
//!
//! Listing scans the metadata files, so it recovers exact node identities
//! even when long call filenames were truncated.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use memoizer_core::{
    asof_folder_name, parse_asof, Asof, CacheError, CallId, MemoError, MemoResult, Metadata,
    NodeId,
};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::memory::InMemoryCache;
use super::traits::{Cache, CacheStats, CachedResult};

/// Suffix of result files.
pub const RESULT_SUFFIX: &str = ".res.json";

/// Suffix of metadata files.
pub const METADATA_SUFFIX: &str = ".metadata.json";

/// Persistent cache rooted at a directory.
pub struct FileCache {
    root: PathBuf,
    front: InMemoryCache,
    stats: RwLock<CacheStats>,
}

impl FileCache {
    /// Create a file cache rooted at `root`.
    ///
    /// The directory is created on first write. `front_capacity_bytes` bounds
    /// the in-memory front layer; zero disables it.
    pub fn new(root: impl Into<PathBuf>, front_capacity_bytes: u64) -> Self {
        Self {
            root: root.into(),
            front: InMemoryCache::new(Some(front_capacity_bytes)),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The in-memory front layer.
    pub fn front(&self) -> &InMemoryCache {
        &self.front
    }

    /// Path of the result or metadata file for `node_id`.
    pub fn entry_path(&self, node_id: &NodeId, suffix: &str) -> MemoResult<PathBuf> {
        let (call_id, asof) = node_id.split()?;
        Ok(self.entry_path_parts(&call_id, &asof, suffix))
    }

    fn entry_path_parts(&self, call_id: &CallId, asof: &Asof, suffix: &str) -> PathBuf {
        self.root
            .join(asof_folder_name(asof))
            .join(format!("{}{}", call_id.to_filename(), suffix))
    }

    fn record_hit(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.hits += 1;
        }
    }

    fn record_miss(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.misses += 1;
        }
    }

    fn read_json<T: DeserializeOwned>(&self, node_id: &NodeId, suffix: &str) -> MemoResult<T> {
        let path = self.entry_path(node_id, suffix)?;
        let bytes = fs::read(&path).map_err(|e| io_error(node_id, &path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            CacheError::Serialization {
                reason: format!("{}: {}", path.display(), e),
            }
            .into()
        })
    }

    /// Every asof folder under the root, with the asof it encodes.
    fn asof_folders(&self) -> MemoResult<Vec<(Asof, PathBuf)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error_at(&self.root, e)),
        };
        let mut folders = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error_at(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match parse_folder_name(name) {
                Some(asof) => folders.push((asof, path)),
                None => trace!(folder = %path.display(), "Skipping non-asof folder"),
            }
        }
        folders.sort();
        Ok(folders)
    }
}

/// Invert [`asof_folder_name`].
fn parse_folder_name(name: &str) -> Option<Asof> {
    let restored = match name.get(..10) {
        Some(date) if name.len() > 10 => format!("{}{}", date, name[10..].replace('-', ":")),
        _ => name.to_string(),
    };
    parse_asof(&restored).ok()
}

fn io_error_at(path: &Path, e: io::Error) -> MemoError {
    CacheError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
    .into()
}

fn io_error(node_id: &NodeId, path: &Path, e: io::Error) -> MemoError {
    if e.kind() == io::ErrorKind::NotFound {
        CacheError::NotFound {
            node_id: node_id.to_string(),
        }
        .into()
    } else {
        io_error_at(path, e)
    }
}

impl Cache for FileCache {
    fn name(&self) -> &'static str {
        "FileCache"
    }

    fn write(&self, node_id: &NodeId, result: &CachedResult, metadata: &Metadata) -> MemoResult<()> {
        let (call_id, asof) = node_id.split()?;
        let result_path = self.entry_path_parts(&call_id, &asof, RESULT_SUFFIX);
        let metadata_path = self.entry_path_parts(&call_id, &asof, METADATA_SUFFIX);
        if let Some(folder) = result_path.parent() {
            fs::create_dir_all(folder).map_err(|e| io_error_at(folder, e))?;
        }

        let result_bytes = serde_json::to_vec(result).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        let metadata_bytes =
            serde_json::to_vec_pretty(metadata).map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;
        fs::write(&result_path, &result_bytes).map_err(|e| io_error_at(&result_path, e))?;
        fs::write(&metadata_path, &metadata_bytes).map_err(|e| io_error_at(&metadata_path, e))?;
        debug!(
            node_id = %node_id,
            path = %result_path.display(),
            bytes = result_bytes.len(),
            "Wrote cache entry"
        );

        self.front.write(node_id, result, metadata)
    }

    fn read_result(&self, node_id: &NodeId) -> MemoResult<CachedResult> {
        if self.front.contains(node_id)? {
            self.record_hit();
            return self.front.read_result(node_id);
        }
        match self.read_json(node_id, RESULT_SUFFIX) {
            Ok(result) => {
                self.record_hit();
                Ok(result)
            }
            Err(e) => {
                if e.is_not_found() {
                    self.record_miss();
                }
                Err(e)
            }
        }
    }

    fn read_metadata(&self, node_id: &NodeId) -> MemoResult<Metadata> {
        if self.front.contains(node_id)? {
            return self.front.read_metadata(node_id);
        }
        self.read_json(node_id, METADATA_SUFFIX)
    }

    fn contains(&self, node_id: &NodeId) -> MemoResult<bool> {
        if self.front.contains(node_id)? {
            return Ok(true);
        }
        Ok(self.entry_path(node_id, RESULT_SUFFIX)?.is_file())
    }

    fn remove(&self, node_id: &NodeId) -> MemoResult<()> {
        let result_path = self.entry_path(node_id, RESULT_SUFFIX)?;
        let metadata_path = self.entry_path(node_id, METADATA_SUFFIX)?;
        fs::remove_file(&result_path).map_err(|e| io_error(node_id, &result_path, e))?;
        match fs::remove_file(&metadata_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error_at(&metadata_path, e)),
        }
        if self.front.contains(node_id)? {
            self.front.remove(node_id)?;
        }
        debug!(node_id = %node_id, "Removed cache entry");
        Ok(())
    }

    fn list_node_ids(&self) -> MemoResult<BTreeSet<NodeId>> {
        let mut node_ids = BTreeSet::new();
        for (_, folder) in self.asof_folders()? {
            for entry in fs::read_dir(&folder).map_err(|e| io_error_at(&folder, e))? {
                let path = entry.map_err(|e| io_error_at(&folder, e))?.path();
                let is_metadata = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(METADATA_SUFFIX));
                if !is_metadata {
                    continue;
                }
                let bytes = fs::read(&path).map_err(|e| io_error_at(&path, e))?;
                let metadata: Metadata =
                    serde_json::from_slice(&bytes).map_err(|e| CacheError::Serialization {
                        reason: format!("{}: {}", path.display(), e),
                    })?;
                node_ids.insert(metadata.node_id);
            }
        }
        Ok(node_ids)
    }

    fn list_node_ids_by_call_id(&self, call_id: &CallId) -> MemoResult<Vec<NodeId>> {
        let mut node_ids = Vec::new();
        for (asof, _) in self.asof_folders()? {
            if self
                .entry_path_parts(call_id, &asof, RESULT_SUFFIX)
                .is_file()
            {
                node_ids.push(NodeId::new(call_id, asof));
            }
        }
        Ok(node_ids)
    }

    fn get_latest_node_id_by_call_id(&self, call_id: &CallId) -> MemoResult<Option<NodeId>> {
        Ok(self.list_node_ids_by_call_id(call_id)?.pop())
    }

    fn stats(&self) -> CacheStats {
        let front = self.front.stats();
        let own = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        CacheStats {
            hits: own.hits,
            misses: own.misses,
            entry_count: front.entry_count,
            memory_bytes: front.memory_bytes,
            evictions: front.evictions,
            refusals: front.refusals,
        }
    }
}
