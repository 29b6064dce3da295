//! Per-repository caches: open packs and inflated deltas.
//!
//! Both caches are small, MRU-ordered vectors. A hit promotes the entry to
//! the front; an insert into a full cache evicts the last entry and
//! releases its resources (the pack cache closes a file handle, the delta
//! cache drops buffers). Capacities come from [`StoreLimits`].
//!
//! Delta streams are small and re-read for every descendant that shares a
//! base, so the delta cache stores the *inflated delta instructions*, not
//! reconstructed objects; that is what keeps a long history walk cheap.
//!
//! # Invariants
//! - Entry counts never exceed the configured capacities.
//! - Pack entries are keyed by the trailer pack SHA-1.
//! - Oversize deltas are never cached (applied, then dropped).

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::errors::StoreError;
use super::limits::StoreLimits;
use super::object_id::ObjectId;
use super::pack_file;
use super::pack_idx::PackIndex;

/// One cached pack: its index, an open handle, and the resolved path.
#[derive(Debug)]
struct CachedPack {
    index: PackIndex,
    file: File,
    path: PathBuf,
}

/// MRU cache of open pack index/file pairs.
#[derive(Debug)]
pub(super) struct PackCache {
    entries: Vec<CachedPack>,
    capacity: usize,
    opens: u64,
}

impl PackCache {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            opens: 0,
        }
    }

    /// Number of cached packs.
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Count of real `File::open` calls on pack files, for cache
    /// effectiveness checks.
    pub(super) fn open_count(&self) -> u64 {
        self.opens
    }

    /// Searches cached indexes MRU-first for `id`.
    ///
    /// On hit the pack is promoted to the front and a deep copy of its
    /// index is returned together with the slot.
    pub(super) fn lookup(&mut self, id: &ObjectId) -> Option<(PackIndex, u32)> {
        let hit = self
            .entries
            .iter()
            .position(|entry| entry.index.find(id).is_some())?;
        let entry = self.entries.remove(hit);
        let slot = entry.index.find(id).expect("hit re-probes");
        let index = entry.index.clone();
        self.entries.insert(0, entry);
        Some((index, slot))
    }

    /// Returns an open handle and path for the pack paired with `index`.
    ///
    /// The cache is consulted first (keyed by the trailer pack SHA-1); a
    /// miss opens the sibling pack from `pack_dir`, validates its header
    /// against the index, and caches it, evicting the least-recently-used
    /// pack when full. The returned handle shares the cached descriptor.
    pub(super) fn open_pack(
        &mut self,
        pack_dir: &Path,
        index: &PackIndex,
    ) -> Result<(PathBuf, File), StoreError> {
        if let Some(hit) = self
            .entries
            .iter()
            .position(|entry| entry.index.pack_sha1() == index.pack_sha1())
        {
            let entry = self.entries.remove(hit);
            let handle = entry.file.try_clone()?;
            let path = entry.path.clone();
            self.entries.insert(0, entry);
            return Ok((path, handle));
        }

        let path = pack_dir.join(index.pack_file_name());
        let mut file = File::open(&path)?;
        self.opens += 1;
        pack_file::check_pack_header(&mut file, index)?;
        debug!(pack = %path.display(), "pack opened");

        let handle = file.try_clone()?;
        self.insert(CachedPack {
            index: index.clone(),
            file,
            path: path.clone(),
        });
        Ok((path, handle))
    }

    /// Returns an open handle for a pack file by path.
    ///
    /// Extraction runs after location, so the pack is normally still
    /// cached; a cache hit promotes the entry and shares its descriptor.
    /// After an eviction the file is reopened without re-entering the
    /// cache (there is no index at hand to validate an insert against).
    pub(super) fn open_by_path(&mut self, path: &Path) -> Result<File, StoreError> {
        if let Some(hit) = self.entries.iter().position(|entry| entry.path == path) {
            let entry = self.entries.remove(hit);
            let handle = entry.file.try_clone()?;
            self.entries.insert(0, entry);
            return Ok(handle);
        }
        let file = File::open(path)?;
        self.opens += 1;
        debug!(pack = %path.display(), "pack reopened for extraction");
        Ok(file)
    }

    /// Inserts an already-validated pack at the MRU position.
    fn insert(&mut self, entry: CachedPack) {
        if self.entries.len() == self.capacity {
            let evicted = self.entries.pop().expect("cache full implies non-empty");
            debug!(pack = %evicted.path.display(), "pack evicted");
        }
        self.entries.insert(0, entry);
    }

    /// Drops every cached pack, closing all file handles.
    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// One inflated delta keyed by its payload offset.
#[derive(Debug)]
struct DeltaEntry {
    data_offset: u64,
    bytes: Vec<u8>,
}

/// Per-pack MRU list of inflated deltas.
#[derive(Debug)]
struct PackDeltas {
    path: PathBuf,
    entries: Vec<DeltaEntry>,
}

/// MRU cache of inflated delta streams, grouped by pack.
#[derive(Debug)]
pub(super) struct DeltaCache {
    packs: Vec<PackDeltas>,
    pack_capacity: usize,
    entry_capacity: usize,
    max_entry_bytes: usize,
}

impl DeltaCache {
    pub(super) fn new(limits: &StoreLimits) -> Self {
        Self {
            packs: Vec::with_capacity(limits.delta_cache_packs),
            pack_capacity: limits.delta_cache_packs,
            entry_capacity: limits.delta_cache_entries,
            max_entry_bytes: limits.max_cached_delta_bytes,
        }
    }

    /// Number of tracked packs.
    #[cfg(test)]
    fn pack_count(&self) -> usize {
        self.packs.len()
    }

    /// Largest per-pack entry count currently held.
    #[cfg(test)]
    fn max_entries(&self) -> usize {
        self.packs.iter().map(|p| p.entries.len()).max().unwrap_or(0)
    }

    /// Looks up an inflated delta, promoting pack and entry on hit.
    ///
    /// The returned bytes are owned by the cache and borrowed by the
    /// caller.
    pub(super) fn lookup(&mut self, path: &Path, data_offset: u64) -> Option<&[u8]> {
        let pack_hit = self.packs.iter().position(|pack| pack.path == path)?;
        let entry_hit = self.packs[pack_hit]
            .entries
            .iter()
            .position(|entry| entry.data_offset == data_offset)?;

        let mut pack = self.packs.remove(pack_hit);
        let entry = pack.entries.remove(entry_hit);
        pack.entries.insert(0, entry);
        self.packs.insert(0, pack);
        Some(&self.packs[0].entries[0].bytes)
    }

    /// Inserts an inflated delta, evicting LRU pack and LRU entry as
    /// needed. Oversize deltas are silently not cached.
    pub(super) fn insert(&mut self, path: &Path, data_offset: u64, bytes: Vec<u8>) {
        if bytes.len() > self.max_entry_bytes {
            return;
        }

        let mut pack = match self.packs.iter().position(|pack| pack.path == path) {
            Some(hit) => self.packs.remove(hit),
            None => {
                if self.packs.len() == self.pack_capacity {
                    let evicted = self.packs.pop().expect("cache full implies non-empty");
                    debug!(pack = %evicted.path.display(), "delta cache pack evicted");
                }
                PackDeltas {
                    path: path.to_path_buf(),
                    entries: Vec::with_capacity(self.entry_capacity),
                }
            }
        };

        if let Some(hit) = pack
            .entries
            .iter()
            .position(|entry| entry.data_offset == data_offset)
        {
            pack.entries.remove(hit);
        } else if pack.entries.len() == self.entry_capacity {
            pack.entries.pop();
        }
        pack.entries.insert(0, DeltaEntry { data_offset, bytes });
        self.packs.insert(0, pack);
    }

    /// Drops every cached buffer.
    pub(super) fn clear(&mut self) {
        self.packs.clear();
    }
}
