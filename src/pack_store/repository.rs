//! Repository handle and object locator.
//!
//! A [`Repository`] owns both caches and is the single entry point for
//! reads: locate an id, open a descriptor, extract bytes. It is not
//! thread-safe; one caller drives one handle, and concurrent readers
//! must each open their own.
//!
//! Lookup order for an id:
//! 1. Walk the pack cache MRU-first and probe each cached index.
//! 2. Scan `objects/pack` for `pack-*.idx` files, probing each; the first
//!    hit caches the pack (possibly evicting the least-recently-used one).
//! 3. Report the id as missing.
//!
//! Dropping the repository releases both caches and every file handle the
//! store opened.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::cache::{DeltaCache, PackCache};
use super::chain::{self, BaseLocator};
use super::errors::StoreError;
use super::extract::Materialiser;
use super::limits::StoreLimits;
use super::object::{Object, ObjectKind, ObjectRepr};
use super::object_id::ObjectId;
use super::pack_file;
use super::pack_idx::PackIndex;

/// Pack index file name shape: `pack-<40-hex>.idx`.
const PACKIDX_PREFIX: &str = "pack-";
const PACKIDX_SUFFIX: &str = ".idx";
const PACKIDX_NAME_LEN: usize = 5 + 40 + 4;

/// Read handle over one Git repository's pack store.
#[derive(Debug)]
pub struct Repository {
    pack_dir: PathBuf,
    pack_cache: PackCache,
    delta_cache: DeltaCache,
    limits: StoreLimits,
}

impl Repository {
    /// Opens a repository with default limits.
    ///
    /// `path` may be a worktree root containing a `.git` directory, or a
    /// git directory itself (one containing `objects/`).
    ///
    /// # Errors
    /// `BadPath` when no `objects` directory can be resolved.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_limits(path, StoreLimits::DEFAULT)
    }

    /// Opens a repository with explicit limits.
    pub fn open_with_limits(path: &Path, limits: StoreLimits) -> Result<Self, StoreError> {
        limits.validate();

        let meta = fs::metadata(path)?;
        if !meta.is_dir() {
            return Err(StoreError::BadPath {
                detail: "not a directory",
            });
        }

        let dot_git = path.join(".git");
        let git_dir = if dot_git.is_dir() { dot_git } else { path.to_path_buf() };

        let objects_dir = git_dir.join("objects");
        if !objects_dir.is_dir() {
            return Err(StoreError::BadPath {
                detail: "no objects directory",
            });
        }
        let pack_dir = objects_dir.join("pack");
        debug!(repo = %git_dir.display(), "repository opened");

        Ok(Self {
            pack_dir,
            pack_cache: PackCache::new(limits.pack_cache_slots),
            delta_cache: DeltaCache::new(&limits),
            limits,
        })
    }

    /// The configured limits.
    #[must_use]
    pub fn limits(&self) -> &StoreLimits {
        &self.limits
    }

    /// Number of packs currently cached.
    #[must_use]
    pub fn cached_pack_count(&self) -> usize {
        self.pack_cache.len()
    }

    /// Count of real pack-file opens performed so far.
    ///
    /// Repeated reads of hot objects should not move this counter; it
    /// exists so cache effectiveness is observable.
    #[must_use]
    pub fn pack_open_count(&self) -> u64 {
        self.pack_cache.open_count()
    }

    /// Locates an object id, returning a cloned index and the entry slot.
    ///
    /// # Errors
    /// `NoObject` when no pack in the repository contains `id`.
    pub fn locate(&mut self, id: &ObjectId) -> Result<(PackIndex, u32), StoreError> {
        locate_in(&mut self.pack_cache, &self.pack_dir, id)
    }

    /// Opens a descriptor for the object with the given id.
    ///
    /// Delta entries are resolved to their full chain here; the returned
    /// descriptor's kind is always a plain type. Deltified descriptors
    /// report size 0 until extraction.
    ///
    /// # Errors
    /// - `NoObject` for unknown ids.
    /// - Format errors from index, pack, or chain resolution propagate.
    pub fn open_object(&mut self, id: &ObjectId) -> Result<Object, StoreError> {
        let (index, slot) = self.locate(id)?;
        let offset = index.offset_at(slot)?;
        let (pack_path, mut file) = self.pack_cache.open_pack(&self.pack_dir, &index)?;
        let header = pack_file::read_entry_header(&mut file, offset)?;

        if let Some(kind) = header.entry_type.plain_kind() {
            return Ok(Object {
                id: *id,
                kind,
                size: header.size,
                pack_path,
                repr: ObjectRepr::Plain {
                    data_offset: offset + header.header_len,
                },
            });
        }

        let mut locator = RefBaseLocator {
            pack_cache: &mut self.pack_cache,
            pack_dir: &self.pack_dir,
        };
        let chain = chain::resolve_chain(
            &mut locator,
            pack_path.clone(),
            file,
            offset,
            header,
            self.limits.max_delta_chain_depth,
        )?;
        let kind = chain
            .base()?
            .entry_type
            .plain_kind()
            .ok_or(StoreError::BadDeltaChain {
                detail: "chain base is not a plain object",
            })?;

        Ok(Object {
            id: *id,
            kind,
            // Not known until the deltas are applied.
            size: 0,
            pack_path,
            repr: ObjectRepr::Deltified { chain },
        })
    }

    /// Returns the resolved plain type of the object with the given id.
    ///
    /// # Errors
    /// `NoObject` for unknown ids.
    pub fn object_type(&mut self, id: &ObjectId) -> Result<ObjectKind, StoreError> {
        Ok(self.open_object(id)?.kind())
    }

    /// Extracts an object's raw bytes into an unnamed temp file, rewound
    /// to offset 0. The file is unlinked and lives until dropped.
    pub fn extract_object(&mut self, obj: &Object) -> Result<File, StoreError> {
        self.materialiser().extract_to_file(obj)
    }

    /// Extracts an object's raw bytes into an owned buffer.
    pub fn extract_object_to_mem(&mut self, obj: &Object) -> Result<Vec<u8>, StoreError> {
        self.materialiser().extract_to_mem(obj)
    }

    /// Convenience: open and extract in one call.
    pub fn read_object(&mut self, id: &ObjectId) -> Result<(ObjectKind, Vec<u8>), StoreError> {
        let obj = self.open_object(id)?;
        let bytes = self.extract_object_to_mem(&obj)?;
        Ok((obj.kind(), bytes))
    }

    fn materialiser(&mut self) -> Materialiser<'_> {
        Materialiser {
            pack_cache: &mut self.pack_cache,
            delta_cache: &mut self.delta_cache,
            limits: &self.limits,
        }
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        // Releases every cached file handle and buffer.
        self.pack_cache.clear();
        self.delta_cache.clear();
    }
}

/// Locator for ref-delta bases, backed by the repository's pack cache.
struct RefBaseLocator<'a> {
    pack_cache: &'a mut PackCache,
    pack_dir: &'a Path,
}

impl BaseLocator for RefBaseLocator<'_> {
    type Handle = File;

    fn base_pack(&mut self, id: &ObjectId) -> Result<(PathBuf, File, u64), StoreError> {
        let (index, slot) = locate_in(self.pack_cache, self.pack_dir, id)?;
        let offset = index.offset_at(slot)?;
        let (path, file) = self.pack_cache.open_pack(self.pack_dir, &index)?;
        Ok((path, file, offset))
    }
}

/// Cache walk plus filesystem scan for an object id.
fn locate_in(
    pack_cache: &mut PackCache,
    pack_dir: &Path,
    id: &ObjectId,
) -> Result<(PackIndex, u32), StoreError> {
    if let Some(hit) = pack_cache.lookup(id) {
        return Ok(hit);
    }

    // No luck in the cache; scan the pack directory. A missing directory
    // just means an empty store.
    let entries = match fs::read_dir(pack_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NoObject)
        }
        Err(err) => return Err(StoreError::Io(err)),
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_packidx_filename(name) {
            continue;
        }

        let index = PackIndex::open(&entry.path())?;
        if let Some(slot) = index.find(id) {
            debug!(pack = name, id = %id, "object located by directory scan");
            pack_cache.open_pack(pack_dir, &index)?;
            return Ok((index, slot));
        }
    }

    Err(StoreError::NoObject)
}

/// Checks the `pack-<40-hex>.idx` name shape.
fn is_packidx_filename(name: &str) -> bool {
    name.len() == PACKIDX_NAME_LEN
        && name.starts_with(PACKIDX_PREFIX)
        && name.ends_with(PACKIDX_SUFFIX)
}
