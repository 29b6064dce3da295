//! Delta chain resolution.
//!
//! A deltified pack entry points at its base: offset deltas by a strictly
//! regressive in-pack offset, ref deltas by object id (the base may live in
//! a different pack). The resolver walks leaf-to-base, recording one link
//! per entry, and returns the chain base-first so application is a single
//! forward pass.
//!
//! The walk is a loop with an explicit link vector, not recursion; chains
//! from hostile packs can be deep, so depth is capped and exceeding the cap
//! is a chain error.
//!
//! # Invariants
//! - `links[0]` is a plain entry; `links[1..]` are delta entries.
//! - Every link records the pack file it lives in (chains may span packs).
//! - Adjacent links are base/derived pairs in application order.

use std::io::{Read, Seek};
use std::path::PathBuf;

use tracing::debug;

use super::errors::StoreError;
use super::object_id::ObjectId;
use super::pack_file::{self, EntryHeader, PackEntryType};

/// One resolved chain link.
#[derive(Clone, Debug)]
pub struct DeltaLink {
    /// Pack file containing this entry.
    pub pack_path: PathBuf,
    /// Offset of the entry header within its pack.
    pub offset: u64,
    /// Length of the type+size varint header.
    pub header_len: u64,
    /// Declared entry type (plain for the base, delta for the rest).
    pub entry_type: PackEntryType,
    /// Declared size: object bytes for the base, delta stream bytes for
    /// delta links.
    pub size: u64,
    /// Offset of the delta payload; 0 for the plain base (its payload
    /// starts at `offset + header_len`).
    pub data_offset: u64,
}

/// Base-first delta chain.
#[derive(Clone, Debug, Default)]
pub struct DeltaChain {
    links: Vec<DeltaLink>,
}

impl DeltaChain {
    /// All links, base first.
    #[inline]
    #[must_use]
    pub fn links(&self) -> &[DeltaLink] {
        &self.links
    }

    /// Number of links including the base.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True when the chain holds no links.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The plain base link.
    ///
    /// # Errors
    /// `BadDeltaChain` when the chain is empty or headed by a delta entry.
    pub fn base(&self) -> Result<&DeltaLink, StoreError> {
        let base = self.links.first().ok_or(StoreError::BadDeltaChain {
            detail: "empty chain",
        })?;
        if !base.entry_type.is_plain() {
            return Err(StoreError::BadDeltaChain {
                detail: "chain base is not a plain object",
            });
        }
        Ok(base)
    }
}

/// Supplies pack handles for ref-delta bases outside the current pack.
///
/// Implemented by the repository locator; the resolver stays independent of
/// the cache and directory-scan machinery behind it.
pub(super) trait BaseLocator {
    /// Seekable pack handle type.
    type Handle: Read + Seek;

    /// Locates a ref-delta base: the pack holding `id`, an open handle, and
    /// the base entry's header offset.
    ///
    /// # Errors
    /// `NoObject` when no known pack contains `id`.
    fn base_pack(&mut self, id: &ObjectId) -> Result<(PathBuf, Self::Handle, u64), StoreError>;
}

/// Resolves the chain for a delta (or plain) entry whose header was just
/// read from `file` at `offset`.
///
/// `file`'s position must be immediately after the entry header varint,
/// which is where [`pack_file::read_entry_header`] leaves it.
///
/// # Errors
/// - `BadDeltaChain` when the walk exceeds `max_depth` links.
/// - `NoObject` when a ref delta names an id no pack knows.
/// - Header parse and I/O errors propagate.
pub(super) fn resolve_chain<L: BaseLocator>(
    locator: &mut L,
    pack_path: PathBuf,
    file: L::Handle,
    offset: u64,
    header: EntryHeader,
    max_depth: usize,
) -> Result<DeltaChain, StoreError> {
    let mut links: Vec<DeltaLink> = Vec::new();
    let mut cur_path = pack_path;
    let mut cur_file = file;
    let mut cur_offset = offset;
    let mut cur_header = header;

    loop {
        if links.len() >= max_depth {
            return Err(StoreError::BadDeltaChain {
                detail: "chain too deep",
            });
        }

        match cur_header.entry_type {
            t if t.is_plain() => {
                // Plain types are the final delta base. The walk ends.
                links.push(DeltaLink {
                    pack_path: cur_path,
                    offset: cur_offset,
                    header_len: cur_header.header_len,
                    entry_type: cur_header.entry_type,
                    size: cur_header.size,
                    data_offset: 0,
                });
                break;
            }
            PackEntryType::OffsetDelta => {
                let (base_offset, _len) =
                    pack_file::read_offset_delta(&mut cur_file, cur_offset)?;
                let data_offset = cur_file.stream_position()?;
                links.push(DeltaLink {
                    pack_path: cur_path.clone(),
                    offset: cur_offset,
                    header_len: cur_header.header_len,
                    entry_type: cur_header.entry_type,
                    size: cur_header.size,
                    data_offset,
                });
                // An offset delta's base is in the same pack, earlier.
                cur_offset = base_offset;
                cur_header = pack_file::read_entry_header(&mut cur_file, base_offset)?;
            }
            PackEntryType::RefDelta => {
                let (base_id, _len) = pack_file::read_ref_delta(&mut cur_file)?;
                let data_offset = cur_file.stream_position()?;
                links.push(DeltaLink {
                    pack_path: cur_path.clone(),
                    offset: cur_offset,
                    header_len: cur_header.header_len,
                    entry_type: cur_header.entry_type,
                    size: cur_header.size,
                    data_offset,
                });

                let (base_path, base_file, base_offset) = locator.base_pack(&base_id)?;
                if base_path != cur_path {
                    debug!(base = %base_id, pack = %base_path.display(), "delta chain crosses packs");
                }
                cur_path = base_path;
                cur_file = base_file;
                cur_offset = base_offset;
                cur_header = pack_file::read_entry_header(&mut cur_file, base_offset)?;
            }
            // `read_entry_header` only yields the six known types.
            _ => unreachable!("entry type already validated"),
        }
    }

    // Links were collected leaf-to-base; the chain is consumed base-first.
    links.reverse();
    Ok(DeltaChain { links })
}
