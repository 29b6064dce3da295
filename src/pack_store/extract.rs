//! Object materialisation: turning a descriptor into bytes.
//!
//! Plain objects inflate straight to the destination. Delta chains first
//! compute `max_size`, the largest intermediate result declared anywhere
//! in the chain, then apply deltas base-first, ping-ponging between two
//! buffers. Small results stay in memory; large ones go through two
//! unnamed temp files so memory stays bounded regardless of object size.
//!
//! The delta cache is consulted before every delta inflation; inflated
//! streams are inserted on miss so siblings sharing a base pay for the
//! zlib work once.
//!
//! # Guarantees
//! - Returned files are rewound to offset 0; returned buffers are owned
//!   by the caller.
//! - Partial output is discarded on error (temp files are unlinked on
//!   close, buffers dropped).

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use super::cache::{DeltaCache, PackCache};
use super::chain::{DeltaChain, DeltaLink};
use super::delta;
use super::errors::StoreError;
use super::inflate;
use super::limits::StoreLimits;
use super::object::{Object, ObjectRepr};

/// Bytes of inflated delta head needed to cover both size varints.
const DELTA_SIZES_PREFIX: usize = 32;

/// Applies descriptors against the repository's caches.
///
/// Borrowed from the repository for the duration of one extraction.
pub(super) struct Materialiser<'a> {
    pub(super) pack_cache: &'a mut PackCache,
    pub(super) delta_cache: &'a mut DeltaCache,
    pub(super) limits: &'a StoreLimits,
}

impl Materialiser<'_> {
    /// Extracts an object's bytes into memory.
    pub(super) fn extract_to_mem(&mut self, obj: &Object) -> Result<Vec<u8>, StoreError> {
        match &obj.repr {
            ObjectRepr::Plain { data_offset } => {
                let mut file = self.pack_cache.open_by_path(&obj.pack_path)?;
                file.seek(SeekFrom::Start(*data_offset))?;
                inflate::inflate_to_mem(&mut file, self.limits.max_object_bytes)
            }
            ObjectRepr::Deltified { chain } => self.apply_chain_to_mem(chain),
        }
    }

    /// Extracts an object into an unnamed temp file, rewound to offset 0.
    pub(super) fn extract_to_file(&mut self, obj: &Object) -> Result<File, StoreError> {
        let mut out = tempfile::tempfile()?;
        match &obj.repr {
            ObjectRepr::Plain { data_offset } => {
                let mut file = self.pack_cache.open_by_path(&obj.pack_path)?;
                file.seek(SeekFrom::Start(*data_offset))?;
                inflate::inflate_to_file(&mut file, &mut out)?;
            }
            ObjectRepr::Deltified { chain } => self.apply_chain_to_file(chain, &mut out)?,
        }
        out.flush()?;
        out.seek(SeekFrom::Start(0))?;
        Ok(out)
    }

    /// Applies a chain entirely in memory.
    fn apply_chain_to_mem(&mut self, chain: &DeltaChain) -> Result<Vec<u8>, StoreError> {
        let base_link = chain.base()?;
        let max_size = self.chain_max_size(chain)?;
        if max_size > self.limits.max_object_bytes as u64 {
            return Err(StoreError::NoSpace {
                detail: "delta result exceeds memory cap",
            });
        }
        let max_size = max_size as usize;

        let mut base_buf = {
            let mut file = self.pack_cache.open_by_path(&base_link.pack_path)?;
            file.seek(SeekFrom::Start(base_link.offset + base_link.header_len))?;
            inflate::inflate_to_mem(&mut file, max_size)?
        };
        let mut accum_buf = Vec::new();

        for link in &chain.links()[1..] {
            self.apply_one(link, &mut base_buf, &mut accum_buf, max_size)?;
            // Accumulated result becomes the new base.
            std::mem::swap(&mut base_buf, &mut accum_buf);
        }
        Ok(base_buf)
    }

    /// Applies a chain, writing the final result to `out`.
    ///
    /// Below the in-memory ceiling the chain is applied in memory and
    /// copied out once; above it two temp files ping-pong, and the last
    /// delta writes straight to `out`.
    fn apply_chain_to_file(
        &mut self,
        chain: &DeltaChain,
        out: &mut File,
    ) -> Result<(), StoreError> {
        let base_link = chain.base()?;
        let max_size = self.chain_max_size(chain)?;

        if max_size < self.limits.max_in_memory_result_bytes {
            let result = self.apply_chain_to_mem(chain)?;
            out.write_all(&result)?;
            return Ok(());
        }

        let mut base_file = tempfile::tempfile()?;
        let mut accum_file = tempfile::tempfile()?;
        {
            let mut pack = self.pack_cache.open_by_path(&base_link.pack_path)?;
            pack.seek(SeekFrom::Start(base_link.offset + base_link.header_len))?;
            inflate::inflate_to_file(&mut pack, &mut base_file)?;
        }

        let deltas = &chain.links()[1..];
        for (i, link) in deltas.iter().enumerate() {
            let last = i + 1 == deltas.len();
            if last {
                self.apply_one_file(link, &mut base_file, out)?;
            } else {
                accum_file.set_len(0)?;
                accum_file.seek(SeekFrom::Start(0))?;
                self.apply_one_file(link, &mut base_file, &mut accum_file)?;
                std::mem::swap(&mut base_file, &mut accum_file);
            }
        }
        if deltas.is_empty() {
            // Degenerate single-link chain: the base is the result.
            base_file.seek(SeekFrom::Start(0))?;
            std::io::copy(&mut base_file, out)?;
        }
        Ok(())
    }

    /// Applies one delta link in memory, `base` -> `accum`.
    fn apply_one(
        &mut self,
        link: &DeltaLink,
        base: &mut Vec<u8>,
        accum: &mut Vec<u8>,
        max_size: usize,
    ) -> Result<(), StoreError> {
        let mut scratch = None;
        let delta_bytes = self.load_delta(link, &mut scratch)?;
        delta::apply_delta(base, delta_bytes, accum, max_size)
    }

    /// Applies one delta link file-to-file, `base` -> `out`.
    fn apply_one_file(
        &mut self,
        link: &DeltaLink,
        base: &mut File,
        out: &mut impl Write,
    ) -> Result<(), StoreError> {
        let mut scratch = None;
        let delta_bytes = self.load_delta(link, &mut scratch)?;
        delta::apply_delta_file(base, delta_bytes, out)?;
        Ok(())
    }

    /// Returns a link's inflated delta stream, through the cache.
    ///
    /// On miss the stream is inflated and inserted; deltas over the cache
    /// size ceiling are parked in `scratch` instead and applied from there.
    fn load_delta<'s>(
        &'s mut self,
        link: &DeltaLink,
        scratch: &'s mut Option<Vec<u8>>,
    ) -> Result<&'s [u8], StoreError> {
        if self
            .delta_cache
            .lookup(&link.pack_path, link.data_offset)
            .is_none()
        {
            let bytes = self.inflate_delta(link)?;
            if bytes.len() <= self.limits.max_cached_delta_bytes {
                self.delta_cache
                    .insert(&link.pack_path, link.data_offset, bytes);
            } else {
                *scratch = Some(bytes);
            }
        }
        if let Some(bytes) = scratch.as_ref() {
            return Ok(bytes);
        }
        Ok(self
            .delta_cache
            .lookup(&link.pack_path, link.data_offset)
            .expect("delta inflated above"))
    }

    /// Inflates a delta stream from its pack.
    fn inflate_delta(&mut self, link: &DeltaLink) -> Result<Vec<u8>, StoreError> {
        let mut file = self.pack_cache.open_by_path(&link.pack_path)?;
        file.seek(SeekFrom::Start(link.data_offset))?;
        inflate::inflate_to_mem(&mut file, self.limits.max_object_bytes)
    }

    /// Largest declared size anywhere in the chain.
    ///
    /// The base contributes its declared object size; every delta
    /// contributes the (base size, result size) pair from the head of its
    /// stream, read by inflating only the first few bytes (or from the
    /// delta cache when the stream is already inflated).
    fn chain_max_size(&mut self, chain: &DeltaChain) -> Result<u64, StoreError> {
        let mut max_size = chain.base()?.size;

        for link in &chain.links()[1..] {
            let (base_size, result_size) = self.delta_sizes_for(link)?;
            max_size = max_size.max(base_size).max(result_size);
        }
        Ok(max_size)
    }

    /// Reads the (base size, result size) header of one delta link.
    fn delta_sizes_for(&mut self, link: &DeltaLink) -> Result<(u64, u64), StoreError> {
        if let Some(bytes) = self.delta_cache.lookup(&link.pack_path, link.data_offset) {
            return delta::delta_sizes(bytes);
        }
        let mut file = self.pack_cache.open_by_path(&link.pack_path)?;
        file.seek(SeekFrom::Start(link.data_offset))?;
        let head = inflate::inflate_prefix(&mut file, DELTA_SIZES_PREFIX)?;
        delta::delta_sizes(&head)
    }
}
