//! Pack index (`.idx`) v2 loader and lookup.
//!
//! The loader parses an index file in a single forward pass, streaming every
//! byte except the trailing self-digest through SHA-1 and rejecting the file
//! on mismatch. Tables are owned by the returned [`PackIndex`]; cloning an
//! index deep-copies them so handed-out copies are independent of the cache.
//!
//! # Layout (v2 format)
//! ```text
//! +----------------+
//! | Magic (4B)     |  0xff 't' 'O' 'c'
//! | Version (4B)   |  Big-endian 2
//! +----------------+
//! | Fanout (1024B) |  256 * u32 BE cumulative counts
//! +----------------+
//! | OID Table      |  N * 20 bytes (strictly ascending)
//! +----------------+
//! | CRC Table      |  N * 4 bytes
//! +----------------+
//! | Offset Table   |  N * 4 bytes (MSB=1 -> large offset index)
//! +----------------+
//! | Large Offsets  |  M * 8 bytes (present iff pack > 2 GiB)
//! +----------------+
//! | Pack SHA-1     |  20 bytes (digested)
//! | Index SHA-1    |  20 bytes (self-digest, not digested)
//! +----------------+
//! ```
//!
//! # Invariants
//! - `fanout` is monotone non-decreasing; `fanout[255]` is the object count.
//! - `sorted_ids` is strictly ascending (lookup relies on it).
//! - The large-offset table is only read when the sibling pack exceeds 2 GiB.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

use super::errors::StoreError;
use super::object_id::{ObjectId, OBJECT_ID_LEN};

/// Pack index magic bytes for the v2 format.
const IDX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
/// Only supported index version.
const IDX_VERSION: u32 = 2;
/// Flag bit marking an offset entry as a large-offset table index.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;
/// Mask for the direct-offset / table-index payload of an offset entry.
const OFFSET_VAL_MASK: u32 = 0x7fff_ffff;
/// Pack sizes above this require the large-offset table.
const LARGE_PACK_THRESHOLD: u64 = 0x8000_0000;

/// In-memory pack index, immutable after load.
#[derive(Clone, Debug)]
pub struct PackIndex {
    fanout: [u32; 256],
    sorted_ids: Vec<ObjectId>,
    crc32: Vec<u32>,
    offsets: Vec<u32>,
    large_offsets: Vec<u64>,
    pack_sha1: [u8; OBJECT_ID_LEN],
}

impl PackIndex {
    /// Loads and verifies a pack index file.
    ///
    /// The sibling `.pack` file is stat'ed to decide whether the
    /// large-offset table is present; it is absent (and never read) for
    /// packs of 2 GiB or less.
    ///
    /// # Errors
    /// - `BadPackIdx` on any format violation or truncation.
    /// - `PackIdxChecksum` when the trailing self-digest does not match.
    /// - `Io` for underlying filesystem failures.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let packfile_size = sibling_pack_size(path)?;

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut digest = Sha1::new();

        let mut header = [0u8; 8];
        read_exact_idx(&mut reader, &mut header, "header")?;
        if header[0..4] != IDX_MAGIC {
            return Err(StoreError::bad_packidx("magic"));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != IDX_VERSION {
            return Err(StoreError::bad_packidx("version"));
        }
        digest.update(header);

        let mut fanout_raw = [0u8; 256 * 4];
        read_exact_idx(&mut reader, &mut fanout_raw, "fanout")?;
        digest.update(fanout_raw);
        let fanout = parse_fanout(&fanout_raw)?;
        let nobj = fanout[255] as usize;

        let mut ids_raw = vec![0u8; nobj * OBJECT_ID_LEN];
        read_exact_idx(&mut reader, &mut ids_raw, "object ids")?;
        digest.update(&ids_raw);
        let sorted_ids = parse_sorted_ids(&ids_raw)?;

        let mut crc_raw = vec![0u8; nobj * 4];
        read_exact_idx(&mut reader, &mut crc_raw, "crc table")?;
        digest.update(&crc_raw);
        let crc32 = parse_be_u32_table(&crc_raw);

        let mut offsets_raw = vec![0u8; nobj * 4];
        read_exact_idx(&mut reader, &mut offsets_raw, "offset table")?;
        digest.update(&offsets_raw);
        let offsets = parse_be_u32_table(&offsets_raw);

        // Large file offsets are contained only in packs > 2 GiB.
        let large_offsets = if packfile_size > LARGE_PACK_THRESHOLD {
            let count = offsets
                .iter()
                .filter(|&&o| o & LARGE_OFFSET_FLAG != 0)
                .count();
            let mut large_raw = vec![0u8; count * 8];
            read_exact_idx(&mut reader, &mut large_raw, "large offset table")?;
            digest.update(&large_raw);
            parse_be_u64_table(&large_raw)
        } else {
            Vec::new()
        };

        let mut pack_sha1 = [0u8; OBJECT_ID_LEN];
        read_exact_idx(&mut reader, &mut pack_sha1, "pack digest")?;
        digest.update(pack_sha1);

        let mut index_sha1 = [0u8; OBJECT_ID_LEN];
        read_exact_idx(&mut reader, &mut index_sha1, "index digest")?;

        let computed: [u8; OBJECT_ID_LEN] = digest.finalize().into();
        if computed != index_sha1 {
            return Err(StoreError::PackIdxChecksum);
        }

        Ok(Self {
            fanout,
            sorted_ids,
            crc32,
            offsets,
            large_offsets,
            pack_sha1,
        })
    }

    /// Total number of objects in the indexed pack.
    #[inline]
    #[must_use]
    pub fn object_count(&self) -> u32 {
        self.fanout[255]
    }

    /// The pack digest recorded in the trailer; doubles as the cache key
    /// and names the sibling `.pack` file.
    #[inline]
    #[must_use]
    pub fn pack_sha1(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.pack_sha1
    }

    /// File name of the sibling pack, `pack-<40-hex>.pack`.
    #[must_use]
    pub fn pack_file_name(&self) -> String {
        let mut name = String::with_capacity(5 + OBJECT_ID_LEN * 2 + 5);
        name.push_str("pack-");
        for byte in &self.pack_sha1 {
            name.push_str(&format!("{byte:02x}"));
        }
        name.push_str(".pack");
        name
    }

    /// Object id stored at `slot`.
    ///
    /// # Panics
    /// Panics in debug builds when `slot` is out of range.
    #[inline]
    #[must_use]
    pub fn id_at(&self, slot: u32) -> ObjectId {
        debug_assert!(slot < self.object_count(), "slot out of bounds");
        self.sorted_ids[slot as usize]
    }

    /// CRC-32 recorded for the entry at `slot`.
    ///
    /// Entry CRCs are carried but not verified by the store.
    #[inline]
    #[must_use]
    pub fn crc32_at(&self, slot: u32) -> u32 {
        debug_assert!(slot < self.object_count(), "slot out of bounds");
        self.crc32[slot as usize]
    }

    /// Looks up an id in its fanout bucket.
    ///
    /// The bucket `sorted_ids[fanout[b-1]..fanout[b]]` is sorted, so the
    /// search is binary within the bucket. Returns `None` when absent.
    #[must_use]
    pub fn find(&self, id: &ObjectId) -> Option<u32> {
        let bucket = id.first_byte() as usize;
        let lo = if bucket > 0 {
            self.fanout[bucket - 1] as usize
        } else {
            0
        };
        let hi = self.fanout[bucket] as usize;
        let slice = &self.sorted_ids[lo..hi];
        slice
            .binary_search(id)
            .ok()
            .map(|pos| (lo + pos) as u32)
    }

    /// Pack offset of the entry at `slot`, resolving the large-offset
    /// indirection when the high bit is set.
    ///
    /// # Errors
    /// `BadPackIdx` when the large-offset index is out of range or the
    /// resolved value exceeds the maximum signed file offset.
    pub fn offset_at(&self, slot: u32) -> Result<u64, StoreError> {
        debug_assert!(slot < self.object_count(), "slot out of bounds");
        let raw = self.offsets[slot as usize];
        if raw & LARGE_OFFSET_FLAG == 0 {
            return Ok((raw & OFFSET_VAL_MASK) as u64);
        }
        let idx = (raw & OFFSET_VAL_MASK) as usize;
        let resolved = *self
            .large_offsets
            .get(idx)
            .ok_or(StoreError::bad_packidx("large offset index"))?;
        if resolved > i64::MAX as u64 {
            return Err(StoreError::bad_packidx("large offset value"));
        }
        Ok(resolved)
    }
}

/// Reads exactly `buf.len()` bytes; EOF is index truncation, anything else
/// passes through as I/O.
fn read_exact_idx(
    reader: &mut impl Read,
    buf: &mut [u8],
    detail: &'static str,
) -> Result<(), StoreError> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            StoreError::BadPackIdx { detail }
        } else {
            StoreError::Io(err)
        }
    })
}

/// Stats the `.pack` file next to an `.idx` path.
fn sibling_pack_size(idx_path: &Path) -> Result<u64, StoreError> {
    if idx_path.extension().is_none() {
        return Err(StoreError::BadPath {
            detail: "pack index path has no extension",
        });
    }
    let pack_path = idx_path.with_extension("pack");
    Ok(fs::metadata(pack_path)?.len())
}

/// Decodes and validates the fanout table.
fn parse_fanout(raw: &[u8; 256 * 4]) -> Result<[u32; 256], StoreError> {
    let mut fanout = [0u32; 256];
    let mut prev = 0u32;
    for (i, entry) in fanout.iter_mut().enumerate() {
        let off = i * 4;
        let val = u32::from_be_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]]);
        if val < prev {
            return Err(StoreError::bad_packidx("fanout not monotonic"));
        }
        prev = val;
        *entry = val;
    }
    Ok(fanout)
}

/// Decodes the id table, enforcing strict ascent.
fn parse_sorted_ids(raw: &[u8]) -> Result<Vec<ObjectId>, StoreError> {
    let mut ids = Vec::with_capacity(raw.len() / OBJECT_ID_LEN);
    for chunk in raw.chunks_exact(OBJECT_ID_LEN) {
        let id = ObjectId::try_from_slice(chunk).expect("chunk is id-sized");
        if let Some(prev) = ids.last() {
            if *prev >= id {
                return Err(StoreError::bad_packidx("object ids not ascending"));
            }
        }
        ids.push(id);
    }
    Ok(ids)
}

fn parse_be_u32_table(raw: &[u8]) -> Vec<u32> {
    raw.chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn parse_be_u64_table(raw: &[u8]) -> Vec<u64> {
    raw.chunks_exact(8)
        .map(|c| u64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}
