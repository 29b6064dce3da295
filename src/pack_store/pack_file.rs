//! Pack file header and entry header parsing.
//!
//! A pack entry starts with a variable-length header encoding the entry
//! type and inflated size, followed by (for deltas) a base reference and
//! then the zlib payload. All parses here advance the handle so the
//! payload offset can be taken from the stream position afterwards.
//!
//! # Encodings
//! - Entry header byte 0: bit 7 = more, bits 6-4 = type, bits 3-0 = size
//!   low nibble. Continuation bytes: bit 7 = more, bits 6-0 = size bits
//!   shifted by `4 + 7*(i-1)`. At most 10 bytes (sizes fit in 64 bits).
//! - Offset-delta base: incrementing base-128 negative offset, at most
//!   9 bytes; the base must lie strictly earlier in the same pack.
//! - Ref-delta base: 20 raw id bytes.

use std::io::{Read, Seek, SeekFrom};

use super::errors::StoreError;
use super::object::ObjectKind;
use super::object_id::{ObjectId, OBJECT_ID_LEN};
use super::pack_idx::PackIndex;

/// Pack file signature bytes.
const PACK_SIGNATURE: [u8; 4] = *b"PACK";
/// Only supported pack version.
const PACK_VERSION: u32 = 2;

/// Continuation bit shared by both varint encodings.
const MORE: u8 = 0x80;
/// Value mask for continuation bytes.
const VAL_MASK: u8 = 0x7f;
/// Maximum bytes in an entry header varint.
const MAX_HEADER_VARINT: usize = 10;
/// Maximum bytes in a negative-offset varint.
const MAX_OFFSET_VARINT: usize = 9;

/// Raw entry type as stored in a pack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackEntryType {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta against a base earlier in the same pack.
    OffsetDelta,
    /// Delta against a base named by object id, possibly in another pack.
    RefDelta,
}

impl PackEntryType {
    /// Maps the 3-bit type field to an entry type.
    ///
    /// # Errors
    /// `NotImplemented` for type values the store does not handle.
    pub fn from_type_byte(value: u8) -> Result<Self, StoreError> {
        match value {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            6 => Ok(Self::OffsetDelta),
            7 => Ok(Self::RefDelta),
            other => Err(StoreError::NotImplemented { obj_type: other }),
        }
    }

    /// Returns the plain object kind, or `None` for delta types.
    #[inline]
    #[must_use]
    pub fn plain_kind(self) -> Option<ObjectKind> {
        match self {
            Self::Commit => Some(ObjectKind::Commit),
            Self::Tree => Some(ObjectKind::Tree),
            Self::Blob => Some(ObjectKind::Blob),
            Self::Tag => Some(ObjectKind::Tag),
            Self::OffsetDelta | Self::RefDelta => None,
        }
    }

    /// Returns true for the four plain types.
    #[inline]
    #[must_use]
    pub fn is_plain(self) -> bool {
        self.plain_kind().is_some()
    }
}

/// Decoded pack entry header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    /// Entry type (plain or delta).
    pub entry_type: PackEntryType,
    /// Inflated size: object bytes for plain entries, delta stream bytes
    /// for delta entries.
    pub size: u64,
    /// Length of the type+size varint itself.
    pub header_len: u64,
}

/// Validates the pack header against the paired index.
///
/// # Errors
/// - `BadPackIdx` when the 12-byte header cannot be read.
/// - `BadPackFile` on signature, version, or object count mismatch.
pub fn check_pack_header<R: Read + Seek>(
    file: &mut R,
    index: &PackIndex,
) -> Result<(), StoreError> {
    file.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; 12];
    file.read_exact(&mut header).map_err(truncated_header)?;

    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let nobjects = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    if header[0..4] != PACK_SIGNATURE || version != PACK_VERSION || nobjects != index.object_count()
    {
        return Err(StoreError::bad_packfile("header mismatch with index"));
    }
    Ok(())
}

/// Seeks to `offset` and decodes the entry's type+size header.
///
/// # Errors
/// - `BadPackIdx` on truncation.
/// - `NoSpace` when the size would not fit in 64 bits.
/// - `NotImplemented` for unknown type values.
pub fn read_entry_header<R: Read + Seek>(
    file: &mut R,
    offset: u64,
) -> Result<EntryHeader, StoreError> {
    file.seek(SeekFrom::Start(offset))?;

    let first = read_byte(file)?;
    let entry_type = PackEntryType::from_type_byte((first >> 4) & 0x07)?;
    let mut size = (first & 0x0f) as u64;
    let mut len = 1usize;

    let mut byte = first;
    while byte & MORE != 0 {
        if len >= MAX_HEADER_VARINT {
            return Err(StoreError::NoSpace {
                detail: "object size varint",
            });
        }
        byte = read_byte(file)?;
        let shift = 4 + 7 * (len - 1);
        size |= ((byte & VAL_MASK) as u64) << shift;
        len += 1;
    }

    Ok(EntryHeader {
        entry_type,
        size,
        header_len: len as u64,
    })
}

/// Decodes the negative back-offset of an offset delta at the current
/// position and resolves it against the delta's own header offset.
///
/// Returns the base header offset and the encoded length.
///
/// # Errors
/// - `BadPackIdx` on truncation, `NoSpace` on over-long encodings.
/// - `BadPackFile` when the base would not lie strictly earlier in the
///   pack.
pub fn read_offset_delta<R: Read + Seek>(
    file: &mut R,
    header_offset: u64,
) -> Result<(u64, u64), StoreError> {
    let mut byte = read_byte(file)?;
    let mut value = (byte & VAL_MASK) as u64;
    let mut len = 1usize;

    while byte & MORE != 0 {
        if len >= MAX_OFFSET_VARINT {
            return Err(StoreError::NoSpace {
                detail: "negative offset varint",
            });
        }
        byte = read_byte(file)?;
        value = ((value + 1) << 7) | ((byte & VAL_MASK) as u64);
        len += 1;
    }

    if value >= header_offset {
        return Err(StoreError::bad_packfile("negative offset underflow"));
    }
    Ok((header_offset - value, len as u64))
}

/// Reads the 20-byte base id of a ref delta at the current position.
pub fn read_ref_delta<R: Read>(file: &mut R) -> Result<(ObjectId, u64), StoreError> {
    let mut raw = [0u8; OBJECT_ID_LEN];
    file.read_exact(&mut raw)?;
    Ok((ObjectId::new(raw), OBJECT_ID_LEN as u64))
}

fn read_byte<R: Read>(file: &mut R) -> Result<u8, StoreError> {
    let mut buf = [0u8; 1];
    file.read_exact(&mut buf).map_err(truncated_header)?;
    Ok(buf[0])
}

fn truncated_header(err: std::io::Error) -> StoreError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        StoreError::bad_packidx("truncated pack entry header")
    } else {
        StoreError::Io(err)
    }
}
