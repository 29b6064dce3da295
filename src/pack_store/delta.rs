//! Delta stream decoding and application.
//!
//! An inflated delta stream carries two base-128 varints (base size, result
//! size) followed by commands: **copy** (high bit set; the low seven bits
//! select which of up to 4 offset and 3 size bytes follow, little-endian;
//! a zero size means 0x10000) and **insert** (1-127 literal bytes). Commands
//! append to the result in order.
//!
//! Application comes in two shapes: in-memory against a base slice, and
//! file-to-file for results too large to hold in memory (the base is read
//! through seeks, the result streamed to a writer).

use std::io::{Read, Seek, SeekFrom, Write};

use super::errors::StoreError;

/// Copy size of zero encodes this many bytes.
const COPY_ZERO_SIZE: usize = 0x10000;

/// Chunk size for file-to-file copy commands.
const COPY_CHUNK: usize = 8 * 1024;

/// Reads a base-128 varint (LSB-first 7-bit groups).
///
/// # Errors
/// - `BadDelta` on truncation.
/// - `NoSpace` when the value would exceed 64 bits.
fn read_varint(delta: &[u8], pos: &mut usize) -> Result<u64, StoreError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *delta.get(*pos).ok_or(StoreError::BadDelta {
            detail: "truncated size varint",
        })?;
        *pos += 1;
        if shift > 63 {
            return Err(StoreError::NoSpace {
                detail: "delta size varint",
            });
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Parses the leading (base size, result size) pair of a delta stream.
///
/// Only the header varints are read; the command sequence is not validated.
pub fn delta_sizes(delta: &[u8]) -> Result<(u64, u64), StoreError> {
    let mut pos = 0usize;
    let base_size = read_varint(delta, &mut pos)?;
    let result_size = read_varint(delta, &mut pos)?;
    Ok((base_size, result_size))
}

/// Decoded copy command parameters.
fn read_copy_params(delta: &[u8], pos: &mut usize, cmd: u8) -> Result<(usize, usize), StoreError> {
    let mut offset = 0usize;
    let mut size = 0usize;

    for (bit, shift) in [(0x01u8, 0u32), (0x02, 8), (0x04, 16), (0x08, 24)] {
        if cmd & bit != 0 {
            let byte = *delta.get(*pos).ok_or(StoreError::BadDelta {
                detail: "truncated copy offset",
            })?;
            *pos += 1;
            offset |= (byte as usize) << shift;
        }
    }
    for (bit, shift) in [(0x10u8, 0u32), (0x20, 8), (0x40, 16)] {
        if cmd & bit != 0 {
            let byte = *delta.get(*pos).ok_or(StoreError::BadDelta {
                detail: "truncated copy size",
            })?;
            *pos += 1;
            size |= (byte as usize) << shift;
        }
    }

    if size == 0 {
        size = COPY_ZERO_SIZE;
    }
    Ok((offset, size))
}

/// Applies a delta to an in-memory base, writing the result into `out`.
///
/// `out` is cleared first; `max_out` caps the declared result size as a
/// defence against corrupt streams.
///
/// # Errors
/// `BadDelta` on size mismatches, out-of-range copies, or a zero command.
pub fn apply_delta(
    base: &[u8],
    delta: &[u8],
    out: &mut Vec<u8>,
    max_out: usize,
) -> Result<(), StoreError> {
    let mut pos = 0usize;
    let base_size = read_varint(delta, &mut pos)? as usize;
    let result_size = read_varint(delta, &mut pos)? as usize;
    if base_size != base.len() {
        return Err(StoreError::BadDelta {
            detail: "base size mismatch",
        });
    }
    if result_size > max_out {
        return Err(StoreError::BadDelta {
            detail: "result size over cap",
        });
    }

    out.clear();
    out.reserve(result_size);

    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            let (offset, size) = read_copy_params(delta, &mut pos, cmd)?;
            let end = offset.checked_add(size).ok_or(StoreError::BadDelta {
                detail: "copy range overflow",
            })?;
            if end > base.len() {
                return Err(StoreError::BadDelta {
                    detail: "copy out of range",
                });
            }
            if out.len() + size > result_size {
                return Err(StoreError::BadDelta {
                    detail: "output overrun",
                });
            }
            out.extend_from_slice(&base[offset..end]);
        } else if cmd != 0 {
            let size = cmd as usize;
            if pos + size > delta.len() {
                return Err(StoreError::BadDelta {
                    detail: "truncated insert",
                });
            }
            if out.len() + size > result_size {
                return Err(StoreError::BadDelta {
                    detail: "output overrun",
                });
            }
            out.extend_from_slice(&delta[pos..pos + size]);
            pos += size;
        } else {
            return Err(StoreError::BadDelta {
                detail: "zero command",
            });
        }
    }

    if out.len() != result_size {
        return Err(StoreError::BadDelta {
            detail: "result size mismatch",
        });
    }
    Ok(())
}

/// Applies a delta reading the base through a seekable handle and streaming
/// the result to `out`. Returns the number of result bytes written.
///
/// Copy commands seek the base and copy in bounded chunks, so neither the
/// base nor the result is held in memory.
///
/// # Errors
/// `BadDelta` on malformed streams; I/O failures pass through.
pub fn apply_delta_file<B: Read + Seek, W: Write>(
    base: &mut B,
    delta: &[u8],
    out: &mut W,
) -> Result<u64, StoreError> {
    let mut pos = 0usize;
    let base_size = read_varint(delta, &mut pos)?;
    let result_size = read_varint(delta, &mut pos)?;

    let base_len = base.seek(SeekFrom::End(0))?;
    if base_size != base_len {
        return Err(StoreError::BadDelta {
            detail: "base size mismatch",
        });
    }

    let mut written = 0u64;
    let mut chunk = [0u8; COPY_CHUNK];

    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            let (offset, size) = read_copy_params(delta, &mut pos, cmd)?;
            let end = (offset as u64)
                .checked_add(size as u64)
                .ok_or(StoreError::BadDelta {
                    detail: "copy range overflow",
                })?;
            if end > base_len {
                return Err(StoreError::BadDelta {
                    detail: "copy out of range",
                });
            }
            base.seek(SeekFrom::Start(offset as u64))?;
            let mut remaining = size;
            while remaining > 0 {
                let take = remaining.min(COPY_CHUNK);
                base.read_exact(&mut chunk[..take])?;
                out.write_all(&chunk[..take])?;
                remaining -= take;
            }
            written += size as u64;
        } else if cmd != 0 {
            let size = cmd as usize;
            if pos + size > delta.len() {
                return Err(StoreError::BadDelta {
                    detail: "truncated insert",
                });
            }
            out.write_all(&delta[pos..pos + size])?;
            pos += size;
            written += size as u64;
        } else {
            return Err(StoreError::BadDelta {
                detail: "zero command",
            });
        }

        if written > result_size {
            return Err(StoreError::BadDelta {
                detail: "output overrun",
            });
        }
    }

    if written != result_size {
        return Err(StoreError::BadDelta {
            detail: "result size mismatch",
        });
    }
    Ok(written)
}
