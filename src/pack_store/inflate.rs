//! Bounded zlib inflation over seekable pack handles.
//!
//! Pack payloads are consumed as zlib streams beginning at a known offset;
//! the caller seeks first, then hands the handle here. Input is read in
//! chunks, so the handle's position after a call is unspecified; callers
//! must seek before every read.
//!
//! All failures (corrupt stream, truncated input, output over the cap)
//! surface as [`StoreError::Decompression`]; partial output must be
//! discarded by the caller.

use std::io::{Read, Write};

use flate2::{Decompress, FlushDecompress, Status};

use super::errors::StoreError;

/// Input chunk size for reads from the pack handle.
const IN_CHUNK: usize = 8 * 1024;

/// Output buffer size per decompress step.
const OUT_CHUNK: usize = 32 * 1024;

/// Inflates one zlib stream into memory, capped at `max_out` bytes.
///
/// # Errors
/// `Decompression` on a corrupt or truncated stream, or when the output
/// would exceed `max_out`.
pub fn inflate_to_mem(src: &mut impl Read, max_out: usize) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    inflate_stream(src, |chunk| {
        if out.len() + chunk.len() > max_out {
            return Err(StoreError::Decompression);
        }
        out.extend_from_slice(chunk);
        Ok(true)
    })?;
    Ok(out)
}

/// Inflates one zlib stream, stopping once `want` output bytes are
/// available.
///
/// The stream is *not* required to end; this exists to read the leading
/// size varints of a delta without inflating the whole stream. Returns at
/// most `want` bytes (fewer if the stream ends first).
pub fn inflate_prefix(src: &mut impl Read, want: usize) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::with_capacity(want);
    inflate_stream(src, |chunk| {
        let take = chunk.len().min(want - out.len());
        out.extend_from_slice(&chunk[..take]);
        Ok(out.len() < want)
    })?;
    Ok(out)
}

/// Inflates one zlib stream into `dst`, returning the byte count written.
///
/// # Errors
/// `Decompression` on stream errors; write failures pass through as I/O.
pub fn inflate_to_file(src: &mut impl Read, dst: &mut impl Write) -> Result<u64, StoreError> {
    let mut written = 0u64;
    inflate_stream(src, |chunk| {
        dst.write_all(chunk)?;
        written += chunk.len() as u64;
        Ok(true)
    })?;
    Ok(written)
}

/// Drives one zlib stream, handing output chunks to `sink`.
///
/// The sink returns `Ok(false)` to stop early (prefix reads). Progress is
/// tracked via the decompressor's total counters; a step that consumes and
/// produces nothing with input still pending is a corrupt stream.
fn inflate_stream(
    src: &mut impl Read,
    mut sink: impl FnMut(&[u8]) -> Result<bool, StoreError>,
) -> Result<(), StoreError> {
    let mut de = Decompress::new(true);
    let mut in_buf = [0u8; IN_CHUNK];
    let mut out_buf = vec![0u8; OUT_CHUNK];
    let mut in_len = 0usize;
    let mut in_pos = 0usize;
    let mut eof = false;

    loop {
        if in_pos == in_len && !eof {
            in_len = src.read(&mut in_buf)?;
            in_pos = 0;
            eof = in_len == 0;
        }

        let before_in = de.total_in();
        let before_out = de.total_out();
        let status = de
            .decompress(&in_buf[in_pos..in_len], &mut out_buf, FlushDecompress::None)
            .map_err(|_| StoreError::Decompression)?;
        let consumed = (de.total_in() - before_in) as usize;
        let produced = (de.total_out() - before_out) as usize;
        in_pos += consumed;

        if produced != 0 && !sink(&out_buf[..produced])? {
            return Ok(());
        }

        match status {
            Status::StreamEnd => return Ok(()),
            Status::Ok | Status::BufError => {
                // Zero progress is only legitimate while more input can
                // still be read; otherwise the stream is truncated or stuck.
                if consumed == 0 && produced == 0 && (eof || in_pos < in_len) {
                    return Err(StoreError::Decompression);
                }
            }
        }
    }
}
