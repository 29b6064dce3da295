//! Error taxonomy for the pack object store.
//!
//! Every fallible operation in the store returns [`StoreError`]. Errors carry
//! a kind plus enough context to render a one-line human-readable message;
//! nothing is swallowed on the way up. A cache miss is not an error (the
//! locator falls back to a filesystem scan); a store-wide miss is
//! [`StoreError::NoObject`].

use std::fmt;
use std::io;

/// Errors raised by the pack object store.
#[derive(Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The object id is not present in any known pack.
    NoObject,
    /// The descriptor refers to an object outside the pack store.
    ObjectNotPacked,
    /// The repository path does not look like a Git repository.
    BadPath { detail: &'static str },
    /// Pack index format violation, truncation, or bad offset.
    BadPackIdx { detail: &'static str },
    /// Pack index trailing digest does not match the computed digest.
    PackIdxChecksum,
    /// Pack header disagrees with its index, or a back-reference is invalid.
    BadPackFile { detail: &'static str },
    /// Delta stream is malformed (bad command, bounds, or size mismatch).
    BadDelta { detail: &'static str },
    /// Delta chain is empty or never reaches a plain base.
    BadDeltaChain { detail: &'static str },
    /// An object type byte the resolver does not handle.
    NotImplemented { obj_type: u8 },
    /// A variable-length integer would exceed 64 bits.
    NoSpace { detail: &'static str },
    /// Commit or tree payload is malformed.
    BadObjectData { detail: &'static str },
    /// zlib stream was corrupt, truncated, or overran its output cap.
    Decompression,
    /// Underlying read/seek/open/stat failure.
    Io(io::Error),
}

impl StoreError {
    /// Constructs a pack-index corruption error with a static detail string.
    #[inline]
    pub const fn bad_packidx(detail: &'static str) -> Self {
        Self::BadPackIdx { detail }
    }

    /// Constructs a pack-file corruption error with a static detail string.
    #[inline]
    pub const fn bad_packfile(detail: &'static str) -> Self {
        Self::BadPackFile { detail }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoObject => write!(f, "object not found"),
            Self::ObjectNotPacked => write!(f, "object is not packed"),
            Self::BadPath { detail } => write!(f, "bad repository path: {detail}"),
            Self::BadPackIdx { detail } => write!(f, "bad pack index: {detail}"),
            Self::PackIdxChecksum => write!(f, "pack index checksum mismatch"),
            Self::BadPackFile { detail } => write!(f, "bad pack file: {detail}"),
            Self::BadDelta { detail } => write!(f, "bad delta: {detail}"),
            Self::BadDeltaChain { detail } => write!(f, "bad delta chain: {detail}"),
            Self::NotImplemented { obj_type } => {
                write!(f, "object type {obj_type} not implemented")
            }
            Self::NoSpace { detail } => write!(f, "variable-length value too large: {detail}"),
            Self::BadObjectData { detail } => write!(f, "bad object data: {detail}"),
            Self::Decompression => write!(f, "decompression failed"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
