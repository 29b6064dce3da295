//! Object descriptors handed out by the store.
//!
//! An [`Object`] records where an object's bytes live inside a pack: either
//! a plain zlib payload at a known offset, or a resolved delta chain. The
//! descriptor's `kind` is always a plain type; delta entries resolve to the
//! type of the chain's base before a descriptor is constructed.
//!
//! Deltified descriptors report `size == 0` until extraction: the result
//! size is only known once the delta headers have been read.

use std::fmt;
use std::path::{Path, PathBuf};

use super::chain::DeltaChain;
use super::object_id::ObjectId;

/// The four plain object types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// Canonical lowercase name, as used in the type-prefixed digest.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an object's bytes live inside its pack.
#[derive(Debug)]
pub(super) enum ObjectRepr {
    /// Plain object: a single zlib stream at `data_offset`.
    Plain { data_offset: u64 },
    /// Deltified object: a base-first chain to apply.
    Deltified { chain: DeltaChain },
}

/// Descriptor for one packed object.
///
/// Owns the resolved delta chain (if any); dropping the descriptor releases
/// all per-object state.
#[derive(Debug)]
pub struct Object {
    pub(super) id: ObjectId,
    pub(super) kind: ObjectKind,
    pub(super) size: u64,
    pub(super) pack_path: PathBuf,
    pub(super) repr: ObjectRepr,
}

impl Object {
    /// The object's content-addressed identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The resolved plain type (never a delta type).
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Declared size for plain objects; 0 for deltified objects until
    /// extraction.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the pack file holding this object's entry.
    #[inline]
    #[must_use]
    pub fn pack_path(&self) -> &Path {
        &self.pack_path
    }

    /// Returns true when the object is stored as a delta chain.
    #[inline]
    #[must_use]
    pub fn is_deltified(&self) -> bool {
        matches!(self.repr, ObjectRepr::Deltified { .. })
    }

    /// The resolved chain of a deltified object, base first.
    #[must_use]
    pub fn delta_chain(&self) -> Option<&DeltaChain> {
        match &self.repr {
            ObjectRepr::Deltified { chain } => Some(chain),
            ObjectRepr::Plain { .. } => None,
        }
    }
}
