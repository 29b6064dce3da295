//! Packfile object store.
//!
//! The store reconstructs objects from Git pack files. Five concerns
//! cooperate per read:
//! 1. `pack_idx` loads and verifies `.idx` files and maps ids to offsets.
//! 2. `repository` locates ids (cache walk, then directory scan) and hands
//!    out descriptors.
//! 3. `pack_file` parses entry headers and delta base references.
//! 4. `chain` resolves delta entries to base-first chains, across packs
//!    when ref deltas demand it.
//! 5. `extract` applies chains and inflates payloads, consulting the
//!    caches in `cache`.
//!
//! # Invariants
//! - The repository path is only ever read; temp files live elsewhere.
//! - Descriptors always carry a plain object type.
//! - Cache sizes never exceed their configured capacities.
//! - Outputs are deterministic for identical repository state.

mod cache;
pub mod chain;
pub mod commit;
pub mod delta;
pub mod errors;
mod extract;
pub mod inflate;
pub mod limits;
pub mod object;
pub mod object_id;
pub mod pack_file;
pub mod pack_idx;
pub mod repository;
pub mod tree;

pub use chain::{DeltaChain, DeltaLink};
pub use commit::Commit;
pub use delta::{apply_delta, apply_delta_file, delta_sizes};
pub use errors::StoreError;
pub use limits::StoreLimits;
pub use object::{Object, ObjectKind};
pub use object_id::{ObjectId, OBJECT_ID_LEN};
pub use pack_file::{EntryHeader, PackEntryType};
pub use pack_idx::PackIndex;
pub use repository::Repository;
pub use tree::{TreeEntry, TreeIter};
