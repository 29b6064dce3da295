//! Hard caps and tunables for the pack object store.
//!
//! These limits bound cache sizes and in-memory materialisation so a single
//! repository handle has a predictable footprint. Exceeding a limit surfaces
//! as an error or a cache bypass, never as silent truncation.
//!
//! # Design Notes
//! - Limits are validated in a const context; invalid configurations are
//!   programmer errors (panic in `validate`).
//! - Defaults favour interactive history walks over long-lived daemons.

/// Hard caps for a repository's pack store.
#[derive(Clone, Copy, Debug)]
pub struct StoreLimits {
    /// Maximum bytes for any object inflated into memory.
    pub max_object_bytes: usize,

    /// Ceiling on `max_size` below which delta chains are applied entirely
    /// in memory; larger chains ping-pong through unnamed temp files.
    pub max_in_memory_result_bytes: u64,

    /// Maximum bytes for a single cached inflated delta stream.
    ///
    /// Larger deltas are still applied, just never cached.
    pub max_cached_delta_bytes: usize,

    /// Number of pack index/file pairs kept open in the pack cache.
    pub pack_cache_slots: usize,

    /// Number of packs tracked by the delta cache.
    pub delta_cache_packs: usize,

    /// Number of inflated deltas retained per tracked pack.
    pub delta_cache_entries: usize,

    /// Maximum number of links in a delta chain.
    pub max_delta_chain_depth: usize,
}

impl StoreLimits {
    /// Defaults sized for interactive use over large repositories.
    pub const DEFAULT: Self = Self {
        max_object_bytes: 512 * 1024 * 1024,
        max_in_memory_result_bytes: 2 * 1024 * 1024,
        max_cached_delta_bytes: 1024 * 1024,
        pack_cache_slots: 16,
        delta_cache_packs: 10,
        delta_cache_entries: 32,
        max_delta_chain_depth: 64,
    };

    /// Restrictive limits for testing or constrained environments.
    pub const RESTRICTIVE: Self = Self {
        max_object_bytes: 8 * 1024 * 1024,
        max_in_memory_result_bytes: 64 * 1024,
        max_cached_delta_bytes: 16 * 1024,
        pack_cache_slots: 4,
        delta_cache_packs: 2,
        delta_cache_entries: 4,
        max_delta_chain_depth: 64,
    };

    /// Validates that limits are internally consistent.
    ///
    /// # Panics
    ///
    /// Panics if limits are invalid (indicates a configuration bug).
    #[track_caller]
    pub const fn validate(&self) {
        assert!(self.max_object_bytes > 0, "object cap must be > 0");
        assert!(
            self.max_in_memory_result_bytes > 0,
            "in-memory ceiling must be > 0"
        );
        assert!(
            self.pack_cache_slots >= 1,
            "pack cache needs at least one slot"
        );
        assert!(
            self.delta_cache_packs >= 1,
            "delta cache needs at least one pack slot"
        );
        assert!(
            self.delta_cache_entries >= 1,
            "delta cache needs at least one entry per pack"
        );
        assert!(
            self.max_delta_chain_depth >= 2,
            "chains of base plus one delta must be allowed"
        );

        assert!(
            self.max_in_memory_result_bytes <= self.max_object_bytes as u64,
            "in-memory ceiling cannot exceed the object cap"
        );
        assert!(
            self.max_cached_delta_bytes <= self.max_object_bytes,
            "cached delta cap cannot exceed the object cap"
        );
        assert!(
            self.pack_cache_slots <= 1024,
            "unreasonably large pack cache"
        );
        assert!(
            self.max_delta_chain_depth <= 4096,
            "unreasonably deep chain cap"
        );
    }
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

const _: () = StoreLimits::DEFAULT.validate();
const _: () = StoreLimits::RESTRICTIVE.validate();
