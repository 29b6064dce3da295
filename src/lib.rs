//! Read-oriented Git object store.
//!
//! This crate locates objects by their content-addressed identifier,
//! reconstructs their bytes from pack files (where most objects are stored
//! as deltas against other objects), and hands the result to callers as an
//! owned byte buffer or a rewound temporary file.
//!
//! High-level flow (single object read):
//! 1) Locate the object id in a pack index (cache walk, then directory scan).
//! 2) Parse the pack entry header at the indexed offset.
//! 3) Plain entries inflate straight to the destination.
//! 4) Delta entries resolve to a base-first chain, possibly across packs,
//!    then apply each delta in order (in memory or via temp-file ping-pong).
//!
//! The store is synchronous and single-owner: one caller drives one
//! [`pack_store::Repository`] at a time, and all caches live inside it.

pub mod pack_store;
