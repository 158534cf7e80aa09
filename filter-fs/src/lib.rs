//! A local-filesystem [`bloomd_core::FilterBackend`], grounded on the
//! teacher's direct-I/O bundle storage: every durable write goes to a
//! temp file on the same filesystem, is `fsync`'d, then renamed into
//! place, so a crash mid-write never leaves a half-written filter visible.
//!
//! The bit array format here is intentionally the simplest thing that
//! works — a fixed-size bit vector double-hashed with two salted FNV-1a
//! passes — not a claim about any particular production Bloom filter
//! encoding, which this backend's trait boundary deliberately keeps out of
//! scope.

mod config;
mod filter;

pub use config::Config;
pub use filter::FsBackend;
