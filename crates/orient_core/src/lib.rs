//! Shared auto-orient domain primitives.
//!
//! This crate owns the notification contract, destination policies, key
//! derivation and the EXIF-driven orientation transform. It intentionally
//! excludes AWS SDK and Lambda runtime concerns.
//! See `crates/orient_core/README.md` for ownership boundaries.

pub mod contract;
pub mod orientation;
pub mod policy;
pub mod storage_keys;
