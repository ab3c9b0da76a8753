//! AWS-oriented adapters and handlers for S3 auto-orient notifications.
//!
//! This crate owns runtime integration details (the Lambda handler and the
//! storage/transcoder capability seams) on top of the `orient_core`
//! contract, policy and orientation primitives.
//! See `crates/orient_lambda/README.md` for ownership boundaries.

pub mod adapters;
pub mod handlers;
