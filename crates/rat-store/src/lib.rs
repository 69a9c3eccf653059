//! Object-store access for landing zones, pipeline source files, and table
//! metadata pointers.
//!
//! Wraps the `object_store` crate's S3-compatible client behind a
//! TTL-cached map keyed by connection config, so short-lived STS credentials
//! get rotated out without every caller re-building a client by hand.

mod client;
mod error;
mod ops;

pub use client::StoreClientCache;
pub use error::StoreError;
pub use ops::{list_keys, move_keys, read_text, read_text_version};
