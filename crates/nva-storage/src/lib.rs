//! Blob storage for nva
//!
//! [`BlobStore`] resolves and uploads the bytes behind blob entries. Blob
//! identity is assigned by the store; the [`ledger`] makes sure concurrent
//! and repeated uploads of one origin share a single blob id.

pub mod blob;
pub mod ledger;

pub use blob::BlobStore;
