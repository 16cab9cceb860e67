//! Core entity model for nva
//!
//! This crate contains:
//! - Blob entries and the blob identity rules
//! - Distributions, relations and factors
//! - Variables and agents
//! - Reconciliation of blob identity across entries

pub mod agent;
pub mod blob_entry;
pub mod distribution;
pub mod error;
pub mod factor;
pub mod ids;
pub mod label;
pub mod reconcile;
pub mod relation;
pub mod variable;

pub use agent::{Agent, GraphScope};
pub use blob_entry::{content_hash, BlobEntry, BlobEntryFields, BlobId, EMPTY_METADATA};
pub use distribution::Distribution;
pub use error::{Error, Result};
pub use factor::Factor;
pub use label::Labeled;
pub use reconcile::Conflict;
pub use relation::{Relation, RelationKind};
pub use variable::{MeanMaxPpe, Variable, VariableRecord};
