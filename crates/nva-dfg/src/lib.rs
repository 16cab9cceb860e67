//! Factor-graph handles for nva
//!
//! Open an agent's graph with [`NavAbilityDfg::connect`], populate it with
//! variables, factors and blob entries, and resolve the bytes behind those
//! entries through [`BlobStore`] handles borrowed from the same client.

pub mod agents;
pub mod dfg;

pub use agents::list_agents;
pub use dfg::{DfgOptions, DfgState, NavAbilityDfg};
pub use nva_storage::BlobStore;
