//! Collaborator traits for the remote graph and blob services

use async_trait::async_trait;
use nva_core::{Agent, BlobEntry, BlobId, Factor, GraphScope, Result, Variable};
use uuid::Uuid;

/// Where a blob entry is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryParent {
    Agent(String),
    Variable { scope: GraphScope, label: String },
}

impl EntryParent {
    pub fn agent(label: impl Into<String>) -> Self {
        EntryParent::Agent(label.into())
    }

    pub fn variable(scope: &GraphScope, label: impl Into<String>) -> Self {
        EntryParent::Variable {
            scope: scope.clone(),
            label: label.into(),
        }
    }
}

impl std::fmt::Display for EntryParent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryParent::Agent(label) => write!(f, "agent {}", label),
            EntryParent::Variable { scope, label } => write!(f, "variable {}/{}", scope, label),
        }
    }
}

/// Graph-structure operations of the remote service.
///
/// Lookups of a single record return `Ok(None)` when the record does not
/// exist. `Err` is reserved for transport, auth and validation failures.
#[async_trait]
pub trait RemoteGraph: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<Agent>>;

    async fn add_agent(&self, label: &str) -> Result<Agent>;

    /// Labels of every graph in the organization.
    async fn list_graphs(&self) -> Result<Vec<String>>;

    async fn add_graph(&self, label: &str, description: &str, metadata: &str) -> Result<()>;

    /// Idempotent.
    async fn connect_agent_graph(&self, agent_label: &str, graph_label: &str) -> Result<()>;

    async fn list_variables(&self, scope: &GraphScope) -> Result<Vec<String>>;

    async fn get_variable(&self, scope: &GraphScope, label: &str) -> Result<Option<Variable>>;

    async fn add_variable(&self, scope: &GraphScope, variable: &Variable) -> Result<()>;

    async fn list_factors(&self, scope: &GraphScope) -> Result<Vec<String>>;

    async fn add_factor(&self, scope: &GraphScope, factor: &Factor) -> Result<()>;

    /// Store an entry under `parent` and return it stamped with its entry id.
    async fn add_blob_entry(&self, parent: &EntryParent, entry: &BlobEntry) -> Result<BlobEntry>;

    /// Entries attached directly to an agent, optionally filtered by a
    /// substring of the MIME type.
    async fn list_agent_entries(
        &self,
        agent_label: &str,
        mime_type_contains: Option<&str>,
    ) -> Result<Vec<BlobEntry>>;

    async fn update_blob_entry_metadata(&self, entry_id: Uuid, metadata: &str) -> Result<()>;

    /// Removes the entry only; the blob it references is left in place.
    async fn delete_blob_entry(&self, entry_id: Uuid) -> Result<()>;
}

/// Byte storage of the remote service.
#[async_trait]
pub trait RemoteBlobs: Send + Sync {
    /// Store `bytes` in `store` and return the new blob id.
    ///
    /// `origin_id` is passed along as an idempotency key: repeating a put for
    /// the same origin must not mint a second blob.
    async fn put_blob(&self, store: &str, origin_id: Uuid, bytes: &[u8]) -> Result<BlobId>;

    async fn get_blob(&self, store: &str, blob_id: BlobId) -> Result<Option<Vec<u8>>>;

    async fn delete_blob(&self, store: &str, blob_id: BlobId) -> Result<()>;
}

/// An authenticated handle on one organization of the remote service.
pub trait Client: RemoteGraph + RemoteBlobs {
    /// Endpoint this client talks to. Part of the blob deduplication key.
    fn api_url(&self) -> &str;

    /// Namespace of every deterministic id.
    fn org_id(&self) -> Uuid;

    /// Store used when a caller does not name one.
    fn default_store(&self) -> &str;
}
