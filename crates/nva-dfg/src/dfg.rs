//! Graph accessor
//!
//! A [`NavAbilityDfg`] is a handle on one agent's view of one factor graph.
//! It borrows a [`Client`] and holds nothing but labels and a lifecycle
//! state:
//!
//! ```text
//! Unopened --open()--> Open --close()--> Closed
//! ```
//!
//! Every graph operation requires `Open`. Lookups that find nothing return
//! `Ok(None)`; `Err` means the handle is in the wrong state, the input was
//! invalid or the service could not be reached.

use nva_client::{Client, EntryParent};
use nva_core::{
    reconcile, BlobEntry, BlobId, Conflict, Error, Factor, GraphScope, Labeled, Result,
    Variable, VariableRecord, EMPTY_METADATA,
};
use nva_storage::BlobStore;
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfgState {
    Unopened,
    Open,
    Closed,
}

/// Options for [`NavAbilityDfg::new`]. Unset flags default to `false`; an
/// unset store label falls back to the client's default store.
#[derive(Debug, Clone, Default)]
pub struct DfgOptions {
    pub agent_label: String,
    pub graph_label: String,
    pub store_label: Option<String>,
    pub add_agent_if_absent: Option<bool>,
    pub add_graph_if_absent: Option<bool>,
    pub graph_description: Option<String>,
}

impl DfgOptions {
    pub fn new(agent_label: impl Into<String>, graph_label: impl Into<String>) -> Self {
        Self {
            agent_label: agent_label.into(),
            graph_label: graph_label.into(),
            ..Default::default()
        }
    }

    pub fn store(mut self, label: impl Into<String>) -> Self {
        self.store_label = Some(label.into());
        self
    }

    pub fn add_agent_if_absent(mut self, yes: bool) -> Self {
        self.add_agent_if_absent = Some(yes);
        self
    }

    pub fn add_graph_if_absent(mut self, yes: bool) -> Self {
        self.add_graph_if_absent = Some(yes);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.graph_description = Some(description.into());
        self
    }
}

pub struct NavAbilityDfg<'c> {
    client: Option<&'c dyn Client>,
    scope: GraphScope,
    store_label: String,
    add_agent_if_absent: bool,
    add_graph_if_absent: bool,
    description: String,
    state: DfgState,
}

impl std::fmt::Debug for NavAbilityDfg<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavAbilityDfg")
            .field("scope", &self.scope)
            .field("store_label", &self.store_label)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'c> NavAbilityDfg<'c> {
    /// Build an unopened handle. Labels are validated here; nothing is sent.
    pub fn new(client: &'c dyn Client, options: DfgOptions) -> Result<Self> {
        if options.agent_label.is_empty() {
            return Err(Error::Validation("agent label cannot be empty".to_string()));
        }
        if options.graph_label.is_empty() {
            return Err(Error::Validation("graph label cannot be empty".to_string()));
        }
        let store_label = match options.store_label {
            Some(label) if label.trim().is_empty() => {
                return Err(Error::Validation("store label cannot be empty".to_string()));
            }
            Some(label) => label,
            None => client.default_store().to_string(),
        };

        Ok(Self {
            client: Some(client),
            scope: GraphScope::new(options.agent_label, options.graph_label),
            store_label,
            add_agent_if_absent: options.add_agent_if_absent.unwrap_or(false),
            add_graph_if_absent: options.add_graph_if_absent.unwrap_or(false),
            description: options.graph_description.unwrap_or_default(),
            state: DfgState::Unopened,
        })
    }

    /// `new` followed by `open`. No handle is returned if either fails.
    pub async fn connect(client: &'c dyn Client, options: DfgOptions) -> Result<Self> {
        let mut dfg = Self::new(client, options)?;
        dfg.open().await?;
        Ok(dfg)
    }

    /// Make sure the agent and graph exist, creating them if allowed, and
    /// link the two.
    pub async fn open(&mut self) -> Result<()> {
        let client = match (self.state, self.client) {
            (DfgState::Open, _) => return Ok(()),
            (DfgState::Unopened, Some(client)) => client,
            _ => {
                return Err(Error::State(format!(
                    "graph {} is closed and cannot be reopened",
                    self.scope
                )));
            }
        };
        let agent_label = self.scope.agent_label.as_str();
        let graph_label = self.scope.graph_label.as_str();

        let agents = client.list_agents().await?;
        if !agents.iter().any(|a| a.label() == agent_label) {
            if !self.add_agent_if_absent {
                return Err(Error::NotFound(format!("agent {:?}", agent_label)));
            }
            client.add_agent(agent_label).await?;
            info!(agent = agent_label, "agent created");
        }

        let graphs = client.list_graphs().await?;
        if !graphs.iter().any(|g| g == graph_label) {
            if !self.add_graph_if_absent {
                return Err(Error::NotFound(format!("graph {:?}", graph_label)));
            }
            client
                .add_graph(graph_label, &self.description, EMPTY_METADATA)
                .await?;
            info!(graph = graph_label, "graph created");
        }

        client.connect_agent_graph(agent_label, graph_label).await?;
        self.state = DfgState::Open;
        debug!(scope = %self.scope, "graph opened");
        Ok(())
    }

    /// Release the client reference. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state != DfgState::Closed {
            debug!(scope = %self.scope, "graph closed");
        }
        self.client = None;
        self.state = DfgState::Closed;
    }

    pub fn state(&self) -> DfgState {
        self.state
    }

    pub fn scope(&self) -> &GraphScope {
        &self.scope
    }

    pub fn agent_label(&self) -> &str {
        &self.scope.agent_label
    }

    pub fn store_label(&self) -> &str {
        &self.store_label
    }

    fn client(&self) -> Result<&'c dyn Client> {
        match (self.state, self.client) {
            (DfgState::Open, Some(client)) => Ok(client),
            (state, _) => Err(Error::State(format!(
                "graph {} is {:?}, expected Open",
                self.scope, state
            ))),
        }
    }

    pub async fn get_variable(&self, label: &str) -> Result<Option<VariableRecord>> {
        let client = self.client()?;
        match client.get_variable(&self.scope, label).await? {
            Some(variable) => Ok(Some(VariableRecord::new(self.scope.clone(), variable))),
            None => {
                debug!(scope = %self.scope, variable = label, "variable not found");
                Ok(None)
            }
        }
    }

    pub async fn list_variables(&self) -> Result<Vec<String>> {
        self.client()?.list_variables(&self.scope).await
    }

    pub async fn add_variable(&self, variable: &Variable) -> Result<()> {
        let client = self.client()?;
        if variable.label().is_empty() {
            return Err(Error::Validation("variable label cannot be empty".to_string()));
        }
        client.add_variable(&self.scope, variable).await?;
        info!(scope = %self.scope, variable = variable.label(), "variable added");
        Ok(())
    }

    pub async fn list_factors(&self) -> Result<Vec<String>> {
        self.client()?.list_factors(&self.scope).await
    }

    /// Submit a factor after checking every variable it references exists.
    pub async fn add_factor(&self, factor: &Factor) -> Result<()> {
        let client = self.client()?;
        let known: BTreeSet<String> = client.list_variables(&self.scope).await?.into_iter().collect();
        if let Some(missing) = factor.variables().iter().find(|v| !known.contains(*v)) {
            return Err(Error::NotFound(format!(
                "factor {:?} references unknown variable {:?} in {}",
                factor.label(),
                missing,
                self.scope
            )));
        }
        client.add_factor(&self.scope, factor).await?;
        info!(scope = %self.scope, factor = factor.label(), "factor added");
        Ok(())
    }

    /// Attach an entry to a variable. Entry labels are unique per variable.
    pub async fn add_blob_entry(&self, variable_label: &str, entry: &BlobEntry) -> Result<BlobEntry> {
        let client = self.client()?;
        let parent = EntryParent::variable(&self.scope, variable_label);
        let stored = client.add_blob_entry(&parent, entry).await?;
        info!(
            scope = %self.scope,
            variable = variable_label,
            entry = stored.label(),
            blob_id = %stored.blob_id(),
            "blob entry added"
        );
        Ok(stored)
    }

    pub async fn get_blob_entry(&self, variable_label: &str, entry_label: &str) -> Result<Option<BlobEntry>> {
        let Some(record) = self.get_variable(variable_label).await? else {
            return Ok(None);
        };
        let entry = record.variable.blob_entry(entry_label).cloned();
        if entry.is_none() {
            debug!(variable = variable_label, entry = entry_label, "blob entry not found");
        }
        Ok(entry)
    }

    /// Attach an entry directly to this handle's agent.
    pub async fn add_agent_entry(&self, entry: &BlobEntry) -> Result<BlobEntry> {
        let client = self.client()?;
        let parent = EntryParent::agent(self.agent_label());
        let stored = client.add_blob_entry(&parent, entry).await?;
        info!(agent = self.agent_label(), entry = stored.label(), "agent entry added");
        Ok(stored)
    }

    /// Agent entries whose MIME type contains `mime_type_contains`, or all of
    /// them when `None`.
    pub async fn list_agent_entries(&self, mime_type_contains: Option<&str>) -> Result<Vec<BlobEntry>> {
        self.client()?
            .list_agent_entries(self.agent_label(), mime_type_contains)
            .await
    }

    /// Replace the metadata of a stored entry and return the updated copy.
    pub async fn update_blob_entry_metadata(&self, entry: &BlobEntry, metadata: &str) -> Result<BlobEntry> {
        let client = self.client()?;
        let id = stored_id(entry)?;
        client.update_blob_entry_metadata(id, metadata).await?;
        let mut updated = entry.clone();
        updated.set_metadata(metadata);
        info!(entry = entry.label(), %id, "blob entry metadata updated");
        Ok(updated)
    }

    /// Remove a stored entry. The blob it references is not deleted.
    pub async fn delete_blob_entry(&self, entry: &BlobEntry) -> Result<()> {
        let client = self.client()?;
        let id = stored_id(entry)?;
        client.delete_blob_entry(id).await?;
        info!(entry = entry.label(), %id, "blob entry deleted");
        Ok(())
    }

    pub fn blob_store(&self, label: &str) -> Result<BlobStore<'c>> {
        BlobStore::open(self.client()?, label)
    }

    pub fn default_blob_store(&self) -> Result<BlobStore<'c>> {
        self.blob_store(&self.store_label)
    }

    /// Upload `bytes` to this handle's store and attach the resulting entry
    /// to a variable.
    pub async fn attach_blob(&self, variable_label: &str, entry: &BlobEntry, bytes: &[u8]) -> Result<BlobEntry> {
        let uploaded = self.default_blob_store()?.upload(entry, bytes).await?;
        self.add_blob_entry(variable_label, &uploaded).await
    }

    /// Every entry in this graph plus the agent's own entries.
    async fn all_entries(&self) -> Result<Vec<BlobEntry>> {
        let client = self.client()?;
        let mut entries = client.list_agent_entries(self.agent_label(), None).await?;
        for label in client.list_variables(&self.scope).await? {
            if let Some(variable) = client.get_variable(&self.scope, &label).await? {
                entries.extend(variable.blob_entries().iter().cloned());
            }
        }
        Ok(entries)
    }

    /// All entries that reference `blob_id`.
    pub async fn blob_references(&self, blob_id: BlobId) -> Result<Vec<BlobEntry>> {
        if blob_id.is_nil() {
            return Ok(Vec::new());
        }
        let entries = self.all_entries().await?;
        Ok(entries.into_iter().filter(|e| e.blob_id() == blob_id).collect())
    }

    /// Identity inconsistencies across the graph and the agent's entries.
    pub async fn audit_blob_entries(&self) -> Result<Vec<Conflict>> {
        let entries = self.all_entries().await?;
        let conflicts = reconcile::find_conflicts(&entries);
        if !conflicts.is_empty() {
            info!(scope = %self.scope, conflicts = conflicts.len(), "blob identity conflicts found");
        }
        Ok(conflicts)
    }
}

fn stored_id(entry: &BlobEntry) -> Result<uuid::Uuid> {
    entry.id().ok_or_else(|| {
        Error::Validation(format!(
            "entry {:?} has no entry id; it was never stored",
            entry.label()
        ))
    })
}

impl Labeled for NavAbilityDfg<'_> {
    fn label(&self) -> &str {
        &self.scope.graph_label
    }
}

impl Drop for NavAbilityDfg<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nva_client::MemoryClient;
    use uuid::Uuid;

    #[test]
    fn test_new_validates_labels() {
        let c = MemoryClient::new(Uuid::new_v4());
        assert!(matches!(
            NavAbilityDfg::new(&c, DfgOptions::new("", "g")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            NavAbilityDfg::new(&c, DfgOptions::new("a", "")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            NavAbilityDfg::new(&c, DfgOptions::new("a", "g").store(" ")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let c = MemoryClient::new(Uuid::new_v4()).with_default_store("lab");
        let dfg = NavAbilityDfg::new(&c, DfgOptions::new("robot1", "session1")).unwrap();
        assert_eq!(dfg.state(), DfgState::Unopened);
        assert_eq!(dfg.store_label(), "lab");
        assert!(!dfg.add_agent_if_absent);
        assert!(!dfg.add_graph_if_absent);
    }

    #[tokio::test]
    async fn test_unopened_rejects_operations() {
        let c = MemoryClient::new(Uuid::new_v4());
        let dfg = NavAbilityDfg::new(&c, DfgOptions::new("robot1", "session1")).unwrap();
        assert!(matches!(dfg.get_variable("x0").await, Err(Error::State(_))));
        assert!(matches!(dfg.default_blob_store(), Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_closed_cannot_reopen() {
        let c = MemoryClient::new(Uuid::new_v4());
        let opts = DfgOptions::new("robot1", "session1")
            .add_agent_if_absent(true)
            .add_graph_if_absent(true);
        let mut dfg = NavAbilityDfg::connect(&c, opts).await.unwrap();
        dfg.close();
        dfg.close();
        assert_eq!(dfg.state(), DfgState::Closed);
        assert!(matches!(dfg.open().await, Err(Error::State(_))));
    }

    #[test]
    fn test_stored_id_required() {
        let entry = BlobEntry::create("x", "text/plain");
        assert!(matches!(stored_id(&entry), Err(Error::Validation(_))));
    }
}
