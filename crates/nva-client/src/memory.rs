//! In-memory client
//!
//! Holds the whole organization in process. Used by tests and offline
//! tooling; behaves like the remote service for every operation, including
//! the idempotent blob put. Transport failures can be simulated with
//! [`MemoryClient::set_fault`].

use crate::client::{Client, EntryParent, RemoteBlobs, RemoteGraph};
use async_trait::async_trait;
use nva_core::{
    ids, Agent, BlobEntry, BlobId, Error, Factor, GraphScope, Labeled, Result, Variable,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// A failure every call reports until cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Offline,
    Unauthorized,
}

#[derive(Debug, Default)]
struct GraphNode {
    description: String,
    metadata: String,
    agents: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct State {
    agents: BTreeMap<String, Agent>,
    graphs: BTreeMap<String, GraphNode>,
    variables: BTreeMap<GraphScope, BTreeMap<String, Variable>>,
    factors: BTreeMap<GraphScope, BTreeMap<String, Factor>>,
    agent_entries: BTreeMap<String, Vec<BlobEntry>>,
    blobs: HashMap<(String, BlobId), Vec<u8>>,
    origins: HashMap<(String, Uuid), BlobId>,
}

pub struct MemoryClient {
    api_url: String,
    org_id: Uuid,
    default_store: String,
    state: RwLock<State>,
    fault: RwLock<Option<Fault>>,
    puts: AtomicUsize,
}

impl MemoryClient {
    pub fn new(org_id: Uuid) -> Self {
        Self {
            api_url: format!("memory://{}", org_id),
            org_id,
            default_store: "default".to_string(),
            state: RwLock::new(State::default()),
            fault: RwLock::new(None),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn with_default_store(mut self, store: impl Into<String>) -> Self {
        self.default_store = store.into();
        self
    }

    /// Make every subsequent call fail, or clear the fault with `None`.
    pub fn set_fault(&self, fault: Option<Fault>) {
        *self.fault.write().unwrap_or_else(PoisonError::into_inner) = fault;
    }

    /// Number of `put_blob` calls received, including idempotent repeats.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of distinct blobs held across all stores.
    pub fn blob_count(&self) -> usize {
        self.read().blobs.len()
    }

    /// Description and metadata recorded for a graph.
    pub fn graph_info(&self, label: &str) -> Option<(String, String)> {
        self.read()
            .graphs
            .get(label)
            .map(|g| (g.description.clone(), g.metadata.clone()))
    }

    /// Overwrite stored bytes in place, bypassing the put path.
    pub fn corrupt_blob(&self, store: &str, blob_id: BlobId, bytes: Vec<u8>) -> bool {
        match self.write().blobs.get_mut(&(store.to_string(), blob_id)) {
            Some(slot) => {
                *slot = bytes;
                true
            }
            None => false,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fault(&self) -> Result<()> {
        match *self.fault.read().unwrap_or_else(PoisonError::into_inner) {
            Some(Fault::Offline) => Err(Error::Connection(format!(
                "{} is unreachable",
                self.api_url
            ))),
            Some(Fault::Unauthorized) => Err(Error::Auth("token rejected".to_string())),
            None => Ok(()),
        }
    }

    fn variable_id(&self, scope: &GraphScope, label: &str) -> Uuid {
        ids::node_id(&self.org_id, &scope.agent_label, &scope.graph_label, label)
    }
}

fn require_scope(state: &State, scope: &GraphScope) -> Result<()> {
    if !state.agents.contains_key(&scope.agent_label) {
        return Err(Error::NotFound(format!("agent {:?}", scope.agent_label)));
    }
    if !state.graphs.contains_key(&scope.graph_label) {
        return Err(Error::NotFound(format!("graph {:?}", scope.graph_label)));
    }
    Ok(())
}

fn require_connected(state: &State, scope: &GraphScope) -> Result<()> {
    require_scope(state, scope)?;
    let connected = state
        .graphs
        .get(&scope.graph_label)
        .is_some_and(|g| g.agents.contains(&scope.agent_label));
    if !connected {
        return Err(Error::NotFound(format!(
            "agent {:?} is not connected to graph {:?}",
            scope.agent_label, scope.graph_label
        )));
    }
    Ok(())
}

#[async_trait]
impl RemoteGraph for MemoryClient {
    async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.check_fault()?;
        Ok(self.read().agents.values().cloned().collect())
    }

    async fn add_agent(&self, label: &str) -> Result<Agent> {
        self.check_fault()?;
        if label.is_empty() {
            return Err(Error::Validation("agent label cannot be empty".to_string()));
        }
        let mut state = self.write();
        if state.agents.contains_key(label) {
            return Err(Error::Validation(format!("agent {:?} already exists", label)));
        }
        let agent = Agent::new(label).with_id(ids::agent_id(&self.org_id, label));
        state.agents.insert(label.to_string(), agent.clone());
        Ok(agent)
    }

    async fn list_graphs(&self) -> Result<Vec<String>> {
        self.check_fault()?;
        Ok(self.read().graphs.keys().cloned().collect())
    }

    async fn add_graph(&self, label: &str, description: &str, metadata: &str) -> Result<()> {
        self.check_fault()?;
        if label.is_empty() {
            return Err(Error::Validation("graph label cannot be empty".to_string()));
        }
        let mut state = self.write();
        if state.graphs.contains_key(label) {
            return Err(Error::Validation(format!("graph {:?} already exists", label)));
        }
        state.graphs.insert(
            label.to_string(),
            GraphNode {
                description: description.to_string(),
                metadata: metadata.to_string(),
                agents: BTreeSet::new(),
            },
        );
        Ok(())
    }

    async fn connect_agent_graph(&self, agent_label: &str, graph_label: &str) -> Result<()> {
        self.check_fault()?;
        let mut state = self.write();
        require_scope(&state, &GraphScope::new(agent_label, graph_label))?;
        if let Some(graph) = state.graphs.get_mut(graph_label) {
            graph.agents.insert(agent_label.to_string());
        }
        Ok(())
    }

    async fn list_variables(&self, scope: &GraphScope) -> Result<Vec<String>> {
        self.check_fault()?;
        let state = self.read();
        require_connected(&state, scope)?;
        Ok(state
            .variables
            .get(scope)
            .map(|vars| vars.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_variable(&self, scope: &GraphScope, label: &str) -> Result<Option<Variable>> {
        self.check_fault()?;
        let state = self.read();
        Ok(state
            .variables
            .get(scope)
            .and_then(|vars| vars.get(label))
            .cloned())
    }

    async fn add_variable(&self, scope: &GraphScope, variable: &Variable) -> Result<()> {
        self.check_fault()?;
        if variable.label().is_empty() {
            return Err(Error::Validation("variable label cannot be empty".to_string()));
        }
        let mut state = self.write();
        require_connected(&state, scope)?;
        let vars = state.variables.entry(scope.clone()).or_default();
        if vars.contains_key(variable.label()) {
            return Err(Error::Validation(format!(
                "variable {:?} already exists in {}",
                variable.label(),
                scope
            )));
        }
        let stored = variable
            .clone()
            .with_id(self.variable_id(scope, variable.label()));
        vars.insert(variable.label().to_string(), stored);
        Ok(())
    }

    async fn list_factors(&self, scope: &GraphScope) -> Result<Vec<String>> {
        self.check_fault()?;
        let state = self.read();
        require_connected(&state, scope)?;
        Ok(state
            .factors
            .get(scope)
            .map(|factors| factors.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_factor(&self, scope: &GraphScope, factor: &Factor) -> Result<()> {
        self.check_fault()?;
        let mut state = self.write();
        require_connected(&state, scope)?;
        for label in factor.variables() {
            let known = state
                .variables
                .get(scope)
                .is_some_and(|vars| vars.contains_key(label));
            if !known {
                return Err(Error::NotFound(format!("variable {:?} in {}", label, scope)));
            }
        }
        let factors = state.factors.entry(scope.clone()).or_default();
        if factors.contains_key(factor.label()) {
            return Err(Error::Validation(format!(
                "factor {:?} already exists in {}",
                factor.label(),
                scope
            )));
        }
        factors.insert(factor.label().to_string(), factor.clone());
        Ok(())
    }

    async fn add_blob_entry(&self, parent: &EntryParent, entry: &BlobEntry) -> Result<BlobEntry> {
        self.check_fault()?;
        if entry.label().is_empty() {
            return Err(Error::Validation("blob entry label cannot be empty".to_string()));
        }
        let mut state = self.write();
        match parent {
            EntryParent::Agent(agent_label) => {
                if !state.agents.contains_key(agent_label) {
                    return Err(Error::NotFound(format!("agent {:?}", agent_label)));
                }
                let entries = state.agent_entries.entry(agent_label.clone()).or_default();
                if entries.iter().any(|e| e.label() == entry.label()) {
                    return Err(Error::Validation(format!(
                        "agent {:?} already has an entry labelled {:?}",
                        agent_label,
                        entry.label()
                    )));
                }
                let stored = entry.clone().with_entry_id(ids::agent_entry_id(
                    &self.org_id,
                    agent_label,
                    entry.label(),
                ));
                entries.push(stored.clone());
                Ok(stored)
            }
            EntryParent::Variable { scope, label } => {
                let variable = state
                    .variables
                    .get_mut(scope)
                    .and_then(|vars| vars.get_mut(label))
                    .ok_or_else(|| Error::NotFound(format!("variable {:?} in {}", label, scope)))?;
                let stored = entry.clone().with_entry_id(ids::variable_entry_id(
                    &self.org_id,
                    &scope.agent_label,
                    &scope.graph_label,
                    label,
                    entry.label(),
                ));
                variable.add_blob_entry(stored.clone())?;
                Ok(stored)
            }
        }
    }

    async fn list_agent_entries(
        &self,
        agent_label: &str,
        mime_type_contains: Option<&str>,
    ) -> Result<Vec<BlobEntry>> {
        self.check_fault()?;
        let state = self.read();
        if !state.agents.contains_key(agent_label) {
            return Err(Error::NotFound(format!("agent {:?}", agent_label)));
        }
        Ok(state
            .agent_entries
            .get(agent_label)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| mime_type_contains.is_none_or(|m| e.mime_type().contains(m)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_blob_entry_metadata(&self, entry_id: Uuid, metadata: &str) -> Result<()> {
        self.check_fault()?;
        let mut state = self.write();
        let State {
            agent_entries,
            variables,
            ..
        } = &mut *state;

        let agent_hit = agent_entries
            .values_mut()
            .flat_map(|entries| entries.iter_mut())
            .find(|e| e.id() == Some(entry_id));
        if let Some(entry) = agent_hit {
            entry.set_metadata(metadata);
            return Ok(());
        }

        for variable in variables.values_mut().flat_map(|vars| vars.values_mut()) {
            let label = variable
                .blob_entries()
                .iter()
                .find(|e| e.id() == Some(entry_id))
                .map(|e| e.label().to_string());
            if let Some(entry) = label.and_then(|l| variable.blob_entry_mut(&l)) {
                entry.set_metadata(metadata);
                return Ok(());
            }
        }
        Err(Error::NotFound(format!("blob entry {}", entry_id)))
    }

    async fn delete_blob_entry(&self, entry_id: Uuid) -> Result<()> {
        self.check_fault()?;
        let mut state = self.write();
        let State {
            agent_entries,
            variables,
            ..
        } = &mut *state;

        for entries in agent_entries.values_mut() {
            if let Some(pos) = entries.iter().position(|e| e.id() == Some(entry_id)) {
                entries.remove(pos);
                return Ok(());
            }
        }

        for variable in variables.values_mut().flat_map(|vars| vars.values_mut()) {
            let label = variable
                .blob_entries()
                .iter()
                .find(|e| e.id() == Some(entry_id))
                .map(|e| e.label().to_string());
            if let Some(label) = label {
                variable.remove_blob_entry(&label);
                return Ok(());
            }
        }
        Err(Error::NotFound(format!("blob entry {}", entry_id)))
    }
}

#[async_trait]
impl RemoteBlobs for MemoryClient {
    async fn put_blob(&self, store: &str, origin_id: Uuid, bytes: &[u8]) -> Result<BlobId> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check_fault()?;
        // Let concurrent callers interleave the way network calls would.
        tokio::task::yield_now().await;

        let mut state = self.write();
        let key = (store.to_string(), origin_id);
        if let Some(existing) = state.origins.get(&key).copied() {
            let same = state
                .blobs
                .get(&(store.to_string(), existing))
                .is_none_or(|held| held.as_slice() == bytes);
            if !same {
                return Err(Error::Validation(format!(
                    "origin {} already holds different bytes in store {:?}",
                    origin_id, store
                )));
            }
            return Ok(existing);
        }
        let blob_id = BlobId::generate();
        state.blobs.insert((store.to_string(), blob_id), bytes.to_vec());
        state.origins.insert(key, blob_id);
        Ok(blob_id)
    }

    async fn get_blob(&self, store: &str, blob_id: BlobId) -> Result<Option<Vec<u8>>> {
        self.check_fault()?;
        Ok(self.read().blobs.get(&(store.to_string(), blob_id)).cloned())
    }

    async fn delete_blob(&self, store: &str, blob_id: BlobId) -> Result<()> {
        self.check_fault()?;
        let mut state = self.write();
        if state.blobs.remove(&(store.to_string(), blob_id)).is_none() {
            return Err(Error::NotFound(format!("blob {} in store {:?}", blob_id, store)));
        }
        state.origins.retain(|_, id| *id != blob_id);
        Ok(())
    }
}

impl Client for MemoryClient {
    fn api_url(&self) -> &str {
        &self.api_url
    }

    fn org_id(&self) -> Uuid {
        self.org_id
    }

    fn default_store(&self) -> &str {
        &self.default_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nva_core::{Distribution, Relation};

    fn client() -> MemoryClient {
        MemoryClient::new(Uuid::new_v4())
    }

    async fn seeded() -> (MemoryClient, GraphScope) {
        let c = client();
        c.add_agent("robot1").await.unwrap();
        c.add_graph("session1", "", "e30=").await.unwrap();
        c.connect_agent_graph("robot1", "session1").await.unwrap();
        assert_eq!(c.graph_info("session1").unwrap().1, "e30=");
        let scope = GraphScope::new("robot1", "session1");
        c.add_variable(&scope, &Variable::new("x0", "Pose3")).await.unwrap();
        (c, scope)
    }

    #[tokio::test]
    async fn test_agents_get_deterministic_ids() {
        let c = client();
        let agent = c.add_agent("robot1").await.unwrap();
        assert_eq!(agent.id, Some(ids::agent_id(&c.org_id(), "robot1")));
        assert!(c.add_agent("robot1").await.is_err());
        assert_eq!(c.list_agents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_variable_is_none() {
        let (c, scope) = seeded().await;
        assert!(c.get_variable(&scope, "x0").await.unwrap().is_some());
        assert!(c.get_variable(&scope, "x99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_variable_entry_labels_unique() {
        let (c, scope) = seeded().await;
        let parent = EntryParent::variable(&scope, "x0");
        let stored = c
            .add_blob_entry(&parent, &BlobEntry::create("LEFTCAM_1", "image/jpeg"))
            .await
            .unwrap();
        assert!(stored.id().is_some());

        let err = c
            .add_blob_entry(&parent, &BlobEntry::create("LEFTCAM_1", "image/jpeg"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let missing = EntryParent::variable(&scope, "x9");
        let err = c
            .add_blob_entry(&missing, &BlobEntry::create("LEFTCAM_1", "image/jpeg"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_agent_entries_filter_and_update() {
        let (c, _) = seeded().await;
        let parent = EntryParent::agent("robot1");
        let map = c
            .add_blob_entry(&parent, &BlobEntry::create("map", "application/octet-stream"))
            .await
            .unwrap();
        c.add_blob_entry(&parent, &BlobEntry::create("notes", "text/plain"))
            .await
            .unwrap();

        let text = c.list_agent_entries("robot1", Some("text")).await.unwrap();
        assert_eq!(text.len(), 1);
        assert_eq!(text[0].label(), "notes");

        let id = map.id().unwrap();
        c.update_blob_entry_metadata(id, "eyJhIjoxfQ==").await.unwrap();
        let all = c.list_agent_entries("robot1", None).await.unwrap();
        let updated = all.iter().find(|e| e.label() == "map").unwrap();
        assert_eq!(updated.metadata(), "eyJhIjoxfQ==");

        c.delete_blob_entry(id).await.unwrap();
        assert!(c.delete_blob_entry(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_put_is_idempotent_per_origin() {
        let c = client();
        let origin = Uuid::new_v4();
        let a = c.put_blob("default", origin, b"abc").await.unwrap();
        let b = c.put_blob("default", origin, b"abc").await.unwrap();
        let other = c.put_blob("lab", origin, b"abc").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, other);
        assert_eq!(c.put_count(), 3);
        assert_eq!(c.blob_count(), 2);

        assert_eq!(c.get_blob("default", a).await.unwrap().unwrap(), b"abc");
        assert!(c.get_blob("default", BlobId::generate()).await.unwrap().is_none());

        let err = c.put_blob("default", origin, b"abd").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(c.get_blob("default", a).await.unwrap().unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_factor_requires_variables() {
        let (c, scope) = seeded().await;
        c.add_variable(&scope, &Variable::new("x1", "Pose3")).await.unwrap();
        let d = Distribution::diagonal(vec![0.0; 6], &[0.1; 6]).unwrap();
        let rel = Relation::pose_to_pose(d).unwrap();

        let f = Factor::between("x0", "x1", rel.clone()).unwrap();
        c.add_factor(&scope, &f).await.unwrap();
        assert_eq!(c.list_factors(&scope).await.unwrap(), vec!["x0x1f1".to_string()]);

        let dangling = Factor::between("x0", "x7", rel).unwrap();
        assert!(c.add_factor(&scope, &dangling).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_faults() {
        let c = client();
        c.set_fault(Some(Fault::Offline));
        assert!(matches!(c.list_agents().await, Err(Error::Connection(_))));
        c.set_fault(Some(Fault::Unauthorized));
        assert!(matches!(c.list_graphs().await, Err(Error::Auth(_))));
        c.set_fault(None);
        assert!(c.list_agents().await.unwrap().is_empty());
    }
}
