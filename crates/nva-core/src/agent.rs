//! Agent domain model

use crate::Labeled;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A robot or session that owns a subgraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Option<Uuid>,
    label: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_timestamp: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated_timestamp: OffsetDateTime,
}

impl Agent {
    pub fn new(label: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: None,
            label: label.into(),
            description: String::new(),
            created_timestamp: now,
            last_updated_timestamp: now,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

impl Labeled for Agent {
    fn label(&self) -> &str {
        &self.label
    }
}

/// The (agent, graph) pair every variable and factor is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphScope {
    pub agent_label: String,
    pub graph_label: String,
}

impl GraphScope {
    pub fn new(agent_label: impl Into<String>, graph_label: impl Into<String>) -> Self {
        Self {
            agent_label: agent_label.into(),
            graph_label: graph_label.into(),
        }
    }
}

impl std::fmt::Display for GraphScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.agent_label, self.graph_label)
    }
}
