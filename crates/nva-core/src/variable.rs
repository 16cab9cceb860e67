//! Variable domain model

use crate::{BlobEntry, Error, GraphScope, Labeled, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Parametric point estimate (mean and max) for one solve key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanMaxPpe {
    pub solve_key: String,
    pub suggested: Vec<f64>,
    pub max: Vec<f64>,
    pub mean: Vec<f64>,
}

/// An estimation target in the factor graph.
///
/// Blob entries are kept in insertion order and their labels are unique per
/// variable (repeat a capture as `LEFTCAM_1`, `LEFTCAM_2`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    id: Option<Uuid>,
    label: String,
    variable_type: String,
    tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    nstime: u64,
    ppes: Vec<MeanMaxPpe>,
    blob_entries: Vec<BlobEntry>,
    metadata: String,
    solvable: i32,
}

impl Variable {
    pub fn new(label: impl Into<String>, variable_type: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            variable_type: variable_type.into(),
            tags: vec!["VARIABLE".to_string()],
            timestamp: OffsetDateTime::now_utc(),
            nstime: 0,
            ppes: Vec::new(),
            blob_entries: Vec::new(),
            metadata: crate::EMPTY_METADATA.to_string(),
            solvable: 1,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime, nstime: u64) -> Self {
        self.timestamp = timestamp;
        self.nstime = nstime;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn set_metadata(&mut self, metadata: impl Into<String>) {
        self.metadata = metadata.into();
    }

    pub fn set_solvable(&mut self, solvable: i32) {
        self.solvable = solvable;
    }

    /// Insert or replace the estimate for `ppe.solve_key`.
    pub fn set_ppe(&mut self, ppe: MeanMaxPpe) {
        match self.ppes.iter_mut().find(|p| p.solve_key == ppe.solve_key) {
            Some(existing) => *existing = ppe,
            None => self.ppes.push(ppe),
        }
    }

    pub fn add_blob_entry(&mut self, entry: BlobEntry) -> Result<()> {
        if self.blob_entry(entry.label()).is_some() {
            return Err(Error::Validation(format!(
                "variable {:?} already has a blob entry labelled {:?}",
                self.label,
                entry.label()
            )));
        }
        self.blob_entries.push(entry);
        Ok(())
    }

    pub fn remove_blob_entry(&mut self, label: &str) -> Option<BlobEntry> {
        let idx = self.blob_entries.iter().position(|e| e.label() == label)?;
        Some(self.blob_entries.remove(idx))
    }

    pub fn blob_entry(&self, label: &str) -> Option<&BlobEntry> {
        self.blob_entries.iter().find(|e| e.label() == label)
    }

    pub fn blob_entry_mut(&mut self, label: &str) -> Option<&mut BlobEntry> {
        self.blob_entries.iter_mut().find(|e| e.label() == label)
    }

    pub fn blob_entries(&self) -> &[BlobEntry] {
        &self.blob_entries
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn variable_type(&self) -> &str {
        &self.variable_type
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn nstime(&self) -> u64 {
        self.nstime
    }

    pub fn ppes(&self) -> &[MeanMaxPpe] {
        &self.ppes
    }

    pub fn ppe(&self, solve_key: &str) -> Option<&MeanMaxPpe> {
        self.ppes.iter().find(|p| p.solve_key == solve_key)
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn solvable(&self) -> i32 {
        self.solvable
    }
}

impl Labeled for Variable {
    fn label(&self) -> &str {
        &self.label
    }
}

/// A variable as read from a graph, together with the scope it lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableRecord {
    pub scope: GraphScope,
    pub variable: Variable,
}

impl VariableRecord {
    pub fn new(scope: GraphScope, variable: Variable) -> Self {
        Self { scope, variable }
    }

    pub fn agent_label(&self) -> &str {
        &self.scope.agent_label
    }

    pub fn graph_label(&self) -> &str {
        &self.scope.graph_label
    }

    pub fn into_variable(self) -> Variable {
        self.variable
    }
}

impl Labeled for VariableRecord {
    fn label(&self) -> &str {
        self.variable.label()
    }
}
