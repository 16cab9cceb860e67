//! Wire shapes of the GraphQL API and their mapping onto the entity model

use nva_core::blob_entry::parse_timestamp;
use nva_core::{
    Agent, BlobEntry, BlobEntryFields, Error, Factor, Labeled, MeanMaxPpe, Result, Variable,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct GraphqlRequest<'a> {
    pub query: &'a str,
    #[serde(rename = "operationName")]
    pub operation_name: &'a str,
    pub variables: Value,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default)]
    pub extensions: Option<Value>,
}

impl GraphqlError {
    pub fn is_unauthenticated(&self) -> bool {
        let code = self
            .extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        code == "UNAUTHENTICATED"
            || code == "FORBIDDEN"
            || self.message.to_ascii_lowercase().contains("unauthorized")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAgent {
    pub id: Uuid,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_timestamp: Option<String>,
    #[serde(default)]
    pub last_updated_timestamp: Option<String>,
}

impl WireAgent {
    pub fn into_agent(self) -> Result<Agent> {
        let mut agent = Agent::new(self.label).with_id(self.id);
        agent.description = self.description.unwrap_or_default();
        if let Some(ts) = self.created_timestamp.as_deref() {
            agent.created_timestamp = parse_timestamp(ts)?;
        }
        if let Some(ts) = self.last_updated_timestamp.as_deref() {
            agent.last_updated_timestamp = parse_timestamp(ts)?;
        }
        Ok(agent)
    }
}

#[derive(Debug, Deserialize)]
pub struct WireLabel {
    pub label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBlobEntry {
    pub id: Option<Uuid>,
    #[serde(default)]
    pub blob_id: Option<String>,
    #[serde(default)]
    pub origin_id: Option<String>,
    pub label: String,
    #[serde(default)]
    pub blobstore: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl WireBlobEntry {
    pub fn into_entry(self) -> Result<BlobEntry> {
        let blob_id = self
            .blob_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::nil().to_string());
        let entry = BlobEntry::create_full(BlobEntryFields {
            blob_id,
            label: self.label,
            blobstore: self.blobstore.unwrap_or_default(),
            hash: self.hash.unwrap_or_default(),
            origin_id: self.origin_id,
            size: self.size,
            description: self.description.unwrap_or_default(),
            mime_type: self.mime_type.unwrap_or_default(),
            metadata: self.metadata.unwrap_or_default(),
            timestamp: self.timestamp,
        })?
        .with_origin(self.origin.unwrap_or_default());
        Ok(match self.id {
            Some(id) => entry.with_entry_id(id),
            None => entry,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePpe {
    pub solve_key: String,
    #[serde(default)]
    pub suggested: Vec<f64>,
    #[serde(default)]
    pub max: Vec<f64>,
    #[serde(default)]
    pub mean: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireVariable {
    pub id: Option<Uuid>,
    pub label: String,
    pub variable_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub nstime: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub solvable: Option<i32>,
    #[serde(default)]
    pub ppes: Vec<WirePpe>,
    #[serde(default)]
    pub blob_entries: Vec<WireBlobEntry>,
}

impl WireVariable {
    pub fn into_variable(self) -> Result<Variable> {
        let mut variable = Variable::new(self.label, self.variable_type);
        if let Some(id) = self.id {
            variable = variable.with_id(id);
        }
        if !self.tags.is_empty() {
            variable = variable.with_tags(self.tags);
        }
        if let Some(ts) = self.timestamp.as_deref() {
            let nstime = match self.nstime.as_deref() {
                Some(ns) => ns.parse::<u64>().map_err(|e| {
                    Error::Validation(format!("invalid nstime {:?}: {}", ns, e))
                })?,
                None => 0,
            };
            variable = variable.with_timestamp(parse_timestamp(ts)?, nstime);
        }
        if let Some(metadata) = self.metadata {
            variable.set_metadata(metadata);
        }
        if let Some(solvable) = self.solvable {
            variable.set_solvable(solvable);
        }
        for ppe in self.ppes {
            variable.set_ppe(MeanMaxPpe {
                solve_key: ppe.solve_key,
                suggested: ppe.suggested,
                max: ppe.max,
                mean: ppe.mean,
            });
        }
        for entry in self.blob_entries {
            let entry = entry.into_entry()?;
            if variable.blob_entry(entry.label()).is_some() {
                warn!(
                    variable = variable.label(),
                    entry = entry.label(),
                    "duplicate blob entry label in server record, keeping the first"
                );
                continue;
            }
            variable.add_blob_entry(entry)?;
        }
        Ok(variable)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUploadPart {
    pub part_number: u32,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUpload {
    pub upload_id: String,
    pub blob_id: String,
    pub parts: Vec<WireUploadPart>,
}

pub fn rfc3339(ts: OffsetDateTime) -> Result<String> {
    ts.format(&Rfc3339)
        .map_err(|e| Error::Other(anyhow::Error::new(e)))
}

fn connect_to(id: Uuid) -> Value {
    json!({ "connect": { "where": { "node": { "id": id } } } })
}

pub fn blob_entry_input(entry: &BlobEntry, id: Uuid, parent: (&str, Uuid)) -> Result<Value> {
    let mut input = json!({
        "id": id,
        "blobId": entry.blob_id(),
        "originId": entry.origin_id(),
        "label": entry.label(),
        "blobstore": entry.blobstore(),
        "hash": entry.hash(),
        "origin": entry.origin(),
        "size": entry.size(),
        "description": entry.description(),
        "mimeType": entry.mime_type(),
        "metadata": entry.metadata(),
        "timestamp": rfc3339(entry.timestamp())?,
        "_version": entry.version(),
    });
    input[parent.0] = connect_to(parent.1);
    Ok(input)
}

pub fn variable_input(
    variable: &Variable,
    id: Uuid,
    agent_id: Uuid,
    fg_id: Uuid,
    version: &str,
) -> Result<Value> {
    Ok(json!({
        "id": id,
        "label": variable.label(),
        "variableType": variable.variable_type(),
        "tags": variable.tags(),
        "timestamp": rfc3339(variable.timestamp())?,
        "nstime": variable.nstime().to_string(),
        "metadata": variable.metadata(),
        "solvable": variable.solvable(),
        "_version": version,
        "agent": connect_to(agent_id),
        "fg": connect_to(fg_id),
    }))
}

pub fn factor_input(
    factor: &Factor,
    id: Uuid,
    variable_ids: &[Uuid],
    agent_id: Uuid,
    fg_id: Uuid,
    version: &str,
) -> Result<Value> {
    let variables: Vec<Value> = variable_ids
        .iter()
        .map(|id| json!({ "where": { "node": { "id": id } } }))
        .collect();
    Ok(json!({
        "id": id,
        "label": factor.label(),
        "tags": factor.tags(),
        "timestamp": rfc3339(factor.timestamp())?,
        "fnctype": factor.relation().kind().as_str(),
        "variableOrderSymbols": factor.variables(),
        "data": serde_json::to_string(factor.relation())?,
        "_version": version,
        "variables": { "connect": variables },
        "agent": connect_to(agent_id),
        "fg": connect_to(fg_id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_entry_without_blob_is_blobless() {
        let wire: WireBlobEntry = serde_json::from_value(json!({
            "id": "3f8a2b9e-0000-4000-8000-000000000001",
            "label": "notes",
            "mimeType": "text/plain",
            "blobId": null,
            "originId": "3f8a2b9e-0000-4000-8000-0000000000aa",
            "timestamp": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        let entry = wire.into_entry().unwrap();
        assert!(entry.is_blobless());
        assert!(entry.id().is_some());
        assert_eq!(entry.metadata(), nva_core::EMPTY_METADATA);
    }

    #[test]
    fn test_wire_variable_with_entries() {
        let wire: WireVariable = serde_json::from_value(json!({
            "id": "3f8a2b9e-0000-4000-8000-000000000002",
            "label": "x0",
            "variableType": "Pose3",
            "tags": ["VARIABLE", "POSE"],
            "timestamp": "2024-05-01T10:00:00Z",
            "nstime": "17",
            "solvable": 0,
            "ppes": [{ "solveKey": "default", "suggested": [1.0], "max": [1.0], "mean": [1.0] }],
            "blobEntries": [{
                "label": "LEFTCAM_1",
                "blobId": "3f8a2b9e-0000-4000-8000-0000000000bb",
                "hash": "abc",
                "size": 12
            }]
        }))
        .unwrap();
        let variable = wire.into_variable().unwrap();
        assert_eq!(variable.label(), "x0");
        assert_eq!(variable.nstime(), 17);
        assert_eq!(variable.solvable(), 0);
        assert!(variable.ppe("default").is_some());
        assert_eq!(variable.blob_entry("LEFTCAM_1").unwrap().size(), Some(12));
    }

    #[test]
    fn test_duplicate_entry_labels_keep_first() {
        let wire: WireVariable = serde_json::from_value(json!({
            "label": "x3",
            "variableType": "Pose3",
            "blobEntries": [
                { "label": "LEFTCAM_1", "blobId": "3f8a2b9e-0000-4000-8000-0000000000c1", "size": 1 },
                { "label": "LEFTCAM_1", "blobId": "3f8a2b9e-0000-4000-8000-0000000000c2", "size": 2 },
                { "label": "LEFTCAM_2", "blobId": "3f8a2b9e-0000-4000-8000-0000000000c3", "size": 3 }
            ]
        }))
        .unwrap();
        let variable = wire.into_variable().unwrap();
        assert_eq!(variable.blob_entries().len(), 2);
        assert_eq!(variable.blob_entry("LEFTCAM_1").unwrap().size(), Some(1));
    }

    #[test]
    fn test_negative_size_rejected() {
        let wire: WireBlobEntry = serde_json::from_value(json!({
            "label": "bad",
            "size": -1
        }))
        .unwrap();
        assert!(wire.into_entry().is_err());
    }

    #[test]
    fn test_unauthenticated_detection() {
        let err: GraphqlError = serde_json::from_value(json!({
            "message": "Access denied",
            "extensions": { "code": "UNAUTHENTICATED" }
        }))
        .unwrap();
        assert!(err.is_unauthenticated());

        let err: GraphqlError = serde_json::from_value(json!({ "message": "boom" })).unwrap();
        assert!(!err.is_unauthenticated());
    }
}
