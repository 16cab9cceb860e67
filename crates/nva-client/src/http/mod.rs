//! GraphQL transport
//!
//! One authenticated `reqwest` client per organization. Graph operations are
//! single GraphQL posts; blob transfers go through short-lived presigned URLs
//! handed out by the API (`createUpload` / `createDownload`).

pub mod queries;
mod wire;

use crate::client::{Client, EntryParent, RemoteBlobs, RemoteGraph};
use async_trait::async_trait;
use nva_core::{ids, Agent, BlobEntry, BlobId, Error, Factor, GraphScope, Labeled, Result, Variable};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, ETAG};
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use wire::{GraphqlRequest, GraphqlResponse, WireAgent, WireBlobEntry, WireLabel, WireUpload, WireVariable};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpClient {
    http: reqwest::Client,
    /// Unauthenticated; presigned URLs carry their own credentials.
    transfer: reqwest::Client,
    api_url: String,
    org_id: Uuid,
    default_store: String,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("api_url", &self.api_url)
            .field("org_id", &self.org_id)
            .field("default_store", &self.default_store)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Build an authenticated client. No request is made until first use.
    pub fn connect(api_url: &str, org_id: &str, api_token: &str) -> Result<Self> {
        Self::build(api_url, org_id, api_token, DEFAULT_TIMEOUT)
    }

    pub fn from_config(config: &nva_config::Config) -> Result<Self> {
        let org_id = config
            .org_id
            .as_deref()
            .ok_or_else(|| Error::Validation("no org_id configured".to_string()))?;
        let token = config.api_token.as_deref().unwrap_or_default();
        let client = Self::build(
            &config.api_url,
            org_id,
            token,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(client.with_default_store(config.default_store.clone()))
    }

    pub fn with_default_store(mut self, store: impl Into<String>) -> Self {
        self.default_store = store.into();
        self
    }

    fn build(api_url: &str, org_id: &str, api_token: &str, timeout: Duration) -> Result<Self> {
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(Error::Validation(format!(
                "API url must start with http:// or https://: {}",
                api_url
            )));
        }
        let org_id = Uuid::parse_str(org_id.trim())
            .map_err(|e| Error::Validation(format!("org id {:?} is not a UUID: {}", org_id, e)))?;

        let token = api_token.trim();
        if token.is_empty() {
            return Err(Error::Auth("API token is empty".to_string()));
        }
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::Auth("API token contains invalid header characters".to_string()))?;
        bearer.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .user_agent(format!("nva/{}", VERSION))
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {}", e)))?;
        let transfer = reqwest::Client::builder()
            .user_agent(format!("nva/{}", VERSION))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            transfer,
            api_url: api_url.to_string(),
            org_id,
            default_store: "default".to_string(),
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation_name: &str,
        operation: &str,
        variables: Value,
    ) -> Result<T> {
        let query = queries::document(operation);
        let body = GraphqlRequest {
            query: &query,
            operation_name,
            variables,
        };
        debug!(operation = operation_name, url = %self.api_url, "GraphQL request");

        let response = self
            .http
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth(format!("{} rejected the token ({})", self.api_url, status)));
        }
        if !status.is_success() {
            return Err(Error::Connection(format!(
                "HTTP {} from {} for {}",
                status, self.api_url, operation_name
            )));
        }

        let payload: GraphqlResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Connection(format!("malformed response to {}: {}", operation_name, e)))?;

        if let Some(first) = payload.errors.first() {
            if payload.errors.iter().any(|e| e.is_unauthenticated()) {
                return Err(Error::Auth(first.message.clone()));
            }
            let messages: Vec<&str> = payload.errors.iter().map(|e| e.message.as_str()).collect();
            warn!(operation = operation_name, errors = ?messages, "GraphQL errors");
            return Err(Error::Other(anyhow::anyhow!(
                "{} failed: {}",
                operation_name,
                messages.join("; ")
            )));
        }

        payload
            .data
            .ok_or_else(|| Error::Connection(format!("{} returned no data", operation_name)))
    }

    fn agent_id(&self, label: &str) -> Uuid {
        ids::agent_id(&self.org_id, label)
    }

    fn graph_id(&self, label: &str) -> Uuid {
        ids::graph_id(&self.org_id, label)
    }

    fn node_id(&self, scope: &GraphScope, label: &str) -> Uuid {
        ids::node_id(&self.org_id, &scope.agent_label, &scope.graph_label, label)
    }

    async fn upload_bytes(&self, url: &str, bytes: &[u8]) -> Result<String> {
        let response = self
            .transfer
            .put(url)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(Error::Connection(format!("upload failed with HTTP {}", response.status())));
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .ok_or_else(|| Error::Connection("upload response carried no ETag".to_string()))?;
        Ok(etag)
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::Connection(e.to_string())
}

#[derive(Deserialize)]
struct AgentsData {
    agents: Vec<WireAgent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddAgentsData {
    add_agents: AgentsData,
}

#[derive(Deserialize)]
struct FactorgraphsData {
    factorgraphs: Vec<WireLabel>,
}

#[derive(Deserialize)]
struct VariableLabelsData {
    variables: Vec<WireLabel>,
}

#[derive(Deserialize)]
struct FactorLabelsData {
    factors: Vec<WireLabel>,
}

#[derive(Deserialize)]
struct VariablesData {
    variables: Vec<WireVariable>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobEntriesPayload {
    blob_entries: Vec<WireBlobEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBlobEntriesData {
    add_blob_entries: BlobEntriesPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentEntriesData {
    agents: Vec<BlobEntriesPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatedEntries {
    blob_entries: Vec<IgnoredAny>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBlobEntriesData {
    update_blob_entries: UpdatedEntries,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteInfo {
    nodes_deleted: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBlobEntriesData {
    delete_blob_entries: DeleteInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUploadData {
    create_upload: WireUpload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteUploadData {
    complete_upload: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDownloadData {
    create_download: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBlobData {
    delete_blob: bool,
}

#[async_trait]
impl RemoteGraph for HttpClient {
    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let data: AgentsData = self
            .execute("GetAgents", queries::GET_AGENTS, json!({ "orgId": self.org_id }))
            .await?;
        data.agents.into_iter().map(WireAgent::into_agent).collect()
    }

    async fn add_agent(&self, label: &str) -> Result<Agent> {
        let data: AddAgentsData = self
            .execute(
                "AddAgent",
                queries::ADD_AGENT,
                json!({
                    "orgId": self.org_id,
                    "agentId": self.agent_id(label),
                    "label": label,
                    "version": VERSION,
                }),
            )
            .await?;
        data.add_agents
            .agents
            .into_iter()
            .next()
            .ok_or_else(|| Error::Other(anyhow::anyhow!("AddAgent returned no agent")))?
            .into_agent()
    }

    async fn list_graphs(&self) -> Result<Vec<String>> {
        let data: FactorgraphsData = self
            .execute("ListGraphs", queries::LIST_GRAPHS, json!({ "orgId": self.org_id }))
            .await?;
        Ok(data.factorgraphs.into_iter().map(|g| g.label).collect())
    }

    async fn add_graph(&self, label: &str, description: &str, metadata: &str) -> Result<()> {
        let _: Value = self
            .execute(
                "AddFactorgraph",
                queries::ADD_FACTORGRAPH,
                json!({
                    "orgId": self.org_id,
                    "fgId": self.graph_id(label),
                    "label": label,
                    "description": description,
                    "metadata": metadata,
                    "version": VERSION,
                }),
            )
            .await?;
        Ok(())
    }

    async fn connect_agent_graph(&self, agent_label: &str, graph_label: &str) -> Result<()> {
        let _: Value = self
            .execute(
                "ConnectAgentGraph",
                queries::CONNECT_AGENT_GRAPH,
                json!({
                    "agentId": self.agent_id(agent_label),
                    "fgId": self.graph_id(graph_label),
                }),
            )
            .await?;
        Ok(())
    }

    async fn list_variables(&self, scope: &GraphScope) -> Result<Vec<String>> {
        let data: VariableLabelsData = self
            .execute(
                "ListVariables",
                queries::LIST_VARIABLES,
                json!({
                    "agentId": self.agent_id(&scope.agent_label),
                    "fgId": self.graph_id(&scope.graph_label),
                }),
            )
            .await?;
        Ok(data.variables.into_iter().map(|v| v.label).collect())
    }

    async fn get_variable(&self, scope: &GraphScope, label: &str) -> Result<Option<Variable>> {
        let data: VariablesData = self
            .execute(
                "GetVariable",
                queries::GET_VARIABLE,
                json!({ "varId": self.node_id(scope, label) }),
            )
            .await?;
        data.variables
            .into_iter()
            .next()
            .map(WireVariable::into_variable)
            .transpose()
    }

    async fn add_variable(&self, scope: &GraphScope, variable: &Variable) -> Result<()> {
        let input = wire::variable_input(
            variable,
            self.node_id(scope, variable.label()),
            self.agent_id(&scope.agent_label),
            self.graph_id(&scope.graph_label),
            VERSION,
        )?;
        let _: Value = self
            .execute("AddVariable", queries::ADD_VARIABLE, json!({ "variable": input }))
            .await?;
        Ok(())
    }

    async fn list_factors(&self, scope: &GraphScope) -> Result<Vec<String>> {
        let data: FactorLabelsData = self
            .execute(
                "ListFactors",
                queries::LIST_FACTORS,
                json!({
                    "agentId": self.agent_id(&scope.agent_label),
                    "fgId": self.graph_id(&scope.graph_label),
                }),
            )
            .await?;
        Ok(data.factors.into_iter().map(|f| f.label).collect())
    }

    async fn add_factor(&self, scope: &GraphScope, factor: &Factor) -> Result<()> {
        let variable_ids: Vec<Uuid> = factor
            .variables()
            .iter()
            .map(|label| self.node_id(scope, label))
            .collect();
        let input = wire::factor_input(
            factor,
            self.node_id(scope, factor.label()),
            &variable_ids,
            self.agent_id(&scope.agent_label),
            self.graph_id(&scope.graph_label),
            VERSION,
        )?;
        let _: Value = self
            .execute("AddFactor", queries::ADD_FACTOR, json!({ "factor": input }))
            .await?;
        Ok(())
    }

    async fn add_blob_entry(&self, parent: &EntryParent, entry: &BlobEntry) -> Result<BlobEntry> {
        let input = match parent {
            EntryParent::Agent(agent_label) => wire::blob_entry_input(
                entry,
                ids::agent_entry_id(&self.org_id, agent_label, entry.label()),
                ("agent", self.agent_id(agent_label)),
            )?,
            EntryParent::Variable { scope, label } => wire::blob_entry_input(
                entry,
                ids::variable_entry_id(
                    &self.org_id,
                    &scope.agent_label,
                    &scope.graph_label,
                    label,
                    entry.label(),
                ),
                ("variable", self.node_id(scope, label)),
            )?,
        };
        let data: AddBlobEntriesData = self
            .execute(
                "AddBlobEntries",
                queries::ADD_BLOB_ENTRIES,
                json!({ "blobEntries": [input] }),
            )
            .await?;
        data.add_blob_entries
            .blob_entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("{} (no entry was created)", parent)))?
            .into_entry()
    }

    async fn list_agent_entries(
        &self,
        agent_label: &str,
        mime_type_contains: Option<&str>,
    ) -> Result<Vec<BlobEntry>> {
        let data: AgentEntriesData = self
            .execute(
                "GetAgentEntries",
                queries::GET_AGENT_ENTRIES,
                json!({
                    "agentId": self.agent_id(agent_label),
                    "mimeType": mime_type_contains.unwrap_or_default(),
                }),
            )
            .await?;
        let agent = data
            .agents
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("agent {:?}", agent_label)))?;
        agent
            .blob_entries
            .into_iter()
            .map(WireBlobEntry::into_entry)
            .collect()
    }

    async fn update_blob_entry_metadata(&self, entry_id: Uuid, metadata: &str) -> Result<()> {
        let data: UpdateBlobEntriesData = self
            .execute(
                "UpdateBlobentryMetadata",
                queries::UPDATE_BLOBENTRY_METADATA,
                json!({ "id": entry_id, "metadata": metadata }),
            )
            .await?;
        if data.update_blob_entries.blob_entries.is_empty() {
            return Err(Error::NotFound(format!("blob entry {}", entry_id)));
        }
        Ok(())
    }

    async fn delete_blob_entry(&self, entry_id: Uuid) -> Result<()> {
        let data: DeleteBlobEntriesData = self
            .execute(
                "DeleteBlobEntry",
                queries::DELETE_BLOB_ENTRY,
                json!({ "id": entry_id }),
            )
            .await?;
        if data.delete_blob_entries.nodes_deleted == 0 {
            return Err(Error::NotFound(format!("blob entry {}", entry_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBlobs for HttpClient {
    async fn put_blob(&self, store: &str, origin_id: Uuid, bytes: &[u8]) -> Result<BlobId> {
        let data: CreateUploadData = self
            .execute(
                "CreateUpload",
                queries::CREATE_UPLOAD,
                json!({
                    "store": store,
                    "originId": origin_id,
                    "size": bytes.len(),
                    "parts": 1,
                }),
            )
            .await?;
        let upload = data.create_upload;
        let blob_id = BlobId::parse(&upload.blob_id)?;
        let part = upload
            .parts
            .iter()
            .find(|p| p.part_number == 1)
            .ok_or_else(|| Error::Other(anyhow::anyhow!("CreateUpload returned no part 1")))?;

        let etag = self.upload_bytes(&part.url, bytes).await?;

        let data: CompleteUploadData = self
            .execute(
                "CompleteUpload",
                queries::COMPLETE_UPLOAD,
                json!({
                    "store": store,
                    "blobId": blob_id,
                    "uploadId": upload.upload_id,
                    "eTag": etag,
                }),
            )
            .await?;
        if !data.complete_upload {
            return Err(Error::Other(anyhow::anyhow!(
                "store {:?} did not complete upload of blob {}",
                store,
                blob_id
            )));
        }
        debug!(%blob_id, store, size = bytes.len(), "blob uploaded");
        Ok(blob_id)
    }

    async fn get_blob(&self, store: &str, blob_id: BlobId) -> Result<Option<Vec<u8>>> {
        let data: CreateDownloadData = self
            .execute(
                "CreateDownload",
                queries::CREATE_DOWNLOAD,
                json!({ "store": store, "blobId": blob_id }),
            )
            .await?;
        let Some(url) = data.create_download else {
            return Ok(None);
        };

        let response = self
            .transfer
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Connection(format!(
                "download of blob {} failed with HTTP {}",
                blob_id,
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(Some(bytes.to_vec()))
    }

    async fn delete_blob(&self, store: &str, blob_id: BlobId) -> Result<()> {
        let data: DeleteBlobData = self
            .execute(
                "DeleteBlob",
                queries::DELETE_BLOB,
                json!({ "store": store, "blobId": blob_id }),
            )
            .await?;
        if !data.delete_blob {
            return Err(Error::NotFound(format!("blob {} in store {:?}", blob_id, store)));
        }
        Ok(())
    }
}

impl Client for HttpClient {
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
