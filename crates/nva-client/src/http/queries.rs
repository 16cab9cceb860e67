//! GraphQL documents sent by [`super::HttpClient`]

pub const AGENT_FIELDS: &str = "
fragment AgentFields on Agent {
  id
  label
  description
  createdTimestamp
  lastUpdatedTimestamp
}";

pub const BLOB_ENTRY_FIELDS: &str = "
fragment BlobEntryFields on BlobEntry {
  id
  blobId
  originId
  label
  blobstore
  hash
  origin
  size
  description
  mimeType
  metadata
  timestamp
  _version
}";

pub const VARIABLE_FIELDS: &str = "
fragment VariableFields on Variable {
  id
  label
  variableType
  tags
  timestamp
  nstime
  metadata
  solvable
  ppes {
    solveKey
    suggested
    max
    mean
  }
  blobEntries {
    ...BlobEntryFields
  }
}";

pub const GET_AGENTS: &str = "
query GetAgents($orgId: ID!) {
  agents(where: { org: { id: $orgId } }) {
    ...AgentFields
  }
}";

pub const ADD_AGENT: &str = "
mutation AddAgent($orgId: ID!, $agentId: ID!, $label: String!, $version: String!) {
  addAgents(
    input: {
      id: $agentId
      label: $label
      _version: $version
      org: { connect: { where: { node: { id: $orgId } } } }
    }
  ) {
    agents {
      ...AgentFields
    }
  }
}";

pub const LIST_GRAPHS: &str = "
query ListGraphs($orgId: ID!) {
  factorgraphs(where: { org: { id: $orgId } }) {
    label
  }
}";

pub const ADD_FACTORGRAPH: &str = "
mutation AddFactorgraph(
  $orgId: ID!
  $fgId: ID!
  $label: String!
  $description: String!
  $metadata: Metadata!
  $version: String!
) {
  addFactorgraphs(
    input: {
      id: $fgId
      label: $label
      description: $description
      metadata: $metadata
      _version: $version
      org: { connect: { where: { node: { id: $orgId } } } }
    }
  ) {
    factorgraphs {
      id
    }
  }
}";

pub const CONNECT_AGENT_GRAPH: &str = "
mutation ConnectAgentGraph($agentId: ID!, $fgId: ID!) {
  updateAgents(
    where: { id: $agentId }
    connect: { fgs: { where: { node: { id: $fgId } } } }
  ) {
    agents {
      id
    }
  }
}";

pub const LIST_VARIABLES: &str = "
query ListVariables($agentId: ID!, $fgId: ID!) {
  variables(where: { agent: { id: $agentId }, fg: { id: $fgId } }) {
    label
  }
}";

pub const GET_VARIABLE: &str = "
query GetVariable($varId: ID!) {
  variables(where: { id: $varId }) {
    ...VariableFields
  }
}";

pub const ADD_VARIABLE: &str = "
mutation AddVariable($variable: VariableCreateInput!) {
  addVariables(input: [$variable]) {
    variables {
      id
    }
  }
}";

pub const LIST_FACTORS: &str = "
query ListFactors($agentId: ID!, $fgId: ID!) {
  factors(where: { agent: { id: $agentId }, fg: { id: $fgId } }) {
    label
  }
}";

pub const ADD_FACTOR: &str = "
mutation AddFactor($factor: FactorCreateInput!) {
  addFactors(input: [$factor]) {
    factors {
      id
    }
  }
}";

pub const ADD_BLOB_ENTRIES: &str = "
mutation AddBlobEntries($blobEntries: [BlobEntryCreateInput!]!) {
  addBlobEntries(input: $blobEntries) {
    blobEntries {
      ...BlobEntryFields
    }
  }
}";

pub const GET_AGENT_ENTRIES: &str = "
query GetAgentEntries($agentId: ID!, $mimeType: String!) {
  agents(where: { id: $agentId }) {
    blobEntries(where: { mimeType_CONTAINS: $mimeType }) {
      ...BlobEntryFields
    }
  }
}";

pub const UPDATE_BLOBENTRY_METADATA: &str = "
mutation UpdateBlobentryMetadata($id: ID!, $metadata: Metadata!) {
  updateBlobEntries(where: { id: $id }, update: { metadata: $metadata }) {
    blobEntries {
      id
    }
  }
}";

pub const DELETE_BLOB_ENTRY: &str = "
mutation DeleteBlobEntry($id: ID!) {
  deleteBlobEntries(where: { id: $id }) {
    nodesDeleted
  }
}";

pub const CREATE_UPLOAD: &str = "
mutation CreateUpload($store: String!, $originId: ID!, $size: BigInt!, $parts: Int!) {
  createUpload(blobstore: $store, originId: $originId, size: $size, parts: $parts) {
    uploadId
    blobId
    parts {
      partNumber
      url
    }
  }
}";

pub const COMPLETE_UPLOAD: &str = "
mutation CompleteUpload($store: String!, $blobId: ID!, $uploadId: ID!, $eTag: String!) {
  completeUpload(
    blobstore: $store
    blobId: $blobId
    completedUpload: { uploadId: $uploadId, parts: [{ partNumber: 1, eTag: $eTag }] }
  )
}";

pub const CREATE_DOWNLOAD: &str = "
mutation CreateDownload($store: String!, $blobId: ID!) {
  createDownload(blobstore: $store, blobId: $blobId)
}";

pub const DELETE_BLOB: &str = "
mutation DeleteBlob($store: String!, $blobId: ID!) {
  deleteBlob(blobstore: $store, blobId: $blobId)
}";

/// Append the fragments a document references.
pub fn document(operation: &str) -> String {
    let mut doc = operation.to_string();
    if operation.contains("...VariableFields") {
        doc.push_str(VARIABLE_FIELDS);
    }
    if operation.contains("...BlobEntryFields") || operation.contains("...VariableFields") {
        doc.push_str(BLOB_ENTRY_FIELDS);
    }
    if operation.contains("...AgentFields") {
        doc.push_str(AGENT_FIELDS);
    }
    doc
}
