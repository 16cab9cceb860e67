//! Blob entries: the bridge between local origin ids and remote blob ids
//!
//! A `BlobEntry` is a small descriptor that tells a reader where a blob lives
//! and what it contains. The bytes themselves are never held here. An entry
//! does not have to reference bytes at all: a *blobless* entry carries the nil
//! blob id and is used for metadata or topology only.
//!
//! Many entries on different variables, agents and graphs may carry the same
//! blob id. That is how a single blob is shared. Identity is therefore
//! compared through [`BlobEntry::same_blob`], never through value equality,
//! since two entries for the same blob can legitimately differ in label,
//! origin id and metadata.

use crate::{Error, Labeled, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Base64 of `{}`, the metadata of an entry that has none.
pub const EMPTY_METADATA: &str = "e30=";

/// Identifier of a blob, assigned by the blob store.
///
/// The nil UUID is reserved for blobless entries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BlobId(Uuid);

impl BlobId {
    pub const NIL: BlobId = BlobId(Uuid::nil());

    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Fresh random id, for stores that mint identifiers client-side.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::Validation(format!("invalid blob id {:?}: {}", s, e)))
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for BlobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Lowercase hex SHA-256 digest, the hash format recorded on entries.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobEntry {
    /// Remotely assigned id of the entry itself (not of the blob).
    id: Option<Uuid>,
    blob_id: BlobId,
    /// Assigned locally when the entry is first created, regardless of network access.
    origin_id: Uuid,
    label: String,
    /// Hint of which store holds the blob. A blob may be copied to several.
    blobstore: String,
    hash: String,
    /// Context the entry was first created in, e.g. `user|robot|session|varlabel`.
    origin: String,
    size: Option<u64>,
    description: String,
    mime_type: String,
    metadata: String,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_timestamp: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    last_updated_timestamp: Option<OffsetDateTime>,
    version: String,
}

/// Raw inputs for [`BlobEntry::create_full`], typically straight from a host
/// binding or a form. Everything is validated on construction.
#[derive(Debug, Clone, Default)]
pub struct BlobEntryFields {
    pub blob_id: String,
    pub label: String,
    pub blobstore: String,
    pub hash: String,
    /// Generated when absent.
    pub origin_id: Option<String>,
    pub size: Option<i64>,
    pub description: String,
    pub mime_type: String,
    /// Defaults to [`EMPTY_METADATA`] when empty.
    pub metadata: String,
    /// RFC 3339; defaults to now.
    pub timestamp: Option<String>,
}

impl BlobEntry {
    /// Minimal blobless entry with a fresh origin id.
    pub fn create(label: &str, mime_type: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: None,
            blob_id: BlobId::NIL,
            origin_id: Uuid::new_v4(),
            label: label.to_string(),
            blobstore: String::new(),
            hash: String::new(),
            origin: String::new(),
            size: None,
            description: String::new(),
            mime_type: mime_type.to_string(),
            metadata: EMPTY_METADATA.to_string(),
            timestamp: now,
            created_timestamp: Some(now),
            last_updated_timestamp: Some(now),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn create_full(fields: BlobEntryFields) -> Result<Self> {
        let blob_id = BlobId::parse(&fields.blob_id)?;

        let size = match fields.size {
            Some(sz) if sz < 0 => {
                return Err(Error::Validation(format!(
                    "blob entry {:?} has negative size {}",
                    fields.label, sz
                )));
            }
            Some(sz) => Some(sz as u64),
            None => None,
        };

        let origin_id = match fields.origin_id.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => Uuid::parse_str(s)
                .map_err(|e| Error::Validation(format!("invalid origin id {:?}: {}", s, e)))?,
            _ => Uuid::new_v4(),
        };

        let timestamp = match fields.timestamp.as_deref() {
            Some(ts) => parse_timestamp(ts)?,
            None => OffsetDateTime::now_utc(),
        };

        let metadata = if fields.metadata.is_empty() {
            EMPTY_METADATA.to_string()
        } else {
            fields.metadata
        };

        let mut entry = Self::create(&fields.label, &fields.mime_type);
        entry.blob_id = blob_id;
        entry.origin_id = origin_id;
        entry.blobstore = fields.blobstore;
        entry.hash = fields.hash;
        entry.size = size;
        entry.description = fields.description;
        entry.metadata = metadata;
        entry.timestamp = timestamp;
        Ok(entry)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Stamp the id the remote store gave this entry.
    pub fn with_entry_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Bind a blobless entry to the blob a store just created for it.
    ///
    /// Fails if the entry already references a blob: a blob id is assigned
    /// once and never rewritten.
    pub fn with_assigned_blob(
        mut self,
        blob_id: BlobId,
        blobstore: &str,
        size: u64,
        hash: String,
    ) -> Result<Self> {
        if blob_id.is_nil() {
            return Err(Error::Validation(format!(
                "cannot assign the nil blob id to entry {:?}",
                self.label
            )));
        }
        if !self.blob_id.is_nil() {
            return Err(Error::Validation(format!(
                "entry {:?} (origin {}) already references blob {}",
                self.label, self.origin_id, self.blob_id
            )));
        }
        self.blob_id = blob_id;
        self.blobstore = blobstore.to_string();
        self.size = Some(size);
        self.hash = hash;
        self.last_updated_timestamp = Some(OffsetDateTime::now_utc());
        Ok(self)
    }

    /// Replace the functional metadata, e.g. after a remote metadata update.
    pub fn set_metadata(&mut self, metadata: impl Into<String>) {
        self.metadata = metadata.into();
        self.last_updated_timestamp = Some(OffsetDateTime::now_utc());
    }

    /// Both entries reference the same bytes.
    ///
    /// Blobless entries never reference the same object as anything else.
    pub fn same_blob(&self, other: &BlobEntry) -> bool {
        !self.blob_id.is_nil() && self.blob_id == other.blob_id
    }

    pub fn is_blobless(&self) -> bool {
        self.blob_id.is_nil()
    }

    /// Check fetched bytes against the recorded hash, if one was recorded.
    pub fn verify(&self, bytes: &[u8]) -> Result<()> {
        if self.hash.is_empty() {
            return Ok(());
        }
        let actual = content_hash(bytes);
        if !actual.eq_ignore_ascii_case(self.hash.trim()) {
            return Err(Error::Integrity {
                blob_id: self.blob_id.to_string(),
                expected: self.hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn blob_id(&self) -> BlobId {
        self.blob_id
    }

    pub fn origin_id(&self) -> Uuid {
        self.origin_id
    }

    pub fn blobstore(&self) -> &str {
        &self.blobstore
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn created_timestamp(&self) -> Option<OffsetDateTime> {
        self.created_timestamp
    }

    pub fn last_updated_timestamp(&self) -> Option<OffsetDateTime> {
        self.last_updated_timestamp
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Labeled for BlobEntry {
    fn label(&self) -> &str {
        &self.label
    }
}

/// Parse an RFC 3339 timestamp, also accepting the `YYYY-MM-DD HH:MM:SS UTC`
/// form some servers emit.
pub fn parse_timestamp(ts: &str) -> Result<OffsetDateTime> {
    let trimmed = ts.trim();
    let normalized = match trimmed.strip_suffix(" UTC") {
        Some(rest) => format!("{}Z", rest.replacen(' ', "T", 1)),
        None => trimmed.to_string(),
    };
    OffsetDateTime::parse(&normalized, &Rfc3339)
        .map_err(|e| Error::Validation(format!("invalid timestamp {:?}: {}", ts, e)))
}
