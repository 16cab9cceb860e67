//! Blob store handle

use crate::ledger;
use nva_client::Client;
use nva_core::{content_hash, BlobEntry, BlobId, Error, Labeled, Result};
use tracing::{debug, info, warn};

/// A named store of raw bytes, borrowed from a [`Client`].
///
/// Holds no bytes and no cached state: every call is a request keyed by the
/// store label, so handles over the same client can be used concurrently.
#[derive(Clone)]
pub struct BlobStore<'c> {
    client: &'c dyn Client,
    label: String,
}

impl std::fmt::Debug for BlobStore<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("label", &self.label)
            .field("api_url", &self.client.api_url())
            .finish()
    }
}

impl<'c> BlobStore<'c> {
    /// Build a handle. Existence of the store is only checked on first use.
    pub fn open(client: &'c dyn Client, label: &str) -> Result<Self> {
        if label.trim().is_empty() {
            return Err(Error::Validation("blob store label cannot be empty".to_string()));
        }
        Ok(Self {
            client,
            label: label.to_string(),
        })
    }

    /// The client's default store.
    pub fn default_for(client: &'c dyn Client) -> Result<Self> {
        Self::open(client, client.default_store())
    }

    /// Fetch the bytes an entry references and check them against its hash.
    pub async fn resolve(&self, entry: &BlobEntry) -> Result<Vec<u8>> {
        if entry.is_blobless() {
            return Err(Error::NotFound(format!(
                "entry {:?} is blobless and references no bytes",
                entry.label()
            )));
        }
        if !entry.blobstore().is_empty() && entry.blobstore() != self.label {
            warn!(
                entry = entry.label(),
                entry_store = entry.blobstore(),
                store = %self.label,
                "resolving entry against a different store than it names"
            );
        }

        let bytes = self
            .client
            .get_blob(&self.label, entry.blob_id())
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "blob {} is not in store {:?}",
                    entry.blob_id(),
                    self.label
                ))
            })?;

        if let Err(e) = entry.verify(&bytes) {
            warn!(blob_id = %entry.blob_id(), store = %self.label, "hash mismatch on resolve");
            return Err(e);
        }
        debug!(blob_id = %entry.blob_id(), size = bytes.len(), "blob resolved");
        Ok(bytes)
    }

    /// Raw fetch by id. `Ok(None)` when the store has no such blob.
    pub async fn fetch(&self, blob_id: BlobId) -> Result<Option<Vec<u8>>> {
        if blob_id.is_nil() {
            return Ok(None);
        }
        self.client.get_blob(&self.label, blob_id).await
    }

    /// Store `bytes` for a blobless entry and return the entry bound to the
    /// new blob.
    ///
    /// The entry's origin id is the idempotency key: repeated or concurrent
    /// uploads of one origin yield the same blob id and a single remote put.
    pub async fn upload(&self, entry: &BlobEntry, bytes: &[u8]) -> Result<BlobEntry> {
        if !entry.is_blobless() {
            return Err(Error::Validation(format!(
                "entry {:?} already references blob {}",
                entry.label(),
                entry.blob_id()
            )));
        }
        let hash = content_hash(bytes);
        if !entry.hash().is_empty() && !entry.hash().trim().eq_ignore_ascii_case(&hash) {
            return Err(Error::Integrity {
                blob_id: BlobId::NIL.to_string(),
                expected: entry.hash().to_string(),
                actual: hash,
            });
        }

        let origin_id = entry.origin_id();
        let size = bytes.len() as u64;
        let recorded = ledger::assign_once(self.client.api_url(), &self.label, origin_id, || async {
            let id = self.client.put_blob(&self.label, origin_id, bytes).await?;
            if id.is_nil() {
                return Err(Error::Other(anyhow::anyhow!(
                    "store {:?} assigned the nil blob id",
                    self.label
                )));
            }
            info!(%id, %origin_id, store = %self.label, size, "blob uploaded");
            Ok(ledger::Recorded {
                blob_id: id,
                hash: hash.clone(),
                size,
            })
        })
        .await?;

        // One origin, one content. Different bytes need a new entry.
        if recorded.hash != hash || recorded.size != size {
            warn!(
                %origin_id,
                blob_id = %recorded.blob_id,
                store = %self.label,
                "origin re-uploaded with different bytes"
            );
            return Err(Error::Integrity {
                blob_id: recorded.blob_id.to_string(),
                expected: recorded.hash,
                actual: hash,
            });
        }

        entry
            .clone()
            .with_assigned_blob(recorded.blob_id, &self.label, size, hash)
    }

    /// Remove a blob. Entries that reference it are left untouched.
    pub async fn delete(&self, blob_id: BlobId) -> Result<()> {
        if blob_id.is_nil() {
            return Err(Error::Validation("cannot delete the nil blob".to_string()));
        }
        self.client.delete_blob(&self.label, blob_id).await?;
        ledger::forget(self.client.api_url(), &self.label, blob_id);
        info!(%blob_id, store = %self.label, "blob deleted");
        Ok(())
    }
}

impl Labeled for BlobStore<'_> {
    fn label(&self) -> &str {
        &self.label
    }
}
