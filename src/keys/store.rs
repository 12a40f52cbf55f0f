use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use super::models::{CredentialRecord, NewCredential};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("owner {0} already holds an access key")]
    DuplicateOwner(i64),
    #[error("credential database io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed credential database: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Durable mapping from internal id to provisioned credential. Implementors
/// must keep insertion order in `list_all` and allocate ids monotonically.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<CredentialRecord>, StoreError>;

    async fn find_by_owner(&self, owner: i64) -> Result<Option<CredentialRecord>, StoreError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<CredentialRecord>, StoreError>;

    /// Assigns the next internal id and persists the whole collection.
    /// `enforce_unique_owner` applies the one-key-per-owner rule; privileged
    /// flows pass `false`.
    async fn insert(
        &self,
        candidate: NewCredential,
        enforce_unique_owner: bool,
    ) -> Result<CredentialRecord, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    users: Vec<CredentialRecord>,
}

/// Whole-file JSON store: `{ "users": [...] }`, created empty on first use.
/// Every insert is a read-modify-write of the full document, serialized
/// through `write_lock` so concurrent requesters cannot lose updates.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Document, StoreError> {
        if !tokio::fs::try_exists(&self.path).await? {
            self.write(&Document::default()).await?;
            return Ok(Document::default());
        }
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write(&self, document: &Document) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn list_all(&self) -> Result<Vec<CredentialRecord>, StoreError> {
        Ok(self.load().await?.users)
    }

    async fn find_by_owner(&self, owner: i64) -> Result<Option<CredentialRecord>, StoreError> {
        let document = self.load().await?;
        Ok(document
            .users
            .into_iter()
            .find(|record| record.owner_identity == owner))
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<CredentialRecord>, StoreError> {
        let document = self.load().await?;
        Ok(document
            .users
            .into_iter()
            .find(|record| record.internal_id == id))
    }

    async fn insert(
        &self,
        candidate: NewCredential,
        enforce_unique_owner: bool,
    ) -> Result<CredentialRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;

        if enforce_unique_owner
            && document
                .users
                .iter()
                .any(|record| record.owner_identity == candidate.owner_identity)
        {
            return Err(StoreError::DuplicateOwner(candidate.owner_identity));
        }

        // max + 1 keeps ids unique even if the collection were ever compacted.
        let internal_id = document
            .users
            .iter()
            .map(|record| record.internal_id)
            .max()
            .unwrap_or(0)
            + 1;

        let record = CredentialRecord {
            internal_id,
            owner_identity: candidate.owner_identity,
            label: candidate.label,
            cipher_suite: candidate.cipher_suite,
            credential_material: candidate.credential_material,
        };
        document.users.push(record.clone());
        self.write(&document).await?;
        Ok(record)
    }
}
