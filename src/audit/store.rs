use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info, warn};

use super::error::{AuditError, Result};
use super::partitions::{decode_record_key, encode_record_key, is_valid_collection_name};
use super::record::{AuditFilter, AuditPatch, AuditRecord, RecordId};

/// Asynchronous gateway over one collection of audit records.
///
/// Every operation may fail; failures come back as `Err` values and are
/// never retried here.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a new record and return the id that addresses it
    async fn insert(&self, record: AuditRecord) -> Result<RecordId>;

    /// Merge `patch` into the record with `id`. Unknown ids are a no-op.
    async fn update(&self, id: &RecordId, patch: AuditPatch) -> Result<()>;

    /// Delete every record matching `filter`, returning how many were removed
    async fn delete_many(&self, filter: AuditFilter) -> Result<usize>;
}

/// Opens audit collections by name
pub trait AuditBackend: Send + Sync {
    fn collection(&self, name: &str) -> Result<Arc<dyn AuditStore>>;
}

/// Fjall keyspace holding one partition per audit collection
#[derive(Clone)]
pub struct FjallBackend {
    keyspace: Keyspace,
}

impl FjallBackend {
    /// Open or create a Fjall keyspace at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audit keyspace at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        Ok(Self { keyspace })
    }

    /// Open (or create) the named collection
    pub fn open_collection(&self, name: &str) -> Result<FjallAuditStore> {
        if !is_valid_collection_name(name) {
            return Err(AuditError::InvalidCollection(name.to_string()));
        }

        let records = self
            .keyspace
            .open_partition(name, PartitionCreateOptions::default())?;
        debug!(collection = name, "Audit collection opened");

        Ok(FjallAuditStore {
            keyspace: self.keyspace.clone(),
            collection: name.to_string(),
            records,
        })
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

impl AuditBackend for FjallBackend {
    fn collection(&self, name: &str) -> Result<Arc<dyn AuditStore>> {
        Ok(Arc::new(self.open_collection(name)?))
    }
}

/// Fjall-backed audit collection. Blocking Fjall calls run on the
/// blocking thread pool so callers on the scheduler never stall.
#[derive(Clone)]
pub struct FjallAuditStore {
    keyspace: Keyspace,
    collection: String,
    records: PartitionHandle,
}

impl FjallAuditStore {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Get a record by id
    pub fn get(&self, id: &RecordId) -> Result<Option<AuditRecord>> {
        match self.records.get(encode_record_key(id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// All records in insertion order
    pub fn list(&self) -> Result<Vec<(RecordId, AuditRecord)>> {
        let mut records = Vec::new();
        for item in self.records.iter() {
            let (key, value) = item?;
            let id = decode_record_key(&key)
                .ok_or_else(|| AuditError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))?;
            records.push((id, serde_json::from_slice(&value)?));
        }
        Ok(records)
    }

    fn insert_blocking(&self, record: &AuditRecord) -> Result<RecordId> {
        let id = RecordId::new();
        let value = serde_json::to_vec(record)?;
        self.records.insert(encode_record_key(&id), value)?;
        debug!(collection = %self.collection, %id, job = %record.name, "Inserted audit record");
        Ok(id)
    }

    fn update_blocking(&self, id: &RecordId, patch: &AuditPatch) -> Result<()> {
        let key = encode_record_key(id);
        let Some(value) = self.records.get(&key)? else {
            debug!(collection = %self.collection, %id, "No audit record to update");
            return Ok(());
        };

        let mut record: AuditRecord = serde_json::from_slice(&value)?;
        if !record.apply(patch) {
            warn!(collection = %self.collection, %id, "Audit record already finalized, patch ignored");
            return Ok(());
        }

        self.records.insert(key, serde_json::to_vec(&record)?)?;
        debug!(collection = %self.collection, %id, status = ?record.status, "Updated audit record");
        Ok(())
    }

    fn delete_blocking(&self, filter: AuditFilter) -> Result<usize> {
        let mut expired = Vec::new();
        for item in self.records.iter() {
            let (key, value) = item?;
            match serde_json::from_slice::<AuditRecord>(&value) {
                Ok(record) if filter.matches(&record) => expired.push(key),
                Ok(_) => {}
                Err(e) => warn!(
                    collection = %self.collection,
                    key = %String::from_utf8_lossy(&key),
                    error = %e,
                    "Skipping undecodable audit record"
                ),
            }
        }

        for key in &expired {
            self.records.remove(key.clone())?;
        }

        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        debug!(collection = %self.collection, deleted = expired.len(), "Deleted audit records");
        Ok(expired.len())
    }
}

#[async_trait]
impl AuditStore for FjallAuditStore {
    async fn insert(&self, record: AuditRecord) -> Result<RecordId> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.insert_blocking(&record)).await?
    }

    async fn update(&self, id: &RecordId, patch: AuditPatch) -> Result<()> {
        let store = self.clone();
        let id = *id;
        tokio::task::spawn_blocking(move || store.update_blocking(&id, &patch)).await?
    }

    async fn delete_many(&self, filter: AuditFilter) -> Result<usize> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.delete_blocking(filter)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::record::AuditStatus;
    use chrono::{TimeDelta, Utc};
    use tempfile::TempDir;

    fn create_test_store() -> (FjallAuditStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let backend = FjallBackend::open(temp_dir.path().join("audit")).unwrap();
        let store = backend.open_collection("CRON_LOGS").unwrap();
        (store, temp_dir)
    }

    fn finished_record(name: &str, finished_ago: TimeDelta) -> AuditRecord {
        let finish = Utc::now() - finished_ago;
        let mut record = AuditRecord::pending(name, finish, None);
        record.apply(&AuditPatch::completion(finish, 10, None));
        record
    }

    #[test]
    fn test_open_rejects_invalid_collection() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FjallBackend::open(temp_dir.path().join("audit")).unwrap();
        assert!(matches!(
            backend.open_collection("bad name"),
            Err(AuditError::InvalidCollection(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (store, _temp) = create_test_store();
        let record = AuditRecord::pending("report", Utc::now(), None);

        let id = store.insert(record.clone()).await.unwrap();
        assert_eq!(store.get(&id).unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_insert_ids_are_unique() {
        let (store, _temp) = create_test_store();
        let record = AuditRecord::pending("report", Utc::now(), None);

        let first = store.insert(record.clone()).await.unwrap();
        let second = store.insert(record).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let (store, _temp) = create_test_store();
        let start = Utc::now();
        let id = store
            .insert(AuditRecord::pending("report", start, None))
            .await
            .unwrap();

        store
            .update(&id, AuditPatch::completion(Utc::now(), 42, None))
            .await
            .unwrap();

        let updated = store.get(&id).unwrap().unwrap();
        assert_eq!(updated.name, "report");
        assert_eq!(updated.start_time, start);
        assert_eq!(updated.status, AuditStatus::Success);
        assert_eq!(updated.execution_duration_millis, Some(42));
        assert!(updated.finish_time.is_some());
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_noop() {
        let (store, _temp) = create_test_store();
        store
            .update(&RecordId::new(), AuditPatch::completion(Utc::now(), 1, None))
            .await
            .unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_many_respects_cutoff() {
        let (store, _temp) = create_test_store();
        let old = store
            .insert(finished_record("report", TimeDelta::days(10)))
            .await
            .unwrap();
        let recent = store
            .insert(finished_record("report", TimeDelta::days(1)))
            .await
            .unwrap();
        let pending = store
            .insert(AuditRecord::pending("report", Utc::now() - TimeDelta::days(20), None))
            .await
            .unwrap();

        let cutoff = Utc::now() - TimeDelta::days(7);
        let deleted = store
            .delete_many(AuditFilter::FinishedBefore(cutoff))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store.get(&old).unwrap().is_none());
        assert!(store.get(&recent).unwrap().is_some());
        assert!(store.get(&pending).unwrap().is_some());
    }
}
