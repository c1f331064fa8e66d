use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::error::{AuditError, Result};
use super::partitions::is_valid_collection_name;
use super::record::{AuditFilter, AuditPatch, AuditRecord, RecordId};
use super::store::{AuditBackend, AuditStore};

/// In-process audit collection for tests and disk-less deployments.
///
/// Faults and latency can be injected to exercise the supervisor's
/// failure paths.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: Mutex<BTreeMap<RecordId, AuditRecord>>,
    insert_delay: Mutex<Option<Duration>>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
    insert_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Delay every insert, simulating a slow store round-trip
    pub fn set_insert_delay(&self, delay: Option<Duration>) {
        *self.insert_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Place a record directly, bypassing call accounting and faults
    pub fn seed(&self, record: AuditRecord) -> RecordId {
        let id = RecordId::new();
        self.lock_records().insert(id, record);
        id
    }

    pub fn get(&self, id: &RecordId) -> Option<AuditRecord> {
        self.lock_records().get(id).cloned()
    }

    pub fn list(&self) -> Vec<(RecordId, AuditRecord)> {
        self.lock_records()
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, BTreeMap<RecordId, AuditRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, record: AuditRecord) -> Result<RecordId> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.insert_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("insert rejected".to_string()));
        }

        let id = RecordId::new();
        self.lock_records().insert(id, record);
        Ok(id)
    }

    async fn update(&self, id: &RecordId, patch: AuditPatch) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("update rejected".to_string()));
        }

        if let Some(record) = self.lock_records().get_mut(id) {
            record.apply(&patch);
        }
        Ok(())
    }

    async fn delete_many(&self, filter: AuditFilter) -> Result<usize> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("delete rejected".to_string()));
        }

        let mut records = self.lock_records();
        let before = records.len();
        records.retain(|_, record| !filter.matches(record));
        Ok(before - records.len())
    }
}

/// Named in-memory collections; the same name always yields the same store
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, Arc<MemoryAuditStore>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_collection(&self, name: &str) -> Result<Arc<MemoryAuditStore>> {
        if !is_valid_collection_name(name) {
            return Err(AuditError::InvalidCollection(name.to_string()));
        }

        let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(collections.entry(name.to_string()).or_default()))
    }
}

impl AuditBackend for MemoryBackend {
    fn collection(&self, name: &str) -> Result<Arc<dyn AuditStore>> {
        let store: Arc<dyn AuditStore> = self.open_collection(name)?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};

    #[tokio::test]
    async fn test_insert_update_roundtrip() {
        let store = MemoryAuditStore::new();
        let id = store
            .insert(AuditRecord::pending("job", Utc::now(), None))
            .await
            .unwrap();

        store
            .update(&id, AuditPatch::completion(Utc::now(), 7, Some("boom".into())))
            .await
            .unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.execution_duration_millis, Some(7));
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert_eq!(store.insert_calls(), 1);
        assert_eq!(store.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryAuditStore::new();
        store.set_fail_inserts(true);
        assert!(store
            .insert(AuditRecord::pending("job", Utc::now(), None))
            .await
            .is_err());
        assert!(store.is_empty());

        store.set_fail_deletes(true);
        assert!(store
            .delete_many(AuditFilter::FinishedBefore(Utc::now()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_many_counts() {
        let store = MemoryAuditStore::new();
        let finish = Utc::now() - TimeDelta::hours(1);
        let mut done = AuditRecord::pending("job", finish, None);
        done.apply(&AuditPatch::completion(finish, 1, None));
        store.seed(done.clone());
        store.seed(done);
        store.seed(AuditRecord::pending("job", finish, None));

        let deleted = store
            .delete_many(AuditFilter::FinishedBefore(Utc::now()))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_backend_shares_collections_by_name() {
        let backend = MemoryBackend::new();
        let a = backend.open_collection("CRON_LOGS").unwrap();
        let b = backend.open_collection("CRON_LOGS").unwrap();
        a.seed(AuditRecord::pending("job", Utc::now(), None));
        assert_eq!(b.len(), 1);
        assert!(backend.open_collection("").is_err());
    }
}
