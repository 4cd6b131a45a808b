//! In-memory enrollment store and audit log.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::store::{AuditLog, AuditSink, EnrollmentStore, SinkError, StoreError};
use crate::types::{AuditEntry, Enrollment};

/// Enrollment store and audit log held in process memory.
///
/// Enrollments are kept ordered by `id_number`, so `list_all` is stable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    enrollments: Mutex<BTreeMap<String, Enrollment>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `enrollments`. Later duplicates replace
    /// earlier ones.
    pub fn with_enrollments(enrollments: impl IntoIterator<Item = Enrollment>) -> Self {
        let map = enrollments
            .into_iter()
            .map(|e| (e.id_number.clone(), e))
            .collect();
        Self {
            enrollments: Mutex::new(map),
            audit: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every audit entry in append order.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        lock(&self.audit).clone()
    }
}

// Every mutation is a single insert, remove or push; a poisoned lock holds
// consistent data.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EnrollmentStore for MemoryStore {
    async fn list_all(&self) -> Result<Vec<Enrollment>, StoreError> {
        Ok(lock(&self.enrollments).values().cloned().collect())
    }

    async fn get(&self, id_number: &str) -> Result<Option<Enrollment>, StoreError> {
        Ok(lock(&self.enrollments).get(id_number).cloned())
    }

    async fn insert(&self, enrollment: Enrollment) -> Result<(), StoreError> {
        let mut map = lock(&self.enrollments);
        if map.contains_key(&enrollment.id_number) {
            return Err(StoreError::Duplicate(enrollment.id_number));
        }
        map.insert(enrollment.id_number.clone(), enrollment);
        Ok(())
    }

    async fn delete(&self, id_number: &str) -> Result<(), StoreError> {
        match lock(&self.enrollments).remove(id_number) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id_number.to_string())),
        }
    }
}

impl AuditSink for MemoryStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), SinkError> {
        lock(&self.audit).push(entry);
        Ok(())
    }
}

impl AuditLog for MemoryStore {
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, SinkError> {
        Ok(lock(&self.audit).iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Descriptor, Role, Status};
    use chrono::{Duration, Utc};

    fn enrollment(id: &str) -> Enrollment {
        Enrollment {
            id_number: id.into(),
            name: id.to_lowercase(),
            role: Role::Lecturer,
            status: Status::Active,
            descriptor: Descriptor::from_stored(vec![0.0, 1.0]),
            visit_purpose: None,
            valid_until: None,
            email: None,
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_list_all_is_ordered_by_id() {
        let store = MemoryStore::with_enrollments([enrollment("S3"), enrollment("S1"), enrollment("S2")]);
        let ids: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id_number)
            .collect();
        assert_eq!(ids, ["S1", "S2", "S3"]);
    }

    #[tokio::test]
    async fn test_insert_duplicate_rejected() {
        let store = MemoryStore::new();
        store.insert(enrollment("S1")).await.unwrap();
        let err = store.insert(enrollment("S1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == "S1"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryStore::with_enrollments([enrollment("S1")]);
        store.delete("S1").await.unwrap();
        assert!(store.get("S1").await.unwrap().is_none());
        assert!(matches!(
            store.delete("S1").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        for i in 0..3 {
            let mut entry = AuditEntry::unknown_denied(t0 + Duration::seconds(i));
            entry.name = format!("entry-{i}");
            store.append(entry).await.unwrap();
        }
        let recent = store.recent(2).await.unwrap();
        let names: Vec<_> = recent.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["entry-2", "entry-1"]);
        assert_eq!(store.audit_entries().len(), 3);
    }
}
