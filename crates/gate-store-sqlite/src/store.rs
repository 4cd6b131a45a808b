//! [`SqliteStore`] — the SQLite implementation of the enrollment store and
//! the access log.

use std::path::Path;

use gate_core::{
    AuditEntry, AuditLog, AuditSink, Enrollment, EnrollmentStore, SinkError, StoreError,
};
use rusqlite::OptionalExtension as _;

use crate::{
    encode::{RawAuditEntry, RawEnrollment, ENROLLMENT_COLUMNS},
    schema::SCHEMA,
    Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Enrollment store and audit log backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let conn = tokio_rusqlite::Connection::open(&path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        tracing::debug!(path = %path.display(), "opened enrollment database");
        Ok(store)
    }

    /// Open an in-memory store — useful for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Rows that fail to decode are logged and left out.
    async fn select_all(&self) -> Result<Vec<Enrollment>> {
        let raws: Vec<RawEnrollment> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENROLLMENT_COLUMNS} FROM enrollments ORDER BY id_number"
                ))?;
                let rows = stmt
                    .query_map([], RawEnrollment::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        let population = raws
            .into_iter()
            .filter_map(|raw| {
                let id_number = raw.id_number.clone();
                match raw.decode() {
                    Ok(enrollment) => Some(enrollment),
                    Err(err) => {
                        tracing::warn!(
                            %id_number,
                            error = %err,
                            "skipping undecodable enrollment row"
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(population)
    }

    async fn select_one(&self, id_number: String) -> Result<Option<Enrollment>> {
        let raw: Option<RawEnrollment> = self
            .conn
            .call(move |conn| {
                let raw = conn
                    .query_row(
                        &format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id_number = ?1"),
                        rusqlite::params![id_number],
                        RawEnrollment::from_row,
                    )
                    .optional()?;
                Ok(raw)
            })
            .await?;
        raw.map(RawEnrollment::decode).transpose()
    }

    /// Returns `false` when the id is already taken.
    async fn insert_row(&self, raw: RawEnrollment) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO enrollments (
                       id_number, name, role, status, descriptor,
                       visit_purpose, valid_until, email, registered_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        raw.id_number,
                        raw.name,
                        raw.role,
                        raw.status,
                        raw.descriptor,
                        raw.visit_purpose,
                        raw.valid_until,
                        raw.email,
                        raw.registered_at,
                    ],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        Ok(inserted)
    }

    /// Returns the number of rows removed.
    async fn delete_row(&self, id_number: String) -> Result<usize> {
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM enrollments WHERE id_number = ?1",
                    rusqlite::params![id_number],
                )?;
                Ok(n)
            })
            .await?;
        Ok(removed)
    }

    async fn insert_log(&self, raw: RawAuditEntry) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO access_logs (user_id, name, role, action, confidence, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        raw.user_id,
                        raw.name,
                        raw.role,
                        raw.action,
                        raw.confidence,
                        raw.timestamp,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn select_recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let raws: Vec<RawAuditEntry> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, name, role, action, confidence, timestamp
                     FROM access_logs
                     ORDER BY timestamp DESC, entry_id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![limit], RawAuditEntry::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawAuditEntry::decode).collect()
    }
}

// ─── Collaborator impls ──────────────────────────────────────────────────────

impl EnrollmentStore for SqliteStore {
    async fn list_all(&self) -> Result<Vec<Enrollment>, StoreError> {
        Ok(self.select_all().await?)
    }

    async fn get(&self, id_number: &str) -> Result<Option<Enrollment>, StoreError> {
        Ok(self.select_one(id_number.to_owned()).await?)
    }

    async fn insert(&self, enrollment: Enrollment) -> Result<(), StoreError> {
        let raw = RawEnrollment::encode(&enrollment)?;
        if self.insert_row(raw).await? {
            Ok(())
        } else {
            Err(StoreError::Duplicate(enrollment.id_number))
        }
    }

    async fn delete(&self, id_number: &str) -> Result<(), StoreError> {
        match self.delete_row(id_number.to_owned()).await? {
            0 => Err(StoreError::NotFound(id_number.to_owned())),
            _ => Ok(()),
        }
    }
}

impl AuditSink for SqliteStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), SinkError> {
        Ok(self.insert_log(RawAuditEntry::encode(&entry)).await?)
    }
}

impl AuditLog for SqliteStore {
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, SinkError> {
        Ok(self.select_recent(limit).await?)
    }
}
