//! Collaborator contracts: descriptor extraction, enrollment storage and the
//! audit log.
//!
//! Storage backends (e.g. `gate-store-sqlite`) implement these traits; the
//! verification controller depends only on the abstractions.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::types::{AuditEntry, Descriptor, Enrollment};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("descriptor extraction failed: {0}")]
    Extraction(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("enrollment already exists: {0}")]
    Duplicate(String),
    #[error("enrollment not found: {0}")]
    NotFound(String),
    #[error("store backend: {0}")]
    Backend(#[source] BoxError),
}

impl StoreError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        StoreError::Backend(err.into())
    }
}

#[derive(Error, Debug)]
#[error("audit sink: {0}")]
pub struct SinkError(#[source] BoxError);

impl SinkError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        SinkError(err.into())
    }
}

/// Produces captured frames for continuous verification.
pub trait FrameSource: Send {
    type Frame: Send;

    fn capture(&mut self) -> impl Future<Output = Result<Self::Frame, CaptureError>> + Send + '_;
}

/// Turns a captured frame into a face descriptor.
///
/// `Ok(None)` means the frame contained no face; that is an outcome, not an error.
pub trait Extractor: Send + Sync {
    type Frame: Send;

    fn extract(
        &self,
        frame: Self::Frame,
    ) -> impl Future<Output = Result<Option<Descriptor>, CaptureError>> + Send + '_;
}

/// Durable table of enrollments keyed by `id_number`.
pub trait EnrollmentStore: Send + Sync {
    /// Full population. The order must be stable for an unchanged population;
    /// the matcher resolves ties by it.
    fn list_all(&self) -> impl Future<Output = Result<Vec<Enrollment>, StoreError>> + Send + '_;

    fn get<'a>(
        &'a self,
        id_number: &'a str,
    ) -> impl Future<Output = Result<Option<Enrollment>, StoreError>> + Send + 'a;

    /// Persist a new enrollment. Fails with [`StoreError::Duplicate`] when the
    /// id is taken.
    fn insert(&self, enrollment: Enrollment)
        -> impl Future<Output = Result<(), StoreError>> + Send + '_;

    /// Remove an enrollment immediately. Fails with [`StoreError::NotFound`]
    /// when no such id exists.
    fn delete<'a>(
        &'a self,
        id_number: &'a str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'a;
}

/// Append-only audit log writer.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry) -> impl Future<Output = Result<(), SinkError>> + Send + '_;
}

/// Read side of the audit log, for operators.
pub trait AuditLog: Send + Sync {
    /// Newest entries first, at most `limit`.
    fn recent(&self, limit: usize)
        -> impl Future<Output = Result<Vec<AuditEntry>, SinkError>> + Send + '_;
}

impl<T: EnrollmentStore> EnrollmentStore for Arc<T> {
    fn list_all(&self) -> impl Future<Output = Result<Vec<Enrollment>, StoreError>> + Send + '_ {
        (**self).list_all()
    }

    fn get<'a>(
        &'a self,
        id_number: &'a str,
    ) -> impl Future<Output = Result<Option<Enrollment>, StoreError>> + Send + 'a {
        (**self).get(id_number)
    }

    fn insert(&self, enrollment: Enrollment) -> impl Future<Output = Result<(), StoreError>> + Send + '_ {
        (**self).insert(enrollment)
    }

    fn delete<'a>(&'a self, id_number: &'a str) -> impl Future<Output = Result<(), StoreError>> + Send + 'a {
        (**self).delete(id_number)
    }
}

impl<T: AuditSink> AuditSink for Arc<T> {
    fn append(&self, entry: AuditEntry) -> impl Future<Output = Result<(), SinkError>> + Send + '_ {
        (**self).append(entry)
    }
}

impl<T: AuditLog> AuditLog for Arc<T> {
    fn recent(&self, limit: usize) -> impl Future<Output = Result<Vec<AuditEntry>, SinkError>> + Send + '_ {
        (**self).recent(limit)
    }
}
