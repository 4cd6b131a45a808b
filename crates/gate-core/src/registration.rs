//! Enrollment validation, registration and removal.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::{AuditSink, EnrollmentStore, SinkError, StoreError};
use crate::types::{AuditEntry, Descriptor, DescriptorError, Enrollment, Role, Status};

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("no face descriptor captured; capture a face before registering")]
    MissingDescriptor,
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("enrollment stored but audit failed: {0}")]
    Audit(#[from] SinkError),
}

/// Registration form data plus the captured descriptor, before validation.
#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub id_number: String,
    pub name: String,
    pub role: Role,
    pub status: Status,
    /// Raw values from the extractor; `None` when no capture succeeded.
    pub descriptor: Option<Vec<f32>>,
    pub visit_purpose: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    pub email: Option<String>,
}

impl NewEnrollment {
    pub fn new(id_number: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id_number: id_number.into(),
            name: name.into(),
            role,
            status: Status::Active,
            descriptor: None,
            visit_purpose: None,
            valid_until: None,
            email: None,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_descriptor(mut self, values: Vec<f32>) -> Self {
        self.descriptor = Some(values);
        self
    }

    pub fn with_visit(mut self, purpose: impl Into<String>, valid_until: Option<DateTime<Utc>>) -> Self {
        self.visit_purpose = Some(purpose.into());
        self.valid_until = valid_until;
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Validate the form and build an [`Enrollment`] registered at `now`.
    ///
    /// Text fields are trimmed. Visitor-only fields are dropped for
    /// non-visitors. An empty email is treated as absent. When `dimension` is
    /// set, the descriptor must have exactly that many values.
    pub fn validate(
        self,
        now: DateTime<Utc>,
        dimension: Option<usize>,
    ) -> Result<Enrollment, RegistrationError> {
        let id_number = required(&self.id_number, "id_number")?;
        let name = required(&self.name, "name")?;

        let (visit_purpose, valid_until) = match self.status {
            Status::Visitor => {
                let purpose = self
                    .visit_purpose
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or(RegistrationError::MissingField("visit_purpose"))?;
                (Some(purpose.to_string()), self.valid_until)
            }
            _ => {
                if self.visit_purpose.is_some() || self.valid_until.is_some() {
                    tracing::debug!(
                        id_number,
                        status = %self.status,
                        "ignoring visitor fields for non-visitor enrollment"
                    );
                }
                (None, None)
            }
        };

        let values = self.descriptor.ok_or(RegistrationError::MissingDescriptor)?;
        let descriptor = Descriptor::new(values)?;
        if let Some(expected) = dimension.filter(|&d| d != descriptor.len()) {
            return Err(DescriptorError::Dimension {
                expected,
                actual: descriptor.len(),
            }
            .into());
        }

        let email = self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        Ok(Enrollment {
            id_number: id_number.to_string(),
            name: name.to_string(),
            role: self.role,
            status: self.status,
            descriptor,
            visit_purpose,
            valid_until,
            email,
            registered_at: now,
        })
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, RegistrationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(RegistrationError::MissingField(field))
    } else {
        Ok(trimmed)
    }
}

/// Validate, persist and audit a new enrollment.
///
/// `dimension` should be the matcher's expected descriptor length, so that
/// nothing is stored that verification would skip. Duplicate ids are rejected
/// by the store. The `registered` audit entry is appended only after the
/// insert succeeded.
pub async fn register<S, A>(
    store: &S,
    sink: &A,
    input: NewEnrollment,
    dimension: Option<usize>,
    now: DateTime<Utc>,
) -> Result<Enrollment, RegistrationError>
where
    S: EnrollmentStore,
    A: AuditSink,
{
    let enrollment = input.validate(now, dimension)?;
    store.insert(enrollment.clone()).await?;
    tracing::info!(
        id_number = %enrollment.id_number,
        role = %enrollment.role,
        status = %enrollment.status,
        dim = enrollment.descriptor.len(),
        "enrollment registered"
    );
    sink.append(AuditEntry::registered(&enrollment, now)).await?;
    Ok(enrollment)
}

/// Administrative removal. Immediate and unconditional; no soft delete.
pub async fn remove<S: EnrollmentStore>(store: &S, id_number: &str) -> Result<(), StoreError> {
    store.delete(id_number).await?;
    tracing::info!(id_number, "enrollment removed");
    Ok(())
}
