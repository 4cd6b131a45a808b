use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User id recorded in the audit log when no enrollment matched.
pub const UNKNOWN_USER_ID: &str = "unknown";
/// Display name recorded in the audit log when no enrollment matched.
pub const UNKNOWN_USER_NAME: &str = "Unknown Person";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor is empty")]
    Empty,
    #[error("descriptor value at index {index} is not finite")]
    NonFinite { index: usize },
    #[error("descriptor has {actual} values, expected {expected}")]
    Dimension { expected: usize, actual: usize },
}

/// Face descriptor vector (128-dimensional for the reference extractor).
///
/// Descriptors built with [`Descriptor::new`] are guaranteed non-empty and
/// finite. Descriptors read back from storage go through
/// [`Descriptor::from_stored`] and may be malformed; the matcher skips those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    /// Validate and wrap a freshly extracted descriptor.
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self { values })
    }

    /// Wrap persisted values without validation.
    pub fn from_stored(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Non-empty with every value finite; anything else cannot be compared.
    pub fn is_usable(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| v.is_finite())
    }

    /// Compute Euclidean distance between two descriptors.
    ///
    /// Returns `None` when the lengths differ; comparing vectors of different
    /// dimensionality is a data-integrity error, not a distance.
    pub fn euclidean_distance(&self, other: &Descriptor) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let sum = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>();
        Some(sum.sqrt())
    }
}

/// Confidence percentage reported for a match at `distance`.
///
/// Not clamped: distances above 1 yield negative values.
pub fn confidence_from_distance(distance: f32) -> f32 {
    (1.0 - distance) * 100.0
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Institutional category of an enrolled person. Orthogonal to access status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Lecturer,
    Staff,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Lecturer => "lecturer",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "lecturer" => Ok(Role::Lecturer),
            "staff" => Ok(Role::Staff),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Access status of an enrollment; drives the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Graduate,
    Suspended,
    Discontinued,
    Visitor,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Graduate => "graduate",
            Status::Suspended => "suspended",
            Status::Discontinued => "discontinued",
            Status::Visitor => "visitor",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "graduate" => Ok(Status::Graduate),
            "suspended" => Ok(Status::Suspended),
            "discontinued" => Ok(Status::Discontinued),
            "visitor" => Ok(Status::Visitor),
            other => Err(ParseEnumError {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// A registered identity: descriptor, access status and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id_number: String,
    pub name: String,
    pub role: Role,
    pub status: Status,
    pub descriptor: Descriptor,
    /// Only meaningful for visitors.
    pub visit_purpose: Option<String>,
    /// Only meaningful for visitors. `None` means no expiry.
    pub valid_until: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Outcome of a verification attempt as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Granted,
    Denied,
}

/// Why an attempt ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    NoFace,
    NoEnrollments,
    NotRecognized,
    StatusDenied,
    Expired,
    Granted,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::NoFace => "no_face",
            ReasonCode::NoEnrollments => "no_enrollments",
            ReasonCode::NotRecognized => "not_recognized",
            ReasonCode::StatusDenied => "status_denied",
            ReasonCode::Expired => "expired",
            ReasonCode::Granted => "granted",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Caller-facing result of one verification attempt.
///
/// Carries everything a presentation layer needs without re-deriving policy.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub attempt_id: uuid::Uuid,
    pub decision: Decision,
    pub reason: ReasonCode,
    /// Matched enrollment (weak reference by value; not re-read from the store).
    pub enrollment: Option<Enrollment>,
    pub distance: Option<f32>,
    pub confidence: Option<f32>,
}

impl VerificationOutcome {
    pub fn granted(&self) -> bool {
        self.decision == Decision::Granted
    }
}

/// Kind of event recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Registered,
    AccessGranted,
    AccessDenied,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Registered => "registered",
            AuditAction::AccessGranted => "access_granted",
            AuditAction::AccessDenied => "access_denied",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(AuditAction::Registered),
            "access_granted" => Ok(AuditAction::AccessGranted),
            "access_denied" => Ok(AuditAction::AccessDenied),
            other => Err(ParseEnumError {
                kind: "audit action",
                value: other.to_string(),
            }),
        }
    }
}

/// A single append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Enrollment id, or [`UNKNOWN_USER_ID`] when unmatched.
    pub user_id: String,
    pub name: String,
    pub role: Option<Role>,
    pub action: AuditAction,
    pub confidence: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn registered(enrollment: &Enrollment, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: enrollment.id_number.clone(),
            name: enrollment.name.clone(),
            role: Some(enrollment.role),
            action: AuditAction::Registered,
            confidence: None,
            timestamp,
        }
    }

    /// Entry for an attempt with a matched enrollment, granted or denied.
    pub fn matched(
        enrollment: &Enrollment,
        granted: bool,
        confidence: f32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: enrollment.id_number.clone(),
            name: enrollment.name.clone(),
            role: Some(enrollment.role),
            action: if granted {
                AuditAction::AccessGranted
            } else {
                AuditAction::AccessDenied
            },
            confidence: Some(confidence),
            timestamp,
        }
    }

    pub fn unknown_denied(timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: UNKNOWN_USER_ID.to_string(),
            name: UNKNOWN_USER_NAME.to_string(),
            role: None,
            action: AuditAction::AccessDenied,
            confidence: None,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Descriptor::new(vec![0.1, 0.2, 0.3]).unwrap();
        assert_eq!(a.euclidean_distance(&a.clone()), Some(0.0));
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Descriptor::new(vec![0.0, 0.0]).unwrap();
        let b = Descriptor::new(vec![3.0, 4.0]).unwrap();
        let d = a.euclidean_distance(&b).unwrap();
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_length_mismatch() {
        let a = Descriptor::new(vec![1.0, 0.0]).unwrap();
        let b = Descriptor::new(vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(a.euclidean_distance(&b), None);
    }

    #[test]
    fn test_descriptor_rejects_empty() {
        assert_eq!(Descriptor::new(vec![]), Err(DescriptorError::Empty));
    }

    #[test]
    fn test_descriptor_rejects_nan() {
        assert_eq!(
            Descriptor::new(vec![0.5, f32::NAN]),
            Err(DescriptorError::NonFinite { index: 1 })
        );
    }

    #[test]
    fn test_stored_descriptor_usability() {
        assert!(Descriptor::from_stored(vec![0.1, 0.2]).is_usable());
        assert!(!Descriptor::from_stored(vec![]).is_usable());
        assert!(!Descriptor::from_stored(vec![f32::NAN, 0.0]).is_usable());
        assert!(!Descriptor::from_stored(vec![0.0, f32::INFINITY]).is_usable());
    }

    #[test]
    fn test_confidence_from_distance() {
        assert_eq!(confidence_from_distance(0.0), 100.0);
        assert!((confidence_from_distance(0.25) - 75.0).abs() < 1e-4);
        // Not clamped above a distance of 1.
        assert!(confidence_from_distance(1.5) < 0.0);
    }

    #[test]
    fn test_enum_round_trip_strings() {
        for status in [
            Status::Active,
            Status::Graduate,
            Status::Suspended,
            Status::Discontinued,
            Status::Visitor,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert_eq!("lecturer".parse::<Role>().unwrap(), Role::Lecturer);
        assert!("janitor".parse::<Role>().is_err());
        assert_eq!(
            "access_denied".parse::<AuditAction>().unwrap(),
            AuditAction::AccessDenied
        );
    }

    #[test]
    fn test_descriptor_serializes_as_plain_array() {
        let d = Descriptor::new(vec![0.5, -0.25]).unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), "[0.5,-0.25]");
    }
}
