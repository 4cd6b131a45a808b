//! Conversions between domain types and the plain-text column values stored
//! in SQLite.
//!
//! Timestamps are RFC 3339 UTC strings with microsecond precision.
//! Descriptors are compact JSON arrays. Enumerations use their lowercase
//! snake_case names.

use chrono::{DateTime, SecondsFormat, Utc};
use gate_core::{AuditAction, AuditEntry, Descriptor, Enrollment, Role, Status};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width so that text ordering matches chronological ordering.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Descriptor ──────────────────────────────────────────────────────────────

pub fn encode_descriptor(d: &Descriptor) -> Result<String> {
    Ok(serde_json::to_string(d.values())?)
}

/// Malformed descriptors decode as empty so one corrupt row cannot take down
/// the whole population; the matcher skips them.
pub fn decode_descriptor(id_number: &str, s: &str) -> Descriptor {
    match serde_json::from_str::<Vec<f32>>(s) {
        Ok(values) => Descriptor::from_stored(values),
        Err(err) => {
            tracing::warn!(id_number, error = %err, "stored descriptor is malformed");
            Descriptor::from_stored(Vec::new())
        }
    }
}

// ─── Enumerations ────────────────────────────────────────────────────────────

fn decode_enum<T: std::str::FromStr>(s: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    s.parse().map_err(|e: T::Err| Error::InvalidValue(e.to_string()))
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// An `enrollments` row as read from SQLite, before decoding.
pub struct RawEnrollment {
    pub id_number: String,
    pub name: String,
    pub role: String,
    pub status: String,
    pub descriptor: String,
    pub visit_purpose: Option<String>,
    pub valid_until: Option<String>,
    pub email: Option<String>,
    pub registered_at: String,
}

pub const ENROLLMENT_COLUMNS: &str = "id_number, name, role, status, descriptor, \
     visit_purpose, valid_until, email, registered_at";

impl RawEnrollment {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id_number: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            status: row.get(3)?,
            descriptor: row.get(4)?,
            visit_purpose: row.get(5)?,
            valid_until: row.get(6)?,
            email: row.get(7)?,
            registered_at: row.get(8)?,
        })
    }

    pub fn encode(e: &Enrollment) -> Result<Self> {
        Ok(Self {
            id_number: e.id_number.clone(),
            name: e.name.clone(),
            role: e.role.as_str().to_owned(),
            status: e.status.as_str().to_owned(),
            descriptor: encode_descriptor(&e.descriptor)?,
            visit_purpose: e.visit_purpose.clone(),
            valid_until: e.valid_until.map(encode_dt),
            email: e.email.clone(),
            registered_at: encode_dt(e.registered_at),
        })
    }

    pub fn decode(self) -> Result<Enrollment> {
        let descriptor = decode_descriptor(&self.id_number, &self.descriptor);
        Ok(Enrollment {
            role: decode_enum::<Role>(&self.role)?,
            status: decode_enum::<Status>(&self.status)?,
            descriptor,
            valid_until: self.valid_until.as_deref().map(decode_dt).transpose()?,
            registered_at: decode_dt(&self.registered_at)?,
            id_number: self.id_number,
            name: self.name,
            visit_purpose: self.visit_purpose,
            email: self.email,
        })
    }
}

/// An `access_logs` row as read from SQLite, before decoding.
pub struct RawAuditEntry {
    pub user_id: String,
    pub name: String,
    pub role: Option<String>,
    pub action: String,
    pub confidence: Option<f64>,
    pub timestamp: String,
}

impl RawAuditEntry {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            action: row.get(3)?,
            confidence: row.get(4)?,
            timestamp: row.get(5)?,
        })
    }

    pub fn encode(entry: &AuditEntry) -> Self {
        Self {
            user_id: entry.user_id.clone(),
            name: entry.name.clone(),
            role: entry.role.map(|r| r.as_str().to_owned()),
            action: entry.action.as_str().to_owned(),
            confidence: entry.confidence.map(f64::from),
            timestamp: encode_dt(entry.timestamp),
        }
    }

    pub fn decode(self) -> Result<AuditEntry> {
        Ok(AuditEntry {
            role: self.role.as_deref().map(decode_enum::<Role>).transpose()?,
            action: decode_enum::<AuditAction>(&self.action)?,
            confidence: self.confidence.map(|c| c as f32),
            timestamp: decode_dt(&self.timestamp)?,
            user_id: self.user_id,
            name: self.name,
        })
    }
}
