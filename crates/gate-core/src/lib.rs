//! gate-core — Face-descriptor matching and access decisions for physical
//! entry points.
//!
//! Compares a live descriptor against the enrolled population, applies the
//! status-driven access policy to the closest match, and records every
//! decision in an append-only audit log. Capture, storage and the audit log
//! are injected collaborators.

pub mod controller;
pub mod matcher;
pub mod memory;
pub mod policy;
pub mod registration;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod types;

pub use controller::{
    AttemptEvent, ContinuousHandle, ControllerConfig, ControllerState, Stage,
    VerificationController, VerifyError,
};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher};
pub use memory::MemoryStore;
pub use registration::{NewEnrollment, RegistrationError};
pub use scheduler::{IntervalScheduler, Scheduler};
pub use store::{
    AuditLog, AuditSink, CaptureError, EnrollmentStore, Extractor, FrameSource, SinkError,
    StoreError,
};
pub use types::{
    AuditAction, AuditEntry, Decision, Descriptor, Enrollment, ReasonCode, Role, Status,
    VerificationOutcome,
};
