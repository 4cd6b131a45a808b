//! Verification controller: one probe-to-decision pipeline per camera session.
//!
//! At most one attempt is in flight. A request arriving while the controller
//! is not `Idle` is dropped, not queued. Continuous mode drives attempts from
//! a [`Scheduler`] on a spawned task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::matcher::{EuclideanMatcher, Matcher, DEFAULT_DESCRIPTOR_DIM, DEFAULT_MATCH_THRESHOLD};
use crate::policy;
use crate::scheduler::{Scheduler, DEFAULT_VERIFY_INTERVAL};
use crate::store::{
    AuditSink, CaptureError, EnrollmentStore, Extractor, FrameSource, SinkError, StoreError,
};
use crate::types::{
    confidence_from_distance, AuditEntry, Decision, ReasonCode, VerificationOutcome,
};

/// Default upper bound on each collaborator call.
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Pipeline state. `Idle` is the only state that accepts a new attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Capturing,
    Matching,
    Deciding,
    Reporting,
}

/// Collaborator call that can time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Enrollments,
    Audit,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Capture => "capture",
            Stage::Enrollments => "enrollment fetch",
            Stage::Audit => "audit append",
        })
    }
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("enrollment store error: {0}")]
    Store(#[from] StoreError),
    #[error("audit error: {0}")]
    Audit(#[from] SinkError),
    #[error("{0} timed out after {1:?}")]
    Timeout(Stage, Duration),
}

/// What a caller receives for each attempt that actually ran.
pub type AttemptEvent = Result<VerificationOutcome, VerifyError>;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Maximum Euclidean distance accepted as a match (exclusive).
    pub threshold: f32,
    /// Expected descriptor length; `None` disables the probe length check.
    pub descriptor_dim: Option<usize>,
    /// Period between continuous attempts.
    pub interval: Duration,
    /// Limit applied to each of extract, enrollment fetch and audit append.
    pub timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            descriptor_dim: Some(DEFAULT_DESCRIPTOR_DIM),
            interval: DEFAULT_VERIFY_INTERVAL,
            timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }
}

struct Inner<X, S, A> {
    extractor: X,
    store: S,
    sink: A,
    matcher: EuclideanMatcher,
    config: ControllerConfig,
    state: watch::Sender<ControllerState>,
}

/// Clone-safe handle to a verification pipeline.
///
/// Collaborators are injected at construction; clones share the same
/// in-flight guard.
pub struct VerificationController<X, S, A> {
    inner: Arc<Inner<X, S, A>>,
}

impl<X, S, A> Clone for VerificationController<X, S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Holds the pipeline out of `Idle` for the lifetime of one attempt.
///
/// Dropping it returns the state to `Idle`, on success, error, timeout or
/// cancellation of the attempt future alike.
struct InFlight<'a> {
    state: &'a watch::Sender<ControllerState>,
}

impl<'a> InFlight<'a> {
    fn acquire(state: &'a watch::Sender<ControllerState>) -> Option<Self> {
        let acquired = state.send_if_modified(|s| {
            if *s == ControllerState::Idle {
                *s = ControllerState::Capturing;
                true
            } else {
                false
            }
        });
        acquired.then_some(Self { state })
    }

    fn advance(&self, next: ControllerState) {
        self.state.send_replace(next);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.send_replace(ControllerState::Idle);
    }
}

async fn timed<T, E>(
    stage: Stage,
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, VerifyError>
where
    VerifyError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(VerifyError::from),
        Err(_) => Err(VerifyError::Timeout(stage, limit)),
    }
}

fn denied(attempt_id: Uuid, reason: ReasonCode) -> VerificationOutcome {
    VerificationOutcome {
        attempt_id,
        decision: Decision::Denied,
        reason,
        enrollment: None,
        distance: None,
        confidence: None,
    }
}

impl<X, S, A> VerificationController<X, S, A>
where
    X: Extractor,
    S: EnrollmentStore,
    A: AuditSink,
{
    pub fn new(extractor: X, store: S, sink: A, config: ControllerConfig) -> Self {
        let matcher = EuclideanMatcher::new(config.threshold, config.descriptor_dim);
        let (state, _) = watch::channel(ControllerState::Idle);
        Self {
            inner: Arc::new(Inner {
                extractor,
                store,
                sink,
                matcher,
                config,
                state,
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ControllerState {
        *self.inner.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.inner.state.subscribe()
    }

    /// Run a single-shot attempt on an already captured frame.
    ///
    /// Returns `None` without side effects when another attempt is in flight.
    pub async fn verify(&self, frame: X::Frame) -> Option<AttemptEvent> {
        self.attempt(async move { Ok(frame) }).await
    }

    async fn attempt<F>(&self, capture: F) -> Option<AttemptEvent>
    where
        F: Future<Output = Result<X::Frame, CaptureError>> + Send,
    {
        let Some(guard) = InFlight::acquire(&self.inner.state) else {
            tracing::debug!("verification already in flight; request dropped");
            return None;
        };

        let attempt_id = Uuid::new_v4();
        let span = tracing::info_span!("attempt", %attempt_id);
        let event = self
            .run(&guard, attempt_id, capture)
            .instrument(span.clone())
            .await;
        guard.advance(ControllerState::Reporting);

        span.in_scope(|| match &event {
            Ok(outcome) => tracing::info!(
                decision = ?outcome.decision,
                reason = %outcome.reason,
                id_number = outcome.enrollment.as_ref().map(|e| e.id_number.as_str()),
                distance = outcome.distance,
                confidence = outcome.confidence,
                "attempt complete"
            ),
            Err(err) => tracing::warn!(error = %err, "attempt failed"),
        });

        Some(event)
    }

    async fn run<F>(&self, guard: &InFlight<'_>, attempt_id: Uuid, capture: F) -> AttemptEvent
    where
        F: Future<Output = Result<X::Frame, CaptureError>> + Send,
    {
        let inner = &*self.inner;
        let limit = inner.config.timeout;

        let probe = timed(Stage::Capture, limit, async {
            let frame = capture.await?;
            inner.extractor.extract(frame).await
        })
        .await?;

        // No face: straight to reporting, nothing audited.
        let Some(probe) = probe else {
            guard.advance(ControllerState::Reporting);
            return Ok(denied(attempt_id, ReasonCode::NoFace));
        };

        guard.advance(ControllerState::Matching);
        let population = timed(Stage::Enrollments, limit, inner.store.list_all()).await?;
        let now = Utc::now();

        if population.is_empty() {
            guard.advance(ControllerState::Reporting);
            timed(Stage::Audit, limit, inner.sink.append(AuditEntry::unknown_denied(now))).await?;
            return Ok(denied(attempt_id, ReasonCode::NoEnrollments));
        }

        let result = inner.matcher.compare(&probe, &population);
        if !result.skipped.is_empty() {
            tracing::warn!(
                skipped = ?result.skipped,
                compared = result.compared,
                "enrollments with unusable descriptors were skipped"
            );
        }

        guard.advance(ControllerState::Deciding);
        let (outcome, entry) = match result.best {
            None => (
                VerificationOutcome {
                    distance: result.closest,
                    ..denied(attempt_id, ReasonCode::NotRecognized)
                },
                AuditEntry::unknown_denied(now),
            ),
            Some(candidate) => {
                let decision = policy::evaluate(candidate.enrollment, now);
                let confidence = confidence_from_distance(candidate.distance);
                let outcome = VerificationOutcome {
                    attempt_id,
                    decision: if decision.granted {
                        Decision::Granted
                    } else {
                        Decision::Denied
                    },
                    reason: decision.reason,
                    enrollment: Some(candidate.enrollment.clone()),
                    distance: Some(candidate.distance),
                    confidence: Some(confidence),
                };
                let entry =
                    AuditEntry::matched(candidate.enrollment, decision.granted, confidence, now);
                (outcome, entry)
            }
        };

        guard.advance(ControllerState::Reporting);
        timed(Stage::Audit, limit, inner.sink.append(entry)).await?;
        Ok(outcome)
    }
}

impl<X, S, A> VerificationController<X, S, A>
where
    X: Extractor + 'static,
    S: EnrollmentStore + 'static,
    A: AuditSink + 'static,
{
    /// Start continuous verification on a spawned task.
    ///
    /// Each scheduler tick requests one attempt with a frame from `source`.
    /// Ticks that arrive while an attempt is in flight are skipped. Events are
    /// delivered on the returned receiver; dropping it also stops the task.
    pub fn start_continuous<F, T>(
        &self,
        source: F,
        scheduler: T,
    ) -> (ContinuousHandle, mpsc::Receiver<AttemptEvent>)
    where
        F: FrameSource<Frame = X::Frame> + 'static,
        T: Scheduler + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.clone().run_continuous(source, scheduler, events_tx, stop_rx));
        (
            ContinuousHandle {
                stop: stop_tx,
                task,
            },
            events_rx,
        )
    }

    async fn run_continuous<F, T>(
        self,
        mut source: F,
        mut scheduler: T,
        events: mpsc::Sender<AttemptEvent>,
        mut stop: watch::Receiver<bool>,
    ) where
        F: FrameSource<Frame = X::Frame>,
        T: Scheduler,
    {
        tracing::info!(interval = ?self.inner.config.interval, "continuous verification started");
        loop {
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
                () = scheduler.tick() => {}
            }

            let Some(event) = self.attempt(source.capture()).await else {
                tracing::debug!("tick skipped: previous attempt still in flight");
                continue;
            };
            if events.send(event).await.is_err() {
                tracing::debug!("event receiver dropped");
                break;
            }
        }
        tracing::info!("continuous verification stopped");
    }
}

/// Control handle for a continuous verification task.
pub struct ContinuousHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ContinuousHandle {
    /// Prevent further attempts. An attempt already running completes and
    /// reports once.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Request stop and wait for the task to finish.
    pub async fn stop(self) {
        self.request_stop();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "continuous verification task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
