//! SaveEngine: reconciles intended document state with the remote store.
//!
//! The reconciliation cycle works as follows:
//!
//! 1. `save(parts)` constructs a write intent owning exactly those fields,
//!    displacing older unsettled intents from them; a fully displaced
//!    intent is revoked and settles as a no-op at its next check.
//! 2. Each intent runs on its own task: await both readiness gates,
//!    re-check desirability, then issue the write. Transient auth failures
//!    retry the same fields indefinitely; any other failure is fatal.
//! 3. Successful completions record the server version per field, keeping
//!    only the highest seen, so late responses for older intents can never
//!    roll a confirmation backwards.
//! 4. When the last pending intent settles, the drain/repair cycle compares
//!    what we wanted last against what the server confirmed and re-submits
//!    any field left stale.
//!
//! Step 4 is what gives eventual consistency: responses may land in any
//! order, so the last intent to settle is not necessarily the one whose
//! value the server kept.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};

use crate::clock::LogicalClock;
use crate::gate::{GateFailed, ReadyGates};
use crate::intent::{Fields, WriteIntent};
use crate::remote::{RemoteStore, WriteError};
use crate::status::{ErrorReporter, FieldCategory, LogReporter, SaveStatus, StatusReporter};
use crate::table::{Confirmation, ConfirmationTable, OwnershipTable};

/// Terminal failure of a write intent. Any of these settles the intent and
/// triggers the engine-wide fatal reset.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("remote write failed: {0}")]
    Write(#[from] WriteError),

    #[error(transparent)]
    Readiness(#[from] GateFailed),
}

/// Mutable engine state, serialized behind one lock.
struct EngineState {
    ownership: OwnershipTable,
    confirmed: ConfirmationTable,
    pending: Vec<Arc<WriteIntent>>,
}

struct EngineInner<R> {
    remote: R,
    gates: ReadyGates,
    status: Arc<dyn StatusReporter>,
    errors: Arc<dyn ErrorReporter>,
    clock: LogicalClock,
    state: Mutex<EngineState>,
    // Publishes the pending-set size. Only updated after a submission or a
    // fully processed settlement (including any repair resubmission), so
    // observers never see a transient zero.
    pending_count: watch::Sender<usize>,
}

/// The save-reconciliation engine. Clone freely; all clones share state.
pub struct SaveEngine<R> {
    inner: Arc<EngineInner<R>>,
    observer: watch::Receiver<usize>,
}

impl<R> Clone for SaveEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            observer: self.observer.clone(),
        }
    }
}

impl<R: RemoteStore + 'static> SaveEngine<R> {
    /// Create an engine with the default tracing-backed reporters.
    pub fn new(remote: R, gates: ReadyGates) -> Self {
        Self::with_reporters(remote, gates, Arc::new(LogReporter), Arc::new(LogReporter))
    }

    pub fn with_reporters(
        remote: R,
        gates: ReadyGates,
        status: Arc<dyn StatusReporter>,
        errors: Arc<dyn ErrorReporter>,
    ) -> Self {
        let (pending_count, observer) = watch::channel(0);
        let inner = Arc::new(EngineInner {
            remote,
            gates,
            status,
            errors,
            clock: LogicalClock::new(),
            state: Mutex::new(EngineState {
                ownership: OwnershipTable::new(),
                confirmed: ConfirmationTable::new(),
                pending: Vec::new(),
            }),
            pending_count,
        });
        Self { inner, observer }
    }

    /// Submit new values for a set of fields.
    ///
    /// This is the only entry point callers need. It always succeeds;
    /// settlement is observed via [`SaveEngine::settled`] and the status
    /// reporter.
    pub async fn save(&self, parts: Fields) {
        let mut state = self.inner.state.lock().await;
        for category in categories_of(&parts) {
            self.inner.status.status_changed(category, SaveStatus::Saving);
        }
        self.inner.submit_locked(&mut state, parts);
        self.inner.publish_pending(&state);
    }

    /// Number of unsettled write intents.
    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Highest confirmed server state for a field, if any write covering it
    /// has completed.
    pub async fn confirmation(&self, field: &str) -> Option<Confirmation> {
        self.inner.state.lock().await.confirmed.get(field)
    }

    /// Wait until no write intents are pending.
    pub async fn settled(&self) {
        let mut rx = self.observer.clone();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl<R: RemoteStore + 'static> EngineInner<R> {
    fn publish_pending(&self, state: &EngineState) {
        let _ = self.pending_count.send(state.pending.len());
    }

    fn mark_all_idle(&self) {
        for category in FieldCategory::ALL {
            self.status.status_changed(category, SaveStatus::Idle);
        }
    }

    /// Construct an intent for `parts`, claim field ownership, and spawn its
    /// driver task. Caller holds the state lock.
    fn submit_locked(self: &Arc<Self>, state: &mut EngineState, parts: Fields) {
        let intent = Arc::new(WriteIntent::new(parts, self.clock.next_version()));
        for old in state.ownership.claim(&intent) {
            debug!(
                "write intent v{} superseded by v{}, will settle as a no-op",
                old.local_version(),
                intent.local_version()
            );
        }
        state.pending.push(Arc::clone(&intent));
        debug!(
            "write intent v{} created for {} field(s)",
            intent.local_version(),
            intent.fields().len()
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let gate_failure = inner.drive(&intent).await;
            inner.settle(intent, gate_failure).await;
        });
    }

    /// Retry-until-success driver for one intent.
    ///
    /// Terminal outcomes: success (confirmation recorded), revoked no-op, a
    /// write error recorded on the intent, or a failed readiness gate
    /// (returned to be classified under the settlement lock).
    async fn drive(&self, intent: &Arc<WriteIntent>) -> Option<GateFailed> {
        loop {
            if let Err(failure) = self.gates.wait_all().await {
                return Some(failure);
            }

            if !intent.is_desired() {
                debug!(
                    "write intent v{} no longer desired, settling",
                    intent.local_version()
                );
                return None;
            }

            match self.remote.write_fields(intent.fields()).await {
                Ok(response) => {
                    intent.set_remote_version(response.version);
                    // The confirmation update is deliberately independent of
                    // the desired flag; the monotonic version check is what
                    // protects newer confirmations from stale completions.
                    let mut state = self.state.lock().await;
                    for field in intent.fields().keys() {
                        state
                            .confirmed
                            .observe(field, response.version, intent.local_version());
                    }
                    debug!(
                        "write intent v{} confirmed at server version {}",
                        intent.local_version(),
                        response.version
                    );
                    return None;
                }
                Err(err) if err.is_transient_auth() => {
                    debug!(
                        "write intent v{} hit transient auth failure, retrying: {}",
                        intent.local_version(),
                        err
                    );
                }
                Err(err) => {
                    intent.record_error(SaveError::Write(err));
                    return None;
                }
            }
        }
    }

    /// Terminal settlement: either the fatal reset, or pending-set removal
    /// followed by the drain/repair cycle once the set is empty.
    async fn settle(self: Arc<Self>, intent: Arc<WriteIntent>, gate_failure: Option<GateFailed>) {
        let mut state = self.state.lock().await;

        // A failed gate escalates only for intents still desired; intents
        // already revoked by an earlier fatal reset settle clean, which is
        // what keeps the gate failure a single engine-wide event.
        if let Some(failure) = gate_failure {
            if intent.is_desired() {
                intent.record_error(SaveError::Readiness(failure));
            }
        }

        intent.mark_settled();

        if let Some(failure) = intent.take_error() {
            error!("write intent v{} failed: {}", intent.local_version(), failure);
            self.errors.fatal(&failure);
            // Abandon all requests; the ones still mid-flight settle later
            // as no-ops. The tables are reset to totally naive.
            for pending in state.pending.drain(..) {
                pending.revoke();
            }
            state.ownership.clear();
            state.confirmed.clear();
            self.mark_all_idle();
            self.publish_pending(&state);
            return;
        }

        state.pending.retain(|p| !Arc::ptr_eq(p, &intent));
        if !state.pending.is_empty() {
            // Remaining intents clean up any mess when they settle.
            self.publish_pending(&state);
            return;
        }

        // Pending set drained: ownership holds the state we want the server
        // to have, confirmations hold what it ended up with. Correct any
        // field whose confirmed local version differs from its owner's.
        let mut correction = Fields::new();
        for (field, owner) in state.ownership.iter() {
            let confirmed_local = state.confirmed.get(field).map(|c| c.local_version);
            if confirmed_local != Some(owner.local_version()) {
                if let Some(value) = owner.value_of(field) {
                    correction.insert(field.to_string(), value.to_string());
                }
            }
        }

        self.mark_all_idle();
        if !correction.is_empty() {
            info!("re-submitting {} stale field(s) after drain", correction.len());
            for category in categories_of(&correction) {
                self.status.status_changed(category, SaveStatus::Saving);
            }
            self.submit_locked(&mut state, correction);
        }
        self.publish_pending(&state);
    }
}

/// Distinct categories covered by a submission, for status reporting.
fn categories_of(parts: &Fields) -> Vec<FieldCategory> {
    let mut categories = Vec::new();
    for field in parts.keys() {
        let category = FieldCategory::of_field(field);
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    categories
}
