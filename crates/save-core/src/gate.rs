//! Readiness gates the engine awaits before every write attempt.
//!
//! Two gates guard each attempt: authentication/session readiness and
//! "document loaded". Both sit on a watch channel so a gate can be one-shot
//! or re-triggered by the collaborator that owns the signal side.

use thiserror::Error;
use tokio::sync::watch;

/// A readiness signal failed or was dropped before becoming ready.
///
/// Terminal for the whole engine: the first desired intent to observe it
/// runs the fatal path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("readiness signal failed: {0}")]
pub struct GateFailed(pub String);

#[derive(Debug, Clone)]
enum GateState {
    Pending,
    Ready,
    Failed(String),
}

/// Collaborator-side handle used to resolve or fail a [`ReadyGate`].
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<GateState>,
}

impl ReadySignal {
    /// Mark the gate ready, waking all waiters.
    pub fn set_ready(&self) {
        let _ = self.tx.send(GateState::Ready);
    }

    /// Revoke readiness (e.g. the session expired); waiters suspend again.
    pub fn reset(&self) {
        let _ = self.tx.send(GateState::Pending);
    }

    /// Fail the gate permanently.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(GateState::Failed(reason.into()));
    }
}

/// Awaitable readiness gate.
#[derive(Debug, Clone)]
pub struct ReadyGate {
    rx: watch::Receiver<GateState>,
}

impl ReadyGate {
    /// Create a gate and the signal handle that resolves it.
    pub fn new() -> (ReadySignal, ReadyGate) {
        let (tx, rx) = watch::channel(GateState::Pending);
        (ReadySignal { tx }, ReadyGate { rx })
    }

    /// A gate that is already ready, for callers without such a signal.
    pub fn ready() -> ReadyGate {
        let (signal, gate) = Self::new();
        signal.set_ready();
        gate
    }

    /// Suspend until the gate is ready.
    ///
    /// A dropped [`ReadySignal`] counts as failure.
    pub async fn wait(&self) -> Result<(), GateFailed> {
        let mut rx = self.rx.clone();
        loop {
            match &*rx.borrow_and_update() {
                GateState::Ready => return Ok(()),
                GateState::Failed(reason) => return Err(GateFailed(reason.clone())),
                GateState::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(GateFailed("readiness signal dropped".into()));
            }
        }
    }
}

/// The pair of gates consulted before every attempt, including retries.
#[derive(Debug, Clone)]
pub struct ReadyGates {
    pub auth: ReadyGate,
    pub document: ReadyGate,
}

impl ReadyGates {
    pub fn new(auth: ReadyGate, document: ReadyGate) -> Self {
        Self { auth, document }
    }

    /// Gates that are already satisfied.
    pub fn ready() -> Self {
        Self {
            auth: ReadyGate::ready(),
            document: ReadyGate::ready(),
        }
    }

    /// Suspend until both gates are ready, failing as soon as either fails.
    pub async fn wait_all(&self) -> Result<(), GateFailed> {
        tokio::try_join!(self.auth.wait(), self.document.wait())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_ready_gate_resolves_immediately() {
        ReadyGate::ready().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_gate_wakes_waiter_on_ready() {
        let (signal, gate) = ReadyGate::new();
        let waiter = tokio::spawn(async move { gate.wait().await });
        signal.set_ready();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_gate_reports_reason() {
        let (signal, gate) = ReadyGate::new();
        signal.fail("session rejected");
        let err = gate.wait().await.unwrap_err();
        assert_eq!(err, GateFailed("session rejected".into()));
    }

    #[tokio::test]
    async fn test_dropped_signal_counts_as_failure() {
        let (signal, gate) = ReadyGate::new();
        drop(signal);
        assert!(gate.wait().await.is_err());
    }

    #[tokio::test]
    async fn test_reset_suspends_waiters_again() {
        let (signal, gate) = ReadyGate::new();
        signal.set_ready();
        gate.wait().await.unwrap();

        signal.reset();
        let result = timeout(Duration::from_millis(50), gate.wait()).await;
        assert!(result.is_err(), "gate should be pending again after reset");

        signal.set_ready();
        gate.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_all_requires_both_gates() {
        let (auth_signal, auth) = ReadyGate::new();
        let (doc_signal, document) = ReadyGate::new();
        let gates = ReadyGates::new(auth, document);

        auth_signal.set_ready();
        let result = timeout(Duration::from_millis(50), gates.wait_all()).await;
        assert!(result.is_err(), "one ready gate is not enough");

        doc_signal.set_ready();
        gates.wait_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_all_fails_fast_on_either_gate() {
        let (_auth_signal, auth) = ReadyGate::new();
        let (doc_signal, document) = ReadyGate::new();
        let gates = ReadyGates::new(auth, document);

        // Auth never resolves, but the document gate failing is enough.
        doc_signal.fail("document load aborted");
        assert!(gates.wait_all().await.is_err());
    }
}
