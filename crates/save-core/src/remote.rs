//! RemoteStore: the authenticated network write collaborator.
//!
//! Implementations:
//! - Production: an HTTP/RPC transport owned by the embedding application
//! - `ScriptedRemote`, `ManualRemote` - for testing

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::intent::Fields;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    /// Transient authentication failure; the engine retries indefinitely.
    #[error("authentication not valid: {0}")]
    Auth(String),

    /// The server rejected the write.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The transport failed outright.
    #[error("network failure: {0}")]
    Network(String),
}

impl WriteError {
    /// Whether the engine should retry the same fields.
    pub fn is_transient_auth(&self) -> bool {
        matches!(self, WriteError::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, WriteError>;

/// Successful write acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResponse {
    /// Server-assigned version number for the document after this write.
    pub version: u64,
}

/// Authenticated write operation against the remote document store.
///
/// The transport classifies its own failures: [`WriteError::Auth`] is
/// retried by the engine, everything else is fatal.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Persist the given field values, replacing each field wholesale.
    async fn write_fields(&self, fields: &Fields) -> Result<WriteResponse>;
}

// Allows sharing one remote between the engine and a test harness.
#[async_trait]
impl<T: RemoteStore> RemoteStore for std::sync::Arc<T> {
    async fn write_fields(&self, fields: &Fields) -> Result<WriteResponse> {
        (**self).write_fields(fields).await
    }
}

/// Scripted remote for testing: pops one queued outcome per call.
///
/// When the script runs dry, calls succeed with auto-incrementing versions.
/// Every call is recorded for inspection.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    script: Mutex<VecDeque<Result<WriteResponse>>>,
    calls: Mutex<Vec<Fields>>,
    next_version: Mutex<u64>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome for the next call.
    pub fn push_outcome(&self, outcome: Result<WriteResponse>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Fields of every write received so far, in call order.
    pub fn calls(&self) -> Vec<Fields> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    async fn write_fields(&self, fields: &Fields) -> Result<WriteResponse> {
        self.calls.lock().unwrap().push(fields.clone());
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return outcome;
        }
        let mut next = self.next_version.lock().unwrap();
        *next += 1;
        Ok(WriteResponse { version: *next })
    }
}

/// A write held open by [`ManualRemote`] until the test responds.
#[derive(Debug)]
pub struct HeldWrite {
    pub fields: Fields,
    responder: oneshot::Sender<Result<WriteResponse>>,
}

impl HeldWrite {
    /// Complete the write successfully with the given server version.
    pub fn succeed(self, version: u64) {
        let _ = self.responder.send(Ok(WriteResponse { version }));
    }

    /// Fail the write.
    pub fn fail(self, error: WriteError) {
        let _ = self.responder.send(Err(error));
    }
}

/// Manual remote for testing completion-order races: each write is parked
/// on a channel until the test completes it, in any order.
#[derive(Debug)]
pub struct ManualRemote {
    tx: mpsc::UnboundedSender<HeldWrite>,
}

impl ManualRemote {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HeldWrite>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RemoteStore for ManualRemote {
    async fn write_fields(&self, fields: &Fields) -> Result<WriteResponse> {
        let (responder, response) = oneshot::channel();
        self.tx
            .send(HeldWrite {
                fields: fields.clone(),
                responder,
            })
            .map_err(|_| WriteError::Network("remote receiver dropped".into()))?;
        response
            .await
            .map_err(|_| WriteError::Network("write response dropped".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_scripted_remote_pops_outcomes_in_order() {
        let remote = ScriptedRemote::new();
        remote.push_outcome(Err(WriteError::Auth("expired".into())));
        remote.push_outcome(Ok(WriteResponse { version: 9 }));

        let parts = fields(&[("title", "A")]);
        assert_eq!(
            remote.write_fields(&parts).await,
            Err(WriteError::Auth("expired".into()))
        );
        assert_eq!(
            remote.write_fields(&parts).await,
            Ok(WriteResponse { version: 9 })
        );
        assert_eq!(remote.call_count(), 2);
        assert_eq!(remote.calls()[0], parts);
    }

    #[tokio::test]
    async fn test_scripted_remote_auto_increments_when_dry() {
        let remote = ScriptedRemote::new();
        let parts = fields(&[("body", "X")]);
        assert_eq!(remote.write_fields(&parts).await.unwrap().version, 1);
        assert_eq!(remote.write_fields(&parts).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_manual_remote_completes_out_of_order() {
        let (remote, mut writes) = ManualRemote::new();
        let remote = std::sync::Arc::new(remote);

        let first = {
            let remote = Arc::clone(&remote);
            tokio::spawn(async move { remote.write_fields(&fields(&[("title", "A")])).await })
        };
        let second = {
            let remote = Arc::clone(&remote);
            tokio::spawn(async move { remote.write_fields(&fields(&[("title", "B")])).await })
        };

        let held_a = writes.recv().await.unwrap();
        let held_b = writes.recv().await.unwrap();

        // Respond to the later write first.
        let (older, newer) = if held_a.fields["title"] == "A" {
            (held_a, held_b)
        } else {
            (held_b, held_a)
        };
        newer.succeed(7);
        older.succeed(8);

        let results = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
        let versions: Vec<u64> = results.iter().map(|r| r.version).collect();
        assert!(versions.contains(&7) && versions.contains(&8));
    }

    #[tokio::test]
    async fn test_manual_remote_fails_when_receiver_dropped() {
        let (remote, writes) = ManualRemote::new();
        drop(writes);
        let err = remote
            .write_fields(&fields(&[("title", "A")]))
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Network(_)));
    }
}
