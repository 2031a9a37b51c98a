//! A single pending write and its lifecycle flags.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::engine::SaveError;

/// Field name -> value mapping submitted in one save call.
///
/// Values replace the server's copy of each field wholesale; no merging.
pub type Fields = HashMap<String, String>;

/// A pending or settled request to persist a specific set of field values.
///
/// Created by submission, driven by its own spawned task, and discarded
/// after settlement. The `desired` flag is the only cancellation mechanism:
/// it cannot abort a dispatched network call, it just makes the intent
/// settle as a no-op at its next check.
#[derive(Debug)]
pub struct WriteIntent {
    fields: Fields,
    local_version: u64,
    desired: AtomicBool,
    settled: AtomicBool,
    remote_version: OnceLock<u64>,
    error: Mutex<Option<SaveError>>,
}

impl WriteIntent {
    pub(crate) fn new(fields: Fields, local_version: u64) -> Self {
        Self {
            fields,
            local_version,
            desired: AtomicBool::new(true),
            settled: AtomicBool::new(false),
            remote_version: OnceLock::new(),
            error: Mutex::new(None),
        }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn value_of(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Version assigned once at creation from the logical clock.
    pub fn local_version(&self) -> u64 {
        self.local_version
    }

    /// Whether this intent's outcome should still be acted upon.
    pub fn is_desired(&self) -> bool {
        self.desired.load(Ordering::Acquire)
    }

    /// Demote the intent: let it finish harmlessly.
    pub(crate) fn revoke(&self) {
        self.desired.store(false, Ordering::Release);
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_settled(&self) {
        self.settled.store(true, Ordering::Release);
    }

    /// Server-assigned version from the first successful completion.
    pub fn remote_version(&self) -> Option<u64> {
        self.remote_version.get().copied()
    }

    pub(crate) fn set_remote_version(&self, version: u64) {
        let _ = self.remote_version.set(version);
    }

    pub(crate) fn record_error(&self, error: SaveError) {
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    pub(crate) fn take_error(&self) -> Option<SaveError> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_new_intent_is_desired_and_unsettled() {
        let intent = WriteIntent::new(fields(&[("title", "A")]), 1);
        assert!(intent.is_desired());
        assert!(!intent.is_settled());
        assert!(intent.remote_version().is_none());
        assert_eq!(intent.value_of("title"), Some("A"));
        assert_eq!(intent.value_of("body"), None);
    }

    #[test]
    fn test_revoke_and_settle() {
        let intent = WriteIntent::new(fields(&[("body", "X")]), 2);
        intent.revoke();
        assert!(!intent.is_desired());
        intent.mark_settled();
        assert!(intent.is_settled());
    }

    #[test]
    fn test_remote_version_is_set_once() {
        let intent = WriteIntent::new(fields(&[("title", "A")]), 1);
        intent.set_remote_version(5);
        intent.set_remote_version(9);
        assert_eq!(intent.remote_version(), Some(5));
    }
}
