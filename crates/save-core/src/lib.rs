//! save-core: save-reconciliation engine for partial document writes.
//!
//! Callers submit field -> value updates as the user edits; the engine
//! guarantees that once all in-flight writes settle, the remote store
//! reflects the most recent value intended for every field, even when
//! individual writes are retried, superseded, or complete out of
//! submission order.
//!
//! This crate provides:
//! - The [`SaveEngine`]: request coalescing by field ownership, per-field
//!   logical-clock reconciliation, soft cancellation of superseded writes,
//!   retry-until-success on transient auth failures, and a drain/repair
//!   cycle that corrects any field left stale
//! - [`RemoteStore`], readiness-gate, and reporter trait abstractions for
//!   the transport and UI collaborators

pub mod clock;
pub mod engine;
pub mod gate;
pub mod intent;
pub mod remote;
pub mod status;
pub mod table;

pub use clock::LogicalClock;
pub use engine::{SaveEngine, SaveError};
pub use gate::{GateFailed, ReadyGate, ReadyGates, ReadySignal};
pub use intent::{Fields, WriteIntent};
pub use remote::{HeldWrite, ManualRemote, RemoteStore, ScriptedRemote, WriteError, WriteResponse};
pub use status::{ErrorReporter, FieldCategory, LogReporter, SaveStatus, StatusReporter};
pub use table::Confirmation;
