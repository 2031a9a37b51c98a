//! Status and error reporting collaborators.
//!
//! Purely observational: the engine tells the UI which coarse categories of
//! data have unsettled writes, and surfaces the fatal error. None of this is
//! part of the consistency contract.

use serde::Serialize;
use tracing::{debug, error};

use crate::engine::SaveError;

/// Coarse category a field belongs to, for UI status purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldCategory {
    Title,
    Body,
    Other,
}

impl FieldCategory {
    pub const ALL: [FieldCategory; 3] = [
        FieldCategory::Title,
        FieldCategory::Body,
        FieldCategory::Other,
    ];

    /// Classify a field name.
    pub fn of_field(field: &str) -> Self {
        match field {
            "title" => FieldCategory::Title,
            "body" => FieldCategory::Body,
            _ => FieldCategory::Other,
        }
    }
}

/// Whether a category currently has unsettled writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveStatus {
    Saving,
    Idle,
}

/// Receives category dirty/clean transitions for UI rendering.
pub trait StatusReporter: Send + Sync {
    fn status_changed(&self, category: FieldCategory, status: SaveStatus);
}

/// Receives the error when the engine hits a fatal failure.
pub trait ErrorReporter: Send + Sync {
    fn fatal(&self, error: &SaveError);
}

/// Default reporter that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn status_changed(&self, category: FieldCategory, status: SaveStatus) {
        debug!("save status: {:?} -> {:?}", category, status);
    }
}

impl ErrorReporter for LogReporter {
    fn fatal(&self, error: &SaveError) {
        error!("saving failed, document in unknown state on server: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_category_mapping() {
        assert_eq!(FieldCategory::of_field("title"), FieldCategory::Title);
        assert_eq!(FieldCategory::of_field("body"), FieldCategory::Body);
        assert_eq!(FieldCategory::of_field("tags"), FieldCategory::Other);
        assert_eq!(FieldCategory::of_field(""), FieldCategory::Other);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&FieldCategory::Title).unwrap(),
            "\"title\""
        );
        assert_eq!(
            serde_json::to_string(&SaveStatus::Saving).unwrap(),
            "\"saving\""
        );
        assert_eq!(serde_json::to_string(&SaveStatus::Idle).unwrap(), "\"idle\"");
    }
}
