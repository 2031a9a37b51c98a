//! The engine's two tracking tables: which intent owns each field locally,
//! and what the server has confirmed for each field.

use std::collections::HashMap;
use std::sync::Arc;

use crate::intent::WriteIntent;

/// Highest confirmed (remote, local) version pair seen for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Server-assigned version of the write that produced this entry.
    pub remote_version: u64,
    /// Logical version of the intent that produced it.
    pub local_version: u64,
}

/// Maps each field to the single unsettled intent responsible for it: the
/// most recently created intent that touched the field.
#[derive(Debug, Default)]
pub struct OwnershipTable {
    owners: HashMap<String, Arc<WriteIntent>>,
}

impl OwnershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassign ownership of the intent's fields to `intent`.
    ///
    /// A displaced intent that no longer owns any field is revoked: we can't
    /// cancel its pending request, but we can make it known that it should
    /// stop trying so hard to complete. Returns the revoked intents.
    pub fn claim(&mut self, intent: &Arc<WriteIntent>) -> Vec<Arc<WriteIntent>> {
        let mut displaced: Vec<Arc<WriteIntent>> = Vec::new();
        for field in intent.fields().keys() {
            if let Some(old) = self.owners.insert(field.clone(), Arc::clone(intent)) {
                if !old.is_settled() && !displaced.iter().any(|d| Arc::ptr_eq(d, &old)) {
                    displaced.push(old);
                }
            }
        }

        let mut revoked = Vec::new();
        for old in displaced {
            let still_owner = self.owners.values().any(|o| Arc::ptr_eq(o, &old));
            if !still_owner {
                old.revoke();
                revoked.push(old);
            }
        }
        revoked
    }

    pub fn owner(&self, field: &str) -> Option<&Arc<WriteIntent>> {
        self.owners.get(field)
    }

    /// Iterate (field, owning intent) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<WriteIntent>)> {
        self.owners.iter().map(|(field, owner)| (field.as_str(), owner))
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }
}

/// Maps each field to the highest confirmed server version seen so far,
/// based on all the responses received to date.
#[derive(Debug, Default)]
pub struct ConfirmationTable {
    entries: HashMap<String, Confirmation>,
}

impl ConfirmationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation from a successful write.
    ///
    /// The entry is replaced only when `remote_version` is strictly greater
    /// than the stored one, so a late-arriving response for an older intent
    /// can never roll a field's confirmation backwards. Ties do not update.
    /// Returns true if the entry changed.
    pub fn observe(&mut self, field: &str, remote_version: u64, local_version: u64) -> bool {
        match self.entries.get_mut(field) {
            Some(entry) => {
                if remote_version > entry.remote_version {
                    *entry = Confirmation {
                        remote_version,
                        local_version,
                    };
                    true
                } else {
                    false
                }
            }
            None => {
                self.entries.insert(
                    field.to_string(),
                    Confirmation {
                        remote_version,
                        local_version,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<Confirmation> {
        self.entries.get(field).copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
