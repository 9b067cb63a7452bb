use serde::{Deserialize, Serialize};

use super::id::{AccountId, SourceId};
use super::source::{ScannedSource, Source};

/// Before/after pair for a source whose provider stream id survived a scan
/// but whose name, icon, or quality tags changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChange {
    pub before: Source,
    pub after: ScannedSource,
}

/// Output of one change-detection pass for one account.
///
/// Ephemeral: constructed per scan, consumed by the reconciler, and only
/// its counts survive in the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub account_id: AccountId,
    pub new_sources: Vec<ScannedSource>,
    pub removed_source_ids: Vec<SourceId>,
    pub changed_sources: Vec<SourceChange>,
}

impl ChangeSet {
    #[must_use]
    pub fn empty(account_id: AccountId) -> Self {
        Self {
            account_id,
            new_sources: Vec::new(),
            removed_source_ids: Vec::new(),
            changed_sources: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_sources.is_empty()
            && self.removed_source_ids.is_empty()
            && self.changed_sources.is_empty()
    }
}
