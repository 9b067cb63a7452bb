use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ChannelId, MappingId, SourceId};

/// Link between one channel and one source.
///
/// Invariants, enforced by the store and the services that write mappings:
/// - at most one mapping per channel has `is_primary = true`
/// - priorities per channel are contiguous integers starting at 0
/// - the primary, if any, holds priority 0
/// - `is_manual` mappings are never deleted or re-prioritized by
///   reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub id: MappingId,
    pub channel_id: ChannelId,
    pub source_id: SourceId,
    pub is_primary: bool,
    pub priority: i32,
    pub is_manual: bool,
    /// Name-match confidence in [0, 1]; 1.0 for manual mappings
    pub match_confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl Mapping {
    /// Auto-matched mapping created by reconciliation.
    #[must_use]
    pub fn auto(
        channel_id: ChannelId,
        source_id: SourceId,
        is_primary: bool,
        priority: i32,
        match_confidence: f64,
    ) -> Self {
        Self {
            id: MappingId::new(),
            channel_id,
            source_id,
            is_primary,
            priority,
            is_manual: false,
            match_confidence,
            created_at: Utc::now(),
        }
    }

    /// Mapping pinned by an explicit human action.
    #[must_use]
    pub fn manual(channel_id: ChannelId, source_id: SourceId, is_primary: bool, priority: i32) -> Self {
        Self {
            id: MappingId::new(),
            channel_id,
            source_id,
            is_primary,
            priority,
            is_manual: true,
            match_confidence: 1.0,
            created_at: Utc::now(),
        }
    }
}
