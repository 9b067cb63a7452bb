//! Event log entry types
//!
//! Append-only records of reconciliation and failover outcomes, consumed
//! by an external log viewer. Distinct from diagnostic `tracing` output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ChannelId, SourceId};

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown event level: {s}")),
        }
    }
}

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Provider catalog scans and reconciliation
    Provider,
    /// Mapping changes (auto-match, promotion, manual overrides)
    Mapping,
    /// Serving-time failover and quality upgrades
    Failover,
}

impl EventCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Mapping => "mapping",
            Self::Failover => "failover",
        }
    }
}

impl std::str::FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider" => Ok(Self::Provider),
            "mapping" => Ok(Self::Mapping),
            "failover" => Ok(Self::Failover),
            _ => Err(format!("Unknown event category: {s}")),
        }
    }
}

/// Machine-readable reason attached to an event's structured details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    ConnectionTimeout,
    ConnectionError,
    HttpError,
    StreamError,
    AllStreamsExhausted,
    SourceRemoved,
    PrimaryPromoted,
    AutoMatched,
    ManualPreserved,
    ManualOverride,
    MetadataUpdated,
    QualityUpgraded,
    ScanCompleted,
    ChannelFailed,
}

/// Structured details carried alongside the human message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_source_id: Option<SourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_source_id: Option<SourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl EventDetails {
    #[must_use]
    pub fn for_channel(channel_id: ChannelId) -> Self {
        Self {
            channel_id: Some(channel_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: ReasonCode) -> Self {
        self.reason = Some(reason);
        self
    }

    #[must_use]
    pub fn from_source(mut self, source_id: SourceId) -> Self {
        self.from_source_id = Some(source_id);
        self
    }

    #[must_use]
    pub fn to_source(mut self, source_id: SourceId) -> Self {
        self.to_source_id = Some(source_id);
        self
    }
}

/// One append-only event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: String,
    pub level: EventLevel,
    pub category: EventCategory,
    pub message: String,
    pub details: EventDetails,
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    #[must_use]
    pub fn new(
        level: EventLevel,
        category: EventCategory,
        message: impl Into<String>,
        details: EventDetails,
    ) -> Self {
        Self {
            id: super::generate_id(),
            level,
            category,
            message: message.into(),
            details,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_serialization() {
        let json = serde_json::to_string(&EventLevel::Warn).unwrap();
        assert!(json.contains("warn"));
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&ReasonCode::AllStreamsExhausted).unwrap();
        assert!(json.contains("all_streams_exhausted"));
    }

    #[test]
    fn test_details_builder() {
        let channel_id = ChannelId::new();
        let from = SourceId::new();
        let to = SourceId::new();
        let details = EventDetails::for_channel(channel_id.clone())
            .from_source(from.clone())
            .to_source(to.clone())
            .with_reason(ReasonCode::ConnectionTimeout);

        assert_eq!(details.channel_id, Some(channel_id));
        assert_eq!(details.from_source_id, Some(from));
        assert_eq!(details.to_source_id, Some(to));
        assert_eq!(details.reason, Some(ReasonCode::ConnectionTimeout));
    }
}
