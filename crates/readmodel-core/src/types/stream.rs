use crate::error::{ReadModelError, Result};
use crate::types::cursor::parse_instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque stream identifier, assigned once at creation and never reused.
pub type StreamId = String;

/// Lifecycle of a projection stream
///
/// `Initializing -> Running -> {Completed | Error | Stopped}`. Terminal
/// states have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    Initializing,
    Running,
    Completed,
    Error,
    Stopped,
}

impl StreamStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamStatus::Completed | StreamStatus::Error | StreamStatus::Stopped
        )
    }

    pub fn can_transition_to(self, next: StreamStatus) -> bool {
        use StreamStatus::*;
        match (self, next) {
            (Initializing, Running) => true,
            (Initializing | Running, Completed | Error | Stopped) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamStatus::Initializing => "INITIALIZING",
            StreamStatus::Running => "RUNNING",
            StreamStatus::Completed => "COMPLETED",
            StreamStatus::Error => "ERROR",
            StreamStatus::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which events a stream pulls from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSelector {
    pub tenant: String,
    pub data_core: String,
    pub flow_type: String,
    /// Ordered, non-empty, all within `flow_type`
    pub event_types: Vec<String>,
}

impl SourceSelector {
    pub fn new(
        tenant: impl Into<String>,
        data_core: impl Into<String>,
        flow_type: impl Into<String>,
        event_types: Vec<String>,
    ) -> Result<Self> {
        let selector = Self {
            tenant: tenant.into(),
            data_core: data_core.into(),
            flow_type: flow_type.into(),
            event_types,
        };
        selector.validate()?;
        Ok(selector)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("tenant", &self.tenant),
            ("dataCore", &self.data_core),
            ("flowType", &self.flow_type),
        ] {
            if value.trim().is_empty() {
                return Err(ReadModelError::InvalidRequest(format!("{} must not be empty", field)));
            }
        }
        if self.event_types.is_empty() {
            return Err(ReadModelError::InvalidRequest(
                "eventTypes must contain at least one event type".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for event_type in &self.event_types {
            if !seen.insert(event_type.as_str()) {
                return Err(ReadModelError::InvalidRequest(format!(
                    "eventTypes lists '{}' more than once",
                    event_type
                )));
            }
        }
        Ok(())
    }

    pub fn accepts(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|t| t == event_type)
    }
}

/// Inclusive time window of a stream, as requested and as parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_date: String,
    pub end_date: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn parse(start_date: &str, end_date: &str) -> Result<Self> {
        let start = parse_instant(start_date)?;
        let end = parse_instant(end_date)?;
        if start > end {
            return Err(ReadModelError::InvalidRequest(format!(
                "startDate {} is after endDate {}",
                start_date, end_date
            )));
        }
        Ok(Self {
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            start,
            end,
        })
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_sinks() {
        for terminal in [StreamStatus::Completed, StreamStatus::Error, StreamStatus::Stopped] {
            assert!(terminal.is_terminal());
            for next in [
                StreamStatus::Initializing,
                StreamStatus::Running,
                StreamStatus::Completed,
                StreamStatus::Error,
                StreamStatus::Stopped,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn running_is_not_reentered() {
        assert!(StreamStatus::Initializing.can_transition_to(StreamStatus::Running));
        assert!(!StreamStatus::Running.can_transition_to(StreamStatus::Running));
        assert!(!StreamStatus::Running.can_transition_to(StreamStatus::Initializing));
        assert!(StreamStatus::Initializing.can_transition_to(StreamStatus::Error));
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&StreamStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
    }

    #[test]
    fn selector_requires_event_types() {
        assert!(SourceSelector::new("acme", "orders", "order", vec![]).is_err());
        assert!(SourceSelector::new(
            "acme",
            "orders",
            "order",
            vec!["a".into(), "a".into()]
        )
        .is_err());
        let sel =
            SourceSelector::new("acme", "orders", "order", vec!["order.created".into()]).unwrap();
        assert!(sel.accepts("order.created"));
        assert!(!sel.accepts("order.deleted"));
    }

    #[test]
    fn window_rejects_reversed_dates() {
        assert!(TimeWindow::parse("2025-01-02", "2025-01-01").is_err());
        let window = TimeWindow::parse("2025-01-01", "2025-01-01").unwrap();
        assert_eq!(window.start, window.end);
    }
}
