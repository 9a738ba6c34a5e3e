//! Cached session summaries.

use serde::{Deserialize, Serialize};

use crate::clock::monotonic_timestamp;
use crate::message::SessionId;

/// A generated summary together with the history size it was built from.
///
/// Stored as `{"summary", "msg_count", "timestamp"}` so records written by
/// other workers sharing the same backend stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: SessionId,
    #[serde(rename = "summary")]
    pub summary_text: String,
    #[serde(rename = "msg_count")]
    pub message_count_at_generation: usize,
    #[serde(rename = "timestamp")]
    pub generated_at: f64,
}

impl SummaryRecord {
    pub fn new(
        session_id: impl Into<SessionId>,
        summary_text: impl Into<String>,
        message_count: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            summary_text: summary_text.into(),
            message_count_at_generation: message_count,
            generated_at: monotonic_timestamp(),
        }
    }

    /// A record is only usable while the session still has the same size.
    pub fn is_valid_for(&self, current_count: usize) -> bool {
        self.message_count_at_generation == current_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_tracks_message_count() {
        let record = SummaryRecord::new("s1", "User discussing pfSense", 5);
        assert!(record.is_valid_for(5));
        assert!(!record.is_valid_for(6));
        assert!(!record.is_valid_for(4));
    }

    #[test]
    fn test_wire_field_names() {
        let record = SummaryRecord::new("s1", "text", 3);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["summary"], "text");
        assert_eq!(value["msg_count"], 3);
        assert!(value.get("timestamp").is_some());

        let parsed: SummaryRecord =
            serde_json::from_str(r#"{"summary":"x","msg_count":2,"timestamp":1.0}"#).unwrap();
        assert!(parsed.session_id.is_empty());
        assert_eq!(parsed.message_count_at_generation, 2);
    }
}
