//! Usage record types shared by the store, the sandbox and the cost calculator.
//!
//! Records are created once, when a model call or tool call completes, and
//! are never mutated afterwards.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MeterError, Result};

/// Identifier grouping every record of one logical run.
pub type ExecutionId = String;

/// Date format used for day buckets.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Token counts for one completed model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens
    pub prompt_tokens: u64,

    /// Output tokens
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Accounting entry for one model call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenUsageRecord {
    /// Execution this call belongs to
    pub execution_id: ExecutionId,

    /// Epoch milliseconds when the call completed
    pub timestamp: i64,

    /// Model identifier (e.g., "gpt-4o")
    pub model_id: String,

    /// Input tokens
    pub prompt_tokens: u64,

    /// Output tokens
    pub completion_tokens: u64,

    /// Input + output tokens
    pub total_tokens: u64,

    /// Agent that issued the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Workspace the agent ran in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl TokenUsageRecord {
    /// Create a new record with required fields.
    pub fn new(
        execution_id: impl Into<String>,
        timestamp: i64,
        model_id: impl Into<String>,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            timestamp,
            model_id: model_id.into(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            agent_id: None,
            workspace_id: None,
        }
    }

    /// Set agent ID.
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Set workspace ID.
    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn usage(&self) -> TokenUsage {
        TokenUsage::new(self.prompt_tokens, self.completion_tokens)
    }

    /// Calendar day (local time) this record belongs to.
    pub fn day(&self) -> Result<NaiveDate> {
        local_day(self.timestamp)
    }
}

/// Accounting entry for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolUsageRecord {
    /// Execution this invocation belongs to
    pub execution_id: ExecutionId,

    /// Epoch milliseconds when the invocation settled
    pub timestamp: i64,

    /// Tool name
    pub tool_name: String,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,

    /// Whether the tool completed successfully
    pub success: bool,

    /// Error message for failed invocations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl ToolUsageRecord {
    /// Create a new record with required fields.
    pub fn new(
        execution_id: impl Into<String>,
        timestamp: i64,
        tool_name: impl Into<String>,
        duration_ms: u64,
        success: bool,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            timestamp,
            tool_name: tool_name.into(),
            duration_ms,
            success,
            error: None,
            agent_id: None,
            workspace_id: None,
        }
    }

    /// Mark as failed with error.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    /// Set agent ID.
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Set workspace ID.
    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Calendar day (local time) this record belongs to.
    pub fn day(&self) -> Result<NaiveDate> {
        local_day(self.timestamp)
    }
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Map epoch milliseconds to the local calendar day.
pub fn local_day(timestamp: i64) -> Result<NaiveDate> {
    Local
        .timestamp_millis_opt(timestamp)
        .earliest()
        .map(|dt: DateTime<Local>| dt.date_naive())
        .ok_or(MeterError::InvalidTimestamp { timestamp })
}

/// Format a day as the zero-padded `YYYY-MM-DD` bucket key.
pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` bucket key.
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DAY_FORMAT).map_err(|_| MeterError::InvalidDate {
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_record_totals() {
        let record = TokenUsageRecord::new("exec-1", 0, "gpt-4o", 500, 200).with_agent("researcher");

        assert_eq!(record.total_tokens, 700);
        assert_eq!(record.usage(), TokenUsage::new(500, 200));
        assert_eq!(record.agent_id.as_deref(), Some("researcher"));
    }

    #[test]
    fn test_tool_record_with_error() {
        let record = ToolUsageRecord::new("exec-1", 0, "fetch", 12, true).with_error("boom");

        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_optional_fields_skipped_in_json() {
        let record = TokenUsageRecord::new("exec-1", 1, "gpt-4o", 1, 1);
        let json = serde_json::to_string(&record).unwrap();

        assert!(!json.contains("agent_id"));
        let back: TokenUsageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_local_day_matches_chrono() {
        let ts = 1_736_942_400_000; // 2025-01-15T12:00:00Z
        let expected = Local.timestamp_millis_opt(ts).unwrap().date_naive();

        assert_eq!(local_day(ts).unwrap(), expected);
    }

    #[test]
    fn test_local_day_out_of_range() {
        assert!(matches!(
            local_day(i64::MAX),
            Err(MeterError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_day_key_zero_padded() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(day_key(day), "2025-03-07");
        assert_eq!(parse_day("2025-03-07").unwrap(), day);
        assert!(parse_day("2025-3-7x").is_err());
    }
}
