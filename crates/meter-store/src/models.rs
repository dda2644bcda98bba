//! Data models for stored buckets and aggregate query results.

use chrono::NaiveDate;
use meter_core::{TokenUsageRecord, ToolUsageRecord};
use serde::{Deserialize, Serialize};

/// Contents of one execution file or one daily file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageBucket {
    /// Token usage records, in append order
    #[serde(default)]
    pub tokens: Vec<TokenUsageRecord>,

    /// Tool usage records, in append order
    #[serde(default)]
    pub tools: Vec<ToolUsageRecord>,
}

impl UsageBucket {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len() + self.tools.len()
    }
}

/// Filter applied by aggregate queries.
///
/// Date bounds are inclusive. `model_id` narrows token records only; tool
/// records carry no model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub agent_id: Option<String>,
    pub model_id: Option<String>,
    pub workspace_id: Option<String>,
}

impl MetricsFilter {
    /// Filter matching everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter on an inclusive date range.
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Whether a day bucket falls inside the date bounds.
    pub fn includes_day(&self, day: NaiveDate) -> bool {
        self.from.is_none_or(|from| day >= from) && self.to.is_none_or(|to| day <= to)
    }

    pub fn matches_token(&self, record: &TokenUsageRecord) -> bool {
        matches_opt(&self.agent_id, &record.agent_id)
            && matches_opt(&self.workspace_id, &record.workspace_id)
            && self
                .model_id
                .as_ref()
                .is_none_or(|model| *model == record.model_id)
    }

    pub fn matches_tool(&self, record: &ToolUsageRecord) -> bool {
        matches_opt(&self.agent_id, &record.agent_id)
            && matches_opt(&self.workspace_id, &record.workspace_id)
    }
}

fn matches_opt(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        Some(wanted) => actual.as_deref() == Some(wanted.as_str()),
        None => true,
    }
}

/// Headline numbers for a filtered range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Distinct execution ids seen
    pub executions: u64,
    pub model_calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub tool_calls: u64,
    pub tool_failures: u64,
    /// Successful tool calls / tool calls (0 when no tool calls)
    pub tool_success_rate: f64,
    pub avg_tool_duration_ms: f64,
}

/// Token totals for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTokens {
    pub date: NaiveDate,
    pub model_calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Cost total for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    pub date: NaiveDate,
    pub model_calls: u64,
    pub total_cost: f64,
}

/// Usage breakdown for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model_id: String,
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

/// Invocation statistics for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    pub tool_name: String,
    pub calls: u64,
    pub failures: u64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: u64,
}

/// Usage attributed to one agent (`None` for records without an agent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentUsage {
    pub agent_id: Option<String>,
    pub model_calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub tool_calls: u64,
}

/// Rollup of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: String,
    /// Earliest record timestamp (epoch ms)
    pub first_timestamp: i64,
    /// Latest record timestamp (epoch ms)
    pub last_timestamp: i64,
    pub model_calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub tool_calls: u64,
    pub tool_failures: u64,
}

/// Outcome of a reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub executions_scanned: usize,
    pub days_scanned: usize,
    /// Token records copied from day files into execution files
    pub tokens_added_to_executions: usize,
    /// Tool records copied from day files into execution files
    pub tools_added_to_executions: usize,
    /// Token records copied from execution files into day files
    pub tokens_added_to_days: usize,
    /// Tool records copied from execution files into day files
    pub tools_added_to_days: usize,
    /// Records skipped because their key or timestamp was unusable
    pub skipped: usize,
}

impl ReconcileReport {
    pub fn repaired(&self) -> usize {
        self.tokens_added_to_executions
            + self.tools_added_to_executions
            + self.tokens_added_to_days
            + self.tools_added_to_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_filter_date_bounds_inclusive() {
        let filter = MetricsFilter::between(day(2), day(4));

        assert!(!filter.includes_day(day(1)));
        assert!(filter.includes_day(day(2)));
        assert!(filter.includes_day(day(4)));
        assert!(!filter.includes_day(day(5)));
        assert!(MetricsFilter::all().includes_day(day(31)));
    }

    #[test]
    fn test_filter_model_applies_to_tokens_only() {
        let filter = MetricsFilter::all().with_model("gpt-4o");
        let token = TokenUsageRecord::new("e", 0, "gpt-4o-mini", 1, 1);
        let tool = ToolUsageRecord::new("e", 0, "search", 5, true);

        assert!(!filter.matches_token(&token));
        assert!(filter.matches_tool(&tool));
    }

    #[test]
    fn test_filter_agent_requires_tag() {
        let filter = MetricsFilter::all().with_agent("writer");
        let untagged = TokenUsageRecord::new("e", 0, "gpt-4o", 1, 1);
        let tagged = untagged.clone().with_agent("writer");

        assert!(!filter.matches_token(&untagged));
        assert!(filter.matches_token(&tagged));
    }

    #[test]
    fn test_bucket_deserializes_partial() {
        let bucket: UsageBucket = serde_json::from_str(r#"{"tokens": []}"#).unwrap();
        assert!(bucket.is_empty());
        assert_eq!(bucket.len(), 0);
    }
}
