//! Aggregate queries for dashboards.
//!
//! Every query reads the day index for the filtered date range, applies the
//! record filters, and prices token records through the shared
//! [`CostCalculator`]. Empty ranges yield zeroed results.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use meter_core::{Result, TokenUsageRecord, ToolUsageRecord};
use meter_cost::{CostCalculator, round_cost};

use crate::models::{
    AgentUsage, DailyCost, DailyTokens, ExecutionSummary, MetricsFilter, ModelUsage, ToolStats,
    UsageSummary,
};
use crate::store::MetricsStore;

/// Query interface for usage analysis.
pub struct MetricsQuery<'a> {
    store: &'a MetricsStore,
    calculator: &'a CostCalculator,
}

/// Filtered records of one day.
struct DaySlice {
    date: NaiveDate,
    tokens: Vec<TokenUsageRecord>,
    tools: Vec<ToolUsageRecord>,
}

impl<'a> MetricsQuery<'a> {
    /// Create a new query interface.
    pub fn new(store: &'a MetricsStore, calculator: &'a CostCalculator) -> Self {
        Self { store, calculator }
    }

    /// Headline totals.
    pub async fn summary(&self, filter: &MetricsFilter) -> Result<UsageSummary> {
        let slices = self.load(filter).await?;
        let mut summary = UsageSummary::default();
        let mut executions: HashSet<&str> = HashSet::new();
        let mut cost = 0.0;
        let mut duration_total: u64 = 0;

        for slice in &slices {
            for record in &slice.tokens {
                executions.insert(&record.execution_id);
                summary.model_calls += 1;
                summary.prompt_tokens += record.prompt_tokens;
                summary.completion_tokens += record.completion_tokens;
                summary.total_tokens += record.total_tokens;
                cost += self.cost_of(record);
            }
            for record in &slice.tools {
                executions.insert(&record.execution_id);
                summary.tool_calls += 1;
                if !record.success {
                    summary.tool_failures += 1;
                }
                duration_total += record.duration_ms;
            }
        }

        summary.executions = executions.len() as u64;
        summary.total_cost = round_cost(cost);
        if summary.tool_calls > 0 {
            let calls = summary.tool_calls as f64;
            summary.tool_success_rate = (summary.tool_calls - summary.tool_failures) as f64 / calls;
            summary.avg_tool_duration_ms = duration_total as f64 / calls;
        }
        Ok(summary)
    }

    /// Token totals per day, ascending.
    pub async fn tokens(&self, filter: &MetricsFilter) -> Result<Vec<DailyTokens>> {
        let slices = self.load(filter).await?;
        Ok(slices
            .iter()
            .map(|slice| {
                let mut daily = DailyTokens {
                    date: slice.date,
                    model_calls: 0,
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                };
                for record in &slice.tokens {
                    daily.model_calls += 1;
                    daily.prompt_tokens += record.prompt_tokens;
                    daily.completion_tokens += record.completion_tokens;
                    daily.total_tokens += record.total_tokens;
                }
                daily
            })
            .collect())
    }

    /// Cost totals per day, ascending.
    pub async fn costs(&self, filter: &MetricsFilter) -> Result<Vec<DailyCost>> {
        let slices = self.load(filter).await?;
        Ok(slices
            .iter()
            .map(|slice| DailyCost {
                date: slice.date,
                model_calls: slice.tokens.len() as u64,
                total_cost: round_cost(slice.tokens.iter().map(|r| self.cost_of(r)).sum()),
            })
            .collect())
    }

    /// Per-model breakdown, most expensive first.
    pub async fn models(&self, filter: &MetricsFilter) -> Result<Vec<ModelUsage>> {
        let slices = self.load(filter).await?;
        let mut by_model: HashMap<&str, ModelUsage> = HashMap::new();

        for record in slices.iter().flat_map(|s| &s.tokens) {
            let entry = by_model
                .entry(record.model_id.as_str())
                .or_insert_with(|| ModelUsage {
                    model_id: record.model_id.clone(),
                    calls: 0,
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                    total_cost: 0.0,
                });
            entry.calls += 1;
            entry.prompt_tokens += record.prompt_tokens;
            entry.completion_tokens += record.completion_tokens;
            entry.total_tokens += record.total_tokens;
            entry.total_cost += self.cost_of(record);
        }

        let mut models: Vec<ModelUsage> = by_model
            .into_values()
            .map(|mut m| {
                m.total_cost = round_cost(m.total_cost);
                m
            })
            .collect();
        models.sort_by(|a, b| {
            b.total_cost
                .total_cmp(&a.total_cost)
                .then_with(|| a.model_id.cmp(&b.model_id))
        });
        Ok(models)
    }

    /// Per-tool invocation statistics, sorted by tool name.
    pub async fn tools(&self, filter: &MetricsFilter) -> Result<Vec<ToolStats>> {
        let slices = self.load(filter).await?;
        let mut by_tool: BTreeMap<&str, (u64, u64, u64, u64)> = BTreeMap::new();

        for record in slices.iter().flat_map(|s| &s.tools) {
            let (calls, failures, total, max) = by_tool.entry(record.tool_name.as_str()).or_default();
            *calls += 1;
            if !record.success {
                *failures += 1;
            }
            *total += record.duration_ms;
            *max = (*max).max(record.duration_ms);
        }

        Ok(by_tool
            .into_iter()
            .map(|(name, (calls, failures, total, max))| ToolStats {
                tool_name: name.to_string(),
                calls,
                failures,
                avg_duration_ms: total as f64 / calls as f64,
                max_duration_ms: max,
            })
            .collect())
    }

    /// Per-agent usage. Records without an agent are grouped under `None`,
    /// which sorts first.
    pub async fn agents(&self, filter: &MetricsFilter) -> Result<Vec<AgentUsage>> {
        let slices = self.load(filter).await?;
        let mut by_agent: BTreeMap<Option<&str>, AgentUsage> = BTreeMap::new();

        for slice in &slices {
            for record in &slice.tokens {
                let entry = by_agent
                    .entry(record.agent_id.as_deref())
                    .or_insert_with(|| empty_agent(record.agent_id.clone()));
                entry.model_calls += 1;
                entry.total_tokens += record.total_tokens;
                entry.total_cost += self.cost_of(record);
            }
            for record in &slice.tools {
                by_agent
                    .entry(record.agent_id.as_deref())
                    .or_insert_with(|| empty_agent(record.agent_id.clone()))
                    .tool_calls += 1;
            }
        }

        Ok(by_agent
            .into_values()
            .map(|mut a| {
                a.total_cost = round_cost(a.total_cost);
                a
            })
            .collect())
    }

    /// Per-execution rollups, most recent first.
    pub async fn executions(&self, filter: &MetricsFilter) -> Result<Vec<ExecutionSummary>> {
        let slices = self.load(filter).await?;
        let mut by_execution: HashMap<&str, ExecutionSummary> = HashMap::new();

        for slice in &slices {
            for record in &slice.tokens {
                let entry = by_execution
                    .entry(record.execution_id.as_str())
                    .or_insert_with(|| empty_execution(&record.execution_id, record.timestamp));
                touch(entry, record.timestamp);
                entry.model_calls += 1;
                entry.total_tokens += record.total_tokens;
                entry.total_cost += self.cost_of(record);
            }
            for record in &slice.tools {
                let entry = by_execution
                    .entry(record.execution_id.as_str())
                    .or_insert_with(|| empty_execution(&record.execution_id, record.timestamp));
                touch(entry, record.timestamp);
                entry.tool_calls += 1;
                if !record.success {
                    entry.tool_failures += 1;
                }
            }
        }

        let mut executions: Vec<ExecutionSummary> = by_execution
            .into_values()
            .map(|mut e| {
                e.total_cost = round_cost(e.total_cost);
                e
            })
            .collect();
        executions.sort_by(|a, b| {
            b.first_timestamp
                .cmp(&a.first_timestamp)
                .then_with(|| a.execution_id.cmp(&b.execution_id))
        });
        Ok(executions)
    }

    fn cost_of(&self, record: &TokenUsageRecord) -> f64 {
        self.calculator
            .calculate_actual(&record.model_id, record.usage())
    }

    async fn load(&self, filter: &MetricsFilter) -> Result<Vec<DaySlice>> {
        let mut slices = Vec::new();
        for date in self.store.list_days().await? {
            if !filter.includes_day(date) {
                continue;
            }
            let bucket = self.store.get_daily_records(date).await?;
            slices.push(DaySlice {
                date,
                tokens: bucket
                    .tokens
                    .into_iter()
                    .filter(|r| filter.matches_token(r))
                    .collect(),
                tools: bucket
                    .tools
                    .into_iter()
                    .filter(|r| filter.matches_tool(r))
                    .collect(),
            });
        }
        Ok(slices)
    }
}

fn empty_agent(agent_id: Option<String>) -> AgentUsage {
    AgentUsage {
        agent_id,
        model_calls: 0,
        total_tokens: 0,
        total_cost: 0.0,
        tool_calls: 0,
    }
}

fn empty_execution(execution_id: &str, timestamp: i64) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: execution_id.to_string(),
        first_timestamp: timestamp,
        last_timestamp: timestamp,
        model_calls: 0,
        total_tokens: 0,
        total_cost: 0.0,
        tool_calls: 0,
        tool_failures: 0,
    }
}

fn touch(summary: &mut ExecutionSummary, timestamp: i64) {
    summary.first_timestamp = summary.first_timestamp.min(timestamp);
    summary.last_timestamp = summary.last_timestamp.max(timestamp);
}
