//! Reconciliation sweep between the execution index and the day index.
//!
//! Appends are two independent file writes, so a crash between them can
//! leave a record in only one index. The sweep compares both sides as
//! multisets (identical records may legitimately repeat) and appends whatever
//! one side is missing.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::NaiveDate;
use meter_core::Result;
use tracing::{info, warn};

use crate::models::{ReconcileReport, UsageBucket};
use crate::store::{MetricsStore, validate_execution_id};

impl MetricsStore {
    /// Cross-check both indices and copy missing records across.
    ///
    /// Run it while no appends are in flight. A record caught between its two
    /// writes would be copied here and then written again by its append.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        // Day files regrouped by execution id.
        let mut by_execution: HashMap<String, UsageBucket> = HashMap::new();
        let days = self.list_days().await?;
        report.days_scanned = days.len();
        for day in &days {
            let bucket = self.get_daily_records(*day).await?;
            for record in bucket.tokens {
                by_execution
                    .entry(record.execution_id.clone())
                    .or_default()
                    .tokens
                    .push(record);
            }
            for record in bucket.tools {
                by_execution
                    .entry(record.execution_id.clone())
                    .or_default()
                    .tools
                    .push(record);
            }
        }

        // Execution files regrouped by day.
        let mut by_day: HashMap<NaiveDate, UsageBucket> = HashMap::new();
        let execution_ids = self.get_all_execution_ids().await?;
        report.executions_scanned = execution_ids.len();
        for execution_id in &execution_ids {
            let bucket = self.get_execution_records(execution_id).await?;
            for record in bucket.tokens {
                match record.day() {
                    Ok(day) => by_day.entry(day).or_default().tokens.push(record),
                    Err(e) => {
                        warn!(execution_id = %execution_id, error = %e, "skipping token record");
                        report.skipped += 1;
                    }
                }
            }
            for record in bucket.tools {
                match record.day() {
                    Ok(day) => by_day.entry(day).or_default().tools.push(record),
                    Err(e) => {
                        warn!(execution_id = %execution_id, error = %e, "skipping tool record");
                        report.skipped += 1;
                    }
                }
            }
        }

        for (execution_id, expected) in by_execution {
            if let Err(e) = validate_execution_id(&execution_id) {
                warn!(error = %e, "day index references an unusable execution id");
                report.skipped += expected.len();
                continue;
            }
            let (tokens, tools) = self
                .repair(&self.execution_path(&execution_id), expected)
                .await?;
            report.tokens_added_to_executions += tokens;
            report.tools_added_to_executions += tools;
        }

        for (day, expected) in by_day {
            let (tokens, tools) = self.repair(&self.daily_path(day), expected).await?;
            report.tokens_added_to_days += tokens;
            report.tools_added_to_days += tools;
        }

        info!(
            executions = report.executions_scanned,
            days = report.days_scanned,
            repaired = report.repaired(),
            skipped = report.skipped,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Append to the file at `path` every expected record it lacks.
    async fn repair(
        &self,
        path: &std::path::Path,
        expected: UsageBucket,
    ) -> Result<(usize, usize)> {
        let mut added = (0, 0);
        self.update(path, |bucket| {
            let tokens = missing_from(&expected.tokens, &bucket.tokens);
            let tools = missing_from(&expected.tools, &bucket.tools);
            added = (tokens.len(), tools.len());
            bucket.tokens.extend(tokens);
            bucket.tools.extend(tools);
            added != (0, 0)
        })
        .await?;

        if added != (0, 0) {
            warn!(
                path = %path.display(),
                tokens = added.0,
                tools = added.1,
                "repaired records missing from index"
            );
        }
        Ok(added)
    }
}

/// Multiset difference `expected - present`, preserving `expected` order.
fn missing_from<T>(expected: &[T], present: &[T]) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let mut counts: HashMap<&T, usize> = HashMap::new();
    for record in present {
        *counts.entry(record).or_default() += 1;
    }

    let mut missing = Vec::new();
    for record in expected {
        match counts.get_mut(record) {
            Some(count) if *count > 0 => *count -= 1,
            _ => missing.push(record.clone()),
        }
    }
    missing
}
