//! Durable, append-only usage ledger.
//!
//! Every record is written twice: once into the file of its execution and
//! once into the file of its calendar day. Each file write is atomic; the
//! pair is not. [`MetricsStore::reconcile`](crate::MetricsStore::reconcile)
//! repairs records that reached only one index.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use meter_core::{
    MeterError, Result, TokenUsageRecord, ToolUsageRecord, day_key, log_usage_event, parse_day,
};
use tracing::{debug, info, warn};

use crate::fs::{ensure_dir, list_json_stems, read_json_or_default, write_json_atomic};
use crate::locks::KeyedLocks;
use crate::models::UsageBucket;

const DAILY_DIR: &str = "daily";
const EXECUTIONS_DIR: &str = "executions";

/// File-backed usage ledger indexed by execution id and by day.
///
/// ```text
/// <root>/daily/<YYYY-MM-DD>.json
/// <root>/executions/<execution_id>.json
/// ```
#[derive(Debug)]
pub struct MetricsStore {
    root: PathBuf,
    locks: KeyedLocks,
}

impl MetricsStore {
    /// Open or create a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        ensure_dir(&root.join(DAILY_DIR)).await?;
        ensure_dir(&root.join(EXECUTIONS_DIR)).await?;
        info!(root = %root.display(), "metrics store opened");

        Ok(Self {
            root,
            locks: KeyedLocks::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append a token usage record to its execution and day files.
    pub async fn append_token_usage(&self, record: &TokenUsageRecord) -> Result<()> {
        validate_execution_id(&record.execution_id)?;
        let day = record.day()?;

        self.update(&self.execution_path(&record.execution_id), |bucket| {
            bucket.tokens.push(record.clone());
            true
        })
        .await?;
        self.update(&self.daily_path(day), |bucket| {
            bucket.tokens.push(record.clone());
            true
        })
        .await?;

        log_usage_event!(
            kind = "token",
            execution_id = %record.execution_id,
            model_id = %record.model_id,
            day = %day,
            total_tokens = record.total_tokens
        );
        Ok(())
    }

    /// Append a tool usage record to its execution and day files.
    pub async fn append_tool_usage(&self, record: &ToolUsageRecord) -> Result<()> {
        validate_execution_id(&record.execution_id)?;
        let day = record.day()?;

        self.update(&self.execution_path(&record.execution_id), |bucket| {
            bucket.tools.push(record.clone());
            true
        })
        .await?;
        self.update(&self.daily_path(day), |bucket| {
            bucket.tools.push(record.clone());
            true
        })
        .await?;

        log_usage_event!(
            kind = "tool",
            execution_id = %record.execution_id,
            tool = %record.tool_name,
            day = %day,
            success = record.success
        );
        Ok(())
    }

    /// Token records of one execution, in append order. Empty when unknown.
    pub async fn get_token_records(&self, execution_id: &str) -> Result<Vec<TokenUsageRecord>> {
        Ok(self.get_execution_records(execution_id).await?.tokens)
    }

    /// Tool records of one execution, in append order. Empty when unknown.
    pub async fn get_tool_records(&self, execution_id: &str) -> Result<Vec<ToolUsageRecord>> {
        Ok(self.get_execution_records(execution_id).await?.tools)
    }

    /// Token and tool records of one execution.
    pub async fn get_execution_records(&self, execution_id: &str) -> Result<UsageBucket> {
        validate_execution_id(execution_id)?;
        read_json_or_default(&self.execution_path(execution_id)).await
    }

    pub async fn get_daily_token_records(&self, day: NaiveDate) -> Result<Vec<TokenUsageRecord>> {
        Ok(self.get_daily_records(day).await?.tokens)
    }

    pub async fn get_daily_tool_records(&self, day: NaiveDate) -> Result<Vec<ToolUsageRecord>> {
        Ok(self.get_daily_records(day).await?.tools)
    }

    /// Token and tool records of one day.
    pub async fn get_daily_records(&self, day: NaiveDate) -> Result<UsageBucket> {
        read_json_or_default(&self.daily_path(day)).await
    }

    /// Every known execution id, sorted lexicographically.
    ///
    /// The order is only chronological when ids are generated with a
    /// monotonic time prefix.
    pub async fn get_all_execution_ids(&self) -> Result<Vec<String>> {
        let mut ids = list_json_stems(&self.root.join(EXECUTIONS_DIR)).await?;
        ids.sort();
        Ok(ids)
    }

    /// Every day that has a daily file, ascending.
    pub async fn list_days(&self) -> Result<Vec<NaiveDate>> {
        let stems = list_json_stems(&self.root.join(DAILY_DIR)).await?;
        let mut days: Vec<NaiveDate> = stems
            .iter()
            .filter_map(|stem| match parse_day(stem) {
                Ok(day) => Some(day),
                Err(_) => {
                    warn!(file = %stem, "ignoring daily file with unexpected name");
                    None
                }
            })
            .collect();
        days.sort();
        Ok(days)
    }

    /// Read-modify-write one file under its path lock.
    ///
    /// `apply` returns whether it changed the bucket; unchanged buckets are
    /// not rewritten.
    pub(crate) async fn update<F>(&self, path: &Path, apply: F) -> Result<bool>
    where
        F: FnOnce(&mut UsageBucket) -> bool,
    {
        let _guard = self.locks.lock(path).await?;

        let mut bucket: UsageBucket = read_json_or_default(path).await?;
        if !apply(&mut bucket) {
            return Ok(false);
        }
        write_json_atomic(path, &bucket).await?;
        debug!(path = %path.display(), records = bucket.len(), "bucket written");
        Ok(true)
    }

    pub(crate) fn execution_path(&self, execution_id: &str) -> PathBuf {
        self.root
            .join(EXECUTIONS_DIR)
            .join(format!("{execution_id}.json"))
    }

    pub(crate) fn daily_path(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(DAILY_DIR)
            .join(format!("{}.json", day_key(day)))
    }
}

/// Reject execution ids that cannot safely be used as a file name.
pub fn validate_execution_id(execution_id: &str) -> Result<()> {
    let reason = if execution_id.is_empty() {
        Some("is empty")
    } else if execution_id.contains(['/', '\\']) {
        Some("contains a path separator")
    } else if execution_id.contains('\0') {
        Some("contains a NUL byte")
    } else if execution_id.starts_with('.') {
        Some("starts with '.'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(MeterError::invalid_key(execution_id, reason)),
        None => Ok(()),
    }
}
