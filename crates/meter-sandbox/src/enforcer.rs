//! Bounded-time, capability-checked tool execution.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use meter_core::{ToolUsageRecord, log_tool_call, now_millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinError;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::tool::{SandboxContext, SandboxedTool};

/// Terminal state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxOutcome {
    Completed,
    TimedOut,
    Failed,
}

/// Uniform result of [`ToolSandboxEnforcer::execute`].
///
/// Timeouts, policy violations, tool errors and panics all land here; only
/// `error` (and `outcome`) distinguish the cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxResult {
    pub tool_name: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Wall-clock time from invocation to settle
    pub duration_ms: u64,
    /// Bytes accounted through the sandbox context
    pub memory_used_bytes: u64,
    pub outcome: SandboxOutcome,
    /// Epoch milliseconds at settle
    pub finished_at: i64,
}

impl SandboxResult {
    /// Build the ledger record for this invocation.
    pub fn to_tool_usage(&self, execution_id: impl Into<String>, timestamp: i64) -> ToolUsageRecord {
        let record = ToolUsageRecord::new(
            execution_id,
            timestamp,
            &self.tool_name,
            self.duration_ms,
            self.success,
        );
        match &self.error {
            Some(error) => record.with_error(error),
            None => record,
        }
    }
}

/// Registry of tools plus the default sandbox policy.
///
/// Each [`execute`](Self::execute) runs the tool body exactly once on its own
/// task, raced against the configured time budget.
pub struct ToolSandboxEnforcer {
    tools: HashMap<String, Arc<dyn SandboxedTool>>,
    default_config: RwLock<SandboxConfig>,
}

impl ToolSandboxEnforcer {
    pub fn new() -> Self {
        Self::with_default_config(SandboxConfig::default())
    }

    pub fn with_default_config(config: SandboxConfig) -> Self {
        Self {
            tools: HashMap::new(),
            default_config: RwLock::new(config),
        }
    }

    /// Register a tool under its name, replacing any previous one.
    pub fn register(&mut self, tool: impl SandboxedTool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn SandboxedTool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "replaced registered tool");
        }
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Copy of the default policy; mutating it does not touch the stored one.
    pub fn get_default_config(&self) -> SandboxConfig {
        self.default_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_default_config(&self, config: SandboxConfig) {
        *self
            .default_config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Execute `tool_name` once under `config` (or the default policy).
    ///
    /// Never fails: every outcome is reported through [`SandboxResult`].
    pub async fn execute(
        &self,
        tool_name: &str,
        input: Value,
        config: Option<SandboxConfig>,
    ) -> SandboxResult {
        let started = Instant::now();
        let config = config.unwrap_or_else(|| self.get_default_config());

        let Some(tool) = self.tools.get(tool_name).cloned() else {
            let result = settle(
                tool_name,
                started,
                0,
                SandboxOutcome::Failed,
                Err(format!("Unknown tool: {tool_name}")),
            );
            warn!(tool = %tool_name, "execute called for unregistered tool");
            return result;
        };

        let capabilities = tool.capabilities();
        if let Err(err) = config.check_all(capabilities.iter().map(String::as_str)) {
            warn!(tool = %tool_name, error = %err, "tool blocked by sandbox policy");
            let result = settle(
                tool_name,
                started,
                0,
                SandboxOutcome::Failed,
                Err(format!("Tool '{tool_name}' blocked: {err}")),
            );
            log_result(&result);
            return result;
        }

        let ctx = SandboxContext::new(tool_name, config.clone());
        let task_ctx = ctx.clone();
        let mut handle = tokio::spawn(async move { tool.run(input, &task_ctx).await });

        let (outcome, body) = match timeout(config.timeout(), &mut handle).await {
            Ok(Ok(Ok(output))) => (SandboxOutcome::Completed, Ok(output)),
            Ok(Ok(Err(err))) => (SandboxOutcome::Failed, Err(err.to_string())),
            Ok(Err(join_err)) => (SandboxOutcome::Failed, Err(join_failure(tool_name, join_err))),
            Err(_) => {
                handle.abort();
                (
                    SandboxOutcome::TimedOut,
                    Err(format!(
                        "Tool '{tool_name}' timed out after {}ms",
                        config.max_execution_time_ms
                    )),
                )
            }
        };

        let result = settle(tool_name, started, ctx.memory_used(), outcome, body);
        log_result(&result);
        result
    }
}

impl Default for ToolSandboxEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

fn settle(
    tool_name: &str,
    started: Instant,
    memory_used_bytes: u64,
    outcome: SandboxOutcome,
    body: Result<Value, String>,
) -> SandboxResult {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let (success, output, error) = match body {
        Ok(output) => (true, Some(output), None),
        Err(error) => (false, None, Some(error)),
    };
    SandboxResult {
        tool_name: tool_name.to_string(),
        success,
        output,
        error,
        duration_ms,
        memory_used_bytes,
        outcome,
        finished_at: now_millis(),
    }
}

fn join_failure(tool_name: &str, err: JoinError) -> String {
    if err.is_panic() {
        format!("Tool '{tool_name}' panicked: {}", panic_message(err.into_panic()))
    } else {
        format!("Tool '{tool_name}' was cancelled")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn log_result(result: &SandboxResult) {
    log_tool_call!(
        result.tool_name.as_str(),
        success = result.success,
        outcome = ?result.outcome,
        duration_ms = result.duration_ms,
        memory_used_bytes = result.memory_used_bytes
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::FnTool;
    use serde_json::json;

    #[test]
    fn test_to_tool_usage_carries_outcome() {
        let result = settle(
            "grep",
            Instant::now(),
            0,
            SandboxOutcome::Failed,
            Err("no match".to_string()),
        );
        let record = result.to_tool_usage("exec-1", 1_000);

        assert_eq!(record.execution_id, "exec-1");
        assert_eq!(record.timestamp, 1_000);
        assert_eq!(record.tool_name, "grep");
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("no match"));
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_register_replaces_by_name() {
        let mut enforcer = ToolSandboxEnforcer::new();
        enforcer.register(FnTool::new("t", |_, _| async { Ok(json!(1)) }));
        enforcer.register(FnTool::new("t", |_, _| async { Ok(json!(2)) }));

        assert_eq!(enforcer.tool_names(), vec!["t"]);
        let result = enforcer.execute("t", Value::Null, None).await;
        assert_eq!(result.output, Some(json!(2)));
    }
}
