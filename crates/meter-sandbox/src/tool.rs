//! Tool trait and the per-invocation sandbox context.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::SandboxConfig;
use crate::error::ToolError;

/// A tool that can be executed by the [`ToolSandboxEnforcer`](crate::ToolSandboxEnforcer).
#[async_trait]
pub trait SandboxedTool: Send + Sync {
    /// Get the tool name.
    fn name(&self) -> &str;

    /// Capability identifiers the tool body uses.
    ///
    /// Checked against the policy before the body starts.
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run the tool body.
    async fn run(&self, input: Value, ctx: &SandboxContext) -> Result<Value, ToolError>;
}

/// Policy handle given to a running tool body.
///
/// Cloning is cheap; clones share the memory account.
#[derive(Debug, Clone)]
pub struct SandboxContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    tool_name: String,
    config: SandboxConfig,
    memory_used: AtomicU64,
}

impl SandboxContext {
    pub fn new(tool_name: impl Into<String>, config: SandboxConfig) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                tool_name: tool_name.into(),
                config,
                memory_used: AtomicU64::new(0),
            }),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.inner.tool_name
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    /// Check a capability at the point of use.
    pub fn require(&self, capability: &str) -> Result<(), ToolError> {
        self.inner.config.check_capability(capability)
    }

    /// Account `bytes` against `max_memory_bytes`.
    ///
    /// Fails without recording anything when the ceiling would be exceeded.
    pub fn track_memory(&self, bytes: u64) -> Result<(), ToolError> {
        let limit = self.inner.config.max_memory_bytes;
        self.inner
            .memory_used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(bytes).filter(|total| *total <= limit)
            })
            .map(|_| ())
            .map_err(|used| ToolError::MemoryLimit {
                requested: bytes,
                used,
                limit,
            })
    }

    /// Return previously accounted bytes.
    pub fn release_memory(&self, bytes: u64) {
        let _ = self
            .inner
            .memory_used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    pub fn memory_used(&self) -> u64 {
        self.inner.memory_used.load(Ordering::SeqCst)
    }
}

/// Tool backed by an async closure.
///
/// ```
/// use meter_sandbox::{FnTool, ToolError};
/// use serde_json::json;
///
/// let tool = FnTool::new("add", |input, _ctx| async move {
///     match (input["a"].as_i64(), input["b"].as_i64()) {
///         (Some(a), Some(b)) => Ok(json!(a + b)),
///         _ => Err(ToolError::invalid_input("expected integers a and b")),
///     }
/// })
/// .with_capabilities(["math"]);
/// ```
pub struct FnTool<F> {
    name: String,
    capabilities: Vec<String>,
    func: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(Value, SandboxContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            func,
        }
    }

    /// Declare the capabilities the closure uses.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl<F, Fut> SandboxedTool for FnTool<F>
where
    F: Fn(Value, SandboxContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    async fn run(&self, input: Value, ctx: &SandboxContext) -> Result<Value, ToolError> {
        (self.func)(input, ctx.clone()).await
    }
}
