//! # meter-sandbox
//!
//! Executes named tools under a time budget and a capability policy, and
//! reports every outcome through one result shape.
//!
//! - [`ToolSandboxEnforcer`] - tool registry, default policy, `execute`
//! - [`SandboxConfig`] - time/memory ceilings and capability lists
//! - [`SandboxedTool`] - trait implemented by tool bodies
//! - [`FnTool`], [`ProcessTool`] - closure-backed and subprocess-backed tools
//!
//! ## Example
//!
//! ```
//! use meter_sandbox::{FnTool, SandboxConfig, ToolSandboxEnforcer};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut enforcer = ToolSandboxEnforcer::new();
//! enforcer.register(
//!     FnTool::new("upper", |input, _ctx| async move {
//!         Ok(json!(input.as_str().unwrap_or_default().to_uppercase()))
//!     })
//!     .with_capabilities(["string"]),
//! );
//!
//! let result = enforcer
//!     .execute("upper", json!("hi"), Some(SandboxConfig::default().with_timeout_ms(1_000)))
//!     .await;
//! assert!(result.success);
//! assert_eq!(result.output, Some(json!("HI")));
//! # }
//! ```

pub mod config;
pub mod enforcer;
pub mod error;
pub mod process;
pub mod tool;

pub use config::{FILE_SYSTEM_PREFIX, NETWORK_PREFIX, SandboxConfig};
pub use enforcer::{SandboxOutcome, SandboxResult, ToolSandboxEnforcer};
pub use error::ToolError;
pub use process::{PROCESS_CAPABILITY, ProcessTool};
pub use tool::{FnTool, SandboxContext, SandboxedTool};
