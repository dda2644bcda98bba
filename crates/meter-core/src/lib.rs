//! # meter-core
//!
//! Core types, errors, and utilities shared by the meter crates.
//!
//! This crate provides:
//! - [`MeterError`] - Error type for store, configuration and I/O failures
//! - [`logging`] - Tracing setup and logging macros
//! - [`types`] - Token and tool usage records plus day-bucket helpers
//!
//! ## Example
//!
//! ```no_run
//! use meter_core::{TokenUsageRecord, logging, now_millis};
//!
//! fn main() -> meter_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let record = TokenUsageRecord::new("exec-1", now_millis(), "gpt-4o", 500, 200);
//!     tracing::info!(day = %record.day()?, "model call recorded");
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use error::{MeterError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::{
    DAY_FORMAT, ExecutionId, TokenUsage, TokenUsageRecord, ToolUsageRecord, day_key, local_day,
    now_millis, parse_day,
};
