//! # meter-store
//!
//! Durable, append-only usage ledger for token and tool usage records.
//!
//! This crate provides:
//! - [`MetricsStore`] - Dual-indexed JSON ledger (by execution id, by day)
//!   with atomic per-file writes and per-file write serialization
//! - [`MetricsQuery`] - Dashboard aggregates over a filtered date range
//! - [`ReconcileReport`] - Result of the sweep that re-synchronizes the two
//!   indices after a crash between paired writes
//!
//! ## Example
//!
//! ```no_run
//! use meter_core::{TokenUsageRecord, now_millis};
//! use meter_cost::CostCalculator;
//! use meter_store::{MetricsFilter, MetricsQuery, MetricsStore};
//!
//! #[tokio::main]
//! async fn main() -> meter_core::Result<()> {
//!     let store = MetricsStore::open("/var/lib/meter").await?;
//!
//!     let record = TokenUsageRecord::new("exec-1", now_millis(), "gpt-4o", 500, 200);
//!     store.append_token_usage(&record).await?;
//!
//!     let calculator = CostCalculator::with_default_pricing();
//!     let summary = MetricsQuery::new(&store, &calculator)
//!         .summary(&MetricsFilter::all())
//!         .await?;
//!     println!("total cost: {:.6}", summary.total_cost);
//!
//!     Ok(())
//! }
//! ```

mod fs;
mod locks;
pub mod models;
pub mod query;
mod reconcile;
pub mod store;

// Re-export main types
pub use models::{
    AgentUsage, DailyCost, DailyTokens, ExecutionSummary, MetricsFilter, ModelUsage,
    ReconcileReport, ToolStats, UsageBucket, UsageSummary,
};
pub use query::MetricsQuery;
pub use store::{MetricsStore, validate_execution_id};
