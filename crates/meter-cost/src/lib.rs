//! # meter-cost
//!
//! Token pricing and cost estimation.
//!
//! This crate provides:
//! - [`CostCalculator`] - Keyed pricing table with estimate/actual computation
//! - [`TokenPricing`] - Per-token input/output prices for one model
//! - [`CostEstimate`] - Priced estimate rounded to micro-currency precision
//!
//! Unknown models are priced at zero instead of failing.
//!
//! ## Example
//!
//! ```
//! use meter_cost::{CostCalculator, TokenPricing};
//! use meter_core::TokenUsage;
//!
//! let calc = CostCalculator::with_default_pricing();
//! let estimate = calc.estimate("gpt-4o-mini", 1_000_000, 0);
//! assert!((estimate.estimated_cost - 0.15).abs() < 1e-9);
//!
//! calc.set_pricing(TokenPricing::per_million("local-llm", 0.0, 0.0));
//! assert_eq!(calc.calculate_actual("local-llm", TokenUsage::new(10, 10)), 0.0);
//! ```

pub mod calculator;
pub mod models;

// Re-export main types
pub use calculator::CostCalculator;
pub use models::{CostEstimate, DEFAULT_CURRENCY, TokenPricing, round_cost};
