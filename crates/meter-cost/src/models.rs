//! Data models for pricing and cost estimates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default currency for built-in prices.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Per-token prices for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPricing {
    /// Model identifier, matched exactly (e.g., "gpt-4o-mini")
    pub model_id: String,

    /// Price of one input token
    pub input_price_per_token: f64,

    /// Price of one output token
    pub output_price_per_token: f64,

    /// Currency code
    #[serde(default = "default_currency")]
    pub currency: String,

    /// When this entry was last written
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl TokenPricing {
    /// Create a USD price entry stamped with the current time.
    pub fn new(model_id: impl Into<String>, input_price_per_token: f64, output_price_per_token: f64) -> Self {
        Self {
            model_id: model_id.into(),
            input_price_per_token,
            output_price_per_token,
            currency: default_currency(),
            updated_at: Utc::now(),
        }
    }

    /// Create an entry from prices quoted per million tokens.
    pub fn per_million(model_id: impl Into<String>, input_per_million: f64, output_per_million: f64) -> Self {
        Self::new(
            model_id,
            input_per_million / 1_000_000.0,
            output_per_million / 1_000_000.0,
        )
    }

    /// Set currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Unrounded cost of the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 * self.input_price_per_token
            + output_tokens as f64 * self.output_price_per_token
    }
}

/// Priced estimate for a model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Model the estimate was computed for
    pub model_id: String,

    /// Input tokens
    pub input_tokens: u64,

    /// Output tokens
    pub output_tokens: u64,

    /// Estimated cost, rounded to 6 decimal places (0 for unknown models)
    pub estimated_cost: f64,

    /// Currency of `estimated_cost`
    pub currency: String,

    /// Whether a pricing entry was found for the model
    pub priced: bool,
}

/// Round to micro-currency precision.
pub fn round_cost(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_million_conversion() {
        let pricing = TokenPricing::per_million("gpt-4o-mini", 0.15, 0.6);

        assert!((pricing.input_price_per_token - 0.000_000_15).abs() < 1e-15);
        assert!((pricing.output_price_per_token - 0.000_000_6).abs() < 1e-15);
        assert_eq!(pricing.currency, "USD");
    }

    #[test]
    fn test_round_cost() {
        assert_eq!(round_cost(0.003_250_000_4), 0.00325);
        assert_eq!(round_cost(0.000_000_4), 0.0);
        assert_eq!(round_cost(1.234_567_89), 1.234568);
    }

    #[test]
    fn test_pricing_deserializes_with_defaults() {
        let json = r#"{"model_id":"local-llm","input_price_per_token":0.0,"output_price_per_token":0.0}"#;
        let pricing: TokenPricing = serde_json::from_str(json).unwrap();

        assert_eq!(pricing.currency, "USD");
        assert_eq!(pricing.model_id, "local-llm");
    }
}
