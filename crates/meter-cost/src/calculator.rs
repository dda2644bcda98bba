//! Keyed pricing table and cost computation.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use meter_core::TokenUsage;
use tracing::debug;

use crate::models::{CostEstimate, DEFAULT_CURRENCY, TokenPricing, round_cost};

/// Built-in per-million-token prices (input, output) in USD.
const DEFAULT_PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o", 2.5, 10.0),
    ("gpt-4o-mini", 0.15, 0.6),
    ("gpt-4-turbo", 10.0, 30.0),
    ("gpt-3.5-turbo", 0.5, 1.5),
    ("claude-3-5-sonnet", 3.0, 15.0),
    ("claude-3-opus", 15.0, 75.0),
    ("claude-3-haiku", 0.25, 1.25),
];

/// Translates token counts into money using a swappable pricing table.
///
/// Lookups are exact-match on the model id. Models without a pricing entry
/// cost zero rather than failing, so cost reporting never blocks on an
/// incomplete table. Share one instance behind an `Arc` to make pricing
/// updates visible to every consumer.
#[derive(Debug, Default)]
pub struct CostCalculator {
    pricing: RwLock<HashMap<String, TokenPricing>>,
}

impl CostCalculator {
    /// Create a calculator with an empty pricing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a calculator seeded with the built-in pricing table.
    pub fn with_default_pricing() -> Self {
        let calculator = Self::new();
        for (model_id, input, output) in DEFAULT_PRICES {
            calculator.set_pricing(TokenPricing::per_million(*model_id, *input, *output));
        }
        calculator
    }

    /// Estimate the cost of a call with the given token counts.
    pub fn estimate(&self, model_id: &str, input_tokens: u64, output_tokens: u64) -> CostEstimate {
        match self.get_pricing(model_id) {
            Some(pricing) => CostEstimate {
                model_id: model_id.to_string(),
                input_tokens,
                output_tokens,
                estimated_cost: round_cost(pricing.cost(input_tokens, output_tokens)),
                currency: pricing.currency,
                priced: true,
            },
            None => {
                debug!(model_id, "no pricing entry, estimating zero cost");
                CostEstimate {
                    model_id: model_id.to_string(),
                    input_tokens,
                    output_tokens,
                    estimated_cost: 0.0,
                    currency: DEFAULT_CURRENCY.to_string(),
                    priced: false,
                }
            }
        }
    }

    /// Cost of a completed call. Returns 0 for unknown models.
    pub fn calculate_actual(&self, model_id: &str, usage: TokenUsage) -> f64 {
        self.estimate(model_id, usage.prompt_tokens, usage.completion_tokens)
            .estimated_cost
    }

    /// Insert or replace the pricing entry for `pricing.model_id`.
    pub fn set_pricing(&self, pricing: TokenPricing) {
        debug!(
            model_id = %pricing.model_id,
            input = pricing.input_price_per_token,
            output = pricing.output_price_per_token,
            "pricing updated"
        );
        self.pricing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pricing.model_id.clone(), pricing);
    }

    pub fn get_pricing(&self, model_id: &str) -> Option<TokenPricing> {
        self.pricing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_id)
            .cloned()
    }

    /// Snapshot of every entry, sorted by model id.
    pub fn list_pricing(&self) -> Vec<TokenPricing> {
        let mut entries: Vec<TokenPricing> = self
            .pricing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unknown_model_is_free() {
        let calc = CostCalculator::with_default_pricing();
        let estimate = calc.estimate("unknown-model-x", 100, 50);

        assert_eq!(estimate.estimated_cost, 0.0);
        assert_eq!(estimate.input_tokens, 100);
        assert_eq!(estimate.output_tokens, 50);
        assert!(!estimate.priced);
    }

    #[test]
    fn test_gpt_4o_mini_million_input_tokens() {
        let calc = CostCalculator::with_default_pricing();
        let estimate = calc.estimate("gpt-4o-mini", 1_000_000, 0);

        assert!((estimate.estimated_cost - 0.15).abs() < 1e-9);
        assert!(estimate.priced);
    }

    #[test]
    fn test_calculate_actual_gpt_4o() {
        let calc = CostCalculator::with_default_pricing();
        let cost = calc.calculate_actual("gpt-4o", TokenUsage::new(500, 200));

        assert!((cost - 0.00325).abs() < 1e-12);
    }

    #[test]
    fn test_calculate_actual_unknown_model() {
        let calc = CostCalculator::new();
        assert_eq!(calc.calculate_actual("gpt-4o", TokenUsage::new(500, 200)), 0.0);
    }

    #[test]
    fn test_exact_match_only() {
        let calc = CostCalculator::with_default_pricing();
        assert!(!calc.estimate("GPT-4o", 1000, 1000).priced);
        assert!(!calc.estimate("gpt-4o-2024-08-06", 1000, 1000).priced);
    }

    #[test]
    fn test_set_pricing_last_write_wins() {
        let calc = CostCalculator::new();
        calc.set_pricing(TokenPricing::new("local", 0.001, 0.002));
        calc.set_pricing(TokenPricing::new("local", 0.01, 0.02).with_currency("EUR"));

        let pricing = calc.get_pricing("local").unwrap();
        assert_eq!(pricing.input_price_per_token, 0.01);
        assert_eq!(pricing.currency, "EUR");
        assert_eq!(calc.list_pricing().len(), 1);

        let estimate = calc.estimate("local", 10, 10);
        assert!((estimate.estimated_cost - 0.3).abs() < 1e-9);
        assert_eq!(estimate.currency, "EUR");
    }

    #[test]
    fn test_list_pricing_is_snapshot() {
        let calc = CostCalculator::with_default_pricing();
        let snapshot = calc.list_pricing();
        calc.set_pricing(TokenPricing::new("zzz-new", 1.0, 1.0));

        assert_eq!(snapshot.len(), DEFAULT_PRICES.len());
        assert_eq!(calc.list_pricing().len(), DEFAULT_PRICES.len() + 1);
        assert!(snapshot.windows(2).all(|w| w[0].model_id <= w[1].model_id));
    }

    #[test]
    fn test_rounding_to_six_decimals() {
        let calc = CostCalculator::new();
        calc.set_pricing(TokenPricing::new("tiny", 0.000_000_1, 0.0));

        assert_eq!(calc.estimate("tiny", 3, 0).estimated_cost, 0.0);
        assert_eq!(calc.estimate("tiny", 18, 0).estimated_cost, 0.000002);
    }

    #[test]
    fn test_shared_updates_visible() {
        let calc = Arc::new(CostCalculator::new());
        let writer = Arc::clone(&calc);

        std::thread::spawn(move || writer.set_pricing(TokenPricing::new("m", 1.0, 1.0)))
            .join()
            .unwrap();

        assert!(calc.estimate("m", 1, 1).priced);
    }
}
