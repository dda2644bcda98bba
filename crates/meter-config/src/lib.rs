//! # meter-config
//!
//! YAML configuration for the metrics root, the log directory, the default
//! sandbox policy and pricing overrides.
//!
//! Loaded from `~/.meter/config.yaml` by default. Every section is optional;
//! missing sections fall back to their defaults.
//!
//! ```yaml
//! metrics_root: /var/lib/meter/metrics
//! sandbox:
//!   max_execution_time_ms: 10000
//!   network_access: false
//! pricing:
//!   - model_id: my-finetune
//!     input_per_million: 1.2
//!     output_per_million: 4.8
//! ```

use std::path::{Path, PathBuf};

use meter_core::logging::meter_home;
use meter_core::{MeterError, Result};
use meter_cost::{CostCalculator, DEFAULT_CURRENCY, TokenPricing};
use meter_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default configuration file name under `~/.meter/`.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Root of the metrics ledger (`daily/` and `executions/` live here)
    pub metrics_root: PathBuf,

    /// Log directory; `None` means `~/.meter/logs`
    pub log_dir: Option<PathBuf>,

    /// Default sandbox policy for the enforcer
    pub sandbox: SandboxConfig,

    /// Pricing entries applied on top of the built-in table
    pub pricing: Vec<PricingEntry>,
}

/// One pricing override, in price per million tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub model_id: String,
    pub input_per_million: f64,
    pub output_per_million: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl PricingEntry {
    pub fn to_pricing(&self) -> TokenPricing {
        TokenPricing::per_million(&self.model_id, self.input_per_million, self.output_per_million)
            .with_currency(&self.currency)
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        let metrics_root = meter_home()
            .map(|home| home.join("metrics"))
            .unwrap_or_else(|_| PathBuf::from(".meter").join("metrics"));
        Self {
            metrics_root,
            log_dir: None,
            sandbox: SandboxConfig::default(),
            pricing: Vec::new(),
        }
    }
}

impl MeterConfig {
    /// Default config path: `~/.meter/config.yaml`
    pub fn default_path() -> Result<PathBuf> {
        Ok(meter_home()?.join(CONFIG_FILE_NAME))
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MeterError::ConfigNotFound {
                    path: path.to_path_buf(),
                    source: Some(e),
                }
            } else {
                MeterError::io("read config", path, e)
            }
        })?;

        let config = Self::parse(&content).map_err(|message| MeterError::ConfigInvalid {
            path: path.to_path_buf(),
            message,
        })?;
        config.validate()?;

        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load `path`, or defaults when the file does not exist.
    ///
    /// Parse and validation errors still propagate.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(MeterError::ConfigNotFound { .. }) => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parse YAML without validating.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| MeterError::internal(format!("serialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.sandbox.max_execution_time_ms == 0 {
            return Err(MeterError::ConfigValidation {
                message: "sandbox.max_execution_time_ms must be > 0".to_string(),
            });
        }
        if self.sandbox.max_memory_bytes == 0 {
            return Err(MeterError::ConfigValidation {
                message: "sandbox.max_memory_bytes must be > 0".to_string(),
            });
        }
        if self.metrics_root.as_os_str().is_empty() {
            return Err(MeterError::ConfigValidation {
                message: "metrics_root must not be empty".to_string(),
            });
        }
        for entry in &self.pricing {
            if entry.model_id.trim().is_empty() {
                return Err(MeterError::ConfigValidation {
                    message: "pricing entries need a model_id".to_string(),
                });
            }
            let prices_ok = [entry.input_per_million, entry.output_per_million]
                .iter()
                .all(|p| p.is_finite() && *p >= 0.0);
            if !prices_ok {
                return Err(MeterError::ConfigValidation {
                    message: format!(
                        "pricing for '{}' must be finite and non-negative",
                        entry.model_id
                    ),
                });
            }
        }
        Ok(())
    }

    /// Calculator with the built-in table plus this config's overrides.
    pub fn build_calculator(&self) -> CostCalculator {
        let calculator = CostCalculator::with_default_pricing();
        for entry in &self.pricing {
            calculator.set_pricing(entry.to_pricing());
        }
        calculator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_validate() {
        let config = MeterConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.metrics_root.ends_with("metrics"));
        assert_eq!(config.sandbox, SandboxConfig::default());
    }

    #[test]
    fn test_yaml_round_trips_defaults() {
        let config = MeterConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(MeterConfig::parse(&yaml).unwrap(), config);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let file = write_config(
            "metrics_root: /tmp/meter-metrics\nsandbox:\n  max_execution_time_ms: 500\n",
        );
        let config = MeterConfig::load(file.path()).unwrap();

        assert_eq!(config.metrics_root, PathBuf::from("/tmp/meter-metrics"));
        assert_eq!(config.sandbox.max_execution_time_ms, 500);
        assert_eq!(config.sandbox.max_memory_bytes, 128 * 1024 * 1024);
        assert!(config.pricing.is_empty());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let file = write_config("sandbox:\n  max_execution_time_ms: 0\n");
        let err = MeterConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, MeterError::ConfigValidation { .. }));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_negative_price_rejected() {
        let mut config = MeterConfig::default();
        config.pricing.push(PricingEntry {
            model_id: "m".into(),
            input_per_million: -1.0,
            output_per_million: 1.0,
            currency: default_currency(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml_reports_path() {
        let file = write_config("sandbox: [unclosed\n");
        match MeterConfig::load(file.path()) {
            Err(MeterError::ConfigInvalid { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        assert!(matches!(
            MeterConfig::load(&path),
            Err(MeterError::ConfigNotFound { .. })
        ));
        assert_eq!(
            MeterConfig::load_or_default(&path).unwrap(),
            MeterConfig::default()
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = write_config("");
        assert_eq!(MeterConfig::load(file.path()).unwrap(), MeterConfig::default());
    }

    #[test]
    fn test_pricing_overrides_applied() {
        let file = write_config(
            "pricing:\n  - model_id: gpt-4o\n    input_per_million: 1.0\n    output_per_million: 2.0\n  - model_id: local\n    input_per_million: 0.0\n    output_per_million: 0.0\n    currency: EUR\n",
        );
        let config = MeterConfig::load(file.path()).unwrap();
        let calculator = config.build_calculator();

        assert_eq!(calculator.estimate("gpt-4o", 1_000_000, 1_000_000).estimated_cost, 3.0);
        assert_eq!(calculator.get_pricing("local").unwrap().currency, "EUR");
        assert!(calculator.get_pricing("claude-3-haiku").is_some());
    }
}
