//! Sandbox policy: time and memory ceilings plus capability lists.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ToolError;

/// Capability prefix gated by [`SandboxConfig::network_access`].
pub const NETWORK_PREFIX: &str = "net.";

/// Capability prefix gated by [`SandboxConfig::file_system_access`].
pub const FILE_SYSTEM_PREFIX: &str = "fs.";

/// Per-invocation sandbox policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock budget for one invocation
    pub max_execution_time_ms: u64,

    /// Ceiling for memory accounted through the sandbox context
    pub max_memory_bytes: u64,

    /// Capability identifiers the tool may use
    pub allowed_apis: Vec<String>,

    /// Capability identifiers that are always forbidden
    pub denied_apis: Vec<String>,

    /// Gates every `net.*` capability
    pub network_access: bool,

    /// Gates every `fs.*` capability
    pub file_system_access: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_execution_time_ms: 30_000,
            max_memory_bytes: 128 * 1024 * 1024,
            allowed_apis: ["json", "math", "time", "string", "console"]
                .map(String::from)
                .to_vec(),
            denied_apis: [
                "eval",
                "function_constructor",
                "dynamic_import",
                "require",
                "child_process",
            ]
            .map(String::from)
            .to_vec(),
            network_access: false,
            file_system_access: false,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.max_execution_time_ms)
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.max_execution_time_ms = ms;
        self
    }

    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// Add identifiers to the allowlist.
    pub fn allow<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_apis.extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Add identifiers to the denylist.
    pub fn deny<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denied_apis.extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_access = enabled;
        self
    }

    pub fn with_file_system(mut self, enabled: bool) -> Self {
        self.file_system_access = enabled;
        self
    }

    /// Check one capability identifier against the policy.
    ///
    /// The denylist wins over everything. `net.*` and `fs.*` identifiers are
    /// decided by their category switch; all others need an allowlist entry.
    pub fn check_capability(&self, capability: &str) -> Result<(), ToolError> {
        let violation = |reason: &str| ToolError::PolicyViolation {
            capability: capability.to_string(),
            reason: reason.to_string(),
        };

        if self.denied_apis.iter().any(|d| d == capability) {
            return Err(violation("is denied"));
        }
        if capability.starts_with(NETWORK_PREFIX) {
            return if self.network_access {
                Ok(())
            } else {
                Err(violation("requires network access, which is disabled"))
            };
        }
        if capability.starts_with(FILE_SYSTEM_PREFIX) {
            return if self.file_system_access {
                Ok(())
            } else {
                Err(violation("requires file system access, which is disabled"))
            };
        }
        if self.allowed_apis.iter().any(|a| a == capability) {
            Ok(())
        } else {
            Err(violation("is not in the allowlist"))
        }
    }

    /// Check every capability, failing on the first violation.
    pub fn check_all<'a, I>(&self, capabilities: I) -> Result<(), ToolError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        capabilities
            .into_iter()
            .try_for_each(|c| self.check_capability(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_memory_bytes, 134_217_728);
        assert!(!config.network_access);
        assert!(!config.file_system_access);
    }

    #[test]
    fn test_allowlisted_capability_passes() {
        assert!(SandboxConfig::default().check_capability("json").is_ok());
    }

    #[test]
    fn test_unlisted_capability_fails() {
        let err = SandboxConfig::default()
            .check_capability("process.spawn")
            .unwrap_err();
        assert!(err.to_string().contains("not in the allowlist"));
    }

    #[test]
    fn test_denied_wins_over_allowed() {
        let config = SandboxConfig::default().allow(["eval"]);
        let err = config.check_capability("eval").unwrap_err();
        assert_eq!(err.to_string(), "capability 'eval' is denied");
    }

    #[test]
    fn test_network_switch_gates_category() {
        let off = SandboxConfig::default();
        assert!(off.check_capability("net.http").is_err());

        let on = SandboxConfig::default().with_network(true);
        assert!(on.check_capability("net.http").is_ok());
        assert!(on.check_capability("fs.read").is_err());

        let denied = on.deny(["net.http"]);
        assert!(denied.check_capability("net.http").is_err());
        assert!(denied.check_capability("net.dns").is_ok());
    }

    #[test]
    fn test_file_system_switch_gates_category() {
        let config = SandboxConfig::default().with_file_system(true);
        assert!(config.check_capability("fs.write").is_ok());
    }

    #[test]
    fn test_check_all_reports_first_violation() {
        let err = SandboxConfig::default()
            .check_all(["json", "eval", "net.http"])
            .unwrap_err();
        assert!(err.to_string().contains("'eval'"));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{"max_execution_time_ms": 50, "network_access": true}"#).unwrap();
        assert_eq!(config.max_execution_time_ms, 50);
        assert!(config.network_access);
        assert!(config.denied_apis.iter().any(|d| d == "eval"));
    }
}
