//! Error types raised by tool bodies.

use thiserror::Error;

/// Errors a sandboxed tool body can return.
///
/// The enforcer never propagates these: each is converted into a failed
/// [`SandboxResult`](crate::SandboxResult) whose `error` is the `Display`
/// text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool-reported failure; the message is surfaced verbatim
    #[error("{0}")]
    Failed(String),

    /// Capability use outside the sandbox policy
    #[error("capability '{capability}' {reason}")]
    PolicyViolation { capability: String, reason: String },

    /// Input did not match what the tool expects
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Accounted memory would exceed the configured ceiling
    #[error("memory limit exceeded: {requested} bytes requested, {used} of {limit} bytes in use")]
    MemoryLimit { requested: u64, used: u64, limit: u64 },
}

impl ToolError {
    /// Create a Failed error
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Create an InvalidInput error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns true if the sandbox policy (capabilities or memory) was violated
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::PolicyViolation { .. } | Self::MemoryLimit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_message_is_verbatim() {
        assert_eq!(ToolError::failed("boom").to_string(), "boom");
        assert!(!ToolError::failed("boom").is_policy_violation());
    }

    #[test]
    fn test_policy_violation_message() {
        let err = ToolError::PolicyViolation {
            capability: "eval".into(),
            reason: "is denied".into(),
        };
        assert_eq!(err.to_string(), "capability 'eval' is denied");
        assert!(err.is_policy_violation());
    }
}
