//! Transfer engine configuration

use std::time::Duration;

/// What the engine does when a transfer would push the source balance below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FundsPolicy {
    /// Reject the transfer with `InsufficientFunds` before any write
    #[default]
    RequireSufficientFunds,
    /// Let balances go negative
    AllowOverdraft,
}

/// Configuration for a [`TransferEngine`](super::TransferEngine)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Overdraft handling
    pub funds_policy: FundsPolicy,

    /// Deadline for a whole transfer transaction, lock waits included
    ///
    /// `None` lets a transfer wait for row locks indefinitely.
    pub timeout: Option<Duration>,
}

impl EngineConfig {
    /// Default deadline for one transfer
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a configuration with explicit values
    pub fn new(funds_policy: FundsPolicy, timeout: Option<Duration>) -> Self {
        Self {
            funds_policy,
            timeout,
        }
    }

    /// Same configuration with a different funds policy
    pub fn with_funds_policy(mut self, funds_policy: FundsPolicy) -> Self {
        self.funds_policy = funds_policy;
        self
    }

    /// Same configuration with a different deadline
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            funds_policy: FundsPolicy::default(),
            timeout: Some(Self::DEFAULT_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_requires_funds_with_deadline() {
        let config = EngineConfig::default();
        assert_eq!(config.funds_policy, FundsPolicy::RequireSufficientFunds);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_builders_override_fields() {
        let config = EngineConfig::default()
            .with_funds_policy(FundsPolicy::AllowOverdraft)
            .with_timeout(None);

        assert_eq!(config, EngineConfig::new(FundsPolicy::AllowOverdraft, None));
    }
}
