//! Retry policy for calls refused before reaching a tool server
//!
//! Only [`TransportError::Refused`] is ever retried: the request provably never
//! left this process, so repeating it cannot duplicate a side effect. Timeouts
//! and remote errors are final. Delays grow linearly and are capped.

use crate::config::ManagerConfig;
use crate::error::TransportError;
use std::time::Duration;

/// Retry policy for one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Policy for a server's retry budget with the manager's delay settings
    pub fn for_server(retry_budget: u32, manager: &ManagerConfig) -> Self {
        Self::new(retry_budget, manager.retry_delay_ms, manager.max_retry_delay_ms)
    }

    /// Delay before retry number `retry` (0-based)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let linear = self.base_delay_ms.saturating_mul(u64::from(retry) + 1);
        Duration::from_millis(linear.min(self.max_delay_ms))
    }

    /// Whether a failure on attempt `retries_done + 1` may be retried
    pub fn should_retry(&self, error: &TransportError, retries_done: u32) -> bool {
        should_retry_error(error) && retries_done < self.max_retries
    }
}

/// Determines if a transport error is retryable at all
pub fn should_retry_error(error: &TransportError) -> bool {
    error.is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = RetryPolicy::new(5, 200, 500);

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(400));
        // capped
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(100), Duration::from_millis(500));
    }

    #[test]
    fn test_should_retry_error() {
        assert!(should_retry_error(&TransportError::Refused("connection refused".into())));
        assert!(!should_retry_error(&TransportError::Remote("query rejected".into())));
        assert!(!should_retry_error(&TransportError::Protocol("HTTP 500".into())));
    }

    #[test]
    fn test_budget_is_respected() {
        let policy = RetryPolicy::new(2, 10, 10);
        let refused = TransportError::Refused("down".into());
        assert!(policy.should_retry(&refused, 0));
        assert!(policy.should_retry(&refused, 1));
        assert!(!policy.should_retry(&refused, 2));

        let none = RetryPolicy::new(0, 10, 10);
        assert!(!none.should_retry(&refused, 0));
    }

    #[test]
    fn test_for_server_uses_manager_delays() {
        let manager = ManagerConfig::default();
        let policy = RetryPolicy::for_server(4, &manager);
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.base_delay_ms, manager.retry_delay_ms);
        assert_eq!(policy.max_delay_ms, manager.max_retry_delay_ms);
    }
}
