//! Admission policies.

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Default window length in seconds.
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

/// An admission rule applied to every key in its scope.
///
/// A policy is immutable once loaded. `limit` caps the number of requests per
/// window and `quota` caps the cumulative time (configured in seconds) that
/// callers may charge against the window. Either may be absent, which disables
/// that mode of limiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Maximum requests per window
    #[serde(default)]
    pub limit: Option<u64>,
    /// Maximum charged time per window, in seconds
    #[serde(default)]
    pub quota: Option<u64>,
    /// Window length, in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            limit: None,
            quota: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL_SECS,
        }
    }
}

impl Policy {
    /// Create a policy with the given window length and no limits.
    pub fn new(refresh_interval_secs: u64) -> Self {
        Self {
            refresh_interval: refresh_interval_secs,
            ..Self::default()
        }
    }

    /// Builder-style: set the request count limit.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builder-style: set the time quota in seconds.
    pub fn with_quota(mut self, quota_secs: u64) -> Self {
        self.quota = Some(quota_secs);
        self
    }

    /// Check the policy is usable.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval == 0 {
            return Err(GateError::Config(
                "refresh_interval must be a positive number of seconds".to_string(),
            ));
        }
        if self.refresh_interval_millis().is_none() {
            return Err(GateError::Config(format!(
                "refresh_interval of {}s is too large",
                self.refresh_interval
            )));
        }
        if let Some(quota) = self.quota {
            if secs_to_millis(quota).is_none() {
                return Err(GateError::Config(format!("quota of {}s is too large", quota)));
            }
        }
        if let Some(limit) = self.limit {
            if i64::try_from(limit).is_err() {
                return Err(GateError::Config(format!("limit of {} is too large", limit)));
            }
        }
        Ok(())
    }

    /// Window length in milliseconds.
    pub fn refresh_interval_millis(&self) -> Option<i64> {
        secs_to_millis(self.refresh_interval)
    }

    /// Quota in milliseconds, if quota limiting is enabled.
    pub fn quota_millis(&self) -> Option<i64> {
        self.quota.and_then(secs_to_millis)
    }

    /// Whether neither count nor quota limiting is enabled.
    pub fn is_unlimited(&self) -> bool {
        self.limit.is_none() && self.quota.is_none()
    }
}

fn secs_to_millis(secs: u64) -> Option<i64> {
    i64::try_from(secs).ok()?.checked_mul(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let policy = Policy::new(30).with_limit(10).with_quota(2);
        assert_eq!(policy.limit, Some(10));
        assert_eq!(policy.quota, Some(2));
        assert_eq!(policy.refresh_interval, 30);
        assert_eq!(policy.refresh_interval_millis(), Some(30_000));
        assert_eq!(policy.quota_millis(), Some(2_000));
        assert!(!policy.is_unlimited());
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let policy = Policy::new(0).with_limit(1);
        assert!(matches!(policy.validate(), Err(GateError::Config(_))));
    }

    #[test]
    fn test_oversized_values_rejected() {
        assert!(Policy::new(u64::MAX).validate().is_err());
        assert!(Policy::new(60).with_quota(u64::MAX).validate().is_err());
        assert!(Policy::new(60).with_limit(u64::MAX).validate().is_err());
    }

    #[test]
    fn test_unlimited_policy_is_valid() {
        let policy = Policy::default();
        assert!(policy.validate().is_ok());
        assert!(policy.is_unlimited());
        assert_eq!(policy.quota_millis(), None);
    }

    #[test]
    fn test_parse_yaml_defaults() {
        let policy: Policy = serde_yaml::from_str("limit: 5\n").unwrap();
        assert_eq!(policy.limit, Some(5));
        assert_eq!(policy.quota, None);
        assert_eq!(policy.refresh_interval, 60);
    }
}
