//! Engine configuration.
//!
//! [`SyncConfig`] is passed explicitly to the engine and its components;
//! nothing reads configuration from global state. [`FileConfig`] is the CLI's
//! TOML file, which wraps a `SyncConfig` under `[sync]`.

mod file;

pub use file::{FileConfig, SourceSection, TargetSection, WatermarkSection};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sync_core::{Result, SyncError};
use watermark::DefaultWatermark;

/// What to do with a contact whose parent account is not in the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountSyncPolicy {
    /// Fetch the parent account from the source and upsert it first.
    #[default]
    SyncAccount,
    /// Load the contact without an account link.
    Ignore,
}

impl std::fmt::Display for AccountSyncPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SyncAccount => write!(f, "syncAccount"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

impl std::str::FromStr for AccountSyncPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "syncAccount" => Ok(Self::SyncAccount),
            "ignore" => Ok(Self::Ignore),
            _ => Err(SyncError::config(format!(
                "Invalid account sync policy '{s}': expected 'syncAccount' or 'ignore'"
            ))),
        }
    }
}

/// Settings of one sync flow.
///
/// # TOML Format
///
/// ```toml
/// [sync]
/// pollIntervalMs = 10000
/// pollStartDelayMs = 20000
/// defaultWatermarkExpression = "now-10s"
/// failureThreshold = 0
/// advanceWatermarkOnEmpty = false
/// maxConcurrency = 4
/// stepTimeoutMs = 60000
/// accountSyncPolicy = "syncAccount"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Time between poll cycles.
    pub poll_interval_ms: u64,
    /// Time before the first poll cycle after the scheduler starts.
    pub poll_start_delay_ms: u64,
    /// Watermark used before the first successful job, e.g. `now-10s`.
    pub default_watermark_expression: String,
    /// Number of failed records a job tolerates before it is FAILED.
    pub failure_threshold: usize,
    /// Advance the watermark to the poll start time when a poll finds nothing.
    pub advance_watermark_on_empty: bool,
    /// Maximum number of records loaded concurrently within a stage.
    pub max_concurrency: usize,
    /// Upper bound on a single record's enrich/transform/load step.
    pub step_timeout_ms: u64,
    pub account_sync_policy: AccountSyncPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            poll_start_delay_ms: 20_000,
            default_watermark_expression: "now-10s".to_string(),
            failure_threshold: 0,
            advance_watermark_on_empty: false,
            max_concurrency: 4,
            step_timeout_ms: 60_000,
            account_sync_policy: AccountSyncPolicy::SyncAccount,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_start_delay(&self) -> Duration {
        Duration::from_millis(self.poll_start_delay_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Parsed `defaultWatermarkExpression`.
    pub fn default_watermark(&self) -> Result<DefaultWatermark> {
        DefaultWatermark::parse(&self.default_watermark_expression)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(SyncError::config("pollIntervalMs must be greater than 0"));
        }
        if self.max_concurrency == 0 {
            return Err(SyncError::config("maxConcurrency must be at least 1"));
        }
        if self.step_timeout_ms == 0 {
            return Err(SyncError::config("stepTimeoutMs must be greater than 0"));
        }
        self.default_watermark()?.resolve(Utc::now())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.poll_start_delay(), Duration::from_secs(20));
        assert_eq!(config.failure_threshold, 0);
        assert!(!config.advance_watermark_on_empty);
        assert_eq!(config.account_sync_policy, AccountSyncPolicy::SyncAccount);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            pollIntervalMs = 500
            accountSyncPolicy = "ignore"
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.account_sync_policy, AccountSyncPolicy::Ignore);
        assert_eq!(config.max_concurrency, 4);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: std::result::Result<SyncConfig, _> = toml::from_str("pollIntervalSecs = 5");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        let config = SyncConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            default_watermark_expression: "sometime".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_default_watermark() {
        for expression in ["now-3000000000h", "now-6000000000000000h"] {
            let config = SyncConfig {
                default_watermark_expression: expression.to_string(),
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, SyncError::Config(_)), "{expression}: {err}");
        }
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "syncAccount".parse::<AccountSyncPolicy>().unwrap(),
            AccountSyncPolicy::SyncAccount
        );
        assert_eq!(AccountSyncPolicy::Ignore.to_string(), "ignore");
        assert!("sync".parse::<AccountSyncPolicy>().is_err());
    }
}
