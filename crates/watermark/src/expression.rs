//! Default watermark expressions.

use chrono::{DateTime, Utc};
use std::time::Duration;
use sync_core::{parse_duration, Result, SyncError};

use crate::Watermark;

/// Value a flow starts from before its first successful job.
///
/// # Expression Format
///
/// - `now` - the moment the store is created
/// - `now-10s`, `now - 5m` - a safety skew before that moment
/// - `2024-01-01T00:00:00.000Z` - a fixed RFC 3339 timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultWatermark {
    /// Relative to the current time, minus a skew.
    Relative { skew: Duration },
    /// Absolute point in time.
    Fixed(Watermark),
}

impl DefaultWatermark {
    /// Parse a default watermark expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let expr = expression.trim();
        if expr.is_empty() {
            return Err(SyncError::config("Empty default watermark expression"));
        }

        if let Some(rest) = expr.strip_prefix("now") {
            let rest = rest.trim_start();
            if rest.is_empty() {
                return Ok(Self::Relative {
                    skew: Duration::ZERO,
                });
            }
            let skew = rest.strip_prefix('-').ok_or_else(|| {
                SyncError::config(format!(
                    "Invalid default watermark expression '{expression}': expected 'now-<duration>'"
                ))
            })?;
            let skew = parse_duration(skew)?;
            signed_skew(skew)?;
            return Ok(Self::Relative { skew });
        }

        Ok(Self::Fixed(Watermark::from_cli_string(expr)?))
    }

    /// Resolve the expression against `now`.
    ///
    /// Fails with a configuration error when the skew reaches past the
    /// earliest representable timestamp.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<Watermark> {
        match self {
            Self::Relative { skew } => now
                .checked_sub_signed(signed_skew(*skew)?)
                .map(Watermark::new)
                .ok_or_else(|| {
                    SyncError::config(format!(
                        "Default watermark skew of {skew:?} reaches before the earliest timestamp"
                    ))
                }),
            Self::Fixed(watermark) => Ok(*watermark),
        }
    }
}

fn signed_skew(skew: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(skew).map_err(|e| {
        SyncError::config(format!("Default watermark skew of {skew:?} is out of range: {e}"))
    })
}

impl Default for DefaultWatermark {
    fn default() -> Self {
        Self::Relative {
            skew: Duration::from_secs(10),
        }
    }
}

impl std::str::FromStr for DefaultWatermark {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for DefaultWatermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relative { skew } if skew.is_zero() => write!(f, "now"),
            Self::Relative { skew } => write!(f, "now-{}ms", skew.as_millis()),
            Self::Fixed(watermark) => write!(f, "{watermark}"),
        }
    }
}
