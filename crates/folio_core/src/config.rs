//! Allocator configuration.
//!
//! # Responsibility
//! - Hold the tunables of folio allocation with documented defaults.
//! - Validate them once, before any store access.
//!
//! # Invariants
//! - `max_consecutive` never exceeds the fixed 3-digit suffix capacity.
//! - `max_attempts` is at least 1.

use crate::model::folio::{FolioFormat, FolioPrefixError, DEFAULT_PREFIX, MAX_CONSECUTIVE};
use crate::model::week::YearAnchor;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 8;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 10;

/// Configuration error raised by [`FolioConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolioConfigError {
    Prefix(FolioPrefixError),
    InvalidMaxConsecutive(u32),
    InvalidMaxAttempts(u32),
}

impl Display for FolioConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prefix(err) => write!(f, "{err}"),
            Self::InvalidMaxConsecutive(value) => write!(
                f,
                "max_consecutive must be within 1..={MAX_CONSECUTIVE}, got {value}"
            ),
            Self::InvalidMaxAttempts(value) => {
                write!(f, "max_attempts must be at least 1, got {value}")
            }
        }
    }
}

impl Error for FolioConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Prefix(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FolioPrefixError> for FolioConfigError {
    fn from(value: FolioPrefixError) -> Self {
        Self::Prefix(value)
    }
}

/// Folio allocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolioConfig {
    /// Literal tag identifying the issuing system.
    pub prefix: String,
    /// Which year stamps a bucket near year boundaries.
    pub year_anchor: YearAnchor,
    /// Allocation fails once a bucket would pass this value.
    pub max_consecutive: u32,
    /// Transaction attempts before a write conflict is reported.
    pub max_attempts: u32,
    /// Pause between conflicting attempts, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            year_anchor: YearAnchor::Calendar,
            max_consecutive: MAX_CONSECUTIVE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl FolioConfig {
    /// Validates settings and returns the codec for the configured prefix.
    pub fn validate(&self) -> Result<FolioFormat, FolioConfigError> {
        let format = FolioFormat::new(&self.prefix)?;
        if self.max_consecutive == 0 || self.max_consecutive > MAX_CONSECUTIVE {
            return Err(FolioConfigError::InvalidMaxConsecutive(
                self.max_consecutive,
            ));
        }
        if self.max_attempts == 0 {
            return Err(FolioConfigError::InvalidMaxAttempts(self.max_attempts));
        }
        Ok(format)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{FolioConfig, FolioConfigError};
    use crate::model::folio::FolioPrefixError;
    use crate::model::week::YearAnchor;

    #[test]
    fn default_config_is_valid() {
        let format = FolioConfig::default().validate().unwrap();
        assert_eq!(format.prefix(), "CF");
    }

    #[test]
    fn rejects_capacity_beyond_three_digits() {
        let config = FolioConfig {
            max_consecutive: 1000,
            ..FolioConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(FolioConfigError::InvalidMaxConsecutive(1000))
        );
    }

    #[test]
    fn rejects_zero_attempts_and_bad_prefix() {
        let config = FolioConfig {
            max_attempts: 0,
            ..FolioConfig::default()
        };
        assert_eq!(config.validate(), Err(FolioConfigError::InvalidMaxAttempts(0)));

        let config = FolioConfig {
            prefix: String::new(),
            ..FolioConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(FolioConfigError::Prefix(FolioPrefixError::Empty))
        );
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let config: FolioConfig =
            serde_json::from_str(r#"{"prefix":"OT","yearAnchor":"isoWeekYear"}"#).unwrap();
        assert_eq!(config.prefix, "OT");
        assert_eq!(config.year_anchor, YearAnchor::IsoWeekYear);
        assert_eq!(config.max_consecutive, 999);
        assert_eq!(config.max_attempts, 8);
    }

    #[test]
    fn serializes_every_field_in_camel_case() {
        let config = FolioConfig {
            year_anchor: YearAnchor::IsoWeekYear,
            ..FolioConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["yearAnchor"], "isoWeekYear");
        assert_eq!(json["maxConsecutive"], 999);
        assert_eq!(json["retryBackoffMs"], 10);
        assert!(serde_json::from_str::<FolioConfig>(r#"{"yearAnchor":"iso_week_year"}"#).is_err());
    }
}
