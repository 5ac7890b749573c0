//! Folio allocation use-case service.
//!
//! # Responsibility
//! - Allocate the next folio of the current week bucket through the store.
//! - Expose validation and prefix helpers bound to the configured prefix.
//!
//! # Invariants
//! - A folio is returned only after its counter increment committed.
//! - Allocation past `max_consecutive` fails and leaves the counter as is.
//! - The service keeps no counter state of its own.

use crate::config::{FolioConfig, FolioConfigError};
use crate::model::folio::{FolioFormat, FolioIdentifier};
use crate::model::week::BucketKey;
use crate::repo::counter_repo::{CounterStore, CounterStoreError, TxOptions};
use chrono::{Local, NaiveDate};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

pub type FolioResult<T> = Result<T, FolioError>;

/// Service error for folio allocation.
#[derive(Debug)]
pub enum FolioError {
    Config(FolioConfigError),
    Store(CounterStoreError),
    /// The bucket already issued its last representable consecutive.
    CapacityExhausted { bucket_key: String, max: u32 },
}

impl Display for FolioError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid folio config: {err}"),
            Self::Store(err) => write!(f, "folio allocation failed: {err}"),
            Self::CapacityExhausted { bucket_key, max } => write!(
                f,
                "bucket `{bucket_key}` exhausted its {max} consecutive numbers"
            ),
        }
    }
}

impl Error for FolioError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::CapacityExhausted { .. } => None,
        }
    }
}

impl From<FolioConfigError> for FolioError {
    fn from(value: FolioConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<CounterStoreError> for FolioError {
    fn from(value: CounterStoreError) -> Self {
        Self::Store(value)
    }
}

/// Allocates folios against a transactional counter store.
pub struct FolioService<S: CounterStore> {
    store: S,
    config: FolioConfig,
    format: FolioFormat,
}

impl<S: CounterStore> FolioService<S> {
    /// Creates a service with [`FolioConfig::default`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: FolioConfig::default(),
            format: FolioFormat::default_format().clone(),
        }
    }

    /// Creates a service with validated custom settings.
    pub fn with_config(store: S, config: FolioConfig) -> FolioResult<Self> {
        let format = config.validate()?;
        Ok(Self {
            store,
            config,
            format,
        })
    }

    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    pub fn format(&self) -> &FolioFormat {
        &self.format
    }

    /// Allocates the next folio for today's local calendar date.
    pub fn generate_new_folio(&self) -> FolioResult<FolioIdentifier> {
        self.allocate(today(), None)
    }

    /// Allocates the next folio of the bucket that `date` falls in.
    pub fn generate_folio_on(&self, date: NaiveDate) -> FolioResult<FolioIdentifier> {
        self.allocate(date, None)
    }

    /// Like [`Self::generate_folio_on`], giving up once `timeout` elapses.
    ///
    /// The deadline is checked between transaction attempts; an attempt in
    /// flight still waits on the connection busy handler.
    pub fn generate_folio_within(
        &self,
        date: NaiveDate,
        timeout: Duration,
    ) -> FolioResult<FolioIdentifier> {
        self.allocate(date, Instant::now().checked_add(timeout))
    }

    /// Returns whether `text` is a folio under the configured prefix.
    pub fn validate_folio(&self, text: &str) -> bool {
        self.format.is_valid(text)
    }

    /// Bucket prefix `PREFIX-YYYY-WW-` for today's local date.
    pub fn current_week_prefix(&self) -> String {
        self.week_prefix_on(today())
    }

    pub fn week_prefix_on(&self, date: NaiveDate) -> String {
        self.format.bucket_prefix(date, self.config.year_anchor)
    }

    fn allocate(&self, date: NaiveDate, deadline: Option<Instant>) -> FolioResult<FolioIdentifier> {
        let started_at = Instant::now();
        let bucket = BucketKey::for_date(date, self.config.year_anchor);
        let bucket_key = bucket.store_key(self.format.prefix());
        let max = self.config.max_consecutive;
        let options = TxOptions {
            max_attempts: self.config.max_attempts,
            backoff: self.config.retry_backoff(),
            deadline,
        };

        let result = self.store.transaction(&bucket_key, &options, |tx| -> FolioResult<u32> {
            match tx.get(&bucket_key)? {
                None => {
                    tx.set(&bucket_key, 1)?;
                    Ok(1)
                }
                Some(current) => {
                    let next = current.saturating_add(1);
                    if next > max {
                        return Err(FolioError::CapacityExhausted {
                            bucket_key: bucket_key.clone(),
                            max,
                        });
                    }
                    tx.update(&bucket_key, next)?;
                    Ok(next)
                }
            }
        });

        match result {
            Ok(consecutive) => {
                let folio = self.format.identifier(bucket, consecutive);
                info!(
                    "event=folio_allocate module=service status=ok bucket={} consecutive={} duration_ms={}",
                    bucket_key,
                    consecutive,
                    started_at.elapsed().as_millis()
                );
                Ok(folio)
            }
            Err(err @ FolioError::CapacityExhausted { .. }) => {
                warn!(
                    "event=folio_allocate module=service status=rejected bucket={} error_code=capacity_exhausted max={}",
                    bucket_key, max
                );
                Err(err)
            }
            Err(err) => {
                error!(
                    "event=folio_allocate module=service status=error bucket={} duration_ms={} error={}",
                    bucket_key,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

/// Bucket prefix `CF-YYYY-WW-` for today's local calendar date.
pub fn current_week_prefix() -> String {
    crate::model::folio::bucket_prefix(today())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::{FolioError, FolioService};
    use crate::config::FolioConfig;
    use crate::db::open_db_in_memory;
    use crate::repo::counter_repo::SqliteCounterStore;
    use chrono::NaiveDate;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn first_allocation_of_a_bucket_starts_at_one() {
        let conn = open_db_in_memory().unwrap();
        let service = FolioService::new(SqliteCounterStore::try_new(&conn).unwrap());

        let folio = service.generate_folio_on(date(2025, 9, 10)).unwrap();
        assert_eq!(folio.as_str(), "CF-2025-37-001");
        let folio = service.generate_folio_on(date(2025, 9, 12)).unwrap();
        assert_eq!(folio.as_str(), "CF-2025-37-002");
    }

    #[test]
    fn invalid_config_is_rejected_before_store_use() {
        let conn = open_db_in_memory().unwrap();
        let config = FolioConfig {
            prefix: "C F".to_string(),
            ..FolioConfig::default()
        };
        let result = FolioService::with_config(SqliteCounterStore::try_new(&conn).unwrap(), config);
        assert!(matches!(result, Err(FolioError::Config(_))));
    }

    #[test]
    fn week_prefix_follows_configured_prefix() {
        let conn = open_db_in_memory().unwrap();
        let config = FolioConfig {
            prefix: "OT".to_string(),
            ..FolioConfig::default()
        };
        let service =
            FolioService::with_config(SqliteCounterStore::try_new(&conn).unwrap(), config)
                .unwrap();
        assert_eq!(service.week_prefix_on(date(2025, 1, 6)), "OT-2025-02-");
        assert!(service.current_week_prefix().starts_with("OT-"));
        assert!(service.validate_folio("OT-2025-02-001"));
        assert!(!service.validate_folio("CF-2025-02-001"));
    }
}
