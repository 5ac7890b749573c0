//! Folio sequence allocation for field-service records.
//! This crate is the single source of truth for folio invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{FolioConfig, FolioConfigError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError, LoggingStatus};
pub use model::folio::{
    bucket_prefix, format_folio, is_valid_folio, next_consecutive, parse_folio, FolioFormat,
    FolioIdentifier, FolioParts, FolioPrefixError, InvalidFolio, DEFAULT_PREFIX, MAX_CONSECUTIVE,
};
pub use model::week::{iso_week_year, week_number, BucketKey, YearAnchor};
pub use repo::counter_repo::{
    CounterResult, CounterStore, CounterStoreError, CounterTransaction, SqliteCounterStore,
    TxOptions,
};
pub use service::folio_service::{current_week_prefix, FolioError, FolioResult, FolioService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
