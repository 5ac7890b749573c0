//! Folio identifier formatting, parsing and validation.
//!
//! # Responsibility
//! - Render `PREFIX-YYYY-WW-NNN` identifiers from their components.
//! - Parse and validate identifiers without raising errors on bad input.
//! - Provide the `FolioIdentifier` value type handed to record owners.
//!
//! # Invariants
//! - Parsing is anchored at both ends; partial matches are rejected.
//! - `parse(format(y, w, c)) == (y, w, c)` for 4-digit years, weeks 1-53 and
//!   consecutives 1-999.
//! - Formatting does not clamp; a consecutive above 999 yields a wider,
//!   unparsable suffix.

use crate::model::week::{BucketKey, YearAnchor};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Prefix stamped on folios issued by this system.
pub const DEFAULT_PREFIX: &str = "CF";
/// Largest consecutive that fits the fixed 3-digit suffix.
pub const MAX_CONSECUTIVE: u32 = 999;

static FOLIO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]+)-([0-9]{4})-([0-9]{2})-([0-9]{3})$").expect("valid folio regex")
});
static PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid folio prefix regex"));
static DEFAULT_FORMAT: Lazy<FolioFormat> = Lazy::new(|| FolioFormat {
    prefix: DEFAULT_PREFIX.to_string(),
});

/// Numeric components of one folio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolioParts {
    pub year: i32,
    pub week: u32,
    pub consecutive: u32,
}

impl FolioParts {
    /// Bucket that issued this folio.
    pub fn bucket_key(&self) -> BucketKey {
        BucketKey::new(self.year, self.week)
    }
}

/// Rejected folio prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolioPrefixError {
    Empty,
    InvalidCharacters(String),
}

impl Display for FolioPrefixError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "folio prefix cannot be empty"),
            Self::InvalidCharacters(value) => write!(
                f,
                "folio prefix `{value}` must contain only ASCII letters and digits"
            ),
        }
    }
}

impl Error for FolioPrefixError {}

/// Folio codec bound to one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolioFormat {
    prefix: String,
}

impl FolioFormat {
    /// Creates a codec for `prefix`.
    ///
    /// # Errors
    /// - Returns an error when `prefix` is empty or contains anything other
    ///   than ASCII letters and digits (a hyphen would make parsing ambiguous).
    pub fn new(prefix: &str) -> Result<Self, FolioPrefixError> {
        let trimmed = prefix.trim();
        if trimmed.is_empty() {
            return Err(FolioPrefixError::Empty);
        }
        if !PREFIX_RE.is_match(trimmed) {
            return Err(FolioPrefixError::InvalidCharacters(trimmed.to_string()));
        }
        Ok(Self {
            prefix: trimmed.to_string(),
        })
    }

    /// Codec for [`DEFAULT_PREFIX`].
    pub fn default_format() -> &'static FolioFormat {
        &DEFAULT_FORMAT
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Renders `PREFIX-YYYY-WW-NNN`.
    pub fn format(&self, year: i32, week: u32, consecutive: u32) -> String {
        format!("{}-{year}-{week:02}-{consecutive:03}", self.prefix)
    }

    /// Parses `text`, returning `None` on any mismatch.
    pub fn parse(&self, text: &str) -> Option<FolioParts> {
        match split_folio(text)? {
            (prefix, parts) if prefix == self.prefix => Some(parts),
            _ => None,
        }
    }

    pub fn is_valid(&self, text: &str) -> bool {
        self.parse(text).is_some()
    }

    /// Parses `text` into an owned identifier.
    pub fn parse_identifier(&self, text: &str) -> Option<FolioIdentifier> {
        let parts = self.parse(text)?;
        Some(FolioIdentifier {
            text: text.to_string(),
            prefix_len: self.prefix.len(),
            parts,
        })
    }

    /// Consecutive that follows `last`, or 1 when `last` is absent or not
    /// recognized. Does not reserve anything.
    pub fn next_consecutive(&self, last: Option<&str>) -> u32 {
        match last.and_then(|text| self.parse(text)) {
            Some(parts) => parts.consecutive + 1,
            None => 1,
        }
    }

    /// Renders `PREFIX-YYYY-WW-` for `date`.
    pub fn bucket_prefix(&self, date: NaiveDate, anchor: YearAnchor) -> String {
        BucketKey::for_date(date, anchor).folio_prefix(&self.prefix)
    }

    pub(crate) fn identifier(&self, bucket: BucketKey, consecutive: u32) -> FolioIdentifier {
        FolioIdentifier {
            text: self.format(bucket.year, bucket.week, consecutive),
            prefix_len: self.prefix.len(),
            parts: FolioParts {
                year: bucket.year,
                week: bucket.week,
                consecutive,
            },
        }
    }
}

// Splits a well-formed folio into its prefix and numeric components.
fn split_folio(text: &str) -> Option<(&str, FolioParts)> {
    let captures = FOLIO_RE.captures(text)?;
    let prefix = captures.get(1)?.as_str();
    let parts = FolioParts {
        year: captures[2].parse().ok()?,
        week: captures[3].parse().ok()?,
        consecutive: captures[4].parse().ok()?,
    };
    Some((prefix, parts))
}

/// Validated folio string assigned to one business record.
///
/// Carries whatever prefix issued it; use [`FolioFormat::parse_identifier`]
/// to additionally require a specific prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolioIdentifier {
    text: String,
    prefix_len: usize,
    parts: FolioParts,
}

impl FolioIdentifier {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Prefix tag of the issuing system, e.g. `CF`.
    pub fn prefix(&self) -> &str {
        &self.text[..self.prefix_len]
    }

    pub fn parts(&self) -> FolioParts {
        self.parts
    }

    pub fn bucket_key(&self) -> BucketKey {
        self.parts.bucket_key()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Display for FolioIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for FolioIdentifier {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Text that is not a well-formed folio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFolio(pub String);

impl Display for InvalidFolio {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid folio: `{}`", self.0)
    }
}

impl Error for InvalidFolio {}

impl FromStr for FolioIdentifier {
    type Err = InvalidFolio;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, parts) = split_folio(s).ok_or_else(|| InvalidFolio(s.to_string()))?;
        Ok(Self {
            text: s.to_string(),
            prefix_len: prefix.len(),
            parts,
        })
    }
}

impl Serialize for FolioIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for FolioIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Formats a folio with [`DEFAULT_PREFIX`].
pub fn format_folio(year: i32, week: u32, consecutive: u32) -> String {
    DEFAULT_FORMAT.format(year, week, consecutive)
}

/// Parses a folio with [`DEFAULT_PREFIX`].
pub fn parse_folio(text: &str) -> Option<FolioParts> {
    DEFAULT_FORMAT.parse(text)
}

pub fn is_valid_folio(text: &str) -> bool {
    DEFAULT_FORMAT.is_valid(text)
}

/// See [`FolioFormat::next_consecutive`].
pub fn next_consecutive(last: Option<&str>) -> u32 {
    DEFAULT_FORMAT.next_consecutive(last)
}

/// Bucket prefix `CF-YYYY-WW-` for `date`, stamped with its calendar year.
pub fn bucket_prefix(date: NaiveDate) -> String {
    DEFAULT_FORMAT.bucket_prefix(date, YearAnchor::Calendar)
}
