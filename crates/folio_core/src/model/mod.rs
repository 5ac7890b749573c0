//! Folio domain model.
//!
//! # Responsibility
//! - Define folio identifiers and the week buckets that scope them.
//! - Keep every pure formatting/parsing rule in one place.
//!
//! # Invariants
//! - Nothing in this module performs I/O.

pub mod folio;
pub mod week;
