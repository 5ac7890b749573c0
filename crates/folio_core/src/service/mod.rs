//! Core use-case services.
//!
//! # Responsibility
//! - Turn store transactions into folio allocation use-cases.
//! - Keep callers decoupled from storage details.

pub mod folio_service;
