//! Persistence contracts and implementations.
//!
//! # Responsibility
//! - Define the transactional counter contract consumed by allocation.
//! - Keep SQL details out of the service layer.
//!
//! # Invariants
//! - Counter writes happen only inside a store transaction.

pub mod counter_repo;
