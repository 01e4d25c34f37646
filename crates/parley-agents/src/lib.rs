//! The Parley dialogue domains.
//!
//! Each module defines one agent on top of `parley-core`: its phase graph,
//! its typed payload, its reference data, and a `registry()` constructor
//! returning the tools a decision source may call.
//!
//! | Agent | Terminal phase | Reference data | Sink |
//! |-------|----------------|----------------|------|
//! | [`coffee`] | `complete` | none | JSON file |
//! | [`improv`] | `done` | scenario list | JSON file |
//! | [`sales`] | `closing` | FAQ | JSON file |
//! | [`grocery`] | `placed` | catalog + recipes | JSON file |
//! | [`adventure`] | `ended` | world | JSON file |
//! | [`fraud`] | `resolved` | fraud case store | `fraud_cases` row |
//!
//! [`coffee`] and [`improv`] also implement
//! [`Conversational`](parley_core::Conversational) and can be driven
//! straight from transcripts.

pub mod adventure;
pub mod coffee;
mod error;
pub mod fraud;
pub mod fraud_store;
pub mod grocery;
pub mod improv;
pub mod reference;
pub mod sales;

pub use error::{FraudStoreError, ReferenceDataError};

/// Formats integer cents as dollars, e.g. `1250` as `$12.50`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}${}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod testing;
