//! # Validation Errors
//!
//! Request-level validation failures. These are always rejected before
//! any ledger write and surface as client errors on the HTTP side.

use thiserror::Error;

use crate::category::ViolationCategory;

/// A request failed validation before touching the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The category string is not in the enumerated set.
    #[error("unknown violation category: {0}")]
    UnknownCategory(String),

    /// An external violation identifier was empty or whitespace-only.
    #[error("violation id must be a non-empty string")]
    InvalidViolationId,

    /// Individual dismissal requested for a category whose source data
    /// has no stable per-item identity.
    #[error("category {0} supports section-level dismissal only")]
    SectionOnlyCategory(ViolationCategory),

    /// A section total was supplied for an itemized category, whose
    /// total is derived from its violation records.
    #[error("category {0} is itemized; its total is derived from violation records")]
    SectionTotalForItemizedCategory(ViolationCategory),

    /// The authenticated user id was empty.
    #[error("dismissed_by must be a non-empty user id")]
    InvalidUserId,

    /// The city string is not a supported market.
    #[error("unknown city: {0}")]
    UnknownCity(String),
}
