//! # Violation Category — Single Source of Truth
//!
//! Defines the `ViolationCategory` enum covering every compliance feed a
//! report aggregates. This is the ONE definition used across the stack —
//! every `match` on `ViolationCategory` must be exhaustive, so adding a
//! feed forces every consumer to handle it at compile time.
//!
//! ## Dismissal grain
//!
//! The two housing-authority feeds (HPD, DOB) carry a stable per-item
//! identity and support both section-level and individual dismissal. The
//! equipment/permit feeds have no stable per-item identity in the source
//! data and support section-level suppression only.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ValidationError;

/// All violation categories tracked on a compliance report.
///
/// String forms match the ingestion feed keys of the source datasets,
/// which is also what the HTTP surface accepts.
///
/// | Category | Feed | Dismissal grain |
/// |---|---|---|
/// | HpdViolations | Housing Preservation & Development violations | section + item |
/// | DobViolations | Department of Buildings violations | section + item |
/// | ElevatorInspections | Elevator compliance records | section only |
/// | BoilerInspections | Boiler safety records | section only |
/// | ElectricalPermits | Electrical permit applications | section only |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    /// Housing Preservation & Development violations.
    HpdViolations,
    /// Department of Buildings violations.
    DobViolations,
    /// Elevator inspection/compliance records.
    ElevatorInspections,
    /// Boiler safety inspection records.
    BoilerInspections,
    /// Electrical permit applications.
    ElectricalPermits,
}

/// Total number of violation categories.
pub const VIOLATION_CATEGORY_COUNT: usize = 5;

impl ViolationCategory {
    /// Returns all categories in canonical order.
    pub fn all() -> &'static [ViolationCategory] {
        &[
            Self::HpdViolations,
            Self::DobViolations,
            Self::ElevatorInspections,
            Self::BoilerInspections,
            Self::ElectricalPermits,
        ]
    }

    /// Returns the snake_case string identifier for this category.
    ///
    /// Must match the serde serialization format and the feed keys used
    /// by the ingestion job.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HpdViolations => "hpd_violations",
            Self::DobViolations => "dob_violations",
            Self::ElevatorInspections => "elevator_inspections",
            Self::BoilerInspections => "boiler_inspections",
            Self::ElectricalPermits => "electrical_permits",
        }
    }

    /// Whether violations in this category carry a stable per-item
    /// identity and can be dismissed individually.
    ///
    /// Section dismissal of such a category cascades into per-violation
    /// ledger entries; section-only categories flip the section flag and
    /// nothing else.
    pub fn supports_item_dismissal(&self) -> bool {
        matches!(self, Self::HpdViolations | Self::DobViolations)
    }
}

impl FromStr for ViolationCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hpd_violations" => Ok(Self::HpdViolations),
            "dob_violations" => Ok(Self::DobViolations),
            "elevator_inspections" => Ok(Self::ElevatorInspections),
            "boiler_inspections" => Ok(Self::BoilerInspections),
            "electrical_permits" => Ok(Self::ElectricalPermits),
            other => Err(ValidationError::UnknownCategory(other.to_string())),
        }
    }
}

impl std::fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// City a property (and thus its reports) belongs to.
///
/// Metadata only — the dismissal and scoring semantics are identical in
/// both markets; the ingestion job maps each city's feeds onto the same
/// category set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum City {
    /// New York City.
    Nyc,
    /// Philadelphia.
    Philadelphia,
}

impl City {
    /// Returns the snake_case string identifier for this city.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nyc => "nyc",
            Self::Philadelphia => "philadelphia",
        }
    }
}

impl FromStr for City {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nyc" => Ok(Self::Nyc),
            "philadelphia" => Ok(Self::Philadelphia),
            other => Err(ValidationError::UnknownCity(other.to_string())),
        }
    }
}

impl std::fmt::Display for City {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_categories_count_matches() {
        assert_eq!(ViolationCategory::all().len(), VIOLATION_CATEGORY_COUNT);
    }

    #[test]
    fn as_str_round_trips_through_from_str() {
        for &cat in ViolationCategory::all() {
            let parsed: ViolationCategory = cat.as_str().parse().unwrap();
            assert_eq!(parsed, cat);
        }
    }

    #[test]
    fn unknown_category_rejected() {
        let err = "parking_tickets".parse::<ViolationCategory>().unwrap_err();
        assert!(err.to_string().contains("parking_tickets"));
    }

    #[test]
    fn serde_matches_as_str() {
        for &cat in ViolationCategory::all() {
            let json = serde_json::to_string(&cat).unwrap();
            assert_eq!(json, format!("\"{}\"", cat.as_str()));
        }
    }

    #[test]
    fn only_housing_feeds_support_item_dismissal() {
        let item_capable: Vec<_> = ViolationCategory::all()
            .iter()
            .filter(|c| c.supports_item_dismissal())
            .collect();
        assert_eq!(
            item_capable,
            vec![
                &ViolationCategory::HpdViolations,
                &ViolationCategory::DobViolations
            ]
        );
    }

    #[test]
    fn city_serde_round_trip() {
        let json = serde_json::to_string(&City::Philadelphia).unwrap();
        assert_eq!(json, "\"philadelphia\"");
        let back: City = serde_json::from_str(&json).unwrap();
        assert_eq!(back, City::Philadelphia);
    }
}
