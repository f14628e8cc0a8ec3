//! Property-based tests for the dismissal engine.
//!
//! Drives random dismiss/restore sequences at both grains against a
//! seeded in-memory store and checks, after every single step:
//!
//! - `active + dismissed == total` for every category;
//! - the score stays within [0, 100];
//! - dismissals never lower the score, restorations never raise it;
//! - section dismissal leaves a dismissal record for every violation in
//!   the section.

use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use parapet_core::{CategoryTally, City, ReportCounts, ViolationCategory, ViolationId};
use parapet_engine::{DismissalEngine, MemoryStore, ReportSource, SourceViolation};

#[derive(Debug, Clone)]
enum Op {
    DismissSection(ViolationCategory),
    RestoreSection(ViolationCategory),
    DismissViolation(ViolationCategory, usize),
    RestoreViolation(ViolationCategory, usize),
}

impl Op {
    fn is_dismissal(&self) -> bool {
        matches!(self, Op::DismissSection(_) | Op::DismissViolation(..))
    }
}

fn item_category() -> impl Strategy<Value = ViolationCategory> {
    prop_oneof![
        Just(ViolationCategory::HpdViolations),
        Just(ViolationCategory::DobViolations),
    ]
}

fn section_category() -> impl Strategy<Value = ViolationCategory> {
    prop_oneof![
        Just(ViolationCategory::HpdViolations),
        Just(ViolationCategory::DobViolations),
        Just(ViolationCategory::BoilerInspections),
        Just(ViolationCategory::ElectricalPermits),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        section_category().prop_map(Op::DismissSection),
        section_category().prop_map(Op::RestoreSection),
        (item_category(), 0usize..8).prop_map(|(c, i)| Op::DismissViolation(c, i)),
        (item_category(), 0usize..8).prop_map(|(c, i)| Op::RestoreViolation(c, i)),
    ]
}

fn vid(category: ViolationCategory, index: usize) -> ViolationId {
    ViolationId::new(format!("{}-{index}", category.as_str())).unwrap()
}

fn items(category: ViolationCategory, count: usize) -> Vec<SourceViolation> {
    (0..count)
        .map(|i| SourceViolation {
            category,
            violation_id: vid(category, i),
            payload: serde_json::json!({"index": i}),
        })
        .collect()
}

fn check_step(
    counts: &ReportCounts,
    totals: &CategoryTally,
    previous_score: f64,
    dismissal: bool,
) -> Result<(), TestCaseError> {
    for &category in ViolationCategory::all() {
        let c = &counts.categories[&category];
        prop_assert_eq!(
            c.active + c.dismissed,
            totals.get(category),
            "active + dismissed != total for {}",
            category
        );
    }
    prop_assert!(counts.compliance_score >= 0.0);
    prop_assert!(counts.compliance_score <= 100.0);
    if dismissal {
        prop_assert!(
            counts.compliance_score >= previous_score,
            "dismissal lowered the score: {} -> {}",
            previous_score,
            counts.compliance_score
        );
    } else {
        prop_assert!(
            counts.compliance_score <= previous_score,
            "restoration raised the score: {} -> {}",
            previous_score,
            counts.compliance_score
        );
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_sequences_preserve_the_invariants(
        hpd_count in 0usize..8,
        dob_count in 0usize..8,
        boiler_total in 0u64..6,
        ops in proptest::collection::vec(op_strategy(), 1..40),
    ) {
        let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
        rt.block_on(async move {
            let engine = DismissalEngine::new(Arc::new(MemoryStore::new()));

            let mut section_totals = CategoryTally::new();
            section_totals.set(ViolationCategory::BoilerInspections, boiler_total);

            let mut violations = items(ViolationCategory::HpdViolations, hpd_count);
            violations.extend(items(ViolationCategory::DobViolations, dob_count));

            let (report, initial) = engine
                .ingest_report(
                    ReportSource {
                        id: None,
                        property_address: "99 Hudson St".to_string(),
                        city: City::Nyc,
                        section_totals,
                    },
                    violations,
                )
                .await
                .expect("ingest");

            let totals: CategoryTally = ViolationCategory::all()
                .iter()
                .map(|&c| (c, initial.categories[&c].total))
                .collect();

            let mut score = initial.compliance_score;
            for op in &ops {
                let counts = match op {
                    Op::DismissSection(category) => {
                        engine
                            .dismiss_section(report, *category, "prop-user")
                            .await
                            .expect("dismiss_section")
                            .counts
                    }
                    Op::RestoreSection(category) => engine
                        .restore_section(report, *category)
                        .await
                        .expect("restore_section"),
                    Op::DismissViolation(category, index) => {
                        let count = totals.get(*category) as usize;
                        if count == 0 {
                            continue;
                        }
                        engine
                            .dismiss_violation(
                                report,
                                *category,
                                vid(*category, index % count),
                                "prop-user",
                                None,
                            )
                            .await
                            .expect("dismiss_violation")
                            .counts
                    }
                    Op::RestoreViolation(category, index) => {
                        let count = totals.get(*category) as usize;
                        if count == 0 {
                            continue;
                        }
                        engine
                            .restore_violation(report, *category, vid(*category, index % count))
                            .await
                            .expect("restore_violation")
                    }
                };

                check_step(&counts, &totals, score, op.is_dismissal())?;
                score = counts.compliance_score;

                if let Op::DismissSection(category) = op {
                    if category.supports_item_dismissal() {
                        let dismissed = engine
                            .dismissed_violations(report, Some(*category))
                            .await
                            .expect("dismissed_violations");
                        prop_assert_eq!(
                            dismissed.len() as u64,
                            totals.get(*category),
                            "cascade incomplete for {}",
                            category
                        );
                    }
                }
            }

            // The facade view agrees with the last mutation's counts.
            let final_counts = engine.counts(report).await.expect("counts");
            prop_assert_eq!(final_counts.compliance_score, score);
            Ok(())
        })?;
    }

    #[test]
    fn dismissing_twice_equals_dismissing_once(
        hpd_count in 1usize..8,
        index in 0usize..8,
    ) {
        let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
        rt.block_on(async move {
            let engine = DismissalEngine::new(Arc::new(MemoryStore::new()));
            let (report, _) = engine
                .ingest_report(
                    ReportSource {
                        id: None,
                        property_address: "99 Hudson St".to_string(),
                        city: City::Nyc,
                        section_totals: CategoryTally::new(),
                    },
                    items(ViolationCategory::HpdViolations, hpd_count),
                )
                .await
                .expect("ingest");

            let target = vid(ViolationCategory::HpdViolations, index % hpd_count);
            let first = engine
                .dismiss_violation(
                    report,
                    ViolationCategory::HpdViolations,
                    target.clone(),
                    "prop-user",
                    None,
                )
                .await
                .expect("first dismissal");
            let ledger_once = engine
                .dismissed_violations(report, None)
                .await
                .expect("ledger");

            let second = engine
                .dismiss_violation(
                    report,
                    ViolationCategory::HpdViolations,
                    target,
                    "someone-else",
                    Some("retry".into()),
                )
                .await
                .expect("second dismissal");
            let ledger_twice = engine
                .dismissed_violations(report, None)
                .await
                .expect("ledger");

            prop_assert!(!first.already_dismissed);
            prop_assert!(second.already_dismissed);
            prop_assert_eq!(first.counts.categories, second.counts.categories);
            prop_assert_eq!(ledger_once, ledger_twice);
            Ok(())
        })?;
    }
}
