//! Merges extracted points into one wide table keyed by timestamp.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use chrono::NaiveDateTime;
use clap::ValueEnum;
use tracing::warn;

use crate::{extract::ExtractedPoint, period::Period, registry::VariableRegistry};

/// Which value survives when two files disagree on one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConflictPolicy {
    #[default]
    KeepFirst,
    KeepLast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub timestamp: NaiveDateTime,
    pub variable: String,
    pub kept: f64,
    pub rejected: f64,
}

#[derive(Debug, Default)]
pub struct ResultTable {
    cells: BTreeMap<NaiveDateTime, BTreeMap<String, Option<f64>>>,
    policy: ConflictPolicy,
    conflicts: Vec<Conflict>,
}

impl ResultTable {
    pub fn new(policy: ConflictPolicy) -> Self {
        ResultTable {
            policy,
            ..Default::default()
        }
    }

    pub fn merge(&mut self, points: &[ExtractedPoint]) {
        for point in points {
            self.merge_point(point);
        }
    }

    fn merge_point(&mut self, point: &ExtractedPoint) {
        let row = self.cells.entry(point.timestamp).or_default();

        let Some(existing) = row.get_mut(&point.variable) else {
            row.insert(point.variable.clone(), point.value);
            return;
        };

        match (*existing, point.value) {
            (_, None) => {}
            (None, Some(incoming)) => *existing = Some(incoming),
            (Some(current), Some(incoming)) if current == incoming => {}
            (Some(current), Some(incoming)) => {
                let (kept, rejected) = match self.policy {
                    ConflictPolicy::KeepFirst => (current, incoming),
                    ConflictPolicy::KeepLast => {
                        *existing = Some(incoming);
                        (incoming, current)
                    }
                };
                self.record_conflict(Conflict {
                    timestamp: point.timestamp,
                    variable: point.variable.clone(),
                    kept,
                    rejected,
                });
            }
        }
    }

    fn record_conflict(&mut self, conflict: Conflict) {
        let seen = self.conflicts.iter().any(|c| {
            c.timestamp == conflict.timestamp
                && c.variable == conflict.variable
                && (c.rejected == conflict.rejected || c.kept == conflict.rejected)
        });
        if seen {
            return;
        }

        warn!(
            timestamp = %conflict.timestamp,
            variable = %conflict.variable,
            kept = conflict.kept,
            rejected = conflict.rejected,
            "Conflicting values for one timestamp"
        );
        self.conflicts.push(conflict);
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Periods that hold at least one point.
    pub fn observed_periods(&self) -> BTreeSet<Period> {
        self.cells.keys().map(Period::from_timestamp).collect()
    }

    pub fn finalize(&self, registry: &VariableRegistry, audit: Option<&CoverageAudit>) -> FinalTable {
        let columns: Vec<String> = registry.logical_names().map(str::to_string).collect();

        let rows = self
            .cells
            .iter()
            .map(|(timestamp, cells)| Row {
                timestamp: *timestamp,
                values: columns
                    .iter()
                    .map(|column| cells.get(column).copied().flatten())
                    .collect(),
            })
            .collect();

        let gaps = audit
            .map(|audit| audit.gaps(&self.observed_periods()))
            .unwrap_or_default();

        FinalTable { columns, rows, gaps }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp: NaiveDateTime,
    /// One entry per column, in registry order.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub gaps: Vec<CoverageGap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapReason {
    MissingFile,
    NoMatchingMessages,
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapReason::MissingFile => write!(f, "missing file"),
            GapReason::NoMatchingMessages => write!(f, "no matching messages"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageGap {
    pub period: Period,
    pub reason: GapReason,
}

/// Expected months and the months a file was actually supplied for.
#[derive(Debug, Clone, Default)]
pub struct CoverageAudit {
    pub expected: Vec<Period>,
    pub supplied: BTreeSet<Period>,
}

impl CoverageAudit {
    pub fn new(expected: Vec<Period>, supplied: BTreeSet<Period>) -> Self {
        CoverageAudit { expected, supplied }
    }

    pub fn gaps(&self, observed: &BTreeSet<Period>) -> Vec<CoverageGap> {
        self.expected
            .iter()
            .filter(|period| !observed.contains(period))
            .map(|&period| CoverageGap {
                period,
                reason: if self.supplied.contains(&period) {
                    GapReason::NoMatchingMessages
                } else {
                    GapReason::MissingFile
                },
            })
            .collect()
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::extract::tests::hour;

    use super::*;

    #[test]
    fn should_replace_missing_with_present() {
        let mut table = ResultTable::default();

        table.merge(&[
            point(hour(1940, 1, 1, 0), "swh", None),
            point(hour(1940, 1, 1, 0), "swh", Some(1.2)),
        ]);

        let rows = table.finalize(&registry(), None).rows;
        assert_eq!(rows[0].values[0], Some(1.2));
        assert!(table.conflicts().is_empty());
    }

    #[test]
    fn should_not_replace_present_with_missing() {
        let mut table = ResultTable::default();

        table.merge(&[
            point(hour(1940, 1, 1, 0), "swh", Some(1.2)),
            point(hour(1940, 1, 1, 0), "swh", None),
        ]);

        assert_eq!(table.finalize(&registry(), None).rows[0].values[0], Some(1.2));
    }

    #[test]
    fn should_keep_first_and_record_conflict() {
        let mut table = ResultTable::new(ConflictPolicy::KeepFirst);

        table.merge(&[
            point(hour(1940, 1, 1, 0), "swh", Some(1.0)),
            point(hour(1940, 1, 1, 0), "swh", Some(2.0)),
        ]);

        assert_eq!(table.finalize(&registry(), None).rows[0].values[0], Some(1.0));
        assert_eq!(
            table.conflicts(),
            &[Conflict {
                timestamp: hour(1940, 1, 1, 0),
                variable: "swh".to_string(),
                kept: 1.0,
                rejected: 2.0,
            }]
        );
    }

    #[test]
    fn should_keep_last_when_configured() {
        let mut table = ResultTable::new(ConflictPolicy::KeepLast);

        table.merge(&[
            point(hour(1940, 1, 1, 0), "swh", Some(1.0)),
            point(hour(1940, 1, 1, 0), "swh", Some(2.0)),
        ]);

        assert_eq!(table.finalize(&registry(), None).rows[0].values[0], Some(2.0));
        assert_eq!(table.conflicts().len(), 1);
    }

    #[test]
    fn should_merge_idempotently() {
        let points = vec![
            point(hour(1940, 1, 1, 1), "mwd", Some(180.0)),
            point(hour(1940, 1, 1, 0), "swh", Some(1.0)),
            point(hour(1940, 1, 1, 0), "swh", Some(2.0)),
        ];
        let mut once = ResultTable::default();
        once.merge(&points);
        let mut twice = ResultTable::default();
        twice.merge(&points);
        twice.merge(&points);

        assert_eq!(
            once.finalize(&registry(), None),
            twice.finalize(&registry(), None)
        );
        assert_eq!(once.conflicts(), twice.conflicts());
    }

    #[test]
    fn should_not_record_conflict_twice_under_keep_last() {
        let points = vec![
            point(hour(1940, 1, 1, 0), "swh", Some(1.0)),
            point(hour(1940, 1, 1, 0), "swh", Some(2.0)),
        ];
        let mut table = ResultTable::new(ConflictPolicy::KeepLast);

        table.merge(&points);
        table.merge(&points);

        assert_eq!(table.conflicts().len(), 1);
    }

    #[test]
    fn should_finalize_sorted_rows_in_registry_order() {
        let mut table = ResultTable::default();

        table.merge(&[
            point(hour(1940, 1, 2, 0), "dwi", Some(90.0)),
            point(hour(1940, 1, 1, 5), "swh", Some(1.0)),
            point(hour(1940, 1, 1, 5), "pp1d", Some(9.5)),
            point(hour(1940, 1, 1, 0), "swh", Some(0.5)),
        ]);
        let table = table.finalize(&registry(), None);

        assert_eq!(table.columns, vec!["swh", "mwd", "pp1d", "wind", "dwi"]);
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(
            table.rows[1].values,
            vec![Some(1.0), None, Some(9.5), None, None]
        );
        assert_eq!(table.rows[2].values[4], Some(90.0));
    }

    #[test]
    fn should_report_coverage_gaps_by_reason() {
        let mut table = ResultTable::default();
        table.merge(&[point(hour(1940, 1, 1, 0), "swh", Some(1.0))]);

        let expected = Period::range(1940, 1940)[..3].to_vec();
        let supplied = [expected[0], expected[2]].into_iter().collect();
        let audit = CoverageAudit::new(expected.clone(), supplied);

        let gaps = table.finalize(&registry(), Some(&audit)).gaps;

        assert_eq!(
            gaps,
            vec![
                CoverageGap {
                    period: expected[1],
                    reason: GapReason::MissingFile,
                },
                CoverageGap {
                    period: expected[2],
                    reason: GapReason::NoMatchingMessages,
                },
            ]
        );
    }

    #[test]
    fn should_count_missing_only_month_as_observed() {
        let mut table = ResultTable::default();
        table.merge(&[point(hour(1940, 1, 1, 0), "swh", None)]);

        let audit = CoverageAudit::new(vec![Period::new(1940, 1).unwrap()], BTreeSet::new());

        assert!(table.finalize(&registry(), Some(&audit)).gaps.is_empty());
    }

    fn point(timestamp: NaiveDateTime, variable: &str, value: Option<f64>) -> ExtractedPoint {
        ExtractedPoint {
            timestamp,
            variable: variable.to_string(),
            value,
        }
    }

    fn registry() -> VariableRegistry {
        VariableRegistry::era5_waves().unwrap()
    }
}
