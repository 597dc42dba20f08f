use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Category, EndIndex, FlowError, StartIndex};

/// Slack accepted on the final cumulative value and on range checks.
pub const CUMULATIVE_TOLERANCE: f64 = 1e-3;

/// Shape rules a cumulative distribution can break.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum DistributionProblem {
    /// The distribution holds no values.
    #[error("distribution is empty")]
    Empty,
    /// The distribution length differs from the number of end-states.
    #[error("expected {expected} values, found {actual}")]
    LengthMismatch {
        /// Number of declared end-states.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
    /// A value is not finite or lies outside `0.0..=1.0`.
    #[error("value {value} at index {index} lies outside [0, 1]")]
    OutOfRange {
        /// Position of the offending value.
        index: usize,
        /// Offending value.
        value: f64,
    },
    /// A value is smaller than its predecessor.
    #[error("value at index {index} decreases")]
    Decreasing {
        /// Position of the offending value.
        index: usize,
    },
    /// The final value is not 1 within tolerance.
    #[error("final value {last} does not reach 1")]
    NotNormalised {
        /// Final cumulative value.
        last: f64,
    },
    /// A raw count is negative or not finite.
    #[error("count {value} at index {index} is not a non-negative number")]
    InvalidCount {
        /// Position of the offending count.
        index: usize,
        /// Offending count.
        value: f64,
    },
    /// Every raw count is zero, leaving nothing to sample.
    #[error("counts sum to zero")]
    ZeroTotal,
}

/// Non-decreasing cumulative probabilities over the declared end-states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CumulativeDistribution {
    values: Vec<f64>,
}

impl CumulativeDistribution {
    /// Validates and wraps a cumulative probability sequence.
    pub fn new(values: Vec<f64>) -> Result<Self, DistributionProblem> {
        let Some(&last) = values.last() else {
            return Err(DistributionProblem::Empty);
        };

        let mut previous = 0.0;
        for (index, &value) in values.iter().enumerate() {
            if !value.is_finite() || value < 0.0 || value > 1.0 + CUMULATIVE_TOLERANCE {
                return Err(DistributionProblem::OutOfRange { index, value });
            }
            if value < previous {
                return Err(DistributionProblem::Decreasing { index });
            }
            previous = value;
        }

        if (last - 1.0).abs() > CUMULATIVE_TOLERANCE {
            return Err(DistributionProblem::NotNormalised { last });
        }

        Ok(Self { values })
    }

    /// Builds the distribution from raw per-end-state counts.
    ///
    /// Each value is the running sum of counts divided by the total.
    pub fn from_counts(counts: &[f64]) -> Result<Self, DistributionProblem> {
        if counts.is_empty() {
            return Err(DistributionProblem::Empty);
        }
        if let Some((index, &value)) = counts
            .iter()
            .enumerate()
            .find(|(_, value)| !value.is_finite() || **value < 0.0)
        {
            return Err(DistributionProblem::InvalidCount { index, value });
        }

        let total: f64 = counts.iter().sum();
        if total <= 0.0 {
            return Err(DistributionProblem::ZeroTotal);
        }

        let mut running = 0.0;
        let values = counts
            .iter()
            .map(|count| {
                running += count;
                running / total
            })
            .collect();
        Self::new(values)
    }

    /// Cumulative values in end-state order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of end-states covered by the distribution.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`; construction rejects empty sequences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Inverse-CDF lookup: the first end-state whose cumulative value is at least `u`.
    ///
    /// Draws that exceed the final value (possible when rounding leaves it just
    /// below one) resolve to the last end-state.
    #[must_use]
    pub fn sample_index(&self, u: f64) -> EndIndex {
        let index = self.values.partition_point(|&value| value < u);
        EndIndex::new(index.min(self.values.len().saturating_sub(1)))
    }
}

/// Read-only table of cumulative distributions keyed by `(category, start)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DistributionTable {
    categories: Vec<Category>,
    starts: Vec<String>,
    ends: Vec<String>,
    entries: HashMap<Category, Vec<Option<CumulativeDistribution>>>,
}

impl DistributionTable {
    /// Starts building a table over the declared categories, start-states, and end-states.
    #[must_use]
    pub fn builder<C, S, E>(
        categories: impl IntoIterator<Item = C>,
        starts: impl IntoIterator<Item = S>,
        ends: impl IntoIterator<Item = E>,
    ) -> DistributionTableBuilder
    where
        C: Into<Category>,
        S: Into<String>,
        E: Into<String>,
    {
        DistributionTableBuilder {
            categories: categories.into_iter().map(Into::into).collect(),
            starts: starts.into_iter().map(Into::into).collect(),
            ends: ends.into_iter().map(Into::into).collect(),
            entries: HashMap::new(),
        }
    }

    /// Declared categories in declaration order.
    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Declared start-states in declaration order.
    #[must_use]
    pub fn starts(&self) -> &[String] {
        &self.starts
    }

    /// Declared end-states in declaration order.
    #[must_use]
    pub fn ends(&self) -> &[String] {
        &self.ends
    }

    /// Label of a start-state.
    #[must_use]
    pub fn start_label(&self, start: StartIndex) -> Option<&str> {
        self.starts.get(start.get()).map(String::as_str)
    }

    /// Label of an end-state.
    #[must_use]
    pub fn end_label(&self, end: EndIndex) -> Option<&str> {
        self.ends.get(end.get()).map(String::as_str)
    }

    /// Returns the distribution for `(category, start)`.
    pub fn lookup(
        &self,
        category: &str,
        start: StartIndex,
    ) -> Result<&CumulativeDistribution, FlowError> {
        self.entries
            .get(category)
            .and_then(|row| row.get(start.get()))
            .and_then(Option::as_ref)
            .ok_or_else(|| FlowError::MissingDistribution {
                category: category.to_owned(),
                start: self
                    .start_label(start)
                    .map_or_else(|| format!("#{}", start.get()), str::to_owned),
            })
    }

    /// Confirms that every start-state of every listed category can be sampled.
    pub fn ensure_coverage(&self, categories: &[Category]) -> Result<(), FlowError> {
        for category in categories {
            for start in 0..self.starts.len() {
                let _ = self.lookup(category.as_str(), StartIndex::new(start))?;
            }
        }
        Ok(())
    }
}

/// Incremental constructor validating every entry of a [`DistributionTable`].
#[derive(Debug)]
pub struct DistributionTableBuilder {
    categories: Vec<Category>,
    starts: Vec<String>,
    ends: Vec<String>,
    entries: HashMap<Category, Vec<Option<CumulativeDistribution>>>,
}

impl DistributionTableBuilder {
    /// Adds a cumulative probability sequence for `(category, start)`.
    pub fn cumulative(
        self,
        category: &str,
        start: &str,
        values: Vec<f64>,
    ) -> Result<Self, FlowError> {
        let expected = self.ends.len();
        if values.len() != expected {
            return Err(malformed(
                category,
                start,
                DistributionProblem::LengthMismatch {
                    expected,
                    actual: values.len(),
                },
            ));
        }
        let distribution = CumulativeDistribution::new(values)
            .map_err(|problem| malformed(category, start, problem))?;
        self.insert(category, start, distribution)
    }

    /// Adds a distribution for `(category, start)` derived from raw per-end-state counts.
    pub fn counts(self, category: &str, start: &str, counts: &[f64]) -> Result<Self, FlowError> {
        let expected = self.ends.len();
        if counts.len() != expected {
            return Err(malformed(
                category,
                start,
                DistributionProblem::LengthMismatch {
                    expected,
                    actual: counts.len(),
                },
            ));
        }
        let distribution = CumulativeDistribution::from_counts(counts)
            .map_err(|problem| malformed(category, start, problem))?;
        self.insert(category, start, distribution)
    }

    /// Finishes the table after checking the declared label sets.
    pub fn build(self) -> Result<DistributionTable, FlowError> {
        if self.categories.is_empty() {
            return Err(FlowError::InvalidConfig(
                "at least one category must be declared".to_owned(),
            ));
        }
        if self.starts.is_empty() {
            return Err(FlowError::InvalidConfig(
                "at least one start-state must be declared".to_owned(),
            ));
        }
        if self.ends.is_empty() {
            return Err(FlowError::InvalidConfig(
                "at least one end-state must be declared".to_owned(),
            ));
        }
        ensure_unique("category", self.categories.iter().map(Category::as_str))?;
        ensure_unique("start", self.starts.iter().map(String::as_str))?;
        ensure_unique("end", self.ends.iter().map(String::as_str))?;

        Ok(DistributionTable {
            categories: self.categories,
            starts: self.starts,
            ends: self.ends,
            entries: self.entries,
        })
    }

    fn insert(
        mut self,
        category: &str,
        start: &str,
        distribution: CumulativeDistribution,
    ) -> Result<Self, FlowError> {
        let key = self
            .categories
            .iter()
            .find(|declared| declared.as_str() == category)
            .cloned()
            .ok_or_else(|| FlowError::UnknownCategory(category.to_owned()))?;
        let start_index = self
            .starts
            .iter()
            .position(|declared| declared == start)
            .ok_or_else(|| FlowError::UnknownStart(start.to_owned()))?;

        let start_count = self.starts.len();
        let row = self
            .entries
            .entry(key)
            .or_insert_with(|| vec![None; start_count]);
        let slot = &mut row[start_index];
        if slot.is_some() {
            return Err(FlowError::DuplicateDistribution {
                category: category.to_owned(),
                start: start.to_owned(),
            });
        }
        *slot = Some(distribution);
        Ok(self)
    }
}

fn malformed(category: &str, start: &str, problem: DistributionProblem) -> FlowError {
    FlowError::MalformedDistribution {
        category: category.to_owned(),
        start: start.to_owned(),
        problem,
    }
}

fn ensure_unique<'a>(kind: &str, labels: impl Iterator<Item = &'a str>) -> Result<(), FlowError> {
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label) {
            return Err(FlowError::InvalidConfig(format!(
                "{kind} '{label}' is declared twice"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distribution(values: &[f64]) -> CumulativeDistribution {
        CumulativeDistribution::new(values.to_vec()).expect("valid distribution")
    }

    #[test]
    fn zero_draw_selects_first_end_state() {
        for values in [&[0.2, 0.5, 1.0][..], &[0.3, 0.7, 0.9, 1.0][..], &[1.0][..]] {
            assert_eq!(distribution(values).sample_index(0.0), EndIndex::new(0));
        }
    }

    #[test]
    fn draw_below_final_value_selects_last_end_state() {
        let cdf = distribution(&[0.3, 0.7, 0.9, 1.0]);
        assert_eq!(cdf.sample_index(0.999_999), EndIndex::new(3));
        assert_eq!(cdf.sample_index(0.900_001), EndIndex::new(3));
    }

    #[test]
    fn ties_resolve_to_first_qualifying_index() {
        let cdf = distribution(&[0.2, 0.5, 1.0]);
        assert_eq!(cdf.sample_index(0.2), EndIndex::new(0));
        assert_eq!(cdf.sample_index(0.200_1), EndIndex::new(1));
        assert_eq!(cdf.sample_index(0.5), EndIndex::new(1));
    }

    #[test]
    fn draws_beyond_rounded_final_value_clamp_to_last_index() {
        let cdf = distribution(&[0.25, 0.9995]);
        assert_eq!(cdf.sample_index(0.9998), EndIndex::new(1));
    }

    #[test]
    fn counts_produce_running_share() {
        let cdf = CumulativeDistribution::from_counts(&[30.0, 40.0, 20.0, 10.0])
            .expect("counts are valid");
        let expected = [0.3, 0.7, 0.9, 1.0];
        for (value, expected) in cdf.values().iter().zip(expected) {
            assert!((value - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert_eq!(
            CumulativeDistribution::from_counts(&[0.0, 0.0]),
            Err(DistributionProblem::ZeroTotal)
        );
        assert_eq!(
            CumulativeDistribution::from_counts(&[1.0, -2.0]),
            Err(DistributionProblem::InvalidCount {
                index: 1,
                value: -2.0
            })
        );
    }

    #[test]
    fn malformed_sequences_are_rejected() {
        assert_eq!(
            CumulativeDistribution::new(Vec::new()),
            Err(DistributionProblem::Empty)
        );
        assert_eq!(
            CumulativeDistribution::new(vec![0.5, 0.4, 1.0]),
            Err(DistributionProblem::Decreasing { index: 1 })
        );
        assert_eq!(
            CumulativeDistribution::new(vec![0.5, 0.8]),
            Err(DistributionProblem::NotNormalised { last: 0.8 })
        );
        assert!(matches!(
            CumulativeDistribution::new(vec![0.5, 1.2]),
            Err(DistributionProblem::OutOfRange { index: 1, .. })
        ));
        assert!(CumulativeDistribution::new(vec![0.5, 0.9995]).is_ok());
    }

    #[test]
    fn builder_validates_entries_against_declared_sets() {
        let builder = || DistributionTable::builder(["F", "M"], ["Not Seen"], ["A", "B", "C"]);

        assert!(matches!(
            builder().cumulative("F", "Not Seen", vec![0.5, 1.0]),
            Err(FlowError::MalformedDistribution {
                problem: DistributionProblem::LengthMismatch {
                    expected: 3,
                    actual: 2
                },
                ..
            })
        ));
        assert_eq!(
            builder()
                .cumulative("X", "Not Seen", vec![0.2, 0.5, 1.0])
                .err(),
            Some(FlowError::UnknownCategory("X".to_owned()))
        );
        assert_eq!(
            builder().cumulative("F", "Seen", vec![0.2, 0.5, 1.0]).err(),
            Some(FlowError::UnknownStart("Seen".to_owned()))
        );

        let duplicate = builder()
            .cumulative("F", "Not Seen", vec![0.2, 0.5, 1.0])
            .and_then(|builder| builder.counts("F", "Not Seen", &[1.0, 1.0, 1.0]));
        assert!(matches!(
            duplicate,
            Err(FlowError::DuplicateDistribution { .. })
        ));
    }

    #[test]
    fn lookup_reports_missing_pairs_by_label() {
        let table = DistributionTable::builder(["F", "M"], ["Not Seen"], ["A", "B", "C"])
            .cumulative("F", "Not Seen", vec![0.2, 0.5, 1.0])
            .and_then(DistributionTableBuilder::build)
            .expect("table builds");

        assert!(table.lookup("F", StartIndex::new(0)).is_ok());
        assert_eq!(
            table.lookup("M", StartIndex::new(0)),
            Err(FlowError::MissingDistribution {
                category: "M".to_owned(),
                start: "Not Seen".to_owned(),
            })
        );
        assert!(table.ensure_coverage(&[Category::from("F")]).is_ok());
        assert!(table
            .ensure_coverage(&[Category::from("F"), Category::from("M")])
            .is_err());
    }

    #[test]
    fn build_rejects_duplicate_labels() {
        let result = DistributionTable::builder(["F", "F"], ["Not Seen"], ["A"]).build();
        assert!(matches!(result, Err(FlowError::InvalidConfig(_))));
    }
}
