use thiserror::Error;

use crate::DistributionProblem;

/// Configuration defects detected while building or sampling a flow.
///
/// None of these conditions are transient: they indicate that the caller
/// assembled an inconsistent distribution table or engine configuration and
/// must fix it before starting another run.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum FlowError {
    /// A sampled `(category, start)` pair has no cumulative distribution.
    #[error("no distribution for category '{category}' at start '{start}'")]
    MissingDistribution {
        /// Category that was sampled.
        category: String,
        /// Start-state that was sampled.
        start: String,
    },
    /// A run was requested without any active category.
    #[error("at least one category must be selected")]
    EmptySelection,
    /// A cumulative distribution violates the table's shape rules.
    #[error("distribution for category '{category}' at start '{start}' is malformed: {problem}")]
    MalformedDistribution {
        /// Category owning the distribution.
        category: String,
        /// Start-state owning the distribution.
        start: String,
        /// Specific rule the distribution breaks.
        problem: DistributionProblem,
    },
    /// The same `(category, start)` pair was declared twice.
    #[error("distribution for category '{category}' at start '{start}' is declared twice")]
    DuplicateDistribution {
        /// Category owning the distribution.
        category: String,
        /// Start-state owning the distribution.
        start: String,
    },
    /// A distribution refers to a category that the table does not declare.
    #[error("category '{0}' is not declared")]
    UnknownCategory(String),
    /// A distribution refers to a start-state that the table does not declare.
    #[error("start '{0}' is not declared")]
    UnknownStart(String),
    /// An engine or table setting holds an unusable value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
