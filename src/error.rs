use core::fmt;

use thiserror::Error;

/// Result alias for `ivcca`.
pub type Result<T> = std::result::Result<T, Error>;

/// Analysis stage an operation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// A dataset has been loaded.
    Dataset,
    /// A correlation matrix has been computed for the loaded dataset.
    Correlation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Dataset => write!(f, "dataset"),
            Stage::Correlation => write!(f, "correlation matrix"),
        }
    }
}

/// Errors returned by the analysis engines.
///
/// Every variant is recoverable: a failed call never leaves shared state
/// half-updated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// An operation ran before the stage it depends on.
    #[error("{stage} not available: run that stage first")]
    NotLoaded {
        /// The missing stage.
        stage: Stage,
    },

    /// Malformed or empty input matrix.
    #[error("invalid input format: {0}")]
    InvalidFormat(String),

    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Matrix dimension mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Cross-dataset correlation over datasets with different sample counts.
    #[error("datasets must have the same number of samples: {left} vs {right}")]
    SampleCountMismatch {
        /// Samples in the first dataset.
        left: usize,
        /// Samples in the second dataset.
        right: usize,
    },

    /// A named gene is absent from the dataset (case-insensitive lookup).
    #[error("gene '{0}' not found in dataset")]
    GeneNotFound(String),

    /// None of a pathway's (or gene list's) genes matched the dataset.
    #[error("no listed genes matched the dataset ({0})")]
    EmptyPathway(String),

    /// Input too small or too uniform for the requested computation.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Invalid number of clusters requested.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Eigendecomposition or other linear algebra failure.
    #[error("decomposition failed: {0}")]
    Decomposition(String),

    /// Configuration could not be parsed or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}
