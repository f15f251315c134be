//! Error types for tfws

use thiserror::Error;

/// tfws error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error (bad region layout, link ordering, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A histogram requested from the store does not exist
    #[error("histogram '{key}' not found in region '{region}'")]
    MissingHistogram {
        /// Region the lookup was made in
        region: String,
        /// Key that was requested
        key: String,
    },

    /// A linked model asked for a donor bin model that has not been built
    #[error("no bin model for donor process '{process}' in region '{region}'")]
    MissingDonor {
        /// Donor process name
        process: String,
        /// Donor region name
        region: String,
    },

    /// Two binned objects that must share a binning do not
    #[error("bin mismatch in {context}: expected {expected} bins, found {found}")]
    BinMismatch {
        /// Where the mismatch was detected
        context: String,
        /// Expected bin count
        expected: usize,
        /// Actual bin count
        found: usize,
    },

    /// An object with the same name but different content already exists
    #[error("conflicting definition for '{0}'")]
    Conflict(String),

    /// Reference to a node that does not exist
    #[error("unknown node '{0}'")]
    UnknownNode(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
