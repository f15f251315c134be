//! # tfws-core
//!
//! Core types, traits, and error handling for tfws.
//!
//! This crate provides:
//! - Common error types
//! - The binned [`Histogram`] and the [`VariableDomain`] it lives on
//! - The expression [`Registry`] holding every parameter and formula of a build
//! - The collaborator traits ([`HistogramStore`], [`ModelSink`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod expr;
pub mod histogram;
pub mod traits;

pub use error::{Error, Result};
pub use expr::{Expr, Formula, Node, NodeId, Parameter, Registry};
pub use histogram::{Histogram, VariableDomain};
pub use traits::{HistogramStore, ModelSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
