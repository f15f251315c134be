//! Collaborator traits.
//!
//! Model construction reads histograms from a [`HistogramStore`] and writes
//! the finished model into a [`ModelSink`]; neither side knows about the
//! other's storage.

use crate::expr::{NodeId, Registry};
use crate::histogram::{Histogram, VariableDomain};
use crate::Result;

/// Source of raw per-region histograms.
pub trait HistogramStore {
    /// Fetch histogram `key` from `region`.
    ///
    /// Implementations return [`crate::Error::MissingHistogram`] for unknown keys.
    fn get(&self, region: &str, key: &str) -> Result<Histogram>;

    /// All keys available in `region`.
    fn list_keys(&self, region: &str) -> Result<Vec<String>>;

    /// Whether `region` holds `key`.
    fn contains(&self, region: &str, key: &str) -> Result<bool> {
        Ok(self.list_keys(region)?.iter().any(|k| k == key))
    }
}

/// Destination of the exported model.
///
/// Every import is idempotent: importing identical content under an existing
/// name is a no-op.
pub trait ModelSink {
    /// Register a binned dataset / template.
    fn import_data(&mut self, name: &str, hist: &Histogram) -> Result<()>;

    /// Register a parametric yield: one node per bin plus their total.
    ///
    /// `bins` and `total` are handles into `registry`; the sink must copy
    /// whatever it needs since the registry is not handed over.
    fn import_parametric_yield(
        &mut self,
        registry: &Registry,
        name: &str,
        template: &Histogram,
        bins: &[NodeId],
        total: NodeId,
    ) -> Result<()>;

    /// Record a scalar metadata entry (luminosity, year, ...).
    fn set_scalar(&mut self, name: &str, value: f64) -> Result<()>;

    /// Record the binning of the fitted observable.
    fn set_domain(&mut self, domain: &VariableDomain) -> Result<()>;
}
