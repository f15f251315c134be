//! Binned distributions and the variable domain they are defined on.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Binning of the fitted observable, shared by every template in a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDomain {
    /// Observable name (e.g. `"recoil"`).
    pub name: String,
    /// Bin edges (length = n_bins + 1).
    pub bin_edges: Vec<f64>,
}

impl VariableDomain {
    /// Create a domain from explicit edges.
    pub fn new(name: impl Into<String>, bin_edges: Vec<f64>) -> Self {
        Self { name: name.into(), bin_edges }
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.bin_edges.len().saturating_sub(1)
    }

    /// Lower edge of the first bin.
    pub fn min(&self) -> Option<f64> {
        self.bin_edges.first().copied()
    }

    /// Upper edge of the last bin.
    pub fn max(&self) -> Option<f64> {
        self.bin_edges.last().copied()
    }
}

/// A 1D histogram: per-bin contents with per-bin errors.
///
/// Bin indices are zero-based and exclude under/overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram name.
    pub name: String,
    /// Bin edges (length = n_bins + 1).
    pub bin_edges: Vec<f64>,
    /// Bin contents.
    pub contents: Vec<f64>,
    /// Bin errors (same length as `contents`).
    pub errors: Vec<f64>,
}

impl Histogram {
    /// Histogram with Poisson errors (`sqrt(|content|)`) and unit-width bins.
    pub fn new(name: impl Into<String>, contents: Vec<f64>) -> Self {
        let errors = contents.iter().map(|c| c.abs().sqrt()).collect();
        let bin_edges = (0..=contents.len()).map(|i| i as f64).collect();
        Self { name: name.into(), bin_edges, contents, errors }
    }

    /// Histogram with explicit errors and unit-width bins.
    pub fn with_errors(
        name: impl Into<String>,
        contents: Vec<f64>,
        errors: Vec<f64>,
    ) -> Result<Self> {
        let name = name.into();
        if errors.len() != contents.len() {
            return Err(Error::BinMismatch {
                context: format!("errors of histogram '{name}'"),
                expected: contents.len(),
                found: errors.len(),
            });
        }
        let bin_edges = (0..=contents.len()).map(|i| i as f64).collect();
        Ok(Self { name, bin_edges, contents, errors })
    }

    /// Replace the bin edges.
    pub fn with_edges(mut self, bin_edges: Vec<f64>) -> Result<Self> {
        if bin_edges.len() != self.contents.len() + 1 {
            return Err(Error::BinMismatch {
                context: format!("edges of histogram '{}'", self.name),
                expected: self.contents.len() + 1,
                found: bin_edges.len(),
            });
        }
        self.bin_edges = bin_edges;
        Ok(self)
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    /// Content of bin `i`.
    pub fn content(&self, i: usize) -> f64 {
        self.contents[i]
    }

    /// Error of bin `i`.
    pub fn error(&self, i: usize) -> f64 {
        self.errors[i]
    }

    /// Set the content of bin `i`.
    pub fn set_content(&mut self, i: usize, value: f64) {
        self.contents[i] = value;
    }

    /// Sum of bin contents.
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Copy with a new name.
    pub fn clone_named(&self, name: impl Into<String>) -> Self {
        Self { name: name.into(), ..self.clone() }
    }

    /// Zero all contents and errors, keeping name and binning.
    pub fn reset(&mut self) {
        self.contents.iter_mut().for_each(|c| *c = 0.0);
        self.errors.iter_mut().for_each(|e| *e = 0.0);
    }

    /// Element-wise `self /= other`.
    ///
    /// Errors: `σ² = (σa²·b² + σb²·a²) / b⁴`. A zero denominator yields an
    /// empty bin.
    pub fn divide(&mut self, other: &Histogram) -> Result<()> {
        self.check_compatible(other, "divide")?;
        for i in 0..self.n_bins() {
            let (a, ea) = (self.contents[i], self.errors[i]);
            let (b, eb) = (other.contents[i], other.errors[i]);
            if b == 0.0 {
                self.contents[i] = 0.0;
                self.errors[i] = 0.0;
                continue;
            }
            let b2 = b * b;
            self.contents[i] = a / b;
            self.errors[i] = ((ea * ea * b2 + eb * eb * a * a) / (b2 * b2)).sqrt();
        }
        Ok(())
    }

    /// Element-wise `self *= other`.
    pub fn multiply(&mut self, other: &Histogram) -> Result<()> {
        self.check_compatible(other, "multiply")?;
        for i in 0..self.n_bins() {
            let (a, ea) = (self.contents[i], self.errors[i]);
            let (b, eb) = (other.contents[i], other.errors[i]);
            self.contents[i] = a * b;
            self.errors[i] = (ea * ea * b * b + eb * eb * a * a).sqrt();
        }
        Ok(())
    }

    fn check_compatible(&self, other: &Histogram, op: &str) -> Result<()> {
        if self.n_bins() != other.n_bins() {
            return Err(Error::BinMismatch {
                context: format!("{op} '{}' by '{}'", self.name, other.name),
                expected: self.n_bins(),
                found: other.n_bins(),
            });
        }
        for h in [self, other] {
            if h.errors.len() != h.contents.len() {
                return Err(Error::BinMismatch {
                    context: format!("errors of histogram '{}' in {op}", h.name),
                    expected: h.contents.len(),
                    found: h.errors.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_divide_propagates_errors() {
        let mut a = Histogram::with_errors("a", vec![4.0, 9.0], vec![2.0, 3.0]).unwrap();
        let b = Histogram::with_errors("b", vec![2.0, 3.0], vec![1.0, 0.0]).unwrap();
        a.divide(&b).unwrap();
        assert_relative_eq!(a.content(0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(a.content(1), 3.0, epsilon = 1e-12);
        // (4·4 + 1·16) / 16 = 2
        assert_relative_eq!(a.error(0), 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(a.error(1), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_divide_by_zero_bin_is_empty() {
        let mut a = Histogram::new("a", vec![4.0, 1.0]);
        let b = Histogram::new("b", vec![0.0, 1.0]);
        a.divide(&b).unwrap();
        assert_eq!(a.content(0), 0.0);
        assert_eq!(a.error(0), 0.0);
        assert_eq!(a.content(1), 1.0);
    }

    #[test]
    fn test_bin_mismatch() {
        let mut a = Histogram::new("a", vec![1.0, 2.0]);
        let b = Histogram::new("b", vec![1.0]);
        assert!(matches!(a.divide(&b), Err(Error::BinMismatch { .. })));
        assert!(matches!(a.multiply(&b), Err(Error::BinMismatch { .. })));
    }

    #[test]
    fn test_short_errors_rejected() {
        let mut a: Histogram = serde_json::from_str(
            r#"{"name":"a","bin_edges":[0.0,1.0,2.0],"contents":[1.0,2.0],"errors":[1.0]}"#,
        )
        .unwrap();
        let b = Histogram::new("b", vec![1.0, 1.0]);
        let err = a.divide(&b).unwrap_err();
        assert!(matches!(err, Error::BinMismatch { expected: 2, found: 1, .. }));
        assert!(b.clone().multiply(&a).is_err());
        assert_eq!(a.contents, vec![1.0, 2.0]);
    }

    #[test]
    fn test_multiply_and_integral() {
        let mut a = Histogram::new("a", vec![1.0, 2.0, 3.0]);
        let b = Histogram::new("b", vec![2.0, 2.0, 0.5]);
        a.multiply(&b).unwrap();
        assert_eq!(a.contents, vec![2.0, 4.0, 1.5]);
        assert_relative_eq!(a.integral(), 7.5, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_keeps_binning() {
        let mut h = Histogram::new("h", vec![1.0, 2.0]).with_edges(vec![0.0, 10.0, 30.0]).unwrap();
        h.reset();
        assert_eq!(h.contents, vec![0.0, 0.0]);
        assert_eq!(h.bin_edges, vec![0.0, 10.0, 30.0]);
    }

    #[test]
    fn test_domain_bins() {
        let d = VariableDomain::new("recoil", vec![250.0, 300.0, 400.0]);
        assert_eq!(d.n_bins(), 2);
        assert_eq!(d.min(), Some(250.0));
        assert_eq!(d.max(), Some(400.0));
    }

    proptest! {
        #[test]
        fn prop_divide_is_finite(
            pairs in prop::collection::vec((0.0f64..1e6, prop_oneof![Just(0.0), 1e-3f64..1e6]), 1..16),
        ) {
            let (num, den): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let mut a = Histogram::new("a", num);
            a.divide(&Histogram::new("b", den.clone())).unwrap();
            for (i, &d) in den.iter().enumerate() {
                prop_assert!(a.content(i).is_finite());
                prop_assert!(a.error(i).is_finite());
                if d == 0.0 {
                    prop_assert_eq!(a.content(i), 0.0);
                }
            }
        }
    }
}
