//! In-memory [`HistogramStore`] with a JSON file format.
//!
//! ```json
//! { "regions": { "sr": { "ZJets": { "contents": [100.0, 50.0] } } } }
//! ```
//!
//! `errors` defaults to `sqrt(|content|)` and `bin_edges` to unit-width bins.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tfws_core::{Error, Histogram, HistogramStore, Result};

/// One stored histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredHistogram {
    /// Bin contents.
    pub contents: Vec<f64>,
    /// Bin errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<f64>>,
    /// Bin edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_edges: Option<Vec<f64>>,
}

impl StoredHistogram {
    fn to_histogram(&self, name: &str) -> Result<Histogram> {
        let h = match &self.errors {
            Some(errors) => Histogram::with_errors(name, self.contents.clone(), errors.clone())?,
            None => Histogram::new(name, self.contents.clone()),
        };
        match &self.bin_edges {
            Some(edges) => h.with_edges(edges.clone()),
            None => Ok(h),
        }
    }
}

impl From<&Histogram> for StoredHistogram {
    fn from(h: &Histogram) -> Self {
        Self {
            contents: h.contents.clone(),
            errors: Some(h.errors.clone()),
            bin_edges: Some(h.bin_edges.clone()),
        }
    }
}

/// Histograms keyed by region, then by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryStore {
    regions: BTreeMap<String, BTreeMap<String, StoredHistogram>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON file format.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read the JSON file format from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Insert (or replace) a histogram.
    pub fn insert(&mut self, region: &str, key: &str, hist: &Histogram) -> &mut Self {
        self.regions
            .entry(region.to_string())
            .or_default()
            .insert(key.to_string(), StoredHistogram::from(hist));
        self
    }

    /// Insert contents with Poisson errors.
    pub fn insert_contents(&mut self, region: &str, key: &str, contents: &[f64]) -> &mut Self {
        self.insert(region, key, &Histogram::new(key, contents.to_vec()))
    }
}

impl HistogramStore for InMemoryStore {
    fn get(&self, region: &str, key: &str) -> Result<Histogram> {
        self.regions
            .get(region)
            .and_then(|r| r.get(key))
            .ok_or_else(|| Error::MissingHistogram {
                region: region.to_string(),
                key: key.to_string(),
            })?
            .to_histogram(key)
    }

    fn list_keys(&self, region: &str) -> Result<Vec<String>> {
        Ok(self.regions.get(region).map(|r| r.keys().cloned().collect()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_defaults() {
        let store = InMemoryStore::from_json_str(
            r#"{"regions":{"sr":{"ZJets":{"contents":[4.0,9.0],"bin_edges":[250,300,400]}}}}"#,
        )
        .unwrap();
        let h = store.get("sr", "ZJets").unwrap();
        assert_eq!(h.name, "ZJets");
        assert_eq!(h.errors, vec![2.0, 3.0]);
        assert_eq!(h.bin_edges, vec![250.0, 300.0, 400.0]);
        assert_eq!(store.list_keys("sr").unwrap(), vec!["ZJets".to_string()]);
        assert!(store.list_keys("we").unwrap().is_empty());
    }

    #[test]
    fn test_missing_histogram() {
        let store = InMemoryStore::new();
        let err = store.get("sr", "QCD").unwrap_err();
        assert!(matches!(err, Error::MissingHistogram { ref region, ref key } if region == "sr" && key == "QCD"));
    }

    #[test]
    fn test_insert_roundtrip() {
        let mut store = InMemoryStore::new();
        store.insert_contents("e", "WJets", &[1.0, 2.0]);
        assert!(store.contains("e", "WJets").unwrap());
        let back = InMemoryStore::from_json_str(&serde_json::to_string(&store).unwrap()).unwrap();
        assert_eq!(back, store);
    }
}
