//! Serialisable model container.
//!
//! [`ModelWorkspace`] is the bundled [`ModelSink`]: it holds every exported
//! dataset and parametric yield together with the parameters and formulas
//! they need, and round-trips through JSON.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tfws_core::{Error, Histogram, ModelSink, NodeId, Registry, Result, VariableDomain};

/// A named per-bin yield function and its total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametricYield {
    /// Yield name.
    pub name: String,
    /// Binning template.
    pub template: Histogram,
    /// Per-bin nodes.
    pub bins: Vec<NodeId>,
    /// Total node.
    pub total: NodeId,
}

/// Exported workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelWorkspace {
    name: String,
    data: Vec<Histogram>,
    yields: Vec<ParametricYield>,
    nodes: Registry,
    scalars: BTreeMap<String, f64>,
    domain: Option<VariableDomain>,
}

impl ModelWorkspace {
    /// Empty workspace.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Workspace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dataset / template by name.
    pub fn data(&self, name: &str) -> Option<&Histogram> {
        self.data.iter().find(|h| h.name == name)
    }

    /// Dataset names in import order.
    pub fn data_names(&self) -> impl Iterator<Item = &str> {
        self.data.iter().map(|h| h.name.as_str())
    }

    /// Parametric yield by name.
    pub fn parametric_yield(&self, name: &str) -> Option<&ParametricYield> {
        self.yields.iter().find(|y| y.name == name)
    }

    /// Parametric yield names in import order.
    pub fn yield_names(&self) -> impl Iterator<Item = &str> {
        self.yields.iter().map(|y| y.name.as_str())
    }

    /// Parameters and formulas referenced by the yields.
    pub fn registry(&self) -> &Registry {
        &self.nodes
    }

    fn require_yield(&self, name: &str) -> Result<&ParametricYield> {
        self.parametric_yield(name).ok_or_else(|| Error::UnknownNode(name.to_string()))
    }

    /// Current per-bin values of yield `name`.
    pub fn evaluate_yield(&self, name: &str) -> Result<Vec<f64>> {
        let y = self.require_yield(name)?;
        y.bins.iter().map(|&b| self.nodes.evaluate(b)).collect()
    }

    /// Current total of yield `name`.
    pub fn total_yield(&self, name: &str) -> Result<f64> {
        self.nodes.evaluate(self.require_yield(name)?.total)
    }

    /// Scalar metadata entry.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).copied()
    }

    /// All scalar metadata.
    pub fn scalars(&self) -> &BTreeMap<String, f64> {
        &self.scalars
    }

    /// Observable binning.
    pub fn domain(&self) -> Option<&VariableDomain> {
        self.domain.as_ref()
    }

    /// Set a free parameter by name.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        self.nodes.set_named(name, value)
    }

    /// Serialise to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON, checking every yield handle against the registry.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ws: Self = serde_json::from_str(s)?;
        for y in &ws.yields {
            if let Some(bad) = y.bins.iter().chain([&y.total]).find(|id| ws.nodes.get(**id).is_none())
            {
                return Err(Error::Validation(format!(
                    "yield '{}' references unknown node #{}",
                    y.name,
                    bad.index()
                )));
            }
        }
        Ok(ws)
    }

    /// Write to `path` as JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Read from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

impl ModelSink for ModelWorkspace {
    fn import_data(&mut self, name: &str, hist: &Histogram) -> Result<()> {
        let hist = hist.clone_named(name);
        match self.data(name) {
            Some(existing) if *existing == hist => Ok(()),
            Some(_) => Err(Error::Conflict(name.to_string())),
            None => {
                self.data.push(hist);
                Ok(())
            }
        }
    }

    fn import_parametric_yield(
        &mut self,
        registry: &Registry,
        name: &str,
        template: &Histogram,
        bins: &[NodeId],
        total: NodeId,
    ) -> Result<()> {
        if bins.len() != template.n_bins() {
            return Err(Error::BinMismatch {
                context: format!("parametric yield '{name}'"),
                expected: template.n_bins(),
                found: bins.len(),
            });
        }
        let mut roots = bins.to_vec();
        roots.push(total);
        let mut nodes = self.nodes.clone();
        let mut imported = nodes.import_many(registry, &roots)?;
        let total = imported.pop().ok_or_else(|| Error::UnknownNode(name.to_string()))?;
        let y = ParametricYield {
            name: name.to_string(),
            template: template.clone_named(name),
            bins: imported,
            total,
        };
        match self.parametric_yield(name) {
            Some(existing) if *existing == y => Ok(()),
            Some(_) => Err(Error::Conflict(name.to_string())),
            None => {
                self.yields.push(y);
                self.nodes = nodes;
                Ok(())
            }
        }
    }

    fn set_scalar(&mut self, name: &str, value: f64) -> Result<()> {
        match self.scalars.get(name) {
            Some(&v) if v != value => Err(Error::Conflict(name.to_string())),
            _ => {
                self.scalars.insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    fn set_domain(&mut self, domain: &VariableDomain) -> Result<()> {
        match &self.domain {
            Some(d) if d != domain => Err(Error::Conflict(domain.name.clone())),
            _ => {
                self.domain = Some(domain.clone());
                Ok(())
            }
        }
    }
}
