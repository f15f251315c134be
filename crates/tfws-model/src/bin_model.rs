//! Per-bin yield models.

use std::sync::Arc;

use tfws_core::{
    Error, Expr, Formula, Histogram, ModelSink, NodeId, Parameter, Registry, Result,
    VariableDomain,
};

use crate::linked::LinkedBinModel;
use crate::template::ObservedTemplate;

/// One free yield parameter per bin, seeded from the observed template.
#[derive(Debug, Clone)]
pub struct StandaloneBinModel {
    name: String,
    template: Arc<ObservedTemplate>,
    observed: Histogram,
    bins: Vec<NodeId>,
    total: NodeId,
}

impl StandaloneBinModel {
    /// Build `<process>_model_<region>` from `template`.
    ///
    /// Each bin parameter starts at the observed content with range
    /// `[0, 2·content]`; the upper bound is dropped after seeding. With
    /// `fixed` the bins are constants instead.
    pub fn new(
        registry: &mut Registry,
        template: Arc<ObservedTemplate>,
        domain: &VariableDomain,
        fixed: bool,
    ) -> Result<Self> {
        let procname = format!("{}_model", template.process());
        let region = template.region().to_string();
        let name = format!("{procname}_{region}");
        let observed = template.nominal().clone_named(&name);
        if observed.n_bins() != domain.n_bins() {
            return Err(Error::BinMismatch {
                context: format!("bin model '{name}' against domain '{}'", domain.name),
                expected: domain.n_bins(),
                found: observed.n_bins(),
            });
        }

        let mut bins = Vec::with_capacity(observed.n_bins());
        for (i, &content) in observed.contents.iter().enumerate() {
            let bin_name = format!("{name}_bin_{i}");
            let label = format!("{procname} Yield in {region}, bin {i}");
            let parameter = if fixed {
                Parameter::constant(bin_name, label, content)
            } else {
                if content < 0.0 {
                    log::warn!("negative yield {content} in {name} bin {i}");
                }
                Parameter::free(bin_name, label, content, content.min(0.0), 2.0 * content)
                    .remove_max()
            };
            bins.push(registry.add_parameter(parameter)?);
        }

        let total = registry.add_formula(Formula::new(
            format!("{name}_norm"),
            format!("{procname} total events in {region}"),
            Expr::sum(bins.iter().copied().map(Expr::node).collect()),
        ))?;

        Ok(Self { name, template, observed, bins, total })
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Export the nominal template and the parametric yield.
    pub fn export(&self, registry: &Registry, sink: &mut dyn ModelSink) -> Result<()> {
        sink.import_data(&self.name, &self.observed)?;
        sink.import_parametric_yield(registry, &self.name, &self.observed, &self.bins, self.total)
    }
}

/// Bin model of one background in one region.
#[derive(Debug, Clone)]
pub enum BinModel {
    /// Free per-bin yields.
    Standalone(StandaloneBinModel),
    /// Yields derived from a donor through a transfer factor.
    Linked(LinkedBinModel),
}

impl BinModel {
    /// Model name (`<process>_model_<region>`).
    pub fn name(&self) -> &str {
        match self {
            BinModel::Standalone(m) => m.name(),
            BinModel::Linked(m) => m.name(),
        }
    }

    /// Observed template the model was built from.
    pub fn template(&self) -> &Arc<ObservedTemplate> {
        match self {
            BinModel::Standalone(m) => &m.template,
            BinModel::Linked(m) => m.template(),
        }
    }

    /// Process name.
    pub fn process(&self) -> &str {
        self.template().process()
    }

    /// Region name.
    pub fn region(&self) -> &str {
        self.template().region()
    }

    /// Observed per-bin distribution that dependents take their ratio against.
    pub fn observed(&self) -> &Histogram {
        match self {
            BinModel::Standalone(m) => &m.observed,
            BinModel::Linked(m) => m.observed(),
        }
    }

    /// Per-bin yield nodes.
    pub fn bins(&self) -> &[NodeId] {
        match self {
            BinModel::Standalone(m) => &m.bins,
            BinModel::Linked(m) => m.bins(),
        }
    }

    /// Total yield node.
    pub fn total(&self) -> NodeId {
        match self {
            BinModel::Standalone(m) => m.total,
            BinModel::Linked(m) => m.total(),
        }
    }

    /// Current per-bin yields.
    pub fn bin_values(&self, registry: &Registry) -> Result<Vec<f64>> {
        self.bins().iter().map(|&b| registry.evaluate(b)).collect()
    }

    /// Current total yield.
    pub fn total_yield(&self, registry: &Registry) -> Result<f64> {
        registry.evaluate(self.total())
    }

    /// Whether the model is transfer-factor linked.
    pub fn is_linked(&self) -> bool {
        matches!(self, BinModel::Linked(_))
    }

    /// Linked model, if this is one.
    pub fn as_linked(&self) -> Option<&LinkedBinModel> {
        match self {
            BinModel::Linked(m) => Some(m),
            BinModel::Standalone(_) => None,
        }
    }

    /// Export into `sink`.
    pub fn export(&self, registry: &Registry, sink: &mut dyn ModelSink) -> Result<()> {
        match self {
            BinModel::Standalone(m) => m.export(registry, sink),
            BinModel::Linked(m) => m.export(registry, sink),
        }
    }
}

impl From<StandaloneBinModel> for BinModel {
    fn from(m: StandaloneBinModel) -> Self {
        BinModel::Standalone(m)
    }
}

impl From<LinkedBinModel> for BinModel {
    fn from(m: LinkedBinModel) -> Self {
        BinModel::Linked(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use tfws_core::Node;

    fn template(contents: &[f64]) -> Arc<ObservedTemplate> {
        let mut store = InMemoryStore::new();
        store.insert_contents("sr", "ZJets", contents);
        let domain = VariableDomain::new("x", (0..=contents.len()).map(|i| i as f64).collect());
        Arc::new(ObservedTemplate::new(&store, "ZJets", "sr", &domain).unwrap())
    }

    fn domain(n: usize) -> VariableDomain {
        VariableDomain::new("x", (0..=n).map(|i| i as f64).collect())
    }

    #[test]
    fn test_bin_parameters_seeded_from_template() {
        let mut reg = Registry::new();
        let m = StandaloneBinModel::new(&mut reg, template(&[100.0, 50.0]), &domain(2), false)
            .unwrap();
        let model = BinModel::from(m);
        assert_eq!(model.name(), "ZJets_model_sr");
        assert_eq!(model.bins().len(), 2);
        match reg.get(model.bins()[0]).unwrap() {
            Node::Parameter(p) => {
                assert_eq!(p.name, "ZJets_model_sr_bin_0");
                assert_eq!(p.value, 100.0);
                assert_eq!(p.min, Some(0.0));
                assert_eq!(p.max, None);
                assert!(!p.constant);
            }
            other => panic!("expected parameter, got {other:?}"),
        }
        assert_eq!(reg.name(model.total()), Some("ZJets_model_sr_norm"));
    }

    #[test]
    fn test_fixed_bins_are_constant() {
        let mut reg = Registry::new();
        let m = StandaloneBinModel::new(&mut reg, template(&[3.0]), &domain(1), true).unwrap();
        let id = BinModel::from(m).bins()[0];
        assert!(matches!(reg.get(id), Some(Node::Parameter(p)) if p.constant));
        assert!(reg.set_value(id, 1.0).is_err());
    }

    #[test]
    fn test_total_tracks_bin_parameters() {
        let mut reg = Registry::new();
        let m = StandaloneBinModel::new(&mut reg, template(&[1.0, 2.0, 3.0]), &domain(3), false)
            .unwrap();
        let model = BinModel::from(m);
        assert_relative_eq!(model.total_yield(&reg).unwrap(), 6.0, epsilon = 1e-12);
        reg.set_value(model.bins()[1], 10.0).unwrap();
        assert_relative_eq!(model.total_yield(&reg).unwrap(), 14.0, epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn prop_total_is_sum_of_bins(
            contents in prop::collection::vec(0.0f64..1e5, 1..12),
            pulls in prop::collection::vec(0.0f64..1e5, 12),
        ) {
            let n = contents.len();
            let mut reg = Registry::new();
            let model: BinModel =
                StandaloneBinModel::new(&mut reg, template(&contents), &domain(n), false).unwrap().into();
            for (&id, &v) in model.bins().iter().zip(&pulls) {
                reg.set_value(id, v).unwrap();
            }
            let sum: f64 = model.bin_values(&reg).unwrap().iter().sum();
            prop_assert!((model.total_yield(&reg).unwrap() - sum).abs() <= 1e-9 * sum.max(1.0));
        }
    }
}
