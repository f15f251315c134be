//! Transfer-factor linked bin models.
//!
//! A linked model predicts a process in one region from a donor bin model:
//!
//! ```text
//! yield_i = donor_i × r_i × Π_j f_j(θ_j) × f_stat,i(θ_stat,i)
//! ```
//!
//! where `r_i` is the observed target/donor ratio and every correction
//! factor `f` equals 1 at `θ = 0`. Donor bins enter by reference, so pulling
//! a donor parameter moves every model linked to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tfws_core::{
    Error, Expr, Formula, Histogram, HistogramStore, ModelSink, Node, NodeId, Parameter,
    Registry, Result,
};

use crate::bin_model::BinModel;
use crate::shift::{average_shift, fractional_shift, is_valid_shape, shift_envelope};
use crate::template::ObservedTemplate;
use crate::theory::{link_sides, CorrectionForm, TheoryConfig, TheorySource, NUISANCE_RANGE};

/// A shape systematic folded into the transfer factor.
#[derive(Debug, Clone)]
pub struct SystematicCorrection {
    /// Nuisance parameter shared by all bins.
    pub parameter: NodeId,
    /// Per-bin fractional envelope.
    pub envelope: Histogram,
    /// Per-bin average shift.
    pub average: Histogram,
    /// Per-bin half-difference shift.
    pub shift: Histogram,
}

/// Bin model whose yields follow a donor model through a transfer factor.
#[derive(Debug, Clone)]
pub struct LinkedBinModel {
    name: String,
    link: String,
    donor_process: String,
    donor_region: String,
    template: Arc<ObservedTemplate>,
    observed: Histogram,
    ratio: Histogram,
    reciprocal: Histogram,
    systematics: BTreeMap<String, SystematicCorrection>,
    ratio_parameters: Vec<NodeId>,
    stat_parameters: Vec<NodeId>,
    corrections: Vec<NodeId>,
    bins: Vec<NodeId>,
    total: NodeId,
}

impl LinkedBinModel {
    /// Link `template` to `donor` under the transfer factor named `link`.
    ///
    /// Theory nuisances are attached only when `theory` lists `link`.
    pub fn new(
        registry: &mut Registry,
        store: &dyn HistogramStore,
        template: Arc<ObservedTemplate>,
        donor: &BinModel,
        link: &str,
        theory: &TheoryConfig,
    ) -> Result<Self> {
        let procname = format!("{}_model", template.process());
        let region = template.region().to_string();
        let name = format!("{procname}_{region}");
        let observed = template.nominal().clone_named(format!("{name}_obs"));

        if donor.bins().len() != observed.n_bins() {
            return Err(Error::BinMismatch {
                context: format!("link '{link}' from '{}' to '{name}'", donor.name()),
                expected: observed.n_bins(),
                found: donor.bins().len(),
            });
        }

        // target / donor
        let mut ratio = observed.clone_named(&name);
        ratio.divide(donor.observed())?;

        // donor / target: seeds the scale-factor systematics
        let mut reciprocal = donor.observed().clone_named(format!("{name}_re"));
        reciprocal.divide(&observed)?;

        let inputs = LinkInputs {
            link,
            template: &template,
            observed: &observed,
            ratio: &ratio,
            reciprocal: &reciprocal,
            donor,
        };
        let systematics = if theory.applies_to(link) {
            inputs.theory_systematics(registry, store, theory)?
        } else {
            BTreeMap::new()
        };
        let nodes = inputs.bin_nodes(registry, &name, &systematics, theory.form)?;

        Ok(Self {
            name,
            link: link.to_string(),
            donor_process: donor.process().to_string(),
            donor_region: donor.region().to_string(),
            template,
            observed,
            ratio,
            reciprocal,
            systematics,
            ratio_parameters: nodes.ratio_parameters,
            stat_parameters: nodes.stat_parameters,
            corrections: nodes.corrections,
            bins: nodes.bins,
            total: nodes.total,
        })
    }

    /// Model name (`<process>_model_<region>`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transfer-factor link name.
    pub fn link(&self) -> &str {
        &self.link
    }

    /// Donor (process, region).
    pub fn donor(&self) -> (&str, &str) {
        (&self.donor_process, &self.donor_region)
    }

    /// Target template.
    pub fn template(&self) -> &Arc<ObservedTemplate> {
        &self.template
    }

    /// Target nominal distribution.
    pub fn observed(&self) -> &Histogram {
        &self.observed
    }

    /// Per-bin target/donor ratio.
    pub fn ratio(&self) -> &Histogram {
        &self.ratio
    }

    /// Per-bin donor/target ratio.
    pub fn reciprocal(&self) -> &Histogram {
        &self.reciprocal
    }

    /// Retained shape systematics, keyed by nuisance name.
    pub fn systematics(&self) -> &BTreeMap<String, SystematicCorrection> {
        &self.systematics
    }

    /// Constant per-bin ratio parameters.
    pub fn ratio_parameters(&self) -> &[NodeId] {
        &self.ratio_parameters
    }

    /// Per-bin statistical nuisance parameters.
    pub fn stat_parameters(&self) -> &[NodeId] {
        &self.stat_parameters
    }

    /// Every correction-factor formula (systematic and statistical).
    pub fn corrections(&self) -> &[NodeId] {
        &self.corrections
    }

    /// Per-bin composite yield formulas.
    pub fn bins(&self) -> &[NodeId] {
        &self.bins
    }

    /// Total yield formula.
    pub fn total(&self) -> NodeId {
        self.total
    }

    /// Export the composite per-bin formulas and their total.
    pub fn export(&self, registry: &Registry, sink: &mut dyn ModelSink) -> Result<()> {
        sink.import_parametric_yield(registry, &self.name, &self.observed, &self.bins, self.total)
    }
}

struct BinNodes {
    ratio_parameters: Vec<NodeId>,
    stat_parameters: Vec<NodeId>,
    corrections: Vec<NodeId>,
    bins: Vec<NodeId>,
    total: NodeId,
}

/// Borrowed view of everything a link is derived from.
struct LinkInputs<'a> {
    link: &'a str,
    template: &'a ObservedTemplate,
    observed: &'a Histogram,
    ratio: &'a Histogram,
    reciprocal: &'a Histogram,
    donor: &'a BinModel,
}

impl LinkInputs<'_> {
    fn theory_systematics(
        &self,
        registry: &mut Registry,
        store: &dyn HistogramStore,
        theory: &TheoryConfig,
    ) -> Result<BTreeMap<String, SystematicCorrection>> {
        let use_reciprocal = matches!(theory.source, TheorySource::ScaleFactors { .. });
        let mut systematics = BTreeMap::new();
        for nuisance in &theory.nuisances {
            let shapes = match &theory.source {
                TheorySource::Templates => self.template_shapes(&nuisance.name, nuisance.correlated)?,
                TheorySource::ScaleFactors { region } => {
                    self.scale_factor_shapes(store, region, &nuisance.name, nuisance.correlated)?
                }
            };
            for (up, dn) in shapes {
                if let Some(syst) = self.shape_correction(registry, &up, &dn, use_reciprocal)? {
                    systematics.insert(syst.envelope.name.clone(), syst);
                }
            }
        }
        Ok(systematics)
    }

    /// Up/down shapes in target/donor orientation from the processes' own
    /// systematic templates.
    fn template_shapes(&self, syst: &str, correlated: bool) -> Result<Vec<(Histogram, Histogram)>> {
        let link = self.link;
        let num = self.template.systematic(syst);
        let den = self.donor.template().systematic(syst);
        let mut shapes = Vec::new();

        if correlated {
            let (Some(num), Some(den)) = (num, den) else {
                log::debug!("{link}: no {syst} variations on both sides, skipping");
                return Ok(shapes);
            };
            let mut up = num.up.nominal().clone_named(format!("{link}_{syst}Up"));
            let mut dn = num.down.nominal().clone_named(format!("{link}_{syst}Down"));
            up.divide(den.up.nominal())?;
            dn.divide(den.down.nominal())?;
            shapes.push((up, dn));
            return Ok(shapes);
        }

        let (num_side, den_side) = link_sides(link);
        if let Some(num) = num {
            let mut up = num.up.nominal().clone_named(format!("{link}_{syst}_{num_side}Up"));
            let mut dn = num.down.nominal().clone_named(format!("{link}_{syst}_{num_side}Down"));
            up.divide(self.donor.observed())?;
            dn.divide(self.donor.observed())?;
            shapes.push((up, dn));
        }
        if let Some(den) = den {
            let mut up = self.observed.clone_named(format!("{link}_{syst}_{den_side}Up"));
            let mut dn = self.observed.clone_named(format!("{link}_{syst}_{den_side}Down"));
            up.divide(den.up.nominal())?;
            dn.divide(den.down.nominal())?;
            shapes.push((up, dn));
        }
        Ok(shapes)
    }

    /// Up/down shapes in donor/target orientation from precomputed
    /// `<link>_<syst>Up/Down` scale factors.
    fn scale_factor_shapes(
        &self,
        store: &dyn HistogramStore,
        region: &str,
        syst: &str,
        correlated: bool,
    ) -> Result<Vec<(Histogram, Histogram)>> {
        let link = self.link;
        let labels: Vec<String> = if correlated {
            vec![syst.to_string()]
        } else {
            let (a, b) = link_sides(link);
            vec![format!("{syst}_{a}"), format!("{syst}_{b}")]
        };

        let mut shapes = Vec::new();
        for label in labels {
            let up_key = format!("{link}_{label}Up");
            let dn_key = format!("{link}_{label}Down");
            if !store.contains(region, &up_key)? || !store.contains(region, &dn_key)? {
                log::debug!("{link}: no scale factors for {label} in {region}, skipping");
                continue;
            }
            let mut up = self.reciprocal.clone_named(&up_key);
            let mut dn = self.reciprocal.clone_named(&dn_key);
            up.multiply(&store.get(region, &up_key)?)?;
            dn.multiply(&store.get(region, &dn_key)?)?;
            shapes.push((up, dn));
        }
        Ok(shapes)
    }

    fn shape_correction(
        &self,
        registry: &mut Registry,
        up: &Histogram,
        dn: &Histogram,
        use_reciprocal: bool,
    ) -> Result<Option<SystematicCorrection>> {
        if !is_valid_shape(up, dn) {
            log::debug!("{}: degenerate shape {}, skipping", self.link, up.name);
            return Ok(None);
        }
        let envelope = fractional_shift(self.ratio, up, dn, use_reciprocal)?;
        let average = average_shift(self.ratio, up, dn, use_reciprocal)?;
        let shift = shift_envelope(self.ratio, up, dn, use_reciprocal)?;
        let (lo, hi) = NUISANCE_RANGE;
        let parameter = registry.add_parameter(Parameter::free(
            &envelope.name,
            format!("{} TF Ratio", envelope.name),
            0.0,
            lo,
            hi,
        ))?;
        Ok(Some(SystematicCorrection { parameter, envelope, average, shift }))
    }

    fn bin_nodes(
        &self,
        registry: &mut Registry,
        name: &str,
        systematics: &BTreeMap<String, SystematicCorrection>,
        form: CorrectionForm,
    ) -> Result<BinNodes> {
        let (lo, hi) = NUISANCE_RANGE;
        let n = self.ratio.n_bins();
        let mut nodes = BinNodes {
            ratio_parameters: Vec::with_capacity(n),
            stat_parameters: Vec::with_capacity(n),
            corrections: Vec::new(),
            bins: Vec::with_capacity(n),
            total: self.donor.total(),
        };

        for i in 0..n {
            let bin_name = format!("{name}_bin{i}");
            let label = format!("{name} TF Ratio, bin {i}");
            let bin_ratio = self.ratio.content(i);

            let r = registry.add_parameter(Parameter::constant(
                format!("r_{bin_name}"),
                label.clone(),
                bin_ratio,
            ))?;
            nodes.ratio_parameters.push(r);

            let mut factors = vec![Expr::node(r)];
            for syst in systematics.values() {
                let f = correction_formula(registry, form, bin_ratio, syst, i)?;
                nodes.corrections.push(f);
                factors.push(Expr::node(f));
            }

            let stat_name = format!("{name}_stat_bin{i}");
            let stat_title = format!("{name} TF Stats, bin {i}");
            let stat = registry.add_parameter(Parameter::free(&stat_name, &stat_title, 0.0, lo, hi))?;
            nodes.stat_parameters.push(stat);
            let stat_envelope = if bin_ratio != 0.0 { self.ratio.error(i) / bin_ratio } else { 0.0 };
            let stat_form = registry.add_formula(Formula::new(
                format!("func_{stat_name}"),
                format!("Function {stat_title}"),
                power_factor(stat_envelope, stat),
            ))?;
            nodes.corrections.push(stat_form);
            factors.push(Expr::node(stat_form));

            let expr = Expr::product(vec![Expr::node(self.donor.bins()[i]), Expr::product(factors)]);
            nodes.bins.push(registry.add_formula(Formula::new(bin_name, label, expr))?);
        }

        nodes.total = registry.add_formula(Formula::new(
            format!("{name}_norm"),
            format!("{}_model total events in {}", self.template.process(), self.template.region()),
            Expr::sum(nodes.bins.iter().copied().map(Expr::node).collect()),
        ))?;
        Ok(nodes)
    }
}

fn power_factor(envelope: f64, parameter: NodeId) -> Expr {
    Expr::pow(Expr::constant(1.0 + envelope), Expr::node(parameter))
}

fn correction_formula(
    registry: &mut Registry,
    form: CorrectionForm,
    nominal: f64,
    syst: &SystematicCorrection,
    bin: usize,
) -> Result<NodeId> {
    let theta = syst.parameter;
    let (name, title) = match registry.get(theta) {
        Some(Node::Parameter(p)) => (p.name.clone(), p.title.clone()),
        _ => return Err(Error::UnknownNode(format!("#{}", theta.index()))),
    };
    let expr = match form {
        CorrectionForm::Power => power_factor(syst.envelope.content(bin), theta),
        CorrectionForm::Linear if nominal == 0.0 => Expr::constant(1.0),
        CorrectionForm::Linear => {
            let first = syst.shift.content(bin) / nominal;
            let second = syst.average.content(bin) / nominal;
            let mut terms = vec![
                Expr::constant(1.0),
                Expr::product(vec![Expr::constant(first), Expr::node(theta)]),
            ];
            if second != 0.0 {
                terms.push(Expr::product(vec![
                    Expr::constant(second),
                    Expr::node(theta),
                    Expr::node(theta),
                ]));
            }
            Expr::sum(terms)
        }
    };
    registry.add_formula(Formula::new(
        format!("func_{name}_bin{bin}"),
        format!("Function {title}"),
        expr,
    ))
}
