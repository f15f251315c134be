//! Region assembly: the templates and bin models of one analysis region.

use std::collections::BTreeMap;
use std::sync::Arc;

use tfws_core::{Error, HistogramStore, ModelSink, Registry, Result, VariableDomain};

use crate::bin_model::{BinModel, StandaloneBinModel};
use crate::config::LinkSpec;
use crate::linked::LinkedBinModel;
use crate::template::ObservedTemplate;
use crate::theory::TheoryConfig;

/// Shared inputs for building every region of one workspace.
#[derive(Clone, Copy)]
pub struct RegionContext<'a> {
    /// Source histograms.
    pub store: &'a dyn HistogramStore,
    /// Binning every template is checked against.
    pub domain: &'a VariableDomain,
    /// Theory systematics for linked models.
    pub theory: &'a TheoryConfig,
    /// Store key of observed data.
    pub data_key: &'a str,
    /// Region → process built as a standalone model there.
    pub major: &'a BTreeMap<String, String>,
    /// Processes whose standalone bins are constants.
    pub fixed: &'a [String],
}

/// What a region carries besides its backgrounds.
#[derive(Debug, Clone)]
pub enum RegionKind {
    /// Control region: data and backgrounds only.
    Control,
    /// Signal region with signal templates.
    Signal {
        /// One template per signal process, in configuration order.
        signals: Vec<ObservedTemplate>,
    },
}

/// A built analysis region.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    backgrounds: Vec<String>,
    data: ObservedTemplate,
    templates: BTreeMap<String, Arc<ObservedTemplate>>,
    models: BTreeMap<String, BinModel>,
    kind: RegionKind,
}

impl Region {
    /// Build region `name`.
    ///
    /// `link` maps backgrounds onto donor models; `donor` is the region the
    /// link points at, or `None` when the link is internal to this region.
    pub fn build(
        registry: &mut Registry,
        ctx: RegionContext<'_>,
        name: &str,
        backgrounds: &[String],
        signals: &[String],
        link: Option<&LinkSpec>,
        donor: Option<&Region>,
    ) -> Result<Self> {
        let data = ObservedTemplate::new(ctx.store, ctx.data_key, name, ctx.domain)?;

        let mut templates = BTreeMap::new();
        for bkg in backgrounds {
            let t = ObservedTemplate::new(ctx.store, bkg, name, ctx.domain)?;
            templates.insert(bkg.clone(), Arc::new(t));
        }

        let major = ctx.major.get(name);
        let mut models: BTreeMap<String, BinModel> = BTreeMap::new();
        for bkg in backgrounds {
            let template = Arc::clone(&templates[bkg]);
            let target = link.and_then(|l| l.processes.get(bkg).map(|d| (l, d)));

            let model: BinModel = if let Some((link, donor_process)) = target {
                let donor_model = match donor {
                    Some(region) => region.model(donor_process),
                    None => models.get(donor_process),
                }
                .ok_or_else(|| Error::MissingDonor {
                    process: donor_process.clone(),
                    region: donor.map_or(name, |r| r.name()).to_string(),
                })?;
                LinkedBinModel::new(
                    registry,
                    ctx.store,
                    template,
                    donor_model,
                    &link.name,
                    ctx.theory,
                )?
                .into()
            } else if major == Some(bkg) {
                let fixed = ctx.fixed.contains(bkg);
                StandaloneBinModel::new(registry, template, ctx.domain, fixed)?.into()
            } else {
                continue;
            };
            models.insert(bkg.clone(), model);
        }

        let kind = if signals.is_empty() {
            RegionKind::Control
        } else {
            let signals = signals
                .iter()
                .map(|s| ObservedTemplate::new(ctx.store, s, name, ctx.domain))
                .collect::<Result<Vec<_>>>()?;
            RegionKind::Signal { signals }
        };

        log::info!(
            "built region {name}: {} backgrounds, {} models, {} signals",
            templates.len(),
            models.len(),
            signals.len()
        );

        Ok(Self {
            name: name.to_string(),
            backgrounds: backgrounds.to_vec(),
            data,
            templates,
            models,
            kind,
        })
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Background processes in construction order.
    pub fn backgrounds(&self) -> &[String] {
        &self.backgrounds
    }

    /// Observed data template.
    pub fn data(&self) -> &ObservedTemplate {
        &self.data
    }

    /// Background template of `process`.
    pub fn template(&self, process: &str) -> Option<&ObservedTemplate> {
        self.templates.get(process).map(Arc::as_ref)
    }

    /// Bin model of `process`, if one was built.
    pub fn model(&self, process: &str) -> Option<&BinModel> {
        self.models.get(process)
    }

    /// Every bin model, in background order.
    pub fn models(&self) -> impl Iterator<Item = &BinModel> {
        self.backgrounds.iter().filter_map(|b| self.models.get(b))
    }

    /// Region kind.
    pub fn kind(&self) -> &RegionKind {
        &self.kind
    }

    /// Signal templates (empty for control regions).
    pub fn signals(&self) -> &[ObservedTemplate] {
        match &self.kind {
            RegionKind::Control => &[],
            RegionKind::Signal { signals } => signals,
        }
    }

    /// Export data, background templates, bin models, then signals.
    pub fn export(&self, registry: &Registry, sink: &mut dyn ModelSink) -> Result<()> {
        self.data.export(sink)?;
        for bkg in &self.backgrounds {
            self.templates[bkg].export(sink)?;
        }
        for model in self.models() {
            model.export(registry, sink)?;
        }
        for signal in self.signals() {
            signal.export(sink)?;
        }
        Ok(())
    }
}
