//! Workspace builder: constructs every region in donor-first order and
//! exports them together with the workspace metadata.

use tfws_core::{Error, HistogramStore, ModelSink, Registry, Result, VariableDomain};

use crate::config::WorkspaceConfig;
use crate::region::{Region, RegionContext};
use crate::workspace::ModelWorkspace;

/// Builds a [`BuiltWorkspace`] from a [`WorkspaceConfig`].
#[derive(Debug, Clone, Default)]
pub struct WorkspaceBuilder {
    config: WorkspaceConfig,
}

impl WorkspaceBuilder {
    /// Create a builder.
    pub fn new(config: WorkspaceConfig) -> Self {
        Self { config }
    }

    /// Resolve the observable binning: configured, or taken from the first
    /// region's data histogram.
    pub fn domain(&self, store: &dyn HistogramStore) -> Result<VariableDomain> {
        if let Some(d) = &self.config.domain {
            return Ok(d.clone());
        }
        let first = self
            .config
            .regions
            .first()
            .ok_or_else(|| Error::Config("no regions configured".into()))?;
        let data = store.get(&first.name, &self.config.data)?;
        Ok(VariableDomain::new(&self.config.variable, data.bin_edges))
    }

    /// Build every region.
    pub fn build(&self, store: &dyn HistogramStore) -> Result<BuiltWorkspace> {
        let cfg = &self.config;
        cfg.validate()?;
        let domain = self.domain(store)?;
        log::info!("building workspace '{}' on {} ({} bins)", cfg.name, domain.name, domain.n_bins());

        let mut registry = Registry::new();
        let mut regions: Vec<Region> = Vec::with_capacity(cfg.regions.len());
        for spec in &cfg.regions {
            let ctx = RegionContext {
                store,
                domain: &domain,
                theory: &cfg.theory,
                data_key: &cfg.data,
                major: &cfg.major,
                fixed: &cfg.fixed,
            };
            let link = spec.link.as_ref();
            let donor = match link.and_then(|l| l.donor_region.as_deref()) {
                Some(name) => Some(regions.iter().find(|r| r.name() == name).ok_or_else(|| {
                    Error::Config(format!("donor region '{name}' of '{}' is not built", spec.name))
                })?),
                None => None,
            };
            let region = Region::build(
                &mut registry,
                ctx,
                &spec.name,
                cfg.backgrounds_of(spec),
                &spec.signals,
                link,
                donor,
            )?;
            regions.push(region);
        }

        Ok(BuiltWorkspace {
            name: cfg.name.clone(),
            registry,
            regions,
            domain,
            lumi: cfg.lumi,
            year: cfg.year,
        })
    }

    /// Build every region and export into a fresh [`ModelWorkspace`].
    pub fn build_workspace(&self, store: &dyn HistogramStore) -> Result<ModelWorkspace> {
        let built = self.build(store)?;
        let mut ws = ModelWorkspace::new(&built.name);
        built.export(&mut ws)?;
        Ok(ws)
    }
}

/// Every region of a workspace plus the registry their models live in.
#[derive(Debug, Clone)]
pub struct BuiltWorkspace {
    name: String,
    registry: Registry,
    regions: Vec<Region>,
    domain: VariableDomain,
    lumi: f64,
    year: u32,
}

impl BuiltWorkspace {
    /// Workspace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry of every parameter and formula.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Regions in construction order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region by name.
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name() == name)
    }

    /// Observable binning.
    pub fn domain(&self) -> &VariableDomain {
        &self.domain
    }

    /// Export every region once, in construction order, then the metadata.
    pub fn export(&self, sink: &mut dyn ModelSink) -> Result<()> {
        for region in &self.regions {
            region.export(&self.registry, sink)?;
        }
        sink.set_scalar("lumi", self.lumi)?;
        sink.set_scalar("year", f64::from(self.year))?;
        sink.set_domain(&self.domain)
    }
}
