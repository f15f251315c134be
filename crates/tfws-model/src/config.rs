//! Configuration types for the workspace builder.
//!
//! The default configuration is the monojet layout: a signal region with an
//! internal W→Z link and five single-background control regions.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tfws_core::{Error, Result, VariableDomain};

use crate::theory::TheoryConfig;

/// Transfer-factor link of one region to a donor region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Link name (e.g. `"we_to_sr"`); also names the link's theory nuisances.
    pub name: String,
    /// Donor region; `None` links within the region itself.
    #[serde(default)]
    pub donor_region: Option<String>,
    /// Background → donor process.
    pub processes: BTreeMap<String, String>,
}

impl LinkSpec {
    /// Link within the same region.
    pub fn internal(name: &str, processes: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            donor_region: None,
            processes: processes.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect(),
        }
    }

    /// Link to another region.
    pub fn to_region(name: &str, donor_region: &str, processes: &[(&str, &str)]) -> Self {
        Self { donor_region: Some(donor_region.to_string()), ..Self::internal(name, processes) }
    }
}

/// One region of the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    /// Region name, also the store region.
    pub name: String,
    /// Backgrounds; `None` uses [`WorkspaceConfig::backgrounds`].
    #[serde(default)]
    pub backgrounds: Option<Vec<String>>,
    /// Signal processes (signal regions only).
    #[serde(default)]
    pub signals: Vec<String>,
    /// Transfer-factor link.
    #[serde(default)]
    pub link: Option<LinkSpec>,
}

impl RegionSpec {
    /// Control region without a link.
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), backgrounds: None, signals: Vec::new(), link: None }
    }

    /// Set the signal processes.
    pub fn signals(mut self, signals: &[&str]) -> Self {
        self.signals = signals.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set the transfer-factor link.
    pub fn link(mut self, link: LinkSpec) -> Self {
        self.link = Some(link);
        self
    }

    /// Override the background list.
    pub fn backgrounds(mut self, backgrounds: &[&str]) -> Self {
        self.backgrounds = Some(backgrounds.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// Full builder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace name.
    pub name: String,
    /// Integrated luminosity (fb⁻¹).
    pub lumi: f64,
    /// Data-taking year.
    pub year: u32,
    /// Observable name used when the domain is derived from data.
    pub variable: String,
    /// Explicit binning; derived from the first region's data when absent.
    pub domain: Option<VariableDomain>,
    /// Store key of observed data.
    pub data: String,
    /// Default background list, in model-construction order.
    pub backgrounds: Vec<String>,
    /// Region → the background built as a standalone model there, so other
    /// regions can link against it.
    pub major: BTreeMap<String, String>,
    /// Processes whose standalone bins are constants.
    pub fixed: Vec<String>,
    /// Theory systematics.
    pub theory: TheoryConfig,
    /// Regions in construction order (donors first).
    pub regions: Vec<RegionSpec>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        let sr = "sr";
        Self {
            name: "w".to_string(),
            lumi: 59.7,
            year: 2018,
            variable: "recoil".to_string(),
            domain: None,
            data: "data_obs".to_string(),
            backgrounds: ["ZJets", "DYJets", "WJets", "GJets", "QCD", "DiBoson", "TTJets"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            major: BTreeMap::from([(sr.to_string(), "ZJets".to_string())]),
            fixed: Vec::new(),
            theory: TheoryConfig::default(),
            regions: vec![
                RegionSpec::new(sr)
                    .signals(&["axial"])
                    .link(LinkSpec::internal("wsr_to_zsr", &[("WJets", "ZJets")])),
                RegionSpec::new("we").link(LinkSpec::to_region("we_to_sr", sr, &[("WJets", "WJets")])),
                RegionSpec::new("wm").link(LinkSpec::to_region("wm_to_sr", sr, &[("WJets", "WJets")])),
                RegionSpec::new("ze").link(LinkSpec::to_region("ze_to_sr", sr, &[("DYJets", "ZJets")])),
                RegionSpec::new("zm").link(LinkSpec::to_region("zm_to_sr", sr, &[("DYJets", "ZJets")])),
                RegionSpec::new("ga").link(LinkSpec::to_region("ga_to_sr", sr, &[("GJets", "ZJets")])),
            ],
        }
    }
}

impl WorkspaceConfig {
    /// Parse a JSON configuration.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Backgrounds of `region`.
    pub fn backgrounds_of<'a>(&'a self, region: &'a RegionSpec) -> &'a [String] {
        region.backgrounds.as_deref().unwrap_or(&self.backgrounds)
    }

    /// Whether `process` gets a bin model in `region`.
    pub fn has_model(&self, region: &RegionSpec, process: &str) -> bool {
        self.major.get(&region.name).is_some_and(|m| m == process)
            || region.link.as_ref().is_some_and(|l| l.processes.contains_key(process))
    }

    /// Check region layout and link ordering.
    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(Error::Config("no regions configured".into()));
        }
        if let Some(d) = &self.domain {
            if d.n_bins() == 0 {
                return Err(Error::Config(format!("domain '{}' has no bins", d.name)));
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (idx, region) in self.regions.iter().enumerate() {
            if !seen.insert(&region.name) {
                return Err(Error::Config(format!("duplicate region '{}'", region.name)));
            }
            let backgrounds = self.backgrounds_of(region);
            if let Some(major) = self.major.get(&region.name) {
                if !backgrounds.contains(major) {
                    return Err(Error::Config(format!(
                        "major process '{major}' is not a background of region '{}'",
                        region.name
                    )));
                }
            }
            let Some(link) = &region.link else { continue };

            let donor_spec = match &link.donor_region {
                None => region,
                Some(name) => self.regions[..idx].iter().find(|r| &r.name == name).ok_or_else(
                    || {
                        Error::Config(format!(
                            "donor region '{name}' of link '{}' must be built before region '{}'",
                            link.name, region.name
                        ))
                    },
                )?,
            };

            for (target, donor) in &link.processes {
                let Some(target_pos) = backgrounds.iter().position(|b| b == target) else {
                    return Err(Error::Config(format!(
                        "link '{}' targets '{target}', which is not a background of region '{}'",
                        link.name, region.name
                    )));
                };
                if !self.has_model(donor_spec, donor) {
                    return Err(Error::Config(format!(
                        "link '{}' needs a bin model for '{donor}' in region '{}'",
                        link.name, donor_spec.name
                    )));
                }
                if link.donor_region.is_none() {
                    let donor_pos = backgrounds.iter().position(|b| b == donor);
                    if !donor_pos.is_some_and(|p| p < target_pos) {
                        return Err(Error::Config(format!(
                            "link '{}': donor '{donor}' must precede '{target}' in region '{}'",
                            link.name, region.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = WorkspaceConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.regions.len(), 6);
        assert_eq!(cfg.regions[0].name, "sr");
    }

    #[test]
    fn test_donor_region_must_come_first() {
        let mut cfg = WorkspaceConfig::default();
        cfg.regions.swap(0, 1);
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("must be built before")));
    }

    #[test]
    fn test_internal_donor_must_precede_target() {
        let mut cfg = WorkspaceConfig::default();
        cfg.regions[0].backgrounds = Some(vec!["WJets".into(), "ZJets".into()]);
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("must precede")));
    }

    #[test]
    fn test_donor_without_model_rejected() {
        let mut cfg = WorkspaceConfig::default();
        cfg.major.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_duplicate_region_rejected() {
        let mut cfg = WorkspaceConfig::default();
        cfg.regions.push(RegionSpec::new("we"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_json_defaults_fill_missing_fields() {
        let cfg = WorkspaceConfig::from_json_str(
            r#"{"lumi": 41.5, "year": 2017, "regions": [{"name": "sr", "signals": ["axial"]}]}"#,
        )
        .unwrap();
        assert_eq!(cfg.lumi, 41.5);
        assert_eq!(cfg.backgrounds.len(), 7);
        assert!(cfg.regions[0].link.is_none());
        cfg.validate().unwrap();
    }
}
