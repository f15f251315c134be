//! Observed templates: the raw distribution of one process in one region,
//! together with its systematic up/down variations.

use std::collections::BTreeMap;

use tfws_core::{Error, Histogram, HistogramStore, ModelSink, Result, VariableDomain};

use crate::shift::{is_valid_histogram, is_valid_shape, DEFAULT_THRESHOLD};

/// Up/down pair of a systematic variation.
#[derive(Debug, Clone)]
pub struct Variation {
    /// +1σ template.
    pub up: ObservedTemplate,
    /// −1σ template.
    pub down: ObservedTemplate,
}

/// Nominal template for a (process, region) plus its systematic variations.
///
/// A systematic discovered in the store whose pair fails [`is_valid_shape`]
/// (or has no `Down` partner) is kept as `None`.
#[derive(Debug, Clone)]
pub struct ObservedTemplate {
    process: String,
    region: String,
    nominal: Histogram,
    systematics: BTreeMap<String, Option<Variation>>,
}

/// Whether a process key names a systematic variation.
pub fn is_variation_name(process: &str) -> bool {
    process.ends_with("Up") || process.ends_with("Down")
}

impl ObservedTemplate {
    /// Read `process` from `region` and discover its `<process>_<syst>Up/Down` pairs.
    pub fn new(
        store: &dyn HistogramStore,
        process: &str,
        region: &str,
        domain: &VariableDomain,
    ) -> Result<Self> {
        let nominal = fetch(store, region, process, format!("{process}_{region}"), domain)?;
        let mut template = Self {
            process: process.to_string(),
            region: region.to_string(),
            nominal,
            systematics: BTreeMap::new(),
        };
        if is_variation_name(process) {
            return Ok(template);
        }

        let prefix = format!("{process}_");
        let keys = store.list_keys(region)?;
        let names: Vec<&str> = keys
            .iter()
            .filter_map(|k| k.strip_prefix(&prefix)?.strip_suffix("Up"))
            .filter(|s| !s.is_empty())
            .collect();

        for syst in names {
            let variation = Self::load_variation(store, process, region, syst, domain, &keys)?;
            if variation.is_none() {
                log::debug!("dropping systematic '{syst}' of {process} in {region}");
            }
            template.systematics.insert(syst.to_string(), variation);
        }
        Ok(template)
    }

    fn load_variation(
        store: &dyn HistogramStore,
        process: &str,
        region: &str,
        syst: &str,
        domain: &VariableDomain,
        keys: &[String],
    ) -> Result<Option<Variation>> {
        let up_key = format!("{process}_{syst}Up");
        let down_key = format!("{process}_{syst}Down");
        if !keys.iter().any(|k| *k == down_key) {
            log::warn!("{up_key} in {region} has no Down partner");
            return Ok(None);
        }
        let up = fetch(store, region, &up_key, format!("{process}_{region}_{syst}Up"), domain)?;
        let down = fetch(store, region, &down_key, format!("{process}_{region}_{syst}Down"), domain)?;
        if !is_valid_shape(&up, &down) {
            return Ok(None);
        }
        Ok(Some(Variation {
            up: Self::from_histogram(&up_key, region, up),
            down: Self::from_histogram(&down_key, region, down),
        }))
    }

    /// Wrap an already-named histogram without systematic discovery.
    pub fn from_histogram(process: &str, region: &str, nominal: Histogram) -> Self {
        Self {
            process: process.to_string(),
            region: region.to_string(),
            nominal,
            systematics: BTreeMap::new(),
        }
    }

    /// Process name.
    pub fn process(&self) -> &str {
        &self.process
    }

    /// Region name.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Exported name (`<process>_<region>`).
    pub fn name(&self) -> &str {
        &self.nominal.name
    }

    /// Nominal distribution.
    pub fn nominal(&self) -> &Histogram {
        &self.nominal
    }

    /// Usable variation for `syst`, if any.
    pub fn systematic(&self, syst: &str) -> Option<&Variation> {
        self.systematics.get(syst).and_then(Option::as_ref)
    }

    /// Every discovered systematic name, usable or not.
    pub fn systematic_names(&self) -> impl Iterator<Item = &str> {
        self.systematics.keys().map(String::as_str)
    }

    /// Usable systematics.
    pub fn variations(&self) -> impl Iterator<Item = (&str, &Variation)> {
        self.systematics.iter().filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v)))
    }

    /// Export nominal and every usable variation. Empty templates are skipped.
    pub fn export(&self, sink: &mut dyn ModelSink) -> Result<()> {
        if !is_valid_histogram(&self.nominal, 0.0, DEFAULT_THRESHOLD) {
            log::debug!("skipping export of empty template {}", self.name());
            return Ok(());
        }
        sink.import_data(self.name(), &self.nominal)?;
        for (_, variation) in self.variations() {
            variation.up.export(sink)?;
            variation.down.export(sink)?;
        }
        Ok(())
    }
}

fn fetch(
    store: &dyn HistogramStore,
    region: &str,
    key: &str,
    name: String,
    domain: &VariableDomain,
) -> Result<Histogram> {
    let hist = store.get(region, key)?;
    if hist.n_bins() != domain.n_bins() {
        return Err(Error::BinMismatch {
            context: format!("'{key}' in region '{region}' against domain '{}'", domain.name),
            expected: domain.n_bins(),
            found: hist.n_bins(),
        });
    }
    Ok(hist.clone_named(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::workspace::ModelWorkspace;

    fn domain() -> VariableDomain {
        VariableDomain::new("recoil", vec![0.0, 1.0, 2.0])
    }

    fn store() -> InMemoryStore {
        let mut s = InMemoryStore::new();
        s.insert_contents("sr", "ZJets", &[100.0, 50.0])
            .insert_contents("sr", "ZJets_jesUp", &[110.0, 52.0])
            .insert_contents("sr", "ZJets_jesDown", &[90.0, 48.0])
            .insert_contents("sr", "ZJets_flatUp", &[100.0, 50.0])
            .insert_contents("sr", "ZJets_flatDown", &[100.0, 50.0])
            .insert_contents("sr", "ZJets_orphanUp", &[101.0, 50.0])
            .insert_contents("sr", "QCD", &[0.0, 0.0]);
        s
    }

    #[test]
    fn test_discovers_valid_systematics() {
        let t = ObservedTemplate::new(&store(), "ZJets", "sr", &domain()).unwrap();
        assert_eq!(t.name(), "ZJets_sr");
        let names: Vec<&str> = t.systematic_names().collect();
        assert_eq!(names, vec!["flat", "jes", "orphan"]);
        let jes = t.systematic("jes").unwrap();
        assert_eq!(jes.up.name(), "ZJets_sr_jesUp");
        assert_eq!(jes.down.name(), "ZJets_sr_jesDown");
        assert!(t.systematic("flat").is_none());
        assert!(t.systematic("orphan").is_none());
    }

    #[test]
    fn test_variation_process_skips_discovery() {
        let t = ObservedTemplate::new(&store(), "ZJets_jesUp", "sr", &domain()).unwrap();
        assert_eq!(t.systematic_names().count(), 0);
    }

    #[test]
    fn test_bin_mismatch_is_an_error() {
        let d = VariableDomain::new("recoil", vec![0.0, 1.0, 2.0, 3.0]);
        let err = ObservedTemplate::new(&store(), "ZJets", "sr", &d).unwrap_err();
        assert!(matches!(err, Error::BinMismatch { expected: 3, found: 2, .. }));
    }

    #[test]
    fn test_export_nominal_and_variations() {
        let t = ObservedTemplate::new(&store(), "ZJets", "sr", &domain()).unwrap();
        let mut ws = ModelWorkspace::new("w");
        t.export(&mut ws).unwrap();
        let mut names: Vec<&str> = ws.data_names().collect();
        names.sort();
        assert_eq!(names, vec!["ZJets_sr", "ZJets_sr_jesDown", "ZJets_sr_jesUp"]);
    }

    #[test]
    fn test_empty_template_not_exported() {
        let t = ObservedTemplate::new(&store(), "QCD", "sr", &domain()).unwrap();
        let mut ws = ModelWorkspace::new("w");
        t.export(&mut ws).unwrap();
        assert_eq!(ws.data_names().count(), 0);
    }
}
