//! Theory systematics applied to transfer-factor links.

use serde::{Deserialize, Serialize};

/// Range of every transfer-factor nuisance parameter, in effective sigma.
pub const NUISANCE_RANGE: (f64, f64) = (-4.0, 4.0);

/// One theory nuisance and whether it is correlated across the two
/// processes of a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheoryNuisance {
    /// Nuisance name as it appears in variation keys.
    pub name: String,
    /// `false` splits the nuisance into one independent term per link side.
    pub correlated: bool,
}

impl TheoryNuisance {
    fn new(name: &str, correlated: bool) -> Self {
        Self { name: name.to_string(), correlated }
    }
}

/// Where the up/down shapes of a theory nuisance come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TheorySource {
    /// Ratio of the processes' own `<process>_<syst>Up/Down` templates.
    #[default]
    Templates,
    /// Precomputed scale factors `<link>_<syst>Up/Down` stored in `region`,
    /// applied to the donor/target ratio.
    ScaleFactors {
        /// Store region holding the scale-factor histograms.
        region: String,
    },
}

/// Functional form of a per-bin correction factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionForm {
    /// `(1 + envelope)^θ`.
    #[default]
    Power,
    /// `1 + (average·θ² + shift·θ) / ratio`.
    Linear,
}

/// Theory systematic settings for linked bin models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TheoryConfig {
    /// Link names that receive theory nuisances.
    pub links: Vec<String>,
    /// Correlation table.
    pub nuisances: Vec<TheoryNuisance>,
    /// Shape source.
    pub source: TheorySource,
    /// Correction factor form.
    pub form: CorrectionForm,
}

impl Default for TheoryConfig {
    fn default() -> Self {
        Self {
            links: vec!["wsr_to_zsr".to_string(), "ga_to_sr".to_string()],
            nuisances: vec![
                TheoryNuisance::new("QCD_Scale", true),
                TheoryNuisance::new("QCD_Shape", true),
                TheoryNuisance::new("QCD_Proc", true),
                TheoryNuisance::new("NNLO_Sud", false),
                TheoryNuisance::new("NNLO_Miss", false),
                TheoryNuisance::new("NNLO_EWK", true),
                TheoryNuisance::new("QCD_EWK_Mix", true),
                TheoryNuisance::new("PDF", true),
            ],
            source: TheorySource::default(),
            form: CorrectionForm::default(),
        }
    }
}

impl TheoryConfig {
    /// No theory nuisances on any link.
    pub fn disabled() -> Self {
        Self { links: Vec::new(), ..Self::default() }
    }

    /// Whether `link` is theory-sensitive.
    pub fn applies_to(&self, link: &str) -> bool {
        self.links.iter().any(|l| l == link)
    }
}

/// Side labels of a link name: `"wsr_to_zsr"` → `("wsr", "zsr")`.
pub fn link_sides(link: &str) -> (&str, &str) {
    link.split_once("_to_").unwrap_or(("num", "den"))
}
