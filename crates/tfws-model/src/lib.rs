//! # tfws-model
//!
//! Construction of transfer-factor linked binned models.
//!
//! A workspace is a set of analysis regions. Each region carries observed
//! data, one template per background and signal process, and bin models for
//! the backgrounds that are fit: either free per-bin yields
//! ([`StandaloneBinModel`]) or yields predicted from a donor model through a
//! transfer factor with theory and statistical corrections
//! ([`LinkedBinModel`]).
//!
//! ```
//! use tfws_model::{InMemoryStore, LinkSpec, RegionSpec, TheoryConfig, WorkspaceBuilder, WorkspaceConfig};
//!
//! let mut store = InMemoryStore::new();
//! store
//!     .insert_contents("sr", "data_obs", &[180.0, 110.0])
//!     .insert_contents("sr", "ZJets", &[100.0, 50.0])
//!     .insert_contents("sr", "WJets", &[80.0, 60.0]);
//!
//! let config = WorkspaceConfig {
//!     backgrounds: vec!["ZJets".into(), "WJets".into()],
//!     theory: TheoryConfig::disabled(),
//!     regions: vec![RegionSpec::new("sr").link(LinkSpec::internal("wsr_to_zsr", &[("WJets", "ZJets")]))],
//!     ..WorkspaceConfig::default()
//! };
//! let ws = WorkspaceBuilder::new(config).build_workspace(&store).unwrap();
//! assert_eq!(ws.evaluate_yield("WJets_model_sr").unwrap().len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bin_model;
pub mod builder;
pub mod config;
pub mod linked;
pub mod region;
pub mod shift;
pub mod store;
pub mod template;
pub mod theory;
pub mod workspace;

pub use bin_model::{BinModel, StandaloneBinModel};
pub use builder::{BuiltWorkspace, WorkspaceBuilder};
pub use config::{LinkSpec, RegionSpec, WorkspaceConfig};
pub use linked::{LinkedBinModel, SystematicCorrection};
pub use region::{Region, RegionContext, RegionKind};
pub use store::{InMemoryStore, StoredHistogram};
pub use template::{ObservedTemplate, Variation};
pub use theory::{CorrectionForm, TheoryConfig, TheoryNuisance, TheorySource};
pub use workspace::{ModelWorkspace, ParametricYield};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
