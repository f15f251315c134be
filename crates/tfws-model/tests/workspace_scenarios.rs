use approx::assert_relative_eq;
use tfws_core::Error;
use tfws_model::{
    BinModel, InMemoryStore, LinkSpec, ModelWorkspace, RegionSpec, TheoryConfig, WorkspaceBuilder,
    WorkspaceConfig,
};

const BACKGROUNDS: [&str; 7] = ["ZJets", "DYJets", "WJets", "GJets", "QCD", "DiBoson", "TTJets"];

/// Every region of the default layout filled with two-bin histograms.
fn monojet_store() -> InMemoryStore {
    let mut s = InMemoryStore::new();
    for region in ["sr", "we", "wm", "ze", "zm", "ga"] {
        s.insert_contents(region, "data_obs", &[400.0, 220.0]);
        for bkg in BACKGROUNDS {
            s.insert_contents(region, bkg, &[10.0, 5.0]);
        }
    }
    s.insert_contents("sr", "ZJets", &[100.0, 50.0])
        .insert_contents("sr", "WJets", &[80.0, 60.0])
        .insert_contents("sr", "axial", &[4.0, 9.0])
        .insert_contents("we", "WJets", &[40.0, 20.0])
        .insert_contents("ze", "DYJets", &[12.0, 6.0])
        .insert_contents("ga", "GJets", &[250.0, 110.0]);
    for (proc, region, up, dn) in [
        ("ZJets", "sr", [110.0, 56.0], [91.0, 45.0]),
        ("WJets", "sr", [90.0, 65.0], [71.0, 55.0]),
        ("GJets", "ga", [270.0, 120.0], [231.0, 100.0]),
    ] {
        for syst in ["QCD_Scale", "NNLO_Sud"] {
            s.insert_contents(region, &format!("{proc}_{syst}Up"), &up)
                .insert_contents(region, &format!("{proc}_{syst}Down"), &dn);
        }
    }
    s
}

fn two_bin_store() -> InMemoryStore {
    let mut s = InMemoryStore::new();
    s.insert_contents("sr", "data_obs", &[190.0, 115.0])
        .insert_contents("sr", "ZJets", &[100.0, 50.0])
        .insert_contents("sr", "WJets", &[80.0, 60.0]);
    s
}

fn two_bin_config() -> WorkspaceConfig {
    WorkspaceConfig {
        backgrounds: vec!["ZJets".into(), "WJets".into()],
        regions: vec![
            RegionSpec::new("sr").link(LinkSpec::internal("wsr_to_zsr", &[("WJets", "ZJets")]))
        ],
        ..WorkspaceConfig::default()
    }
}

#[test]
fn linked_yield_is_donor_times_ratio() {
    let ws = WorkspaceBuilder::new(two_bin_config()).build_workspace(&two_bin_store()).unwrap();
    let bins = ws.evaluate_yield("WJets_model_sr").unwrap();
    assert_relative_eq!(bins[0], 80.0, epsilon = 1e-9);
    assert_relative_eq!(bins[1], 60.0, epsilon = 1e-9);
    let ratio = |name: &str| {
        let reg = ws.registry();
        reg.evaluate(reg.require(name).unwrap()).unwrap()
    };
    assert_relative_eq!(ratio("r_WJets_model_sr_bin0"), 0.8, epsilon = 1e-12);
    assert_relative_eq!(ratio("r_WJets_model_sr_bin1"), 1.2, epsilon = 1e-12);
}

#[test]
fn degenerate_donor_variation_creates_no_nuisance() {
    let mut store = two_bin_store();
    store
        .insert_contents("sr", "ZJets_QCD_ScaleUp", &[0.0005, 0.0])
        .insert_contents("sr", "ZJets_QCD_ScaleDown", &[0.0, 0.0])
        .insert_contents("sr", "WJets_QCD_ScaleUp", &[90.0, 65.0])
        .insert_contents("sr", "WJets_QCD_ScaleDown", &[70.0, 55.0]);

    let mut cfg = two_bin_config();
    cfg.theory = TheoryConfig::default();
    let built = WorkspaceBuilder::new(cfg).build(&store).unwrap();
    let linked = built
        .region("sr")
        .and_then(|r| r.model("WJets"))
        .and_then(BinModel::as_linked)
        .unwrap();
    assert!(!linked.systematics().contains_key("wsr_to_zsr_QCD_Scale"));
    assert!(built.registry().id("wsr_to_zsr_QCD_Scale").is_none());
}

#[test]
fn metadata_survives_json_roundtrip() {
    let ws = WorkspaceBuilder::new(two_bin_config()).build_workspace(&two_bin_store()).unwrap();
    let back = ModelWorkspace::from_json_str(&ws.to_json_string().unwrap()).unwrap();
    assert_eq!(back.scalar("lumi"), Some(59.7));
    assert_eq!(back.scalar("year"), Some(2018.0));
    assert_eq!(back.domain().map(|d| d.n_bins()), Some(2));
}

#[test]
fn default_layout_builds_every_region() {
    let built = WorkspaceBuilder::new(WorkspaceConfig::default()).build(&monojet_store()).unwrap();
    let names: Vec<&str> = built.regions().iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["sr", "we", "wm", "ze", "zm", "ga"]);

    let sr = built.region("sr").unwrap();
    assert!(matches!(sr.model("ZJets"), Some(BinModel::Standalone(_))));
    assert!(sr.model("WJets").is_some_and(BinModel::is_linked));
    assert_eq!(sr.signals().len(), 1);

    let sr_link = sr.model("WJets").and_then(BinModel::as_linked).unwrap();
    let systs: Vec<&str> = sr_link.systematics().keys().map(String::as_str).collect();
    assert_eq!(
        systs,
        vec!["wsr_to_zsr_NNLO_Sud_wsr", "wsr_to_zsr_NNLO_Sud_zsr", "wsr_to_zsr_QCD_Scale"]
    );

    let ga = built.region("ga").unwrap();
    let ga_link = ga.model("GJets").and_then(BinModel::as_linked).unwrap();
    assert_eq!(ga_link.donor(), ("ZJets", "sr"));
    assert!(ga_link.systematics().contains_key("ga_to_sr_QCD_Scale"));

    // Control links outside the theory allow-list only carry stat terms.
    for region in ["we", "wm", "ze", "zm"] {
        let r = built.region(region).unwrap();
        let models: Vec<&BinModel> = r.models().collect();
        assert_eq!(models.len(), 1, "{region}");
        let link = models[0].as_linked().unwrap();
        assert!(link.systematics().is_empty(), "{region}");
        assert_eq!(link.corrections().len(), 2, "{region}");
    }

    let mut ws = ModelWorkspace::new(built.name());
    built.export(&mut ws).unwrap();
    let yields: Vec<&str> = ws.yield_names().collect();
    assert_eq!(
        yields,
        vec![
            "ZJets_model_sr",
            "WJets_model_sr",
            "WJets_model_we",
            "WJets_model_wm",
            "DYJets_model_ze",
            "DYJets_model_zm",
            "GJets_model_ga",
        ]
    );
    assert!(ws.data("axial_sr").is_some());
    assert!(ws.data("ZJets_sr_QCD_ScaleUp").is_some());

    // we WJets at nominal = sr WJets (80, 60) × ratio (40/80, 20/60).
    let we = ws.evaluate_yield("WJets_model_we").unwrap();
    assert_relative_eq!(we[0], 40.0, epsilon = 1e-9);
    assert_relative_eq!(we[1], 20.0, epsilon = 1e-9);
}

#[test]
fn donor_pull_propagates_through_chain() {
    let mut ws =
        WorkspaceBuilder::new(WorkspaceConfig::default()).build_workspace(&monojet_store()).unwrap();
    let before = ws.evaluate_yield("WJets_model_we").unwrap();
    ws.set_parameter("ZJets_model_sr_bin_0", 200.0).unwrap();
    let after = ws.evaluate_yield("WJets_model_we").unwrap();
    assert_relative_eq!(after[0], 2.0 * before[0], epsilon = 1e-9);
    assert_relative_eq!(after[1], before[1], epsilon = 1e-9);
    let ze = ws.evaluate_yield("DYJets_model_ze").unwrap();
    assert_relative_eq!(ze[0], 24.0, epsilon = 1e-9);
}

#[test]
fn every_correction_is_one_at_nominal() {
    let built = WorkspaceBuilder::new(WorkspaceConfig::default()).build(&monojet_store()).unwrap();
    for region in built.regions() {
        for model in region.models() {
            let Some(link) = model.as_linked() else { continue };
            for &f in link.corrections() {
                assert_eq!(built.registry().evaluate(f).unwrap(), 1.0);
            }
        }
    }
}

#[test]
fn link_without_donor_model_rejected() {
    let mut cfg = two_bin_config();
    cfg.major.clear();
    let err = WorkspaceBuilder::new(cfg).build(&two_bin_store()).unwrap_err();
    assert!(matches!(err, Error::Config(msg) if msg.contains("ZJets")));
}

#[test]
fn missing_background_histogram_is_an_error() {
    let mut store = InMemoryStore::new();
    store.insert_contents("sr", "data_obs", &[1.0, 2.0]).insert_contents("sr", "ZJets", &[1.0, 2.0]);
    let err = WorkspaceBuilder::new(two_bin_config()).build(&store).unwrap_err();
    assert!(matches!(err, Error::MissingHistogram { key, .. } if key == "WJets"));
}

#[test]
fn configured_domain_must_match_histograms() {
    let mut cfg = two_bin_config();
    cfg.domain = Some(tfws_core::VariableDomain::new("recoil", vec![0.0, 1.0, 2.0, 3.0]));
    let err = WorkspaceBuilder::new(cfg).build(&two_bin_store()).unwrap_err();
    assert!(matches!(err, Error::BinMismatch { expected: 3, found: 2, .. }));
}
