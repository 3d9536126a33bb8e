//! Build-script generation against real source files

use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use interpose_codegen::{
    GeneratorConfig, GeneratorError, Generator, SynthesisError, SynthesisOptions, TargetConfig,
};
use interpose_core::UnsupportedContract;

const METER: &str = r#"
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub reading: i64,
    pub label: Option<String>,
    calibration: f64,
}

impl Meter {
    pub fn new(reading: i64) -> Self {
        Meter { reading, label: None, calibration: 1.0 }
    }

    pub fn read(&self) -> i64 {
        self.reading
    }

    #[interpose_macros::interpose(variadic)]
    pub fn add(&mut self, amount: i64, more: Vec<i64>) {
        self.reading += amount + more.iter().sum::<i64>();
    }

    fn calibrate(&mut self, factor: f64) {
        self.calibration = factor;
    }

    pub fn units() -> &'static str {
        "kWh"
    }
}
"#;

fn setup(dir: &Path, source: &str) -> GeneratorConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let src = dir.join("meter.rs");
    fs::write(&src, source).unwrap();
    GeneratorConfig {
        out_dir: Some(dir.join("out")),
        cache_dir: Some(dir.join("cache")),
        rerun_if_changed: false,
        ..GeneratorConfig::default()
    }
    .with_target(TargetConfig::new(src, "Meter").with_options(SynthesisOptions {
        clone: true,
        serde: true,
        ..SynthesisOptions::default()
    }))
}

fn cache_entries(dir: &Path) -> usize {
    fs::read_dir(dir.join("cache")).map(|entries| entries.count()).unwrap_or(0)
}

#[test]
fn generated_file_is_valid_rust() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::new(setup(dir.path(), METER)).unwrap();
    let generated = generator.generate().unwrap();

    assert_eq!(generated.len(), 1);
    let file = &generated[0];
    assert_eq!(file.proxy_name, "MeterProxy");
    assert_eq!(file.path, dir.path().join("out").join("meter_proxy.rs"));
    assert!(file.written);
    assert!(!file.from_cache);
    assert!(file.limitations.iter().any(|l| l.member == "units"));

    let text = fs::read_to_string(&file.path).unwrap();
    assert!(text.starts_with("// Generated by interpose-codegen for `Meter`"));
    let parsed: syn::File = syn::parse_file(&text).unwrap();
    assert!(parsed.items.len() >= 4);
    assert!(text.contains("try_calibrate"));
    assert!(text.contains("VariadicByValue"));
    assert!(text.contains("PropertyTable for Meter"));
}

#[test]
fn unchanged_output_is_not_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Generator::new(setup(dir.path(), METER)).unwrap();
    let first = generator.generate().unwrap();
    let second = generator.generate().unwrap();

    assert!(first[0].written);
    assert!(!second[0].written);
    assert_eq!(generator.registry().len(), 1);
}

#[test]
fn cache_serves_fresh_generators_until_the_contract_changes() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), METER);
    let first = Generator::new(config.clone()).unwrap().generate().unwrap();
    assert!(!first[0].from_cache);
    assert_eq!(cache_entries(dir.path()), 1);

    let again = Generator::new(config.clone()).unwrap().generate().unwrap();
    assert!(again[0].from_cache);
    assert_eq!(again[0].fingerprint, first[0].fingerprint);

    let changed = METER.replace(
        "pub fn read(&self) -> i64 {",
        "pub fn read_scaled(&self, factor: i64) -> i64 {\n        self.reading * factor\n    }\n\n    pub fn read(&self) -> i64 {",
    );
    let config = setup(dir.path(), &changed);
    let regenerated = Generator::new(config).unwrap().generate().unwrap();
    assert!(!regenerated[0].from_cache);
    assert_ne!(regenerated[0].fingerprint, first[0].fingerprint);
    assert_eq!(cache_entries(dir.path()), 1, "stale entry must be pruned");

    let text = fs::read_to_string(&regenerated[0].path).unwrap();
    assert!(text.contains("read_scaled"));
}

#[test]
fn deriving_property_table_regenerates_without_a_second_impl() {
    let dir = tempfile::tempdir().unwrap();
    let first = Generator::new(setup(dir.path(), METER)).unwrap().generate().unwrap();
    assert!(fs::read_to_string(&first[0].path).unwrap().contains("PropertyTable for Meter"));

    let derived = METER.replace(
        "#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]",
        "#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, interpose_macros::PropertyTable)]",
    );
    let regenerated = Generator::new(setup(dir.path(), &derived)).unwrap().generate().unwrap();
    assert!(!regenerated[0].from_cache);
    assert_eq!(regenerated[0].fingerprint, first[0].fingerprint);
    assert_eq!(cache_entries(dir.path()), 1);

    let text = fs::read_to_string(&regenerated[0].path).unwrap();
    assert!(!text.contains("PropertyTable for Meter"));
}

#[test]
fn unreadable_cache_entries_cost_only_a_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), METER);
    Generator::new(config.clone()).unwrap().generate().unwrap();

    let entry = fs::read_dir(dir.path().join("cache")).unwrap().next().unwrap().unwrap().path();
    fs::write(&entry, "{ truncated").unwrap();

    let generated = Generator::new(config.clone()).unwrap().generate().unwrap();
    assert!(!generated[0].from_cache);
    assert_eq!(cache_entries(dir.path()), 1);

    let again = Generator::new(config).unwrap().generate().unwrap();
    assert!(again[0].from_cache);
}

#[test]
fn option_changes_bypass_cached_descriptions() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path(), METER);
    Generator::new(config.clone()).unwrap().generate().unwrap();

    config.targets[0].options.debug = true;
    let generated = Generator::new(config).unwrap().generate().unwrap();
    assert!(!generated[0].from_cache);
    let text = fs::read_to_string(&generated[0].path).unwrap();
    assert!(text.contains("Debug for MeterProxy"));
}

#[test]
fn missing_and_unsupported_targets_fail() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path(), METER);
    config.targets[0].type_name = "Gauge".into();
    assert_matches!(
        Generator::new(config).unwrap().generate(),
        Err(GeneratorError::TargetNotFound { type_name, .. }) if type_name == "Gauge"
    );

    let asynchronous = METER.replace("pub fn read(&self)", "pub async fn read(&self)");
    let config = setup(dir.path(), &asynchronous);
    assert_matches!(
        Generator::new(config).unwrap().generate(),
        Err(GeneratorError::Synthesis(SynthesisError::Unsupported(UnsupportedContract::AsyncMethod { .. })))
    );

    let config = setup(dir.path(), "pub struct Meter {");
    assert_matches!(Generator::new(config).unwrap().generate(), Err(GeneratorError::Parse { .. }));
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let config = GeneratorConfig {
        runtime_path: "not a path".into(),
        ..GeneratorConfig::default()
    };
    assert_matches!(Generator::new(config), Err(GeneratorError::Config(_)));
}

#[test]
fn config_files_round_trip_through_toml() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), METER);
    let path = dir.path().join("interpose.toml");
    fs::write(&path, config.to_toml_string().unwrap()).unwrap();

    let generator = Generator::from_config_file(&path).unwrap();
    assert_eq!(generator.config().targets, config.targets);
}
