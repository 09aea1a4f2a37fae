use std::fs;
use tempfile::TempDir;

use localrag_core::config::{Config, RetrievalSettings};
use localrag_core::error::Error;

#[test]
fn missing_sections_fall_back_to_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(&path, "[data]\nchild_collection = \"filters-children\"\n").unwrap();

    let config = Config::from_file(&path).expect("load");

    assert_eq!(config.retrieval(), &RetrievalSettings::default());
    assert_eq!(config.data().child_collection, "filters-children");
    assert_eq!(config.data().parent_collection, "parents", "untouched keys keep defaults");
}

#[test]
fn retrieval_overrides_are_applied() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(&path, "[retrieval]\nsemantic_weight = 0.5\nbm25_weight = 0.5\nfinal_top_k = 5\n").unwrap();

    let config = Config::from_file(&path).expect("load");
    let r = config.retrieval();

    assert_eq!(r.final_top_k, 5);
    assert!((r.default_weights().semantic - 0.5).abs() < 1e-6);
    assert!((r.spec_weights().bm25 - 0.75).abs() < 1e-6, "spec profile untouched");
    assert_eq!(config.get::<usize>("retrieval.final_top_k").expect("get"), 5);
}

#[test]
fn weights_that_do_not_sum_to_one_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(&path, "[retrieval]\nsemantic_weight = 0.7\nbm25_weight = 0.7\n").unwrap();

    match Config::from_file(&path) {
        Err(Error::InvalidConfig(msg)) => assert!(msg.contains("sum to 1.0"), "{msg}"),
        other => panic!("expected InvalidConfig, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn inverted_thresholds_are_rejected() {
    let settings = RetrievalSettings { medium_confidence_threshold: 0.8, ..RetrievalSettings::default() };
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn nan_settings_are_rejected() {
    let nan_k = RetrievalSettings { rrf_k: f32::NAN, ..RetrievalSettings::default() };
    assert!(matches!(nan_k.validate(), Err(Error::InvalidConfig(msg)) if msg.contains("rrf_k")));

    let infinite_k = RetrievalSettings { rrf_k: f32::INFINITY, ..RetrievalSettings::default() };
    assert!(matches!(infinite_k.validate(), Err(Error::InvalidConfig(_))));

    let nan_weight = RetrievalSettings { semantic_weight: f32::NAN, ..RetrievalSettings::default() };
    assert!(matches!(nan_weight.validate(), Err(Error::InvalidConfig(msg)) if msg.contains("sum to 1.0")));

    let nan_spec = RetrievalSettings { spec_bm25_weight: f32::NAN, ..RetrievalSettings::default() };
    assert!(matches!(nan_spec.validate(), Err(Error::InvalidConfig(_))));

    let nan_threshold = RetrievalSettings { high_confidence_threshold: f32::NAN, ..RetrievalSettings::default() };
    assert!(matches!(nan_threshold.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn load_layers_env_file_and_app_vars() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            "[retrieval]\nfinal_top_k = 8\nsemantic_top_k = 40\n\n[data]\nchild_collection = \"base-children\"\n",
        )?;
        jail.create_file("config.test.toml", "[retrieval]\nsemantic_top_k = 12\nbm25_top_k = 15\n")?;
        jail.set_env("RUST_ENV", "test");
        jail.set_env("APP_RETRIEVAL__FINAL_TOP_K", "5");
        jail.set_env("APP_DATA__PARENT_COLLECTION", "env-parents");

        let config = Config::load().expect("load");
        let r = config.retrieval();
        assert_eq!(r.final_top_k, 5, "APP_ vars win over files");
        assert_eq!(r.semantic_top_k, 12, "config.test.toml wins over config.toml");
        assert_eq!(r.bm25_top_k, 15);
        assert_eq!(r.rerank_candidates, RetrievalSettings::default().rerank_candidates);
        assert_eq!(config.data().child_collection, "base-children");
        assert_eq!(config.data().parent_collection, "env-parents");
        Ok(())
    });
}

#[test]
fn load_ignores_files_for_other_environments() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[retrieval]\nfinal_top_k = 7\n")?;
        jail.create_file("config.prod.toml", "[retrieval]\nfinal_top_k = 3\n")?;
        jail.set_env("RUST_ENV", "dev");

        let config = Config::load().expect("load");
        assert_eq!(config.retrieval().final_top_k, 7);
        Ok(())
    });
}

#[test]
fn load_rejects_invalid_env_overrides() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("config.toml", "")?;
        jail.set_env("RUST_ENV", "test");
        jail.set_env("APP_RETRIEVAL__RRF_K", "0");

        assert!(matches!(Config::load(), Err(Error::InvalidConfig(msg)) if msg.contains("rrf_k")));
        Ok(())
    });
}
