//! Integration test: CSV in, artifacts out

use home_valuation::cli::query_record;
use home_valuation::config::{ExplainConfig, PipelineConfig};
use home_valuation::evaluation::EvaluationReport;
use home_valuation::explainability::ImportanceResult;
use home_valuation::pipeline::{ModelArtifact, Pipeline};
use home_valuation::training::{ForestSpace, MaxFeatures, ModelFamily, TrainingConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use std::path::Path;
use tempfile::{tempdir, NamedTempFile};

const HEADER: &str = "parcelid,calculatedfinishedsquarefeet,bedroomcnt,bathroomcnt,roomcnt,yearbuilt,\
garagecarcnt,garagetotalsqft,regionidzip,fips,propertycountylandusecode,propertyzoningdesc,latitude,taxvaluedollarcnt";

fn write_dataset(n: usize) -> NamedTempFile {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let zips = [(96987, 120_000.0), (97001, 0.0), (96116, 60_000.0)];
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for i in 0..n {
        let sqft: f64 = rng.gen_range(700.0..3200.0);
        let beds = rng.gen_range(1..6);
        let baths = rng.gen_range(1..4);
        let year = rng.gen_range(1920..2015);
        let (zip, premium) = zips[i % 3];
        let cars = rng.gen_range(0..3);
        let garage = if cars > 0 { 200 * cars } else { 0 };
        let value = 170.0 * sqft + premium - 500.0 * (2025 - year) as f64 + rng.gen_range(-15_000.0..15_000.0);
        // Every 25th row: missing living area; every 40th: missing target
        let sqft_field = if i % 25 == 7 { String::new() } else { format!("{:.0}", sqft) };
        let target_field = if i % 40 == 3 { String::new() } else { format!("{:.0}", value) };
        writeln!(
            file,
            "{},{},{},{},0,{},{},{},{},6037,0100,LAR1,{:.4},{}",
            1000 + i,
            sqft_field,
            beds,
            baths,
            year,
            cars,
            garage,
            zip,
            34.0 + (i % 10) as f64 / 100.0,
            target_field
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

fn config(dir: &Path) -> PipelineConfig {
    let mut training = TrainingConfig::new()
        .with_models(vec![ModelFamily::Ridge, ModelFamily::RandomForest])
        .with_n_iter(2)
        .with_cv_folds(3);
    training.forest = ForestSpace {
        n_estimators: vec![10, 15],
        max_depth: vec![Some(8)],
        min_samples_split: vec![2],
        min_samples_leaf: vec![1, 2],
        max_features: vec![MaxFeatures::All],
    };
    PipelineConfig::new()
        .with_output_dir(dir)
        .with_seed(5)
        .with_training(training)
        .with_explain(ExplainConfig {
            enabled: true,
            max_rows: 25,
            top_k: 5,
        })
}

#[test]
fn test_pipeline_end_to_end() {
    let data = write_dataset(200);
    let dir = tempdir().unwrap();
    let out = Pipeline::new(config(dir.path())).run(data.path()).unwrap();

    // 200 rows, 5 without a target
    assert_eq!(out.n_excluded, 5);
    assert_eq!(out.n_train + out.n_test, 195);
    assert_eq!(out.n_test, 39);
    assert_eq!(out.models.len(), 2);
    assert!(out.train_stats.total_imputed() + out.test_stats.total_imputed() > 0);

    for report in &out.reports {
        assert!(report.r2 <= 1.0);
        assert!(report.rmse >= report.mae);
        assert!(report.r2 > 0.6, "{} R2 {}", report.family, report.r2);
    }

    let reports: Vec<EvaluationReport> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("evaluation.json")).unwrap()).unwrap();
    assert_eq!(reports.len(), out.reports.len());
    for (saved, live) in reports.iter().zip(out.reports.iter()) {
        assert_eq!(saved.family, live.family);
        assert!((saved.r2 - live.r2).abs() < 1e-12);
    }

    let importance: ImportanceResult =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("importance_random_forest.json")).unwrap())
            .unwrap();
    assert_eq!(importance.n_rows, 25);
    assert_eq!(importance.ranking.len(), out.builder.n_features());

    let stage_names: Vec<&str> = out.timings.iter().map(|t| t.stage.as_str()).collect();
    assert_eq!(stage_names, vec!["split", "features", "training", "evaluation", "explanation", "artifacts"]);
}

#[test]
fn test_saved_artifact_predicts_a_query() {
    let data = write_dataset(150);
    let dir = tempdir().unwrap();
    Pipeline::new(config(dir.path())).run(data.path()).unwrap();

    let artifact = ModelArtifact::load(&dir.path().join("random_forest.json")).unwrap();
    assert_eq!(artifact.target_column, "taxvaluedollarcnt");

    let small = query_record(900.0, Some(2.0), Some(1.0), Some(1950.0), Some("97001"));
    let large = query_record(3000.0, Some(5.0), Some(3.0), Some(2010.0), Some("96987"));
    let preds = artifact.predict(&[small.clone(), large]).unwrap();
    assert!(preds[1] > preds[0]);

    let explanation = &artifact.explain(&[small]).unwrap()[0];
    assert!((explanation.prediction - preds[0]).abs() < 1e-6 * preds[0].abs());
    assert_eq!(explanation.top_k_contributors(3).len(), 3);
}

#[test]
fn test_fixed_seed_is_reproducible() {
    let data = write_dataset(120);
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let a = Pipeline::new(config(dir_a.path())).run(data.path()).unwrap();
    let b = Pipeline::new(config(dir_b.path())).run(data.path()).unwrap();

    for (ma, mb) in a.models.iter().zip(b.models.iter()) {
        assert_eq!(ma.params, mb.params);
    }
    assert_eq!(a.reports, b.reports);
}

#[test]
fn test_missing_target_column_fails() {
    let data = write_dataset(30);
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.data.target_column = "saleprice".to_string();
    assert!(Pipeline::new(cfg).run(data.path()).is_err());
}
