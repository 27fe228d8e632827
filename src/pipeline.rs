//! End-to-end training pipeline and scoring artifacts
//!
//! Stages run in order: load, split, fit features on the training rows,
//! train every configured family, evaluate on the held-out rows, explain a
//! sample of them, then write everything to the artifact directory.

use crate::config::PipelineConfig;
use crate::data::record::targets_of;
use crate::data::{load_records, train_test_split, Record, RecordSet};
use crate::error::{Result, ValuationError};
use crate::evaluation::{evaluate, EvaluationReport};
use crate::explainability::{explainer_for, global_importance, ImportanceResult, LocalExplanation};
use crate::features::{FeatureBuilder, FeatureMatrix, TransformStats};
use crate::training::{ModelFamily, ModelTrainer, TrainedModel};
use crate::utils::{StageTiming, Timer};
use chrono::{DateTime, Utc};
use ndarray::{s, Array1};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Fitted feature builder and trained model: scores raw records on its own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub builder: FeatureBuilder,
    pub model: TrainedModel,
    pub target_column: String,
    pub created_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn new(builder: FeatureBuilder, model: TrainedModel, target_column: impl Into<String>) -> Self {
        Self {
            builder,
            model,
            target_column: target_column.into(),
            created_at: Utc::now(),
        }
    }

    pub fn family(&self) -> ModelFamily {
        self.model.family
    }

    /// Predicted values for raw records
    pub fn predict(&self, records: &[Record]) -> Result<Array1<f64>> {
        let features = self.builder.transform(records)?;
        self.model.predict(&features.values)
    }

    /// Per-feature attributions for raw records
    pub fn explain(&self, records: &[Record]) -> Result<Vec<LocalExplanation>> {
        let features = self.builder.transform(records)?;
        explainer_for(&self.model)?.explain(&features.values, &features.names)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&json)?;
        if !artifact.builder.is_fitted() {
            return Err(ValuationError::ModelNotFitted);
        }
        if artifact.builder.feature_names() != artifact.model.feature_names.as_slice() {
            return Err(ValuationError::ShapeError {
                expected: format!("{} model features", artifact.model.feature_names.len()),
                actual: format!("{} builder features", artifact.builder.n_features()),
            });
        }
        Ok(artifact)
    }
}

/// Everything one pipeline run produced
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub builder: FeatureBuilder,
    pub models: Vec<TrainedModel>,
    /// One report per model, same order as `models`
    pub reports: Vec<EvaluationReport>,
    pub importances: Vec<(ModelFamily, ImportanceResult)>,
    pub train_stats: TransformStats,
    pub test_stats: TransformStats,
    pub n_train: usize,
    pub n_test: usize,
    pub n_excluded: usize,
    pub timings: Vec<StageTiming>,
    /// Files written to the output directory
    pub artifacts: Vec<PathBuf>,
}

impl PipelineOutput {
    /// Report with the highest test R²
    pub fn best_report(&self) -> Option<&EvaluationReport> {
        self.reports
            .iter()
            .max_by(|a, b| a.r2.partial_cmp(&b.r2).unwrap_or(std::cmp::Ordering::Equal))
    }

    pub fn report(&self, family: ModelFamily) -> Option<&EvaluationReport> {
        self.reports.iter().find(|r| r.family == family)
    }

    pub fn importance(&self, family: ModelFamily) -> Option<&ImportanceResult> {
        self.importances.iter().find(|(f, _)| *f == family).map(|(_, imp)| imp)
    }
}

/// Orchestrates the stages for one configuration
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the dataset at `path` and run every stage
    pub fn run(&self, path: &Path) -> Result<PipelineOutput> {
        self.config.validate()?;
        let records = load_records(path, &self.config.data)?;
        self.run_records(records)
    }

    /// Run every stage on already-loaded records
    pub fn run_records(&self, records: RecordSet) -> Result<PipelineOutput> {
        self.config.validate()?;
        let mut timer = Timer::start("pipeline");
        let split = train_test_split(records.len(), &self.config.split)?;
        let train_records = records.select(&split.train);
        let test_records = records.select(&split.test);
        info!("Split {} records into {} train / {} test", records.len(), train_records.len(), test_records.len());
        timer.checkpoint("split");

        let mut builder = FeatureBuilder::new(self.config.features.clone());
        builder.fit(&train_records, &records.extra_columns)?;
        let (train, train_stats) = builder.transform_with_stats(&train_records)?;
        let (test, test_stats) = builder.transform_with_stats(&test_records)?;
        let y_train = targets_of(&train_records)?;
        let y_test = targets_of(&test_records)?;
        log_stats("train", &train_stats);
        log_stats("test", &test_stats);
        timer.checkpoint("features");

        let trainer = ModelTrainer::new(self.config.training.clone());
        let models = trainer.train_all(&train.values, &y_train, &train.names)?;
        timer.checkpoint("training");

        let reports = models
            .iter()
            .map(|model| evaluate(model, &test.values, &y_test, &self.config.evaluation))
            .collect::<Result<Vec<_>>>()?;
        for r in &reports {
            info!("{}: test R2 = {:.4}, RMSE = {:.0}, MAE = {:.0}", r.family, r.r2, r.rmse, r.mae);
        }
        timer.checkpoint("evaluation");

        let importances = if self.config.explain.enabled {
            models
                .iter()
                .map(|model| Ok((model.family, self.explain_sample(model, &test)?)))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        timer.checkpoint("explanation");

        let artifacts = self.write_artifacts(&builder, &models, &reports, &importances, (&train, &y_train), (&test, &y_test))?;
        timer.checkpoint("artifacts");

        let timings = timer.stages();
        timer.stop_with_report();

        Ok(PipelineOutput {
            builder,
            models,
            reports,
            importances,
            train_stats,
            test_stats,
            n_train: split.train.len(),
            n_test: split.test.len(),
            n_excluded: records.excluded_rows,
            timings,
            artifacts,
        })
    }

    /// Global importance over the first `max_rows` test rows
    fn explain_sample(&self, model: &TrainedModel, test: &FeatureMatrix) -> Result<ImportanceResult> {
        let n = self.config.explain.max_rows.min(test.n_rows());
        let sample = test.values.slice(s![..n, ..]).to_owned();
        let explanations = explainer_for(model)?.explain(&sample, &test.names)?;

        let off = explanations
            .iter()
            .filter(|e| e.additivity_gap().abs() > 1e-6 * e.prediction.abs().max(1.0))
            .count();
        if off > 0 {
            warn!("{}: {} of {} explanations do not sum to their prediction", model.family, off, n);
        }

        let importance = global_importance(&explanations)?;
        let top: Vec<&str> = importance
            .top_k(self.config.explain.top_k)
            .iter()
            .map(|f| f.feature_name.as_str())
            .collect();
        info!("{}: top features by mean |SHAP|: {:?}", model.family, top);
        Ok(importance)
    }

    fn write_artifacts(
        &self,
        builder: &FeatureBuilder,
        models: &[TrainedModel],
        reports: &[EvaluationReport],
        importances: &[(ModelFamily, ImportanceResult)],
        train: (&FeatureMatrix, &Array1<f64>),
        test: (&FeatureMatrix, &Array1<f64>),
    ) -> Result<Vec<PathBuf>> {
        let dir = &self.config.output_dir;
        std::fs::create_dir_all(dir)?;
        let target = self.config.data.target_column.as_str();
        let mut written = Vec::new();

        let path = dir.join("train_transformed.csv");
        write_matrix_csv(&path, train.0, train.1, target)?;
        written.push(path);
        let path = dir.join("test_transformed.csv");
        write_matrix_csv(&path, test.0, test.1, target)?;
        written.push(path);

        for model in models {
            let path = dir.join(format!("{}.json", model.family.as_str()));
            ModelArtifact::new(builder.clone(), model.clone(), target).save(&path)?;
            written.push(path);
        }

        let path = dir.join("evaluation.json");
        std::fs::write(&path, serde_json::to_string_pretty(reports)?)?;
        written.push(path);

        for (family, importance) in importances {
            let path = dir.join(format!("importance_{}.json", family.as_str()));
            std::fs::write(&path, serde_json::to_string_pretty(importance)?)?;
            written.push(path);
        }

        let path = dir.join("config.json");
        self.config.save(&path)?;
        written.push(path);

        info!("Wrote {} artifacts to {}", written.len(), dir.display());
        Ok(written)
    }
}

fn log_stats(partition: &str, stats: &TransformStats) {
    info!(
        "{} features: {} rows, {} values imputed, {} room counts fixed, {} garage areas imputed, {} ratios guarded",
        partition,
        stats.n_rows,
        stats.total_imputed(),
        stats.room_count_fixed,
        stats.garage_area_imputed,
        stats.guarded_ratios
    );
}

/// Write a feature matrix and its target as CSV
pub fn write_matrix_csv(path: &Path, matrix: &FeatureMatrix, target: &Array1<f64>, target_name: &str) -> Result<()> {
    if matrix.n_rows() != target.len() {
        return Err(ValuationError::ShapeError {
            expected: format!("{} targets", matrix.n_rows()),
            actual: format!("{} targets", target.len()),
        });
    }
    let mut columns: Vec<Column> = matrix
        .names
        .iter()
        .enumerate()
        .map(|(j, name)| Column::new(name.as_str().into(), matrix.values.column(j).to_vec()))
        .collect();
    columns.push(Column::new(target_name.into(), target.to_vec()));

    let mut df = DataFrame::new(columns)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExplainConfig;
    use crate::data::{CategoricalField, NumericField};
    use crate::training::TrainingConfig;
    use tempfile::tempdir;

    fn records(n: usize) -> RecordSet {
        let zips = ["96001", "96002", "96003"];
        let records = (0..n)
            .map(|i| {
                let sqft = 800.0 + 25.0 * i as f64;
                let zip = zips[i % 3];
                let premium = 40_000.0 * (i % 3) as f64;
                Record::new()
                    .with_numeric(NumericField::FinishedSqft, sqft)
                    .with_numeric(NumericField::Bedrooms, (2 + i % 3) as f64)
                    .with_numeric(NumericField::Bathrooms, (1 + i % 2) as f64)
                    .with_numeric(NumericField::YearBuilt, 1950.0 + (i % 50) as f64)
                    .with_category(CategoricalField::Zip, zip)
                    .with_target(150.0 * sqft + premium)
            })
            .collect();
        RecordSet::new(records, Vec::new())
    }

    fn config(dir: &Path, models: Vec<ModelFamily>) -> PipelineConfig {
        PipelineConfig::new()
            .with_output_dir(dir)
            .with_training(TrainingConfig::new().with_models(models).with_n_iter(2).with_cv_folds(3))
            .with_explain(ExplainConfig {
                max_rows: 10,
                ..Default::default()
            })
    }

    #[test]
    fn test_ridge_run_writes_artifacts() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path(), vec![ModelFamily::Ridge]));
        let out = pipeline.run_records(records(60)).unwrap();

        assert_eq!(out.n_train + out.n_test, 60);
        assert_eq!(out.n_test, 12);
        assert_eq!(out.reports.len(), 1);
        let report = out.report(ModelFamily::Ridge).unwrap();
        assert!(report.r2 > 0.9, "r2 {}", report.r2);
        assert_eq!(out.importance(ModelFamily::Ridge).unwrap().n_rows, 10);

        for name in [
            "train_transformed.csv",
            "test_transformed.csv",
            "ridge.json",
            "evaluation.json",
            "importance_ridge.json",
            "config.json",
        ] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }
        assert_eq!(out.artifacts.len(), 6);
    }

    #[test]
    fn test_artifact_scores_raw_records() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path(), vec![ModelFamily::Ridge]));
        let out = pipeline.run_records(records(60)).unwrap();

        let artifact = ModelArtifact::load(&dir.path().join("ridge.json")).unwrap();
        assert_eq!(artifact.family(), ModelFamily::Ridge);
        assert_eq!(artifact.builder.feature_names(), out.builder.feature_names());

        let query = vec![Record::new()
            .with_numeric(NumericField::FinishedSqft, 1500.0)
            .with_category(CategoricalField::Zip, "96002")];
        let preds = artifact.predict(&query).unwrap();
        assert_eq!(preds.len(), 1);
        assert!(preds[0].is_finite());

        let explanations = artifact.explain(&query).unwrap();
        assert!((explanations[0].prediction - preds[0]).abs() < 1e-6 * preds[0].abs().max(1.0));
        assert!(explanations[0].additivity_gap().abs() < 1e-6 * preds[0].abs().max(1.0));
    }

    #[test]
    fn test_transformed_csv_has_target_column() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path(), vec![ModelFamily::Ridge]));
        let out = pipeline.run_records(records(40)).unwrap();

        let csv = std::fs::read_to_string(dir.path().join("test_transformed.csv")).unwrap();
        let mut lines = csv.lines();
        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(header.len(), out.builder.n_features() + 1);
        assert_eq!(*header.last().unwrap(), "taxvaluedollarcnt");
        assert_eq!(lines.count(), out.n_test);
    }

    #[test]
    fn test_explanations_can_be_disabled() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path(), vec![ModelFamily::Ridge]);
        cfg.explain.enabled = false;
        let out = Pipeline::new(cfg).run_records(records(30)).unwrap();
        assert!(out.importances.is_empty());
        assert!(!dir.path().join("importance_ridge.json").exists());
    }

    #[test]
    fn test_too_few_records() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path(), vec![ModelFamily::Ridge]));
        assert!(pipeline.run_records(records(1)).is_err());
    }

    #[test]
    fn test_write_matrix_length_mismatch() {
        let dir = tempdir().unwrap();
        let matrix = FeatureMatrix {
            values: ndarray::Array2::zeros((2, 1)),
            names: vec!["a".to_string()],
        };
        let target = Array1::zeros(3);
        assert!(write_matrix_csv(&dir.path().join("m.csv"), &matrix, &target, "y").is_err());
    }
}
