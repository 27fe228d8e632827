//! Home valuation CLI
//!
//! `train` runs the full pipeline, `predict` scores one property from a saved
//! artifact, `info` summarizes a dataset.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::data::{load_records, CategoricalField, DataConfig, NumericField, Record};
use crate::pipeline::{ModelArtifact, Pipeline, PipelineOutput};
use crate::training::ModelFamily;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

/// `1234567.8` -> `$1,234,568`
fn dollars(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "homeval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, evaluate and explain residential property value models")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full training pipeline
    Train {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Pipeline configuration (JSON); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Artifact directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model families (ridge, random_forest, lightgbm)
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,

        /// Seed for the split and the searches
        #[arg(long)]
        seed: Option<u64>,

        /// Fraction of rows held out for testing
        #[arg(long)]
        test_size: Option<f64>,

        /// Randomized-search candidates per tree family
        #[arg(long)]
        n_iter: Option<usize>,

        /// Cross-validation folds for every search
        #[arg(long)]
        cv_folds: Option<usize>,
    },

    /// Predict the value of one property
    Predict {
        /// Model artifact written by `train`
        #[arg(short, long)]
        model: PathBuf,

        /// Finished living area in square feet
        #[arg(long)]
        sqft: f64,

        #[arg(long)]
        bedrooms: Option<f64>,

        #[arg(long)]
        bathrooms: Option<f64>,

        #[arg(long)]
        year_built: Option<f64>,

        /// ZIP region id
        #[arg(long)]
        zip: Option<String>,

        /// Contributing features to show
        #[arg(long, default_value = "5")]
        top_k: usize,
    },

    /// Summarize a dataset
    Info {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: Option<String>,
    },
}

/// Command-line values that take precedence over the loaded configuration
#[derive(Debug, Clone, Default)]
pub struct TrainOverrides {
    pub output: Option<PathBuf>,
    pub models: Vec<String>,
    pub seed: Option<u64>,
    pub test_size: Option<f64>,
    pub n_iter: Option<usize>,
    pub cv_folds: Option<usize>,
}

impl TrainOverrides {
    pub fn apply(&self, config: &mut PipelineConfig) -> anyhow::Result<()> {
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if !self.models.is_empty() {
            config.training.models = self
                .models
                .iter()
                .map(|m| m.parse::<ModelFamily>())
                .collect::<std::result::Result<Vec<_>, _>>()?;
        }
        if let Some(seed) = self.seed {
            config.split.seed = seed;
            config.training.seed = seed;
        }
        if let Some(test_size) = self.test_size {
            config.split.test_ratio = test_size;
        }
        if let Some(n_iter) = self.n_iter {
            config.training.n_iter = n_iter;
        }
        if let Some(folds) = self.cv_folds {
            config.training.grid_cv_folds = folds;
            config.training.random_cv_folds = folds;
        }
        config.validate()?;
        Ok(())
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(data_path: &Path, config_path: Option<&Path>, overrides: &TrainOverrides) -> anyhow::Result<()> {
    section("Train");

    let mut config = match config_path {
        Some(path) => {
            let config = PipelineConfig::load(path)?;
            step_ok(&format!("Loaded config {}", path.display()));
            config
        }
        None => PipelineConfig::default(),
    };
    overrides.apply(&mut config)?;

    let families: Vec<&str> = config.training.models.iter().map(|f| f.as_str()).collect();
    println!("  {}", kv("Models", &families.join(", ")));
    println!("  {}", kv("Seed", &config.training.seed.to_string()));
    println!("  {}", kv("Output", &config.output_dir.display().to_string()));
    println!();

    step_run("Loading data");
    let start = Instant::now();
    let records = load_records(data_path, &config.data)?;
    step_done(&format!("{} records ({} excluded) in {:?}", records.len(), records.excluded_rows, start.elapsed()));

    step_run("Running pipeline");
    let start = Instant::now();
    let output = Pipeline::new(config).run_records(records)?;
    step_done(&format!("{:.1?}", start.elapsed()));

    print_train_summary(&output);
    Ok(())
}

fn print_train_summary(output: &PipelineOutput) {
    println!();
    println!(
        "  {:<16} {:>9} {:>9} {:>12} {:>12} {:>8}",
        muted("Model"), muted("CV"), muted("Test R²"), muted("RMSE"), muted("MAE"), muted("Time")
    );
    println!("  {}", dim(&"─".repeat(71)));
    for (model, report) in output.models.iter().zip(output.reports.iter()) {
        println!(
            "  {:<16} {:>9.4} {:>9.4} {:>12} {:>12} {:>7.1}s",
            model.family.as_str(),
            model.cv_score,
            report.r2,
            dollars(report.rmse),
            dollars(report.mae),
            model.training_time_secs
        );
    }
    println!("  {}", dim(&"─".repeat(71)));

    let Some(best) = output.best_report() else {
        return;
    };
    println!();
    line_box_top();
    line_box_center(&format!("{} {}", ok("best"), best.family.as_str().white().bold()));
    line_box_sep();
    line_box(&kv("Test R²     ", &format!("{:.4}", best.r2)));
    if let Some(adj) = best.adjusted_r2 {
        line_box(&kv("Adjusted R² ", &format!("{:.4}", adj)));
    }
    line_box(&kv("Median AE   ", &dollars(best.median_ae)));
    if let Some(mape) = best.mape {
        line_box(&kv("MAPE        ", &format!("{:.2}%", mape)));
    }
    for hit in &best.within_pct {
        line_box(&kv(&format!("Within {:>3.0}% ", hit.threshold * 100.0), &format!("{:.1}%", hit.pct_within)));
    }
    if let Some(importance) = output.importance(best.family) {
        line_box_sep();
        for (rank, f) in importance.top_k(5).iter().enumerate() {
            line_box(&format!("{} {}", muted(&format!("{}.", rank + 1)), f.feature_name));
        }
    }
    line_box_bottom();

    println!();
    println!(
        "  {} {} train / {} test rows, {} values imputed",
        muted("data"),
        output.n_train,
        output.n_test,
        output.train_stats.total_imputed() + output.test_stats.total_imputed()
    );
    println!("  {} {} files", muted("artifacts"), output.artifacts.len());
    println!();
}

/// Raw record for one property described on the command line
pub fn query_record(
    sqft: f64,
    bedrooms: Option<f64>,
    bathrooms: Option<f64>,
    year_built: Option<f64>,
    zip: Option<&str>,
) -> Record {
    let mut record = Record::new().with_numeric(NumericField::FinishedSqft, sqft);
    for (field, value) in [
        (NumericField::Bedrooms, bedrooms),
        (NumericField::Bathrooms, bathrooms),
        (NumericField::YearBuilt, year_built),
    ] {
        if let Some(v) = value {
            record = record.with_numeric(field, v);
        }
    }
    if let Some(zip) = zip {
        record = record.with_category(CategoricalField::Zip, zip.trim());
    }
    record
}

pub fn cmd_predict(model_path: &Path, record: Record, top_k: usize) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let artifact = ModelArtifact::load(model_path)?;
    step_done(&format!(
        "{} with {} features, trained {}",
        artifact.family(),
        artifact.builder.n_features(),
        artifact.created_at.format("%Y-%m-%d %H:%M UTC")
    ));

    let explanations = artifact.explain(std::slice::from_ref(&record))?;
    let Some(explanation) = explanations.first() else {
        anyhow::bail!("no prediction produced");
    };

    println!();
    line_box_top();
    line_box_center(&muted("Estimated value").to_string());
    line_box_center(&dollars(explanation.prediction).white().bold().to_string());
    line_box_sep();
    line_box(&kv("Baseline", &dollars(explanation.base_value)));
    for c in explanation.top_k_contributors(top_k) {
        let signed = if c.contribution >= 0.0 {
            ok(&format!("+{}", dollars(c.contribution)))
        } else {
            format!("{}", dollars(c.contribution)).red()
        };
        line_box(&format!("{:<34} {}", c.feature_name, signed));
    }
    line_box_bottom();
    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path, target: Option<&str>) -> anyhow::Result<()> {
    section("Data Info");

    let mut config = DataConfig::default();
    if let Some(target) = target {
        config = config.with_target(target);
    }
    let records = load_records(data_path, &config)?;
    let summary = records.summary();

    println!("  {:<14} {}", muted("File"), data_path.display());
    println!("  {:<14} {}", muted("Records"), summary.n_records);
    println!("  {:<14} {}", muted("Excluded"), summary.n_excluded);
    println!("  {:<14} {}", muted("Extra columns"), summary.extra_columns.len());
    if let Some(mean) = summary.target_mean {
        println!("  {:<14} {}", muted("Target mean"), dollars(mean));
    }
    if let Some(median) = summary.target_median {
        println!("  {:<14} {}", muted("Target median"), dollars(median));
    }
    println!();

    println!("  {:<32} {:>8} {:>8}", muted("Column"), muted("Missing"), muted("%"));
    println!("  {}", dim(&"─".repeat(50)));
    let n = summary.n_records.max(1) as f64;
    let mut missing: Vec<(&String, &usize)> = summary.missing.iter().collect();
    missing.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (column, count) in missing {
        let pct = 100.0 * *count as f64 / n;
        let pct = if pct > 50.0 {
            format!("{:.1}", pct).yellow()
        } else {
            format!("{:.1}", pct).normal()
        };
        println!("  {:<32} {:>8} {:>8}", column, count, pct);
    }

    println!();
    Ok(())
}
