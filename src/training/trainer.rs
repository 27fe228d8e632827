//! Model trainer: search each configured family, then refit the winner

use super::config::{ModelFamily, TrainingConfig};
use super::models::{Regressor, TrainedModel};
use super::search::{GridSearch, RandomizedSearch, SearchResult};
use crate::error::{Result, ValuationError};
use crate::utils::Timer;
use ndarray::{Array1, Array2};
use tracing::info;

/// Runs the per-family hyperparameter searches
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Search hyperparameters for one family
    pub fn search(&self, family: ModelFamily, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult> {
        let c = &self.config;
        match family {
            ModelFamily::Ridge => GridSearch::ridge(&c.ridge.alphas, c.grid_cv_folds)
                .with_scoring(c.scoring)
                .with_seed(c.seed)
                .fit(x, y),
            ModelFamily::RandomForest => RandomizedSearch::new(&c.forest, c.n_iter, c.random_cv_folds)
                .with_scoring(c.scoring)
                .with_seed(c.seed)
                .fit(x, y),
            ModelFamily::LightGbm => RandomizedSearch::new(&c.boosting, c.n_iter, c.random_cv_folds)
                .with_scoring(c.scoring)
                .with_seed(c.seed)
                .fit(x, y),
        }
    }

    /// Search, then refit the best parameters on all of `x`
    pub fn train_family(
        &self,
        family: ModelFamily,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
    ) -> Result<TrainedModel> {
        if x.nrows() != y.len() {
            return Err(ValuationError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if feature_names.len() != x.ncols() {
            return Err(ValuationError::ShapeError {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }

        let timer = Timer::start(format!("{} training", family));
        let search = self.search(family, x, y)?;
        info!(
            "{}: best CV {} = {:.4} (+/- {:.4}) with {:?}",
            family, self.config.scoring, search.best_score, search.best_std, search.best_params.describe()
        );

        let mut model = search.best_params.build(self.config.seed);
        model.fit(x, y)?;
        let training_time_secs = timer.stop().as_secs_f64();

        Ok(TrainedModel {
            family,
            params: search.best_params,
            cv_score: search.best_score,
            cv_std: search.best_std,
            model,
            feature_names: feature_names.to_vec(),
            training_time_secs,
        })
    }

    /// Train every configured family, in order
    pub fn train_all(&self, x: &Array2<f64>, y: &Array1<f64>, feature_names: &[String]) -> Result<Vec<TrainedModel>> {
        self.config.validate()?;
        self.config
            .models
            .iter()
            .map(|&family| self.train_family(family, x, y, feature_names))
            .collect()
    }
}
