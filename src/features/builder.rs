//! Feature builder: fitted statistics + per-record transform

use super::config::FeatureConfig;
use super::encoder::{CategoryEncoder, EncoderType};
use super::engineered::{fix_room_count, CleanValues, Engineered, ENGINEERED_COLUMNS, ROOM_COUNT_FIXED};
use crate::data::record::median_in_place;
use crate::data::{CategoricalField, NumericField, Record};
use crate::error::{Result, ValuationError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Numeric-only feature matrix with column names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub values: Array2<f64>,
    pub names: Vec<String>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Column index by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Counters describing what a transform had to repair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformStats {
    pub n_rows: usize,
    /// Missing values replaced by a fitted median, per source column
    pub imputed: BTreeMap<String, usize>,
    /// Room counts rebuilt from bedrooms + bathrooms
    pub room_count_fixed: usize,
    /// Garage areas replaced by the per-car-count median
    pub garage_area_imputed: usize,
    /// Ratios whose denominator was zero
    pub guarded_ratios: usize,
}

impl TransformStats {
    fn note_imputed(&mut self, column: &str) {
        *self.imputed.entry(column.to_string()).or_insert(0) += 1;
    }

    pub fn total_imputed(&self) -> usize {
        self.imputed.values().sum()
    }
}

/// Statistics learned from the training rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FittedStats {
    medians: HashMap<NumericField, f64>,
    extra_medians: Vec<f64>,
    /// Median garage area keyed by garage car count
    garage_by_cars: BTreeMap<i64, f64>,
    garage_fallback: f64,
    /// Median price per square foot keyed by ZIP
    zip_price_per_sqft: HashMap<String, f64>,
    global_price_per_sqft: f64,
}

/// Turns raw records into a numeric feature matrix.
///
/// All statistics (medians, garage-area and price-per-sqft lookups, encoder
/// vocabularies) come from `fit`, so transforming train and test rows yields
/// the same columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureBuilder {
    config: FeatureConfig,
    /// Pass-through numeric columns: slot in `Record::extras` and name
    extra_columns: Vec<(usize, String)>,
    stats: FittedStats,
    encoders: Vec<CategoryEncoder>,
    names: Vec<String>,
    is_fitted: bool,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            extra_columns: Vec::new(),
            stats: FittedStats::default(),
            encoders: Vec::new(),
            names: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Output column names (empty before `fit`)
    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    /// Learn imputation statistics and encoder vocabularies
    pub fn fit(&mut self, records: &[Record], extra_columns: &[String]) -> Result<&mut Self> {
        if records.is_empty() {
            return Err(ValuationError::FeatureError(
                "cannot fit feature builder on zero records".to_string(),
            ));
        }
        let base_names = Self::base_names();
        self.extra_columns = if self.config.include_extras {
            extra_columns
                .iter()
                .enumerate()
                .filter(|(_, name)| {
                    let clash = base_names.contains(*name) || ENGINEERED_COLUMNS.contains(&name.as_str());
                    if clash {
                        warn!("Skipping input column '{}': name is reserved for a built feature", name);
                    }
                    !clash
                })
                .map(|(slot, name)| (slot, name.clone()))
                .collect()
        } else {
            Vec::new()
        };

        let mut stats = FittedStats::default();

        for field in NumericField::ALL {
            let mut values: Vec<f64> = records.iter().filter_map(|r| field.value(r)).collect();
            if field == NumericField::FinishedSqft {
                values.retain(|&v| v > 0.0);
            }
            let median = median_in_place(&mut values).unwrap_or_else(|| {
                warn!("No observed values for {}, imputing 0", field.column_name());
                0.0
            });
            stats.medians.insert(field, median);
        }

        stats.extra_medians = self
            .extra_columns
            .iter()
            .map(|(slot, _)| {
                let mut values: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.extras.get(*slot).copied().flatten())
                    .collect();
                median_in_place(&mut values).unwrap_or(0.0)
            })
            .collect();

        // Garage area: zero area with cars present is a recording gap, not a real zero
        let mut by_cars: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        let mut positive_areas = Vec::new();
        for r in records {
            if let (Some(cars), Some(area)) = (
                NumericField::GarageCars.value(r),
                NumericField::GarageSqft.value(r),
            ) {
                if cars > 0.0 && area <= 0.0 {
                    continue;
                }
                by_cars.entry(cars.round() as i64).or_default().push(area);
                if area > 0.0 {
                    positive_areas.push(area);
                }
            }
        }
        stats.garage_by_cars = by_cars
            .into_iter()
            .filter_map(|(cars, mut areas)| median_in_place(&mut areas).map(|m| (cars, m)))
            .collect();
        stats.garage_fallback = median_in_place(&mut positive_areas).unwrap_or(0.0);

        let mut by_zip: HashMap<String, Vec<f64>> = HashMap::new();
        let mut all_ppsf = Vec::new();
        for r in records {
            let (Some(target), Some(sqft)) = (r.target, NumericField::FinishedSqft.value(r)) else {
                continue;
            };
            if sqft <= 0.0 {
                continue;
            }
            let ppsf = target / sqft;
            all_ppsf.push(ppsf);
            if let Some(zip) = CategoricalField::Zip.value(r) {
                by_zip.entry(zip.to_string()).or_default().push(ppsf);
            }
        }
        stats.zip_price_per_sqft = by_zip
            .into_iter()
            .filter_map(|(zip, mut v)| median_in_place(&mut v).map(|m| (zip, m)))
            .collect();
        stats.global_price_per_sqft = median_in_place(&mut all_ppsf).unwrap_or(0.0);

        let mut encoders = Vec::new();
        for spec in &self.config.top_k {
            let mut enc = CategoryEncoder::new(spec.field, EncoderType::TopK { k: spec.k }, self.config.drop_first);
            enc.fit(records.iter().map(|r| spec.field.value(r)))?;
            encoders.push(enc);
        }
        for &field in &self.config.one_hot {
            let mut enc = CategoryEncoder::new(field, EncoderType::OneHot, self.config.drop_first);
            enc.fit(records.iter().map(|r| field.value(r)))?;
            encoders.push(enc);
        }

        let mut names = base_names;
        names.extend(self.extra_columns.iter().map(|(_, name)| name.clone()));
        names.extend(ENGINEERED_COLUMNS.iter().map(|s| s.to_string()));
        for enc in &encoders {
            names.extend(enc.output_names());
        }

        info!(
            "Feature builder fitted on {} records: {} features ({} encoded)",
            records.len(),
            names.len(),
            encoders.iter().map(|e| e.n_outputs()).sum::<usize>()
        );

        self.stats = stats;
        self.encoders = encoders;
        self.names = names;
        self.is_fitted = true;
        Ok(self)
    }

    fn base_names() -> Vec<String> {
        NumericField::ALL
            .iter()
            .map(|f| match f {
                NumericField::RoomCount => ROOM_COUNT_FIXED.to_string(),
                other => other.column_name().to_string(),
            })
            .collect()
    }

    /// Transform records into a feature matrix
    pub fn transform(&self, records: &[Record]) -> Result<FeatureMatrix> {
        self.transform_with_stats(records).map(|(m, _)| m)
    }

    /// Fit on `records`, then transform them
    pub fn fit_transform(&mut self, records: &[Record], extra_columns: &[String]) -> Result<FeatureMatrix> {
        self.fit(records, extra_columns)?;
        self.transform(records)
    }

    /// Transform and report every imputation and guarded ratio.
    ///
    /// Row count in equals row count out: nothing is dropped.
    pub fn transform_with_stats(&self, records: &[Record]) -> Result<(FeatureMatrix, TransformStats)> {
        if !self.is_fitted {
            return Err(ValuationError::ModelNotFitted);
        }

        let width = self.names.len();
        let mut values = Array2::zeros((records.len(), width));
        let mut stats = TransformStats {
            n_rows: records.len(),
            ..Default::default()
        };

        for (i, record) in records.iter().enumerate() {
            let mut row = values.row_mut(i);
            let row = row
                .as_slice_mut()
                .ok_or_else(|| ValuationError::ComputationError("non-contiguous feature row".to_string()))?;
            self.fill_row(record, row, &mut stats)?;
        }

        if stats.total_imputed() > 0 || stats.guarded_ratios > 0 {
            debug!(
                "Transformed {} rows: {} values imputed, {} ratios guarded",
                stats.n_rows,
                stats.total_imputed(),
                stats.guarded_ratios
            );
        }

        Ok((
            FeatureMatrix {
                values,
                names: self.names.clone(),
            },
            stats,
        ))
    }

    fn median(&self, field: NumericField) -> f64 {
        self.stats.medians.get(&field).copied().unwrap_or(0.0)
    }

    fn numeric_or_median(&self, record: &Record, field: NumericField, stats: &mut TransformStats) -> f64 {
        match field.value(record) {
            Some(v) => v,
            None => {
                stats.note_imputed(field.column_name());
                self.median(field)
            }
        }
    }

    fn clean(&self, record: &Record, stats: &mut TransformStats) -> CleanValues {
        let bathrooms = self.numeric_or_median(record, NumericField::Bathrooms, stats);
        let bedrooms = self.numeric_or_median(record, NumericField::Bedrooms, stats);
        let (room_count, fixed) = fix_room_count(NumericField::RoomCount.value(record), bedrooms, bathrooms);
        if fixed {
            stats.room_count_fixed += 1;
        }

        let finished_sqft = match NumericField::FinishedSqft.value(record) {
            Some(v) if v > 0.0 => v,
            _ => {
                stats.note_imputed(NumericField::FinishedSqft.column_name());
                self.median(NumericField::FinishedSqft)
            }
        };

        let lot_sqft = self.numeric_or_median(record, NumericField::LotSqft, stats);
        let year_built = self.numeric_or_median(record, NumericField::YearBuilt, stats);
        let unit_count = self.numeric_or_median(record, NumericField::UnitCount, stats);

        let garage_cars = NumericField::GarageCars.value(record).unwrap_or(0.0);
        let garage_sqft = match NumericField::GarageSqft.value(record) {
            Some(area) if area > 0.0 => area,
            _ if garage_cars > 0.0 => {
                stats.garage_area_imputed += 1;
                self.stats
                    .garage_by_cars
                    .get(&(garage_cars.round() as i64))
                    .copied()
                    .unwrap_or(self.stats.garage_fallback)
            }
            _ => 0.0,
        };

        CleanValues {
            bathrooms,
            bedrooms,
            room_count,
            finished_sqft,
            lot_sqft,
            year_built,
            garage_cars,
            garage_sqft,
            unit_count,
        }
    }

    fn price_per_sqft(&self, record: &Record) -> f64 {
        CategoricalField::Zip
            .value(record)
            .and_then(|zip| self.stats.zip_price_per_sqft.get(zip).copied())
            .unwrap_or(self.stats.global_price_per_sqft)
    }

    fn fill_row(&self, record: &Record, row: &mut [f64], stats: &mut TransformStats) -> Result<()> {
        let clean = self.clean(record, stats);
        let engineered = Engineered::derive(
            &clean,
            self.price_per_sqft(record),
            self.config.reference_year,
            self.config.ratio_sentinel,
        );
        stats.guarded_ratios += engineered.guarded;

        let base = [
            clean.bathrooms,
            clean.bedrooms,
            clean.room_count,
            clean.finished_sqft,
            clean.lot_sqft,
            clean.year_built,
            clean.garage_cars,
            clean.garage_sqft,
            clean.unit_count,
        ];
        let mut col = 0;
        for v in base {
            row[col] = v;
            col += 1;
        }

        for (j, (slot, name)) in self.extra_columns.iter().enumerate() {
            row[col] = match record.extras.get(*slot).copied().flatten() {
                Some(v) => v,
                None => {
                    stats.note_imputed(name);
                    self.stats.extra_medians[j]
                }
            };
            col += 1;
        }

        for v in engineered.values() {
            row[col] = v;
            col += 1;
        }

        for enc in &self.encoders {
            let n = enc.n_outputs();
            enc.encode_into(enc.field().value(record), &mut row[col..col + n])?;
            col += n;
        }

        debug_assert_eq!(col, row.len());
        for v in row.iter_mut() {
            if !v.is_finite() {
                *v = self.config.ratio_sentinel;
                stats.guarded_ratios += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sqft: Option<f64>, beds: f64, baths: f64, zip: &str, target: f64) -> Record {
        let mut r = Record::new()
            .with_numeric(NumericField::Bedrooms, beds)
            .with_numeric(NumericField::Bathrooms, baths)
            .with_numeric(NumericField::YearBuilt, 1990.0)
            .with_category(CategoricalField::Zip, zip)
            .with_category(CategoricalField::Fips, "6037")
            .with_target(target);
        r.finished_sqft = sqft;
        r
    }

    fn training_records() -> Vec<Record> {
        vec![
            record(Some(1000.0), 2.0, 1.0, "100", 300_000.0),
            record(Some(2000.0), 4.0, 3.0, "100", 600_000.0),
            record(Some(1500.0), 3.0, 2.0, "200", 300_000.0),
            record(Some(1200.0), 0.0, 1.0, "200", 240_000.0),
        ]
    }

    fn builder() -> FeatureBuilder {
        let mut b = FeatureBuilder::new(FeatureConfig::default());
        b.fit(&training_records(), &[]).unwrap();
        b
    }

    #[test]
    fn test_transform_before_fit() {
        let b = FeatureBuilder::new(FeatureConfig::default());
        assert!(matches!(b.transform(&training_records()), Err(ValuationError::ModelNotFitted)));
    }

    #[test]
    fn test_fit_on_empty_fails() {
        let mut b = FeatureBuilder::new(FeatureConfig::default());
        assert!(b.fit(&[], &[]).is_err());
    }

    #[test]
    fn test_output_is_numeric_and_finite() {
        let b = builder();
        let m = b.transform(&training_records()).unwrap();
        assert_eq!(m.n_rows(), 4);
        assert_eq!(m.n_features(), b.n_features());
        assert!(m.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_bedrooms_yields_sentinel() {
        let b = builder();
        let (m, stats) = b.transform_with_stats(&training_records()).unwrap();
        let col = m.column_index("bath_per_bed").unwrap();
        assert_eq!(m.values[[3, col]], 0.0);
        assert_eq!(m.values[[0, col]], 0.5);
        assert!(stats.guarded_ratios >= 1);
    }

    #[test]
    fn test_room_count_and_age() {
        let b = builder();
        let m = b.transform(&training_records()).unwrap();
        let rooms = m.column_index("roomcnt_fixed").unwrap();
        let age = m.column_index("age_of_home").unwrap();
        assert_eq!(m.values[[1, rooms]], 8.0);
        assert_eq!(m.values[[1, age]], 35.0);
    }

    #[test]
    fn test_price_per_sqft_is_zip_median() {
        let b = builder();
        let m = b.transform(&training_records()).unwrap();
        let col = m.column_index("price_per_sqft").unwrap();
        // ZIP 100: 300 and 300 per sqft
        assert_eq!(m.values[[0, col]], 300.0);
        // ZIP 200: 200 and 200 per sqft
        assert_eq!(m.values[[2, col]], 200.0);

        let unseen = record(Some(900.0), 2.0, 1.0, "999", 0.0);
        let m = b.transform(&[unseen]).unwrap();
        assert!(m.values[[0, col]] > 0.0);
    }

    #[test]
    fn test_missing_fields_are_imputed_not_dropped() {
        let b = builder();
        let sparse = Record::new();
        let (m, stats) = b.transform_with_stats(&[sparse]).unwrap();
        assert_eq!(m.n_rows(), 1);
        assert!(m.values.iter().all(|v| v.is_finite()));
        assert_eq!(stats.imputed["calculatedfinishedsquarefeet"], 1);
        let sqft = m.column_index("calculatedfinishedsquarefeet").unwrap();
        assert_eq!(m.values[[0, sqft]], 1350.0);
    }

    #[test]
    fn test_garage_area_imputed_from_car_count() {
        let mut records = training_records();
        records[0].garage_cars = Some(2.0);
        records[0].garage_sqft = Some(400.0);
        records[1].garage_cars = Some(2.0);
        records[1].garage_sqft = Some(500.0);
        records[2].garage_cars = Some(2.0);
        records[2].garage_sqft = Some(0.0);

        let mut b = FeatureBuilder::new(FeatureConfig::default());
        b.fit(&records, &[]).unwrap();
        let (m, stats) = b.transform_with_stats(&records).unwrap();
        let col = m.column_index("garagetotalsqft").unwrap();
        assert_eq!(m.values[[2, col]], 450.0);
        assert_eq!(stats.garage_area_imputed, 1);
        let flag = m.column_index("has_garage").unwrap();
        assert_eq!(m.values[[2, flag]], 1.0);
        assert_eq!(m.values[[3, flag]], 0.0);
    }

    #[test]
    fn test_train_and_test_share_columns() {
        let b = builder();
        let test = vec![record(Some(800.0), 1.0, 1.0, "300", 200_000.0)];
        let train_m = b.transform(&training_records()).unwrap();
        let test_m = b.transform(&test).unwrap();
        assert_eq!(train_m.names, test_m.names);
    }

    #[test]
    fn test_extra_columns_pass_through() {
        let mut records = training_records();
        for (i, r) in records.iter_mut().enumerate() {
            r.extras = vec![if i == 0 { None } else { Some(i as f64) }];
        }
        let mut b = FeatureBuilder::new(FeatureConfig::default());
        let m = b.fit_transform(&records, &["latitude".to_string()]).unwrap();
        let col = m.column_index("latitude").unwrap();
        assert_eq!(m.values[[0, col]], 2.0);
        assert_eq!(m.values[[3, col]], 3.0);
    }

    #[test]
    fn test_extra_column_with_reserved_name_is_skipped() {
        let mut records = training_records();
        for r in records.iter_mut() {
            r.extras = vec![Some(99.0), Some(34.0)];
        }
        let mut b = FeatureBuilder::new(FeatureConfig::default());
        let m = b
            .fit_transform(&records, &["age_of_home".to_string(), "latitude".to_string()])
            .unwrap();
        assert_eq!(m.names.iter().filter(|n| *n == "age_of_home").count(), 1);
        assert_eq!(m.values[[0, m.column_index("age_of_home").unwrap()]], 35.0);
        assert_eq!(m.values[[0, m.column_index("latitude").unwrap()]], 34.0);
    }

    #[test]
    fn test_empty_transform_keeps_width() {
        let b = builder();
        let m = b.transform(&[]).unwrap();
        assert_eq!(m.n_rows(), 0);
        assert_eq!(m.n_features(), b.n_features());
    }
}
