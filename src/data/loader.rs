//! Dataset loading utilities

use super::config::DataConfig;
use super::record::{CategoricalField, NumericField, Record, RecordSet};
use crate::error::{Result, ValuationError};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// Read a delimited file into a DataFrame
pub fn load_dataframe(path: &Path, config: &DataConfig) -> Result<DataFrame> {
    let file = File::open(path)
        .map_err(|e| ValuationError::DataError(format!("{}: {}", path.display(), e)))?;

    let delimiter = u8::try_from(config.delimiter).map_err(|_| {
        ValuationError::invalid_param("delimiter", config.delimiter, "must be a single-byte character")
    })?;
    let parse_opts = CsvParseOptions::default().with_separator(delimiter);

    let reader = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(config.infer_schema_rows))
        .with_parse_options(parse_opts)
        .into_reader_with_file_handle(file);

    let df = reader.finish()?;
    info!("Loaded {} rows and {} columns from {}", df.height(), df.width(), path.display());
    Ok(df)
}

/// Read a delimited file straight into records
pub fn load_records(path: &Path, config: &DataConfig) -> Result<RecordSet> {
    let df = load_dataframe(path, config)?;
    records_from_dataframe(&df, config)
}

/// Map DataFrame columns onto `Record`s.
///
/// Known columns are matched by name, other numeric columns are carried as
/// pass-through extras, text columns that are not known categoricals are
/// dropped. Rows without a finite target are excluded.
pub fn records_from_dataframe(df: &DataFrame, config: &DataConfig) -> Result<RecordSet> {
    let n_rows = df.height();

    let target_col = df
        .column(&config.target_column)
        .map_err(|_| ValuationError::ColumnNotFound(config.target_column.clone()))?;
    let targets = column_as_f64(target_col)?;

    let living_area = NumericField::FinishedSqft.column_name();
    if df.column(living_area).is_err() {
        return Err(ValuationError::ColumnNotFound(living_area.to_string()));
    }

    let mut numeric: Vec<(NumericField, Vec<Option<f64>>)> = Vec::new();
    for field in NumericField::ALL {
        match df.column(field.column_name()) {
            Ok(col) => numeric.push((field, column_as_f64(col)?)),
            Err(_) => debug!("Column {} not present, treating as missing", field.column_name()),
        }
    }

    let mut categorical: Vec<(CategoricalField, Vec<Option<String>>)> = Vec::new();
    for field in CategoricalField::ALL {
        match df.column(field.column_name()) {
            Ok(col) => categorical.push((field, column_as_keys(col)?)),
            Err(_) => debug!("Column {} not present, treating as missing", field.column_name()),
        }
    }

    let parcel_ids: Option<Vec<Option<i64>>> = match df.column("parcelid") {
        Ok(col) => {
            let casted = col.cast(&DataType::Int64)?;
            Some(casted.as_materialized_series().i64()?.into_iter().collect())
        }
        Err(_) => None,
    };

    let mut known: HashSet<&str> = HashSet::new();
    known.insert(config.target_column.as_str());
    for field in NumericField::ALL {
        known.insert(field.column_name());
    }
    for field in CategoricalField::ALL {
        known.insert(field.column_name());
    }
    for name in &config.drop_columns {
        known.insert(name.as_str());
    }

    let mut extra_columns = Vec::new();
    let mut extras: Vec<Vec<Option<f64>>> = Vec::new();
    for col in df.get_columns() {
        let name = col.name().as_str();
        if known.contains(name) {
            continue;
        }
        if matches!(col.dtype(), DataType::String) {
            debug!("Dropping text column {}", name);
            continue;
        }
        extra_columns.push(name.to_string());
        extras.push(column_as_f64(col)?);
    }

    let mut records = Vec::with_capacity(n_rows);
    let mut excluded = 0usize;
    for i in 0..n_rows {
        let target = match targets[i] {
            Some(t) if t.is_finite() => t,
            _ => {
                excluded += 1;
                continue;
            }
        };

        let mut record = Record::new().with_target(target);
        record.parcel_id = parcel_ids.as_ref().and_then(|ids| ids[i]);
        for (field, values) in &numeric {
            record.set_numeric(*field, values[i]);
        }
        for (field, values) in &categorical {
            record.set_category(*field, values[i].clone());
        }
        record.extras = extras.iter().map(|values| values[i]).collect();
        records.push(record);
    }

    if excluded > 0 {
        warn!("Excluded {} rows with a missing or non-finite target", excluded);
    }
    info!(
        "Built {} records ({} pass-through numeric columns)",
        records.len(),
        extra_columns.len()
    );

    Ok(RecordSet {
        records,
        extra_columns,
        excluded_rows: excluded,
    })
}

fn column_as_f64(col: &Column) -> Result<Vec<Option<f64>>> {
    let casted = col
        .cast(&DataType::Float64)
        .map_err(|e| ValuationError::DataError(format!("{}: {}", col.name(), e)))?;
    let values = casted
        .as_materialized_series()
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    Ok(values)
}

/// Categorical values as normalized string keys.
///
/// Numeric ids are rendered without a trailing `.0` so that `96987` and
/// `96987.0` land in the same category.
fn column_as_keys(col: &Column) -> Result<Vec<Option<String>>> {
    if matches!(col.dtype(), DataType::String) {
        let values = col
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
            .collect();
        return Ok(values);
    }
    Ok(column_as_f64(col)?
        .into_iter()
        .map(|v| v.map(category_key))
        .collect())
}

/// Canonical string form of a numeric category id
pub fn category_key(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
