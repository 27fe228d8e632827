//! Raw property records

use crate::error::{Result, ValuationError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default target column (assessed total value in dollars)
pub const TARGET_COLUMN: &str = "taxvaluedollarcnt";

/// Numeric attributes the feature builder knows by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NumericField {
    Bathrooms,
    Bedrooms,
    RoomCount,
    FinishedSqft,
    LotSqft,
    YearBuilt,
    GarageCars,
    GarageSqft,
    UnitCount,
}

impl NumericField {
    pub const ALL: [NumericField; 9] = [
        NumericField::Bathrooms,
        NumericField::Bedrooms,
        NumericField::RoomCount,
        NumericField::FinishedSqft,
        NumericField::LotSqft,
        NumericField::YearBuilt,
        NumericField::GarageCars,
        NumericField::GarageSqft,
        NumericField::UnitCount,
    ];

    /// Column name in the source dataset
    pub fn column_name(&self) -> &'static str {
        match self {
            NumericField::Bathrooms => "bathroomcnt",
            NumericField::Bedrooms => "bedroomcnt",
            NumericField::RoomCount => "roomcnt",
            NumericField::FinishedSqft => "calculatedfinishedsquarefeet",
            NumericField::LotSqft => "lotsizesquarefeet",
            NumericField::YearBuilt => "yearbuilt",
            NumericField::GarageCars => "garagecarcnt",
            NumericField::GarageSqft => "garagetotalsqft",
            NumericField::UnitCount => "unitcnt",
        }
    }

    pub fn value(&self, record: &Record) -> Option<f64> {
        let v = match self {
            NumericField::Bathrooms => record.bathrooms,
            NumericField::Bedrooms => record.bedrooms,
            NumericField::RoomCount => record.room_count,
            NumericField::FinishedSqft => record.finished_sqft,
            NumericField::LotSqft => record.lot_sqft,
            NumericField::YearBuilt => record.year_built,
            NumericField::GarageCars => record.garage_cars,
            NumericField::GarageSqft => record.garage_sqft,
            NumericField::UnitCount => record.unit_count,
        };
        v.filter(|x| x.is_finite())
    }

    fn slot<'a>(&self, record: &'a mut Record) -> &'a mut Option<f64> {
        match self {
            NumericField::Bathrooms => &mut record.bathrooms,
            NumericField::Bedrooms => &mut record.bedrooms,
            NumericField::RoomCount => &mut record.room_count,
            NumericField::FinishedSqft => &mut record.finished_sqft,
            NumericField::LotSqft => &mut record.lot_sqft,
            NumericField::YearBuilt => &mut record.year_built,
            NumericField::GarageCars => &mut record.garage_cars,
            NumericField::GarageSqft => &mut record.garage_sqft,
            NumericField::UnitCount => &mut record.unit_count,
        }
    }
}

/// Categorical attributes (location codes and type ids)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoricalField {
    City,
    Zip,
    Neighborhood,
    County,
    Fips,
    LandUseCode,
    LandUseType,
    AirConditioning,
    Heating,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 9] = [
        CategoricalField::City,
        CategoricalField::Zip,
        CategoricalField::Neighborhood,
        CategoricalField::County,
        CategoricalField::Fips,
        CategoricalField::LandUseCode,
        CategoricalField::LandUseType,
        CategoricalField::AirConditioning,
        CategoricalField::Heating,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            CategoricalField::City => "regionidcity",
            CategoricalField::Zip => "regionidzip",
            CategoricalField::Neighborhood => "regionidneighborhood",
            CategoricalField::County => "regionidcounty",
            CategoricalField::Fips => "fips",
            CategoricalField::LandUseCode => "propertycountylandusecode",
            CategoricalField::LandUseType => "propertylandusetypeid",
            CategoricalField::AirConditioning => "airconditioningtypeid",
            CategoricalField::Heating => "heatingorsystemtypeid",
        }
    }

    pub fn value<'a>(&self, record: &'a Record) -> Option<&'a str> {
        let v = match self {
            CategoricalField::City => &record.region_city,
            CategoricalField::Zip => &record.region_zip,
            CategoricalField::Neighborhood => &record.region_neighborhood,
            CategoricalField::County => &record.region_county,
            CategoricalField::Fips => &record.fips,
            CategoricalField::LandUseCode => &record.land_use_code,
            CategoricalField::LandUseType => &record.land_use_type,
            CategoricalField::AirConditioning => &record.air_conditioning_type,
            CategoricalField::Heating => &record.heating_type,
        };
        v.as_deref().filter(|s| !s.is_empty())
    }

    fn slot<'a>(&self, record: &'a mut Record) -> &'a mut Option<String> {
        match self {
            CategoricalField::City => &mut record.region_city,
            CategoricalField::Zip => &mut record.region_zip,
            CategoricalField::Neighborhood => &mut record.region_neighborhood,
            CategoricalField::County => &mut record.region_county,
            CategoricalField::Fips => &mut record.fips,
            CategoricalField::LandUseCode => &mut record.land_use_code,
            CategoricalField::LandUseType => &mut record.land_use_type,
            CategoricalField::AirConditioning => &mut record.air_conditioning_type,
            CategoricalField::Heating => &mut record.heating_type,
        }
    }
}

/// One property as read from the dataset.
///
/// Every attribute may be missing. Engineered values are derived into a
/// separate structure by the feature builder; a `Record` is never rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub parcel_id: Option<i64>,
    pub bathrooms: Option<f64>,
    pub bedrooms: Option<f64>,
    pub room_count: Option<f64>,
    pub finished_sqft: Option<f64>,
    pub lot_sqft: Option<f64>,
    pub year_built: Option<f64>,
    pub garage_cars: Option<f64>,
    pub garage_sqft: Option<f64>,
    pub unit_count: Option<f64>,
    pub region_city: Option<String>,
    pub region_zip: Option<String>,
    pub region_neighborhood: Option<String>,
    pub region_county: Option<String>,
    pub fips: Option<String>,
    pub land_use_code: Option<String>,
    pub land_use_type: Option<String>,
    pub air_conditioning_type: Option<String>,
    pub heating_type: Option<String>,
    /// Other numeric columns, aligned with `RecordSet::extra_columns`
    pub extras: Vec<Option<f64>>,
    /// Assessed value; `None` only for records built for scoring
    pub target: Option<f64>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for a known numeric field
    pub fn with_numeric(mut self, field: NumericField, value: f64) -> Self {
        *field.slot(&mut self) = Some(value);
        self
    }

    /// Builder-style setter for a known categorical field
    pub fn with_category(mut self, field: CategoricalField, value: impl Into<String>) -> Self {
        *field.slot(&mut self) = Some(value.into());
        self
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target = Some(target);
        self
    }

    pub(crate) fn set_numeric(&mut self, field: NumericField, value: Option<f64>) {
        *field.slot(self) = value;
    }

    pub(crate) fn set_category(&mut self, field: CategoricalField, value: Option<String>) {
        *field.slot(self) = value;
    }
}

/// Records plus the schema of their pass-through columns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSet {
    pub records: Vec<Record>,
    /// Names of numeric columns carried in `Record::extras`
    pub extra_columns: Vec<String>,
    /// Rows dropped at load time because the target was missing
    pub excluded_rows: usize,
}

/// Overview of a loaded record set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSummary {
    pub n_records: usize,
    pub n_excluded: usize,
    pub extra_columns: Vec<String>,
    pub missing: BTreeMap<String, usize>,
    pub target_mean: Option<f64>,
    pub target_median: Option<f64>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>, extra_columns: Vec<String>) -> Self {
        Self {
            records,
            extra_columns,
            excluded_rows: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Target values of every record; errors if any record has no target
    pub fn targets(&self) -> Result<Array1<f64>> {
        targets_of(&self.records)
    }

    /// Records at the given indices, in index order
    pub fn select(&self, indices: &[usize]) -> Vec<Record> {
        indices.iter().map(|&i| self.records[i].clone()).collect()
    }

    pub fn summary(&self) -> RecordSummary {
        let mut missing = BTreeMap::new();
        for field in NumericField::ALL {
            let n = self.records.iter().filter(|r| field.value(r).is_none()).count();
            missing.insert(field.column_name().to_string(), n);
        }
        for field in CategoricalField::ALL {
            let n = self.records.iter().filter(|r| field.value(r).is_none()).count();
            missing.insert(field.column_name().to_string(), n);
        }
        for (j, name) in self.extra_columns.iter().enumerate() {
            let n = self
                .records
                .iter()
                .filter(|r| r.extras.get(j).copied().flatten().is_none())
                .count();
            missing.insert(name.clone(), n);
        }

        let mut targets: Vec<f64> = self.records.iter().filter_map(|r| r.target).collect();
        let target_mean = if targets.is_empty() {
            None
        } else {
            Some(targets.iter().sum::<f64>() / targets.len() as f64)
        };
        let target_median = median_in_place(&mut targets);

        RecordSummary {
            n_records: self.records.len(),
            n_excluded: self.excluded_rows,
            extra_columns: self.extra_columns.clone(),
            missing,
            target_mean,
            target_median,
        }
    }
}

/// Collect targets from a slice of records
pub fn targets_of(records: &[Record]) -> Result<Array1<f64>> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.target
                .ok_or_else(|| ValuationError::DataError(format!("record {} has no target", i)))
        })
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from_vec)
}

/// Median of finite values; sorts the slice in place
pub fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    Some(if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_setters() {
        let r = Record::new()
            .with_numeric(NumericField::FinishedSqft, 1500.0)
            .with_category(CategoricalField::Zip, "96987")
            .with_target(450_000.0);
        assert_eq!(NumericField::FinishedSqft.value(&r), Some(1500.0));
        assert_eq!(CategoricalField::Zip.value(&r), Some("96987"));
        assert_eq!(r.target, Some(450_000.0));
    }

    #[test]
    fn test_non_finite_reads_as_missing() {
        let r = Record::new().with_numeric(NumericField::LotSqft, f64::NAN);
        assert_eq!(NumericField::LotSqft.value(&r), None);
        let r = Record::new().with_category(CategoricalField::City, "");
        assert_eq!(CategoricalField::City.value(&r), None);
    }

    #[test]
    fn test_median() {
        assert_eq!(median_in_place(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_in_place(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median_in_place(&mut []), None);
    }

    #[test]
    fn test_summary_counts_missing() {
        let records = vec![
            Record::new().with_numeric(NumericField::Bedrooms, 3.0).with_target(1.0),
            Record::new().with_target(3.0),
        ];
        let set = RecordSet::new(records, Vec::new());
        let summary = set.summary();
        assert_eq!(summary.n_records, 2);
        assert_eq!(summary.missing["bedroomcnt"], 1);
        assert_eq!(summary.missing["regionidzip"], 2);
        assert_eq!(summary.target_mean, Some(2.0));
    }

    #[test]
    fn test_targets_require_values() {
        let set = RecordSet::new(vec![Record::new()], Vec::new());
        assert!(set.targets().is_err());
    }
}
