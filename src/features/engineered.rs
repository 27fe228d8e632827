//! Domain-derived columns: cleaned counts, ratios and flags

use serde::{Deserialize, Serialize};

/// Names of derived columns, in output order
pub const ENGINEERED_COLUMNS: [&str; 7] = [
    "price_per_sqft",
    "age_of_home",
    "bath_per_bed",
    "rooms_per_sqft",
    "garage_sqft_ratio",
    "multi_unit",
    "has_garage",
];

/// Output name of the cleaned room count
pub const ROOM_COUNT_FIXED: &str = "roomcnt_fixed";

/// `numerator / denominator`, or `sentinel` when the denominator is zero or
/// either side is not finite. The flag reports whether the guard fired.
pub fn safe_ratio(numerator: f64, denominator: f64, sentinel: f64) -> (f64, bool) {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        (sentinel, true)
    } else {
        (numerator / denominator, false)
    }
}

/// Room count, falling back to `bedrooms + bathrooms + 1` when the recorded
/// value is missing or not positive
pub fn fix_room_count(room_count: Option<f64>, bedrooms: f64, bathrooms: f64) -> (f64, bool) {
    match room_count {
        Some(r) if r > 0.0 => (r, false),
        _ => (bedrooms + bathrooms + 1.0, true),
    }
}

/// Cleaned and imputed base values of one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CleanValues {
    pub bathrooms: f64,
    pub bedrooms: f64,
    pub room_count: f64,
    pub finished_sqft: f64,
    pub lot_sqft: f64,
    pub year_built: f64,
    pub garage_cars: f64,
    pub garage_sqft: f64,
    pub unit_count: f64,
}

/// Derived values of one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Engineered {
    pub price_per_sqft: f64,
    pub age_of_home: f64,
    pub bath_per_bed: f64,
    pub rooms_per_sqft: f64,
    pub garage_sqft_ratio: f64,
    pub multi_unit: f64,
    pub has_garage: f64,
    /// Number of ratios that hit the zero-denominator guard
    pub guarded: usize,
}

impl Engineered {
    /// Derive ratios and flags from cleaned values
    pub fn derive(clean: &CleanValues, price_per_sqft: f64, reference_year: i32, sentinel: f64) -> Self {
        let (bath_per_bed, g1) = safe_ratio(clean.bathrooms, clean.bedrooms, sentinel);
        let (rooms_per_sqft, g2) = safe_ratio(clean.room_count, clean.finished_sqft, sentinel);
        let (garage_sqft_ratio, g3) = safe_ratio(clean.garage_sqft, clean.finished_sqft, sentinel);

        Self {
            price_per_sqft,
            age_of_home: reference_year as f64 - clean.year_built,
            bath_per_bed,
            rooms_per_sqft,
            garage_sqft_ratio,
            multi_unit: if clean.unit_count > 1.0 { 1.0 } else { 0.0 },
            has_garage: if clean.garage_cars > 0.0 || clean.garage_sqft > 0.0 { 1.0 } else { 0.0 },
            guarded: [g1, g2, g3].iter().filter(|&&g| g).count(),
        }
    }

    pub fn values(&self) -> [f64; 7] {
        [
            self.price_per_sqft,
            self.age_of_home,
            self.bath_per_bed,
            self.rooms_per_sqft,
            self.garage_sqft_ratio,
            self.multi_unit,
            self.has_garage,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean() -> CleanValues {
        CleanValues {
            bathrooms: 2.0,
            bedrooms: 4.0,
            room_count: 7.0,
            finished_sqft: 1400.0,
            lot_sqft: 6000.0,
            year_built: 1975.0,
            garage_cars: 2.0,
            garage_sqft: 420.0,
            unit_count: 1.0,
        }
    }

    #[test]
    fn test_safe_ratio() {
        assert_eq!(safe_ratio(3.0, 2.0, 0.0), (1.5, false));
        assert_eq!(safe_ratio(3.0, 0.0, 0.0), (0.0, true));
        assert_eq!(safe_ratio(3.0, f64::NAN, -1.0), (-1.0, true));
        assert_eq!(safe_ratio(f64::INFINITY, 2.0, 0.0), (0.0, true));
    }

    #[test]
    fn test_fix_room_count() {
        assert_eq!(fix_room_count(Some(6.0), 3.0, 2.0), (6.0, false));
        assert_eq!(fix_room_count(Some(0.0), 3.0, 2.0), (6.0, true));
        assert_eq!(fix_room_count(None, 1.0, 1.0), (3.0, true));
    }

    #[test]
    fn test_derive() {
        let e = Engineered::derive(&clean(), 350.0, 2025, 0.0);
        assert_eq!(e.price_per_sqft, 350.0);
        assert_eq!(e.age_of_home, 50.0);
        assert_eq!(e.bath_per_bed, 0.5);
        assert_eq!(e.rooms_per_sqft, 7.0 / 1400.0);
        assert_eq!(e.garage_sqft_ratio, 0.3);
        assert_eq!(e.multi_unit, 0.0);
        assert_eq!(e.has_garage, 1.0);
        assert_eq!(e.guarded, 0);
    }

    #[test]
    fn test_derive_guards_zero_bedrooms() {
        let mut c = clean();
        c.bedrooms = 0.0;
        c.garage_cars = 0.0;
        c.garage_sqft = 0.0;
        c.unit_count = 3.0;
        let e = Engineered::derive(&c, 0.0, 2025, 0.0);
        assert_eq!(e.bath_per_bed, 0.0);
        assert_eq!(e.guarded, 1);
        assert_eq!(e.has_garage, 0.0);
        assert_eq!(e.multi_unit, 1.0);
        assert!(e.values().iter().all(|v| v.is_finite()));
    }
}
