//! Resolution of a measured value to a named level (e.g. dispersion 0.044 is
//! `very_high`). Each category is a list of half-open `[min, max)` intervals,
//! an absent bound standing for infinity. The first interval containing the
//! value wins, scanning in ascending order of the lower bound with the open
//! lower bound first.

use std::cmp::Ordering;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{CatalogError, Result};
use crate::model::Threshold;

lazy_static! {
    static ref CATEGORY_NAME: Regex = Regex::new(r"^[a-z_]+$").unwrap();
}

/// Category names are lowercase words joined by underscores.
pub fn check_category_name(category: &str) -> Result<()> {
    if CATEGORY_NAME.is_match(category) {
        Ok(())
    } else {
        Err(CatalogError::InvalidArgument(format!("malformed threshold category '{category}'")))
    }
}

// ------------- ThresholdTable -------------
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    category: String,
    rows: Vec<Threshold>,
}

impl ThresholdTable {
    /// Rows belonging to other categories are ignored.
    pub fn new(category: &str, rows: impl IntoIterator<Item = Threshold>) -> Result<Self> {
        check_category_name(category)?;
        let mut rows: Vec<Threshold> = rows.into_iter().filter(|t| t.category == category).collect();
        rows.sort_by(|a, b| match (a.min, b.min) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.total_cmp(&y),
        });
        Ok(Self {
            category: category.to_string(),
            rows,
        })
    }
    pub fn category(&self) -> &str {
        &self.category
    }
    pub fn rows(&self) -> &[Threshold] {
        &self.rows
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    /// `None` when no interval contains the value, including for NaN.
    pub fn classify(&self, value: f64) -> Option<&Threshold> {
        if value.is_nan() {
            return None;
        }
        self.rows.iter().find(|t| t.contains(value))
    }
    pub fn level(&self, value: f64) -> Option<&str> {
        self.classify(value).map(|t| t.level.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(level: &str, min: Option<f64>, max: Option<f64>) -> Threshold {
        Threshold {
            category: "dispersion".into(),
            level: level.into(),
            min,
            max,
            description: None,
        }
    }

    fn dispersion() -> ThresholdTable {
        ThresholdTable::new(
            "dispersion",
            vec![
                row("very_high", Some(0.040), None),
                row("moderate", Some(0.020), Some(0.030)),
                row("low", None, Some(0.020)),
                row("high", Some(0.030), Some(0.040)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn classifies_within_and_on_boundaries() {
        let table = dispersion();
        assert_eq!(table.level(0.025), Some("moderate"));
        assert_eq!(table.level(0.045), Some("very_high"));
        assert_eq!(table.level(0.020), Some("moderate"));
        assert_eq!(table.level(0.0399), Some("high"));
        assert_eq!(table.level(-5.0), Some("low"));
    }

    #[test]
    fn rows_are_kept_in_classification_order() {
        let table = dispersion();
        let levels: Vec<&str> = table.rows().iter().map(|t| t.level.as_str()).collect();
        assert_eq!(levels, vec!["low", "moderate", "high", "very_high"]);
    }

    #[test]
    fn gaps_and_nan_are_unclassified() {
        let table = ThresholdTable::new("critical_angle", vec![Threshold {
            category: "critical_angle".into(),
            level: "small".into(),
            min: Some(25.0),
            max: Some(35.0),
            description: None,
        }])
        .unwrap();
        assert_eq!(table.level(10.0), None);
        assert_eq!(table.level(f64::NAN), None);
    }

    #[test]
    fn malformed_category_names_are_rejected() {
        assert!(check_category_name("birefringence").is_ok());
        assert!(check_category_name("critical_angle").is_ok());
        for bad in ["", "Dispersion", "two words", "rows; drop"] {
            assert!(matches!(check_category_name(bad), Err(CatalogError::InvalidArgument(_))), "{bad}");
        }
    }
}
