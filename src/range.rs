//! Scalar-or-range property values.
//!
//! Source data records refractive index, specific gravity and hardness either
//! as a bare number (`2.42`) or as a textual range (`"1.762-1.770"`). The
//! store keeps them as numeric `(min, max)` pairs so they can be searched, and
//! the compatibility view turns the pair back into text for display.
//!
//! Parsing never fails loudly: anything that cannot be read as a number or a
//! range simply yields `None` and downstream display omits the property.

// used to print out readable forms of a range
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A property value as it arrives from source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}
impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

// ------------- NumericRange -------------
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
    pub fn single(value: f64) -> Self {
        Self { min: value, max: value }
    }
    /// Both bounds must be present for a range to exist.
    pub fn from_bounds(min: Option<f64>, max: Option<f64>) -> Option<Self> {
        match (min, max) {
            (Some(min), Some(max)) => Some(Self { min, max }),
            _ => None,
        }
    }
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
    pub fn is_single(&self) -> bool {
        self.min == self.max
    }
    /// True when `[min, max]` intersects the closed window `[low, high]`.
    pub fn overlaps(&self, low: f64, high: f64) -> bool {
        self.min <= high && self.max >= low
    }
}

impl fmt::Display for NumericRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Parses an optional source value into a numeric range.
pub fn parse_range(value: Option<&PropertyValue>) -> Option<NumericRange> {
    match value? {
        PropertyValue::Number(v) if v.is_finite() => Some(NumericRange::single(*v)),
        PropertyValue::Number(_) => None,
        PropertyValue::Text(text) => parse_range_text(text),
    }
}

/// Parses `"a-b"`, `"a"` or a sentinel such as `"metallic"`.
///
/// The separator is the first `-` that has something on its left, so a
/// leading minus sign is read as part of the number.
pub fn parse_range_text(text: &str) -> Option<NumericRange> {
    let text = text.trim();
    let separator = text
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '-')
        .map(|(i, _)| i);
    match separator {
        Some(i) => {
            let min = parse_number(&text[..i])?;
            let max = parse_number(&text[i + 1..])?;
            Some(NumericRange::new(min, max))
        }
        None => parse_number(text).map(NumericRange::single),
    }
}

/// Formats a stored `(min, max)` pair for display; `None` unless both exist.
pub fn format_range(min: Option<f64>, max: Option<f64>) -> Option<String> {
    NumericRange::from_bounds(min, max).map(|r| r.to_string())
}

/// Serde helper for textual range fields that may arrive as bare numbers.
pub fn range_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<PropertyValue>::deserialize(deserializer)?.map(|value| match value {
        PropertyValue::Number(n) => NumericRange::single(n).to_string(),
        PropertyValue::Text(text) => text,
    }))
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
