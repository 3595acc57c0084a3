// used to order matches by closeness
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;
use crate::model::{Family, FlatRecord};
use crate::range::NumericRange;

// ------------- PropertyKind -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    RefractiveIndex,
    SpecificGravity,
}

impl PropertyKind {
    /// Typical measurement error of a refractometer and a hydrostatic balance.
    pub fn default_tolerance(&self) -> f64 {
        match self {
            PropertyKind::RefractiveIndex => 0.01,
            PropertyKind::SpecificGravity => 0.05,
        }
    }
    pub fn key(&self) -> &'static str {
        match self {
            PropertyKind::RefractiveIndex => "ri",
            PropertyKind::SpecificGravity => "sg",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for PropertyKind {
    type Err = CatalogError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ri" | "refractive_index" => Ok(PropertyKind::RefractiveIndex),
            "sg" | "specific_gravity" => Ok(PropertyKind::SpecificGravity),
            other => Err(CatalogError::InvalidArgument(format!("unknown property '{other}'"))),
        }
    }
}

// ------------- Ranged -------------
/// Anything carrying stored numeric bounds for the searchable properties.
pub trait Ranged {
    fn id(&self) -> &str;
    fn range(&self, kind: PropertyKind) -> Option<NumericRange>;
}

impl Ranged for FlatRecord {
    fn id(&self) -> &str {
        &self.id
    }
    fn range(&self, kind: PropertyKind) -> Option<NumericRange> {
        match kind {
            PropertyKind::RefractiveIndex => NumericRange::from_bounds(self.ri_min, self.ri_max),
            PropertyKind::SpecificGravity => NumericRange::from_bounds(self.sg_min, self.sg_max),
        }
    }
}

impl Ranged for Family {
    fn id(&self) -> &str {
        &self.id
    }
    fn range(&self, kind: PropertyKind) -> Option<NumericRange> {
        match kind {
            PropertyKind::RefractiveIndex => self.ri(),
            PropertyKind::SpecificGravity => self.sg(),
        }
    }
}

/// Candidates whose range overlaps `value ± tolerance`, closest midpoint first
/// and ties broken by id. Items without both bounds never match.
pub fn find_by_property<T: Ranged>(items: &[T], kind: PropertyKind, value: f64, tolerance: f64) -> Vec<&T> {
    if !value.is_finite() || !tolerance.is_finite() {
        return Vec::new();
    }
    let tolerance = tolerance.abs();
    let mut matched: Vec<(f64, &T)> = items
        .iter()
        .filter_map(|item| {
            let range = item.range(kind)?;
            range
                .overlaps(value - tolerance, value + tolerance)
                .then(|| ((range.midpoint() - value).abs(), item))
        })
        .collect();
    matched.sort_by(|(da, a), (db, b)| match da.total_cmp(db) {
        Ordering::Equal => a.id().cmp(b.id()),
        unequal => unequal,
    });
    matched.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, ri: Option<(f64, f64)>, sg: Option<(f64, f64)>) -> FlatRecord {
        FlatRecord {
            id: id.into(),
            name: id.into(),
            ri_min: ri.map(|r| r.0),
            ri_max: ri.map(|r| r.1),
            sg_min: sg.map(|r| r.0),
            sg_max: sg.map(|r| r.1),
            ..Default::default()
        }
    }

    fn corpus() -> Vec<FlatRecord> {
        vec![
            record("ruby", Some((1.762, 1.770)), Some((3.97, 4.05))),
            record("sapphire", Some((1.762, 1.770)), Some((3.95, 4.01))),
            record("spinel", Some((1.712, 1.762)), Some((3.58, 3.61))),
            record("zircon", Some((1.810, 2.024)), Some((3.9, 4.73))),
            record("hematite", None, Some((5.0, 5.3))),
        ]
    }

    fn ids(found: Vec<&FlatRecord>) -> Vec<&str> {
        found.into_iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn overlapping_ranges_match_within_tolerance() {
        let corpus = corpus();
        let found = ids(find_by_property(&corpus, PropertyKind::RefractiveIndex, 1.768, 0.01));
        assert_eq!(found, vec!["ruby", "sapphire", "spinel"]);
    }

    #[test]
    fn distant_value_matches_nothing() {
        let corpus = corpus();
        assert!(ids(find_by_property(&corpus, PropertyKind::RefractiveIndex, 1.9, 0.01)).contains(&"zircon"));
        assert!(find_by_property(&corpus[..3], PropertyKind::RefractiveIndex, 1.9, 0.01).is_empty());
    }

    #[test]
    fn records_without_bounds_are_skipped() {
        let corpus = corpus();
        let found = ids(find_by_property(&corpus, PropertyKind::RefractiveIndex, 0.0, 100.0));
        assert!(!found.contains(&"hematite"));
        let by_sg = ids(find_by_property(&corpus, PropertyKind::SpecificGravity, 5.1, 0.05));
        assert_eq!(by_sg, vec!["hematite"]);
    }

    #[test]
    fn closest_midpoint_comes_first() {
        let corpus = corpus();
        let found = ids(find_by_property(&corpus, PropertyKind::SpecificGravity, 4.0, 0.05));
        assert_eq!(found, vec!["ruby", "sapphire", "zircon"]);
    }

    #[test]
    fn non_finite_queries_match_nothing() {
        let corpus = corpus();
        assert!(find_by_property(&corpus, PropertyKind::SpecificGravity, f64::NAN, 0.05).is_empty());
    }

    #[test]
    fn property_names_parse() {
        assert_eq!("RI".parse::<PropertyKind>().unwrap(), PropertyKind::RefractiveIndex);
        assert_eq!("sg".parse::<PropertyKind>().unwrap().default_tolerance(), 0.05);
        assert!("hardness".parse::<PropertyKind>().is_err());
    }
}
