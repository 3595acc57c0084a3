//! One-hop lookups over the origin graph.
//!
//! A synthetic points at the natural stone it reproduces through
//! `natural_counterpart_id`. A simulant or composite may do the same, and
//! may additionally list the stones it imitates in `target_minerals`; the
//! two signals are independent and either one suffices. Unknown ids simply
//! resolve to nothing.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

// used to hash family ids
use seahash::SeaHasher;
use serde::Serialize;

use crate::model::{Family, Origin};

pub type IdHasher = BuildHasherDefault<SeaHasher>;

/// Both directions of imitation for one natural stone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Counterparts<'a> {
    pub synthetics: Vec<&'a Family>,
    pub simulants: Vec<&'a Family>,
}

impl Counterparts<'_> {
    pub fn is_empty(&self) -> bool {
        self.synthetics.is_empty() && self.simulants.is_empty()
    }
}

pub struct Provenance<'a> {
    families: &'a [Family],
    by_id: HashMap<&'a str, &'a Family, IdHasher>,
}

impl<'a> Provenance<'a> {
    pub fn new(families: &'a [Family]) -> Self {
        let by_id = families.iter().map(|f| (f.id.as_str(), f)).collect();
        Self { families, by_id }
    }

    pub fn family(&self, id: &str) -> Option<&'a Family> {
        self.by_id.get(id.to_lowercase().as_str()).copied()
    }

    pub fn synthetics_of(&self, natural_id: &str) -> Vec<&'a Family> {
        let natural_id = natural_id.to_lowercase();
        self.families
            .iter()
            .filter(|f| f.origin == Origin::Synthetic)
            .filter(|f| f.natural_counterpart_id.as_deref() == Some(natural_id.as_str()))
            .collect()
    }

    pub fn simulants_of(&self, natural_id: &str) -> Vec<&'a Family> {
        let natural_id = natural_id.to_lowercase();
        // families are unique by id, so each one is yielded at most once
        self.families
            .iter()
            .filter(|f| f.origin.imitates())
            .filter(|f| {
                f.natural_counterpart_id.as_deref() == Some(natural_id.as_str())
                    || f.target_minerals.iter().any(|t| t.eq_ignore_ascii_case(&natural_id))
            })
            .collect()
    }

    pub fn counterparts(&self, natural_id: &str) -> Counterparts<'a> {
        Counterparts {
            synthetics: self.synthetics_of(natural_id),
            simulants: self.simulants_of(natural_id),
        }
    }

    /// The natural family a non-natural one refers to. Dangling or
    /// non-natural references resolve to `None`.
    pub fn counterpart_of(&self, id: &str) -> Option<&'a Family> {
        let family = self.family(id)?;
        let counterpart = self.family(family.natural_counterpart_id.as_deref()?)?;
        counterpart.origin.is_natural().then_some(counterpart)
    }

    pub fn by_origin(&self, origin: Origin) -> Vec<&'a Family> {
        self.families.iter().filter(|f| f.origin == origin).collect()
    }

    pub fn by_growth_method(&self, method: &str) -> Vec<&'a Family> {
        self.families
            .iter()
            .filter(|f| f.growth_method.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(method)))
            .collect()
    }

    /// All synthetics, optionally narrowed to one growth method.
    pub fn list_synthetics(&self, method: Option<&str>) -> Vec<&'a Family> {
        match method {
            Some(method) => self
                .by_growth_method(method)
                .into_iter()
                .filter(|f| f.origin == Origin::Synthetic)
                .collect(),
            None => self.by_origin(Origin::Synthetic),
        }
    }

    /// All simulants and composites, optionally narrowed to those imitating `target`.
    pub fn list_simulants(&self, target: Option<&str>) -> Vec<&'a Family> {
        match target {
            Some(target) => self.simulants_of(target),
            None => self.families.iter().filter(|f| f.origin.imitates()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(id: &str, origin: Origin, counterpart: Option<&str>, targets: &[&str]) -> Family {
        let mut f = Family::new(id, id, "trigonal");
        f.origin = origin;
        f.natural_counterpart_id = counterpart.map(str::to_string);
        f.target_minerals = targets.iter().map(|t| t.to_string()).collect();
        f
    }

    fn graph() -> Vec<Family> {
        let mut flux = family("synthetic-ruby-flux", Origin::Synthetic, Some("ruby"), &[]);
        flux.growth_method = Some("flux".into());
        let mut verneuil = family("synthetic-ruby-verneuil", Origin::Synthetic, Some("ruby"), &[]);
        verneuil.growth_method = Some("Verneuil".into());
        vec![
            family("ruby", Origin::Natural, None, &[]),
            family("diamond", Origin::Natural, None, &[]),
            flux,
            verneuil,
            family("red-glass", Origin::Simulant, Some("ruby"), &["ruby", "garnet"]),
            family("cz", Origin::Simulant, None, &["diamond"]),
            family("garnet-doublet", Origin::Composite, None, &["Ruby"]),
            family("orphan", Origin::Synthetic, Some("missing"), &[]),
        ]
    }

    fn ids(families: Vec<&Family>) -> Vec<&str> {
        families.into_iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn synthetics_and_counterpart_are_symmetric() {
        let graph = graph();
        let p = Provenance::new(&graph);
        let synthetics = p.synthetics_of("ruby");
        assert_eq!(ids(synthetics.clone()), vec!["synthetic-ruby-flux", "synthetic-ruby-verneuil"]);
        for s in synthetics {
            assert_eq!(p.counterpart_of(&s.id).map(|n| n.id.as_str()), Some("ruby"));
        }
    }

    #[test]
    fn simulants_match_either_signal_once() {
        let graph = graph();
        let p = Provenance::new(&graph);
        assert_eq!(ids(p.simulants_of("RUBY")), vec!["red-glass", "garnet-doublet"]);
        assert_eq!(ids(p.simulants_of("diamond")), vec!["cz"]);
    }

    #[test]
    fn repeated_targets_do_not_repeat_the_simulant() {
        let graph = vec![
            family("ruby", Origin::Natural, None, &[]),
            family("red-glass", Origin::Simulant, Some("ruby"), &["ruby", "RUBY", "Ruby"]),
        ];
        let p = Provenance::new(&graph);
        assert_eq!(ids(p.simulants_of("ruby")), vec!["red-glass"]);
        assert_eq!(p.counterparts("ruby").simulants.len(), 1);
    }

    #[test]
    fn unknown_or_dangling_ids_resolve_to_nothing() {
        let graph = graph();
        let p = Provenance::new(&graph);
        assert!(p.counterparts("unobtainium").is_empty());
        assert!(p.counterpart_of("orphan").is_none());
        assert!(p.counterpart_of("ruby").is_none());
        assert!(p.counterpart_of("nothing").is_none());
    }

    #[test]
    fn growth_method_filter_ignores_case() {
        let graph = graph();
        let p = Provenance::new(&graph);
        assert_eq!(ids(p.by_growth_method("verneuil")), vec!["synthetic-ruby-verneuil"]);
        assert_eq!(ids(p.list_synthetics(Some("FLUX"))), vec!["synthetic-ruby-flux"]);
        assert_eq!(p.list_synthetics(None).len(), 3);
        assert_eq!(p.list_simulants(None).len(), 3);
        assert_eq!(ids(p.by_origin(Origin::Composite)), vec!["garnet-doublet"]);
    }
}
