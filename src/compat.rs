//! The legacy flat-record projection of families and expressions.
//!
//! Older callers see one record per crystal habit, shaped like the single
//! `Mineral` table. [`flatten`] derives that record from an [`Expression`]
//! and its [`Family`]; it is recomputed on every read and never mutated on
//! its own. Fields an expression may override resolve through [`Layered`],
//! which is the only place the override-then-inherit rule lives.
//!
//! [`Presets`] and [`Categories`] are read-only, map-like snapshots over
//! flattened records for callers that used to iterate global dictionaries.

use std::collections::BTreeMap;

use crate::model::{Category, Expression, Family, FlatRecord};
use crate::range::format_range;

// ------------- Layered -------------
/// Values with no content. An empty string or list overrides nothing.
pub trait Blank {
    fn is_blank(&self) -> bool;
}
impl Blank for str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}
impl<T> Blank for [T] {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

/// Where a resolved field came from.
#[derive(Debug, PartialEq, Eq)]
pub enum Layered<'a, T: ?Sized> {
    Override(&'a T),
    Inherited(&'a T),
    Absent,
}

impl<'a, T: ?Sized + Blank> Layered<'a, T> {
    pub fn resolve(overriding: Option<&'a T>, inherited: Option<&'a T>) -> Self {
        match (overriding, inherited) {
            (Some(v), _) if !v.is_blank() => Layered::Override(v),
            (_, Some(v)) if !v.is_blank() => Layered::Inherited(v),
            _ => Layered::Absent,
        }
    }
    pub fn value(&self) -> Option<&'a T> {
        match self {
            Layered::Override(v) | Layered::Inherited(v) => Some(v),
            Layered::Absent => None,
        }
    }
    pub fn is_override(&self) -> bool {
        matches!(self, Layered::Override(_))
    }
}

impl<'a> Layered<'a, str> {
    pub fn to_owned_value(&self) -> Option<String> {
        self.value().map(str::to_string)
    }
}
impl<'a, T: Clone> Layered<'a, [T]> {
    pub fn to_vec(&self) -> Vec<T> {
        self.value().map(<[T]>::to_vec).unwrap_or_default()
    }
}

// ------------- flattening -------------
/// Display name: the family name, qualified by the habit for non-default expressions.
pub fn display_name(family: &Family, expression: &Expression) -> String {
    if expression.slug == crate::model::DEFAULT_SLUG || expression.slug == family.id {
        family.name.clone()
    } else {
        format!("{} ({})", family.name, expression.name)
    }
}

pub fn flatten(family: &Family, expression: &Expression) -> FlatRecord {
    let point_group = Layered::resolve(expression.point_group.as_deref(), family.point_group.as_deref());
    let forms = Layered::resolve(expression.forms.as_deref(), Some(&family.forms[..]));
    let description = Layered::resolve(expression.form_description.as_deref(), family.description.as_deref());
    let note = Layered::resolve(expression.note.as_deref(), family.notes.as_deref());

    FlatRecord {
        id: expression.id.clone(),
        name: display_name(family, expression),
        cdl: expression.cdl.clone(),
        system: family.crystal_system.clone(),
        point_group: point_group.to_owned_value(),
        chemistry: family.chemistry.clone(),
        hardness: format_range(family.hardness_min, family.hardness_max),
        description: description.to_owned_value(),
        localities: family.localities.clone(),
        forms: forms.to_vec(),
        sg: format_range(family.sg_min, family.sg_max),
        ri: format_range(family.ri_min, family.ri_max),
        birefringence: family.birefringence,
        optical_character: family.optical_character.clone(),
        dispersion: family.dispersion,
        lustre: family.lustre.clone(),
        cleavage: family.cleavage.clone(),
        fracture: family.fracture.clone(),
        pleochroism: family.pleochroism.clone(),
        pleochroism_detail: family.pleochroism_detail.clone(),
        colors: family.colors.clone(),
        treatments: family.treatments.clone(),
        inclusions: family.inclusions.clone(),
        twin_law: family.twin_law.clone(),
        phenomenon: family.phenomenon.clone(),
        fluorescence: family.fluorescence.clone(),
        note: note.to_owned_value(),
        hardness_min: family.hardness_min,
        hardness_max: family.hardness_max,
        ri_min: family.ri_min,
        ri_max: family.ri_max,
        sg_min: family.sg_min,
        sg_max: family.sg_max,
        heat_treatment_temp_min: family.heat_treatment_temp_min,
        heat_treatment_temp_max: family.heat_treatment_temp_max,
        category: family.category.clone(),
        mineral_group: family.mineral_group.clone(),
        origin: family.origin,
        growth_method: family.growth_method.clone(),
        natural_counterpart_id: family.natural_counterpart_id.clone(),
        target_minerals: family.target_minerals.clone(),
        manufacturer: family.manufacturer.clone(),
        year_first_produced: family.year_first_produced,
        diagnostic_synthetic_features: family.diagnostic_synthetic_features.clone(),
        family_id: Some(family.id.clone()),
        artifacts: expression.artifacts.clone(),
    }
}

// ------------- Presets -------------
/// Read-only map of flat records keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Presets {
    records: BTreeMap<String, FlatRecord>,
}

impl Presets {
    pub fn new(records: impl IntoIterator<Item = FlatRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }
    pub fn get(&self, id: &str) -> Option<&FlatRecord> {
        self.records.get(&id.to_lowercase())
    }
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(&id.to_lowercase())
    }
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
    pub fn iter(&self) -> impl Iterator<Item = &FlatRecord> {
        self.records.values()
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ------------- Categories -------------
/// Named id lists. Explicit categories shadow crystal systems of the same name.
#[derive(Debug, Clone, Default)]
pub struct Categories {
    named: BTreeMap<String, Vec<String>>,
    systems: BTreeMap<String, Vec<String>>,
}

impl Categories {
    pub fn new(named: impl IntoIterator<Item = Category>, presets: &Presets) -> Self {
        let mut systems: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in presets.iter() {
            systems
                .entry(record.system.to_lowercase())
                .or_default()
                .push(record.id.clone());
        }
        Self {
            named: named.into_iter().map(|c| (c.name.to_lowercase(), c.ids)).collect(),
            systems,
        }
    }
    pub fn get(&self, name: &str) -> Option<&[String]> {
        let name = name.to_lowercase();
        self.named
            .get(&name)
            .or_else(|| self.systems.get(&name))
            .map(Vec::as_slice)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
    /// Every resolvable name with its ids, named categories first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        let shadowed = |name: &String| self.named.contains_key(name);
        self.named
            .iter()
            .chain(self.systems.iter().filter(move |(name, _)| !shadowed(name)))
            .map(|(name, ids)| (name.as_str(), ids.as_slice()))
    }
    pub fn len(&self) -> usize {
        self.iter().count()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
