//! Entity types of the catalog.
//!
//! * [`Family`] – a mineral species (or synthetic/simulant group) holding the
//!   gemmological properties shared by all of its crystal habits.
//! * [`Expression`] – one crystal-morphology variant of a family, carrying the
//!   opaque CDL notation and the generated model artifacts.
//! * [`FlatRecord`] – the legacy single-table shape. It is either produced by
//!   the compatibility view or read from a standalone legacy row.
//! * Reference rows: [`CutShapeFactor`], [`VolumeShapeFactor`], [`Threshold`].
//!
//! The module also owns the property vocabulary used by display callers:
//! [`INFO_GROUPS`], [`PROPERTY_LABELS`] and [`format_property_value`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CatalogError, Result};
use crate::range::{range_text, NumericRange};

// ------------- Origin -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Natural,
    Synthetic,
    Simulant,
    Composite,
}

impl Origin {
    pub const ALL: [Origin; 4] = [Origin::Natural, Origin::Synthetic, Origin::Simulant, Origin::Composite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Natural => "natural",
            Origin::Synthetic => "synthetic",
            Origin::Simulant => "simulant",
            Origin::Composite => "composite",
        }
    }
    pub fn is_natural(&self) -> bool {
        *self == Origin::Natural
    }
    /// Simulants and composites imitate a natural stone without sharing its chemistry.
    pub fn imitates(&self) -> bool {
        matches!(self, Origin::Simulant | Origin::Composite)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Origin {
    type Err = CatalogError;
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Origin::ALL
            .into_iter()
            .find(|o| o.as_str() == wanted)
            .ok_or_else(|| CatalogError::InvalidArgument(format!("unknown origin '{s}'")))
    }
}

// ------------- Pleochroism -------------
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pleochroism {
    #[serde(rename = "pleochroism_strength", default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<String>,
    #[serde(rename = "pleochroism_color1", default, skip_serializing_if = "Option::is_none")]
    pub color1: Option<String>,
    #[serde(rename = "pleochroism_color2", default, skip_serializing_if = "Option::is_none")]
    pub color2: Option<String>,
    #[serde(rename = "pleochroism_color3", default, skip_serializing_if = "Option::is_none")]
    pub color3: Option<String>,
    #[serde(rename = "pleochroism_notes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Pleochroism {
    /// Dichroic stones show two colors, trichroic ones three.
    pub fn colors(&self) -> Vec<&str> {
        [&self.color1, &self.color2, &self.color3]
            .into_iter()
            .filter_map(|c| c.as_deref())
            .collect()
    }
    pub fn is_empty(&self) -> bool {
        self.strength.is_none() && self.notes.is_none() && self.colors().is_empty()
    }
}

// ------------- ModelArtifacts -------------
/// Output of the external geometry toolchain, stored verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelArtifacts {
    pub svg: Option<String>,
    pub stl: Option<Vec<u8>>,
    pub gltf: Option<String>,
    pub generated_at: Option<String>,
}

impl ModelArtifacts {
    /// The stamp must be RFC 3339; it is kept exactly as given.
    pub fn new(
        svg: Option<String>,
        stl: Option<Vec<u8>>,
        gltf: Option<String>,
        generated_at: &str,
    ) -> Result<Self> {
        DateTime::parse_from_rfc3339(generated_at).map_err(|e| {
            CatalogError::InvalidArgument(format!("generation timestamp '{generated_at}': {e}"))
        })?;
        Ok(Self {
            svg,
            stl,
            gltf,
            generated_at: Some(generated_at.to_string()),
        })
    }
    pub fn generated_now(svg: Option<String>, stl: Option<Vec<u8>>, gltf: Option<String>) -> Self {
        Self {
            svg,
            stl,
            gltf,
            generated_at: Some(Utc::now().to_rfc3339()),
        }
    }
    pub fn is_generated(&self) -> bool {
        self.generated_at.is_some()
    }
    pub fn generated_at_utc(&self) -> Option<DateTime<Utc>> {
        self.generated_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    }
}

// ------------- Family -------------
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub id: String,
    pub name: String,
    #[serde(alias = "system")]
    pub crystal_system: String,
    pub point_group: Option<String>,
    pub chemistry: Option<String>,
    pub category: Option<String>,
    pub mineral_group: Option<String>,
    // physical ranges
    pub hardness_min: Option<f64>,
    pub hardness_max: Option<f64>,
    pub sg_min: Option<f64>,
    pub sg_max: Option<f64>,
    pub ri_min: Option<f64>,
    pub ri_max: Option<f64>,
    // optics
    pub birefringence: Option<f64>,
    pub dispersion: Option<f64>,
    pub optical_character: Option<String>,
    pub pleochroism: Option<String>,
    #[serde(flatten)]
    pub pleochroism_detail: Pleochroism,
    // descriptive
    pub lustre: Option<String>,
    pub cleavage: Option<String>,
    pub fracture: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub diagnostic_features: Option<String>,
    pub common_inclusions: Option<String>,
    #[serde(default)]
    pub localities: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub treatments: Vec<String>,
    #[serde(default)]
    pub inclusions: Vec<String>,
    #[serde(default)]
    pub forms: Vec<String>,
    pub heat_treatment_temp_min: Option<f64>,
    pub heat_treatment_temp_max: Option<f64>,
    pub twin_law: Option<String>,
    pub phenomenon: Option<String>,
    pub fluorescence: Option<String>,
    // provenance
    #[serde(default)]
    pub origin: Origin,
    pub growth_method: Option<String>,
    pub natural_counterpart_id: Option<String>,
    #[serde(default)]
    pub target_minerals: Vec<String>,
    pub manufacturer: Option<String>,
    pub year_first_produced: Option<i32>,
    pub diagnostic_synthetic_features: Option<String>,
}

impl Family {
    pub fn new(id: &str, name: &str, crystal_system: &str) -> Self {
        Self {
            id: id.to_lowercase(),
            name: name.to_string(),
            crystal_system: crystal_system.to_lowercase(),
            ..Default::default()
        }
    }
    pub fn hardness(&self) -> Option<NumericRange> {
        NumericRange::from_bounds(self.hardness_min, self.hardness_max)
    }
    pub fn sg(&self) -> Option<NumericRange> {
        NumericRange::from_bounds(self.sg_min, self.sg_max)
    }
    pub fn ri(&self) -> Option<NumericRange> {
        NumericRange::from_bounds(self.ri_min, self.ri_max)
    }
    pub fn is_amorphous(&self) -> bool {
        self.crystal_system.eq_ignore_ascii_case("amorphous")
    }
    /// Expressions without CDL are legitimate for amorphous materials and for
    /// simulants or composites that have no crystal habit of their own.
    pub fn allows_empty_cdl(&self) -> bool {
        self.is_amorphous() || self.origin.imitates()
    }
}

// ------------- Expression -------------
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub id: String,
    pub family_id: String,
    pub name: String,
    pub slug: String,
    pub cdl: String,
    pub point_group: Option<String>,
    pub form_description: Option<String>,
    pub habit: Option<String>,
    pub forms: Option<Vec<String>>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub sort_order: i64,
    pub note: Option<String>,
    #[serde(skip)]
    pub artifacts: ModelArtifacts,
}

pub const DEFAULT_SLUG: &str = "default";

impl Expression {
    /// `{family_id}-{slug}`, or the bare family id for the default slug.
    pub fn compose_id(family_id: &str, slug: &str) -> String {
        if slug == DEFAULT_SLUG {
            family_id.to_lowercase()
        } else {
            format!("{}-{}", family_id, slug).to_lowercase()
        }
    }
    pub fn is_default(&self) -> bool {
        self.slug == DEFAULT_SLUG || self.slug == self.family_id
    }
}

// ------------- FlatRecord -------------
/// The legacy single-table mineral shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub id: String,
    pub name: String,
    pub cdl: String,
    pub system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chemistry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "range_text")]
    pub hardness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub localities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "range_text")]
    pub sg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "range_text")]
    pub ri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birefringence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optical_character: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispersion: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lustre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleavage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fracture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pleochroism: Option<String>,
    #[serde(flatten)]
    pub pleochroism_detail: Pleochroism,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub treatments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inclusions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twin_law: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phenomenon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fluorescence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardness_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardness_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ri_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ri_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sg_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sg_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heat_treatment_temp_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heat_treatment_temp_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mineral_group: Option<String>,
    #[serde(default)]
    pub origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natural_counterpart_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_minerals: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_first_produced: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_synthetic_features: Option<String>,
    /// Owning family; `None` for standalone legacy rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(skip)]
    pub artifacts: ModelArtifacts,
}

impl FlatRecord {
    pub fn hardness_range(&self) -> Option<NumericRange> {
        NumericRange::from_bounds(self.hardness_min, self.hardness_max)
    }
    pub fn has_form(&self, form: &str) -> bool {
        self.forms.iter().any(|f| f.eq_ignore_ascii_case(form))
    }
    /// Dictionary form, omitting absent scalars and empty lists.
    pub fn to_map(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

// ------------- Reference rows -------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutShapeFactor {
    pub id: String,
    pub name: String,
    pub factor: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeShapeFactor {
    pub id: String,
    pub name: String,
    pub factor: f64,
}

/// One half-open interval `[min, max)` of a classification; `None` bounds are infinite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub category: String,
    pub level: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: Option<String>,
}

impl Threshold {
    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value < max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub ids: Vec<String>,
}

// ------------- Property vocabulary -------------
/// Named property sets projected for a display context.
pub const INFO_GROUPS: &[(&str, &[&str])] = &[
    ("basic", &["name", "chemistry", "system", "hardness"]),
    ("physical", &["sg", "cleavage", "fracture", "lustre"]),
    ("optical", &["ri", "birefringence", "optical_character", "dispersion", "pleochroism"]),
    ("gemological", &["colors", "treatments", "localities", "inclusions"]),
    ("crystal", &["point_group", "forms", "description"]),
    ("full", &["name", "chemistry", "system", "hardness", "sg", "ri", "optical_character", "cleavage"]),
    ("fga", &["name", "ri", "sg", "hardness", "optical_character", "birefringence", "cleavage", "pleochroism"]),
    ("classification", &["category", "mineral_group", "origin"]),
    (
        "synthetic",
        &[
            "name",
            "origin",
            "growth_method",
            "natural_counterpart_id",
            "manufacturer",
            "year_first_produced",
            "diagnostic_synthetic_features",
        ],
    ),
];

pub fn info_group(name: &str) -> Option<&'static [&'static str]> {
    INFO_GROUPS.iter().find(|(group, _)| *group == name).map(|(_, keys)| *keys)
}

pub const PROPERTY_LABELS: &[(&str, &str)] = &[
    ("name", "Name"),
    ("chemistry", "Formula"),
    ("system", "System"),
    ("hardness", "Hardness"),
    ("sg", "SG"),
    ("ri", "RI"),
    ("birefringence", "Biref."),
    ("optical_character", "Optical"),
    ("dispersion", "Dispersion"),
    ("pleochroism", "Pleochroism"),
    ("cleavage", "Cleavage"),
    ("fracture", "Fracture"),
    ("lustre", "Lustre"),
    ("colors", "Colors"),
    ("treatments", "Treatments"),
    ("localities", "Localities"),
    ("inclusions", "Inclusions"),
    ("point_group", "Point Group"),
    ("forms", "Forms"),
    ("description", "Habit"),
    ("ri_min", "RI Min"),
    ("ri_max", "RI Max"),
    ("sg_min", "SG Min"),
    ("sg_max", "SG Max"),
    ("heat_treatment_temp_min", "Heat Treat Min (°C)"),
    ("heat_treatment_temp_max", "Heat Treat Max (°C)"),
    ("origin", "Origin"),
    ("mineral_group", "Mineral Group"),
    ("growth_method", "Growth Method"),
    ("natural_counterpart_id", "Natural Counterpart"),
    ("target_minerals", "Target Minerals"),
    ("manufacturer", "Manufacturer"),
    ("year_first_produced", "Year First Produced"),
    ("diagnostic_synthetic_features", "Diagnostic Features (Synthetic)"),
];

/// Display label for a property key; unknown keys are title-cased.
pub fn property_label(key: &str) -> String {
    if let Some((_, label)) = PROPERTY_LABELS.iter().find(|(k, _)| *k == key) {
        return label.to_string();
    }
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Formats a property value for an info panel.
pub fn format_property_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Array(items) => {
            let shown: Vec<String> = items.iter().take(3).map(format_property_value).collect();
            if items.len() > 3 {
                shown.join(", ") + "..."
            } else {
                shown.join(", ")
            }
        }
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => {
                let fixed = format!("{:.3}", f);
                fixed.trim_end_matches('0').trim_end_matches('.').to_string()
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
