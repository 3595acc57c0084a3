//! The insert contract used by the offline build.
//!
//! A [`Batch`] carries family documents (a family with its expressions),
//! standalone legacy records and named categories. The whole batch is
//! validated before anything is written; structural problems abort it with
//! [`CatalogError::Ingestion`]. Missing or malformed property values are not
//! structural and simply end up absent.
//!
//! Every family expression is also flattened into the legacy table so that
//! callers reading flat rows (and the search index) see the same records as
//! the compatibility view.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::compat::flatten;
use crate::error::{CatalogError, Result};
use crate::model::{Category, CutShapeFactor, Expression, Family, FlatRecord, Threshold, VolumeShapeFactor, DEFAULT_SLUG};
use crate::persist::Persistor;
use crate::provenance::IdHasher;
use crate::range::{parse_range, parse_range_text, NumericRange, PropertyValue};

// ------------- Seed data -------------
pub const CUT_SHAPE_FACTORS: &[(&str, &str, f64, &str)] = &[
    ("round-brilliant", "Round Brilliant", 0.0061, "Standard round brilliant"),
    ("oval", "Oval", 0.0062, "Oval brilliant"),
    ("pear", "Pear", 0.0059, "Pear or teardrop"),
    ("marquise", "Marquise", 0.0058, "Navette"),
    ("emerald-cut", "Emerald Cut", 0.0083, "Step-cut rectangle with cut corners"),
    ("cushion", "Cushion", 0.0080, "Rounded square or rectangle"),
    ("princess", "Princess", 0.0083, "Square modified brilliant"),
    ("heart", "Heart", 0.0059, "Heart-shaped brilliant"),
    ("radiant", "Radiant", 0.0081, "Rectangular modified brilliant"),
];

pub const VOLUME_SHAPE_FACTORS: &[(&str, &str, f64)] = &[
    ("sphere", "Sphere", 0.5236),
    ("cube", "Cube", 1.0),
    ("irregular", "Irregular", 0.65),
];

pub const THRESHOLDS: &[(&str, &str, Option<f64>, Option<f64>, &str)] = &[
    ("birefringence", "none", None, Some(0.0001), "Isotropic or nearly so"),
    ("birefringence", "low", Some(0.0001), Some(0.010), "Weak doubling"),
    ("birefringence", "medium", Some(0.010), Some(0.030), "Doubling visible with a loupe"),
    ("birefringence", "high", Some(0.030), Some(0.100), "Strong doubling"),
    ("birefringence", "very_high", Some(0.100), None, "Extreme doubling"),
    ("dispersion", "low", None, Some(0.020), "Little fire"),
    ("dispersion", "moderate", Some(0.020), Some(0.030), "Some fire"),
    ("dispersion", "high", Some(0.030), Some(0.040), "Strong fire"),
    ("dispersion", "very_high", Some(0.040), None, "Exceptional fire"),
    ("critical_angle", "very_small", None, Some(25.0), "High refractive index"),
    ("critical_angle", "small", Some(25.0), Some(35.0), "Good brilliance"),
    ("critical_angle", "moderate", Some(35.0), Some(45.0), "Average brilliance"),
    ("critical_angle", "large", Some(45.0), None, "Low refractive index"),
];

/// Inserts the reference rows that are missing. Returns how many were added.
pub fn seed_reference_data(persistor: &Persistor) -> Result<usize> {
    let mut added = 0;
    for (id, name, factor, description) in CUT_SHAPE_FACTORS {
        let existed = persistor.persist_cut_shape_factor(&CutShapeFactor {
            id: id.to_string(),
            name: name.to_string(),
            factor: *factor,
            description: Some(description.to_string()),
        })?;
        added += usize::from(!existed);
    }
    for (id, name, factor) in VOLUME_SHAPE_FACTORS {
        let existed = persistor.persist_volume_shape_factor(&VolumeShapeFactor {
            id: id.to_string(),
            name: name.to_string(),
            factor: *factor,
        })?;
        added += usize::from(!existed);
    }
    for (category, level, min, max, description) in THRESHOLDS {
        let existed = persistor.persist_threshold(&Threshold {
            category: category.to_string(),
            level: level.to_string(),
            min: *min,
            max: *max,
            description: Some(description.to_string()),
        })?;
        added += usize::from(!existed);
    }
    if added > 0 {
        debug!(added, "seeded reference data");
    }
    Ok(added)
}

// ------------- Documents -------------
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpressionDocument {
    #[serde(default = "default_slug")]
    pub slug: String,
    pub name: Option<String>,
    #[serde(default)]
    pub cdl: String,
    pub point_group: Option<String>,
    pub form_description: Option<String>,
    pub habit: Option<String>,
    pub forms: Option<Vec<String>>,
    #[serde(default)]
    pub is_primary: bool,
    pub sort_order: Option<i64>,
    pub note: Option<String>,
}

fn default_slug() -> String {
    DEFAULT_SLUG.to_string()
}

/// A family with its expressions. Ranges may be given as `hardness`, `sg`
/// and `ri` values (number or `"a-b"` text) or as explicit bounds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FamilyDocument {
    #[serde(flatten)]
    pub family: Family,
    pub hardness: Option<PropertyValue>,
    pub sg: Option<PropertyValue>,
    pub ri: Option<PropertyValue>,
    #[serde(default)]
    pub expressions: Vec<ExpressionDocument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub families: Vec<FamilyDocument>,
    #[serde(default)]
    pub legacy: Vec<FlatRecord>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Batch {
    /// Accepts a batch object, an array of family documents or a single one.
    pub fn from_json(text: &str) -> Result<Batch> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CatalogError::ingestion("<input>", e.to_string()))?;
        let batch = match value {
            Value::Array(_) => Batch {
                families: serde_json::from_value(value)
                    .map_err(|e| CatalogError::ingestion("<input>", e.to_string()))?,
                ..Default::default()
            },
            Value::Object(ref map)
                if map.contains_key("families") || map.contains_key("legacy") || map.contains_key("categories") =>
            {
                serde_json::from_value(value).map_err(|e| CatalogError::ingestion("<input>", e.to_string()))?
            }
            other => Batch {
                families: vec![
                    serde_json::from_value(other).map_err(|e| CatalogError::ingestion("<input>", e.to_string()))?,
                ],
                ..Default::default()
            },
        };
        Ok(batch)
    }
    pub fn is_empty(&self) -> bool {
        self.families.is_empty() && self.legacy.is_empty() && self.categories.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub families: usize,
    pub expressions: usize,
    pub legacy_records: usize,
    pub categories: usize,
}

// ------------- Normalization -------------
fn bounds(value: Option<&PropertyValue>, min: Option<f64>, max: Option<f64>) -> (Option<f64>, Option<f64>) {
    match NumericRange::from_bounds(min, max).or_else(|| parse_range(value)) {
        Some(range) => (Some(range.min), Some(range.max)),
        None => (None, None),
    }
}

/// Title case of a slug: `cleavage-octahedron` becomes `Cleavage-Octahedron`.
fn title_case(slug: &str) -> String {
    let mut titled = String::with_capacity(slug.len());
    let mut boundary = true;
    for c in slug.chars() {
        if c.is_alphabetic() {
            if boundary {
                titled.extend(c.to_uppercase());
            } else {
                titled.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            titled.push(c);
            boundary = true;
        }
    }
    titled
}

fn normalize_family(document: &FamilyDocument) -> Family {
    let mut family = document.family.clone();
    family.id = family.id.trim().to_lowercase();
    family.crystal_system = family.crystal_system.trim().to_lowercase();
    (family.hardness_min, family.hardness_max) =
        bounds(document.hardness.as_ref(), family.hardness_min, family.hardness_max);
    (family.sg_min, family.sg_max) = bounds(document.sg.as_ref(), family.sg_min, family.sg_max);
    (family.ri_min, family.ri_max) = bounds(document.ri.as_ref(), family.ri_min, family.ri_max);
    if let Some(counterpart) = family.natural_counterpart_id.as_mut() {
        *counterpart = counterpart.to_lowercase();
    }
    family
}

fn normalize_expression(family: &Family, index: usize, document: &ExpressionDocument) -> Expression {
    let slug = document.slug.trim().to_lowercase();
    let sort_order = match document.sort_order {
        Some(order) if order != 0 => order,
        _ if !document.is_primary => index as i64,
        _ => 0,
    };
    Expression {
        id: Expression::compose_id(&family.id, &slug),
        family_id: family.id.clone(),
        name: document.name.clone().unwrap_or_else(|| title_case(&slug)),
        cdl: document.cdl.trim().to_string(),
        point_group: document.point_group.clone(),
        form_description: document.form_description.clone(),
        habit: document.habit.clone(),
        forms: document.forms.clone(),
        is_primary: document.is_primary,
        sort_order,
        note: document.note.clone(),
        slug,
        artifacts: Default::default(),
    }
}

/// Legacy rows get their numeric bounds from the textual ranges when absent.
fn normalize_legacy(record: &FlatRecord) -> FlatRecord {
    let mut record = record.clone();
    record.id = record.id.trim().to_lowercase();
    record.system = record.system.trim().to_lowercase();
    record.family_id = None;
    let text_range = |text: &Option<String>| text.as_deref().and_then(parse_range_text);
    if NumericRange::from_bounds(record.ri_min, record.ri_max).is_none() {
        let range = text_range(&record.ri);
        (record.ri_min, record.ri_max) = (range.map(|r| r.min), range.map(|r| r.max));
    }
    if NumericRange::from_bounds(record.sg_min, record.sg_max).is_none() {
        let range = text_range(&record.sg);
        (record.sg_min, record.sg_max) = (range.map(|r| r.min), range.map(|r| r.max));
    }
    record
}

// ------------- Validation -------------
fn validate_family(family: &Family, expressions: &[Expression]) -> Result<()> {
    if family.id.is_empty() {
        return Err(CatalogError::ingestion("<family>", "family without id"));
    }
    if family.name.trim().is_empty() {
        return Err(CatalogError::ingestion(&family.id, "family without name"));
    }
    if family.crystal_system.is_empty() {
        return Err(CatalogError::ingestion(&family.id, "family without crystal system"));
    }
    if family.origin.is_natural() && family.natural_counterpart_id.is_some() {
        return Err(CatalogError::ingestion(
            &family.id,
            "a natural family cannot have a natural counterpart",
        ));
    }
    if expressions.iter().filter(|e| e.is_primary).count() > 1 {
        return Err(CatalogError::ingestion(&family.id, "more than one primary expression"));
    }
    for expression in expressions {
        if expression.cdl.is_empty() && !family.allows_empty_cdl() {
            return Err(CatalogError::ingestion(&expression.id, "expression without cdl"));
        }
    }
    Ok(())
}

// ------------- Ingestion -------------
#[derive(Debug)]
struct Prepared {
    families: Vec<(Family, Vec<Expression>)>,
    legacy: Vec<FlatRecord>,
    categories: Vec<Category>,
}

fn prepare(batch: &Batch) -> Result<Prepared> {
    let mut family_ids: HashSet<String, IdHasher> = HashSet::default();
    let mut record_ids: HashSet<String, IdHasher> = HashSet::default();
    let mut families = Vec::with_capacity(batch.families.len());
    for document in &batch.families {
        let family = normalize_family(document);
        let expressions: Vec<Expression> = document
            .expressions
            .iter()
            .enumerate()
            .map(|(i, e)| normalize_expression(&family, i, e))
            .collect();
        validate_family(&family, &expressions)?;
        if !family_ids.insert(family.id.clone()) {
            return Err(CatalogError::ingestion(&family.id, "duplicate family id"));
        }
        for expression in &expressions {
            if !record_ids.insert(expression.id.clone()) {
                return Err(CatalogError::ingestion(&expression.id, "duplicate expression id"));
            }
        }
        families.push((family, expressions));
    }
    let mut legacy = Vec::with_capacity(batch.legacy.len());
    for record in batch.legacy.iter().map(normalize_legacy) {
        if record.id.is_empty() {
            return Err(CatalogError::ingestion("<legacy>", "record without id"));
        }
        if !record_ids.insert(record.id.clone()) {
            return Err(CatalogError::ingestion(&record.id, "duplicate record id"));
        }
        legacy.push(record);
    }
    let categories = batch
        .categories
        .iter()
        .map(|c| Category {
            name: c.name.trim().to_lowercase(),
            ids: c.ids.iter().map(|id| id.to_lowercase()).collect(),
        })
        .collect();
    Ok(Prepared { families, legacy, categories })
}

/// Writes a validated batch. The caller owns the transaction, so a failure
/// anywhere leaves the store untouched.
pub fn ingest(persistor: &Persistor, batch: &Batch) -> Result<IngestReport> {
    let prepared = prepare(batch)?;
    seed_reference_data(persistor)?;
    let mut report = IngestReport::default();
    for (family, expressions) in &prepared.families {
        let existing = persistor.persist_family(family)?;
        let keep: Vec<&str> = expressions.iter().map(|e| e.id.as_str()).collect();
        let removed = persistor.retain_expressions(&family.id, &keep)?;
        debug!(family = %family.id, existing, expressions = expressions.len(), removed, "family");
        for expression in expressions {
            persistor.persist_expression(expression)?;
            persistor.persist_flat_record(&flatten(family, expression))?;
            report.expressions += 1;
        }
        report.families += 1;
    }
    for record in &prepared.legacy {
        persistor.persist_flat_record(record)?;
        report.legacy_records += 1;
    }
    for category in &prepared.categories {
        persistor.persist_category(category)?;
        report.categories += 1;
    }
    info!(
        families = report.families,
        expressions = report.expressions,
        legacy_records = report.legacy_records,
        categories = report.categories,
        "ingested batch"
    );
    Ok(report)
}
