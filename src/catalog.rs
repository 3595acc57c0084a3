//! The query façade.
//!
//! [`Catalog`] owns the store location and is the only entry point callers
//! need. Reads go through the compatibility view, so a record is the same
//! whether it is reached by id, by search, by category or by property
//! lookup. Writes (ingestion and artifact updates) each run in a single
//! transaction.
//!
//! Not-found is never an error: lookups return `None`, listings return an
//! empty `Vec` and [`Catalog::info`] an empty panel. `Err` is reserved for
//! store failures, corrupt rows and malformed arguments.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::compat::{flatten, Categories, Presets};
use crate::error::{CatalogError, Result};
use crate::ingest::{self, Batch, IngestReport};
use crate::matcher::{find_by_property, PropertyKind};
use crate::model::{
    format_property_value, info_group, property_label, CutShapeFactor, Expression, Family, FlatRecord,
    ModelArtifacts, Origin, Threshold, VolumeShapeFactor,
};
use crate::persist::Persistor;
use crate::provenance::{IdHasher, Provenance};
use crate::range::parse_range_text;
use crate::threshold::{check_category_name, ThresholdTable};

lazy_static! {
    static ref SEARCH_TOKEN: Regex = Regex::new(r"[\p{L}\p{N}]+").unwrap();
}

// ------------- PersistenceMode -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    /// One private connection kept for the lifetime of the catalog.
    InMemory,
    /// A database file; every operation opens its own connection.
    File(PathBuf),
}

enum Store {
    Memory(Mutex<Connection>),
    File(PathBuf),
}

// ------------- Query helpers -------------
/// Criteria for [`Catalog::filter`]. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub system: Option<String>,
    pub min_hardness: Option<f64>,
    pub max_hardness: Option<f64>,
    pub has_twin: bool,
}

impl Filter {
    pub fn system(mut self, system: &str) -> Self {
        self.system = Some(system.to_lowercase());
        self
    }
    pub fn hardness(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_hardness = min;
        self.max_hardness = max;
        self
    }
    pub fn twinned(mut self) -> Self {
        self.has_twin = true;
        self
    }
    /// Hardness compares the lower bound only; unknown hardness passes.
    fn accepts(&self, record: &FlatRecord) -> bool {
        if let Some(system) = &self.system {
            if !record.system.eq_ignore_ascii_case(system) {
                return false;
            }
        }
        let lower = record
            .hardness_min
            .or_else(|| record.hardness.as_deref().and_then(parse_range_text).map(|r| r.min));
        if let Some(hardness) = lower {
            if self.min_hardness.is_some_and(|min| hardness < min) {
                return false;
            }
            if self.max_hardness.is_some_and(|max| hardness > max) {
                return false;
            }
        }
        !self.has_twin || record.twin_law.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Selected properties of one record, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InfoPanel {
    pub entries: Vec<(String, Value)>,
}

impl InfoPanel {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }
    /// `(label, display value)` pairs for an info panel.
    pub fn labelled(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| (property_label(k), format_property_value(v)))
            .collect()
    }
}

/// Referential problems found by [`Catalog::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// `(expression id, missing family id)`
    pub orphaned_expressions: Vec<(String, String)>,
    /// `(family id, missing counterpart id)`
    pub missing_counterparts: Vec<(String, String)>,
    /// `(family id, counterpart id)` where the counterpart is not natural.
    pub non_natural_counterparts: Vec<(String, String)>,
    /// Families with more than one primary expression.
    pub multiple_primaries: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_expressions.is_empty()
            && self.missing_counterparts.is_empty()
            && self.non_natural_counterparts.is_empty()
            && self.multiple_primaries.is_empty()
    }
}

// ------------- Catalog -------------
pub struct Catalog {
    store: Store,
    ri_tolerance: f64,
    sg_tolerance: f64,
}

impl Catalog {
    /// Opens (creating or migrating as needed) the store and seeds reference data.
    pub fn open(mode: PersistenceMode) -> Result<Catalog> {
        let store = match mode {
            PersistenceMode::InMemory => Store::Memory(Mutex::new(Connection::open_in_memory()?)),
            PersistenceMode::File(path) => Store::File(path),
        };
        let catalog = Catalog {
            store,
            ri_tolerance: PropertyKind::RefractiveIndex.default_tolerance(),
            sg_tolerance: PropertyKind::SpecificGravity.default_tolerance(),
        };
        catalog.write(|persistor| {
            persistor.init_schema()?;
            ingest::seed_reference_data(persistor)
        })?;
        match &catalog.store {
            Store::Memory(_) => info!("opened in-memory catalog"),
            Store::File(path) => info!(path = %path.display(), "opened catalog"),
        }
        Ok(catalog)
    }

    pub fn in_memory() -> Result<Catalog> {
        Catalog::open(PersistenceMode::InMemory)
    }

    /// Overrides the default lookup tolerances.
    pub fn with_tolerances(mut self, ri_tolerance: f64, sg_tolerance: f64) -> Catalog {
        self.ri_tolerance = ri_tolerance;
        self.sg_tolerance = sg_tolerance;
        self
    }

    pub fn tolerance(&self, kind: PropertyKind) -> f64 {
        match kind {
            PropertyKind::RefractiveIndex => self.ri_tolerance,
            PropertyKind::SpecificGravity => self.sg_tolerance,
        }
    }

    // ------------- connection handling -------------
    fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        match &self.store {
            Store::Memory(connection) => {
                let mut guard = connection.lock().map_err(|e| CatalogError::Lock(e.to_string()))?;
                f(&mut guard)
            }
            Store::File(path) => {
                let mut connection = Connection::open(path)?;
                f(&mut connection)
            }
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Persistor) -> Result<T>) -> Result<T> {
        self.with_connection(|connection| f(&Persistor::new(connection)))
    }

    /// Runs `f` in one transaction, committed only if it succeeds.
    fn write<T>(&self, f: impl FnOnce(&Persistor) -> Result<T>) -> Result<T> {
        self.with_connection(|connection| {
            let transaction = connection.transaction()?;
            let result = f(&Persistor::new(&transaction))?;
            transaction.commit()?;
            Ok(result)
        })
    }

    // ------------- records -------------
    fn all_records(persistor: &Persistor) -> Result<Vec<FlatRecord>> {
        let families: HashMap<String, Family, IdHasher> =
            persistor.all_families()?.into_iter().map(|f| (f.id.clone(), f)).collect();
        let mut records: Vec<FlatRecord> = persistor
            .all_expressions()?
            .iter()
            .filter_map(|e| families.get(&e.family_id).map(|f| flatten(f, e)))
            .collect();
        records.extend(persistor.standalone_flat_records()?);
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn record(persistor: &Persistor, id: &str) -> Result<Option<FlatRecord>> {
        if let Some(expression) = persistor.expression(id)? {
            if let Some(family) = persistor.family(&expression.family_id)? {
                return Ok(Some(flatten(&family, &expression)));
            }
        }
        persistor.flat_record(id)
    }

    /// The flat record for an expression id or a standalone legacy id.
    pub fn get(&self, id: &str) -> Result<Option<FlatRecord>> {
        let id = id.trim().to_lowercase();
        self.read(|p| Catalog::record(p, &id))
    }

    pub fn records(&self) -> Result<Vec<FlatRecord>> {
        self.read(Catalog::all_records)
    }

    pub fn presets(&self) -> Result<Presets> {
        Ok(Presets::new(self.records()?))
    }

    pub fn categories(&self) -> Result<Categories> {
        self.read(|p| {
            let presets = Presets::new(Catalog::all_records(p)?);
            Ok(Categories::new(p.categories()?, &presets))
        })
    }

    pub fn category_names(&self) -> Result<Vec<String>> {
        self.read(|p| Ok(p.categories()?.into_iter().map(|c| c.name).collect()))
    }

    /// All ids, or those of a named category, or those of a crystal system.
    pub fn list(&self, category: Option<&str>) -> Result<Vec<String>> {
        let records = self.records()?;
        let Some(category) = category.map(|c| c.trim().to_lowercase()) else {
            return Ok(records.into_iter().map(|r| r.id).collect());
        };
        if let Some(ids) = self.read(|p| p.category(&category))? {
            if !ids.is_empty() {
                return Ok(ids);
            }
        }
        Ok(records
            .into_iter()
            .filter(|r| r.system == category)
            .map(|r| r.id)
            .collect())
    }

    pub fn systems(&self) -> Result<Vec<String>> {
        let systems: BTreeSet<String> = self
            .records()?
            .into_iter()
            .map(|r| r.system)
            .filter(|s| !s.is_empty())
            .collect();
        Ok(systems.into_iter().collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    // ------------- families -------------
    pub fn get_family(&self, id: &str) -> Result<Option<Family>> {
        let id = id.trim().to_lowercase();
        self.read(|p| p.family(&id))
    }

    pub fn families(&self) -> Result<Vec<Family>> {
        self.read(|p| p.all_families())
    }

    /// Expressions of a family in display order.
    pub fn expressions_of(&self, family_id: &str) -> Result<Vec<Expression>> {
        let family_id = family_id.trim().to_lowercase();
        self.read(|p| p.expressions_of(&family_id))
    }

    /// The flagged primary expression, else the first in display order.
    pub fn primary_expression(&self, family_id: &str) -> Result<Option<Expression>> {
        Ok(self.expressions_of(family_id)?.into_iter().next())
    }

    pub fn families_by_group(&self, group: &str) -> Result<Vec<Family>> {
        let group = group.trim();
        Ok(self
            .families()?
            .into_iter()
            .filter(|f| f.mineral_group.as_deref().is_some_and(|g| g.eq_ignore_ascii_case(group)))
            .collect())
    }

    /// Records with a known heat-treatment temperature range.
    pub fn heat_treatable(&self) -> Result<Vec<FlatRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.heat_treatment_temp_min.is_some() || r.heat_treatment_temp_max.is_some())
            .collect())
    }

    // ------------- search -------------
    /// Full-text search with a substring fallback. Returns ids, best first.
    pub fn search(&self, query: &str) -> Result<Vec<String>> {
        let needle = query.trim().to_lowercase();
        let tokens: Vec<&str> = SEARCH_TOKEN.find_iter(&needle).map(|m| m.as_str()).collect();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        if !tokens.is_empty() {
            let expression = tokens
                .iter()
                .map(|t| format!("\"{t}\"*"))
                .collect::<Vec<_>>()
                .join(" ");
            let found = self.read(|p| {
                if !p.search_available()? {
                    return Ok(Vec::new());
                }
                p.full_text_search(&expression)
            });
            match found {
                Ok(ids) if !ids.is_empty() => {
                    let mut seen: HashSet<String, IdHasher> = HashSet::default();
                    return Ok(ids.into_iter().filter(|id| seen.insert(id.clone())).collect());
                }
                Ok(_) => debug!(query = %needle, "no full-text hits, scanning"),
                Err(e) => warn!(query = %needle, error = %e, "full-text search failed, scanning"),
            }
        }
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| substring_match(r, &needle))
            .map(|r| r.id)
            .collect())
    }

    pub fn filter(&self, filter: &Filter) -> Result<Vec<String>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| filter.accepts(r))
            .map(|r| r.id)
            .collect())
    }

    pub fn by_form(&self, form: &str) -> Result<Vec<String>> {
        let form = form.trim();
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.has_form(form))
            .map(|r| r.id)
            .collect())
    }

    /// Properties named by an info group, or by comma-separated keys.
    /// Unknown keys and absent values are left out.
    pub fn info(&self, id: &str, group_or_keys: &str) -> Result<InfoPanel> {
        let Some(record) = self.get(id)? else {
            return Ok(InfoPanel::default());
        };
        let keys: Vec<&str> = match info_group(group_or_keys.trim()) {
            Some(keys) => keys.to_vec(),
            None => group_or_keys.split(',').map(str::trim).filter(|k| !k.is_empty()).collect(),
        };
        let map = record.to_map();
        let entries = keys
            .into_iter()
            .filter_map(|k| map.get(k).map(|v| (k.to_string(), v.clone())))
            .collect();
        Ok(InfoPanel { entries })
    }

    // ------------- tolerance lookup -------------
    /// Records whose range overlaps `value ± tolerance`, closest first.
    /// `None` uses the catalog tolerance for the property.
    pub fn find_by_property(&self, kind: PropertyKind, value: f64, tolerance: Option<f64>) -> Result<Vec<FlatRecord>> {
        let tolerance = tolerance.unwrap_or_else(|| self.tolerance(kind));
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(CatalogError::InvalidArgument(format!("tolerance {tolerance}")));
        }
        let records = self.records()?;
        Ok(find_by_property(&records, kind, value, tolerance)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn find_by_ri(&self, ri: f64, tolerance: Option<f64>) -> Result<Vec<FlatRecord>> {
        self.find_by_property(PropertyKind::RefractiveIndex, ri, tolerance)
    }

    pub fn find_by_sg(&self, sg: f64, tolerance: Option<f64>) -> Result<Vec<FlatRecord>> {
        self.find_by_property(PropertyKind::SpecificGravity, sg, tolerance)
    }

    // ------------- reference data -------------
    pub fn thresholds(&self, category: &str) -> Result<Vec<Threshold>> {
        check_category_name(category)?;
        self.read(|p| p.thresholds(category))
    }

    /// The level `value` falls into, `None` for unknown categories or gaps.
    pub fn classify(&self, category: &str, value: f64) -> Result<Option<String>> {
        let table = ThresholdTable::new(category, self.thresholds(category)?)?;
        Ok(table.level(value).map(str::to_string))
    }

    pub fn cut_shape_factors(&self) -> Result<Vec<CutShapeFactor>> {
        self.read(|p| p.cut_shape_factors())
    }

    pub fn volume_shape_factors(&self) -> Result<Vec<VolumeShapeFactor>> {
        self.read(|p| p.volume_shape_factors())
    }

    // ------------- provenance -------------
    pub fn synthetics_of(&self, natural_id: &str) -> Result<Vec<Family>> {
        let families = self.families()?;
        Ok(owned(Provenance::new(&families).synthetics_of(natural_id)))
    }

    pub fn simulants_of(&self, natural_id: &str) -> Result<Vec<Family>> {
        let families = self.families()?;
        Ok(owned(Provenance::new(&families).simulants_of(natural_id)))
    }

    /// `(synthetics, simulants)` of a natural stone.
    pub fn counterparts(&self, natural_id: &str) -> Result<(Vec<Family>, Vec<Family>)> {
        let families = self.families()?;
        let counterparts = Provenance::new(&families).counterparts(natural_id);
        Ok((owned(counterparts.synthetics), owned(counterparts.simulants)))
    }

    pub fn counterpart_of(&self, id: &str) -> Result<Option<Family>> {
        let families = self.families()?;
        Ok(Provenance::new(&families).counterpart_of(id).cloned())
    }

    pub fn by_origin(&self, origin: Origin) -> Result<Vec<Family>> {
        let families = self.families()?;
        Ok(owned(Provenance::new(&families).by_origin(origin)))
    }

    pub fn by_growth_method(&self, method: &str) -> Result<Vec<Family>> {
        let families = self.families()?;
        Ok(owned(Provenance::new(&families).by_growth_method(method)))
    }

    pub fn list_synthetics(&self, method: Option<&str>) -> Result<Vec<Family>> {
        let families = self.families()?;
        Ok(owned(Provenance::new(&families).list_synthetics(method)))
    }

    pub fn list_simulants(&self, target: Option<&str>) -> Result<Vec<Family>> {
        let families = self.families()?;
        Ok(owned(Provenance::new(&families).list_simulants(target)))
    }

    // ------------- model artifacts -------------
    pub fn model_artifacts(&self, id: &str) -> Result<Option<ModelArtifacts>> {
        let id = id.trim().to_lowercase();
        self.read(|p| p.model_artifacts(&id))
    }

    pub fn model_svg(&self, id: &str) -> Result<Option<String>> {
        Ok(self.model_artifacts(id)?.and_then(|a| a.svg))
    }

    pub fn model_stl(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.model_artifacts(id)?.and_then(|a| a.stl))
    }

    pub fn model_gltf(&self, id: &str) -> Result<Option<String>> {
        Ok(self.model_artifacts(id)?.and_then(|a| a.gltf))
    }

    /// Stores generated artifacts for an expression id. Returns false when
    /// nothing carries that id.
    pub fn update_models(&self, id: &str, artifacts: &ModelArtifacts) -> Result<bool> {
        if let Some(stamp) = artifacts.generated_at.as_deref() {
            ModelArtifacts::new(None, None, None, stamp)?;
        }
        let id = id.trim().to_lowercase();
        let updated = self.write(|p| p.update_models(&id, artifacts))?;
        if updated {
            info!(id = %id, generated_at = ?artifacts.generated_at, "stored model artifacts");
        } else {
            warn!(id = %id, "no expression to attach model artifacts to");
        }
        Ok(updated)
    }

    // ------------- ingestion & validation -------------
    pub fn ingest(&self, batch: &Batch) -> Result<IngestReport> {
        self.write(|p| ingest::ingest(p, batch))
    }

    pub fn validate(&self) -> Result<ValidationReport> {
        let (families, expressions) = self.read(|p| Ok((p.all_families()?, p.all_expressions()?)))?;
        let by_id: HashMap<&str, &Family, IdHasher> = families.iter().map(|f| (f.id.as_str(), f)).collect();
        let mut report = ValidationReport::default();
        let mut primaries: HashMap<&str, usize, IdHasher> = HashMap::default();
        for expression in &expressions {
            if !by_id.contains_key(expression.family_id.as_str()) {
                report
                    .orphaned_expressions
                    .push((expression.id.clone(), expression.family_id.clone()));
            }
            if expression.is_primary {
                *primaries.entry(expression.family_id.as_str()).or_default() += 1;
            }
        }
        for family in &families {
            let Some(counterpart) = family.natural_counterpart_id.as_deref() else {
                continue;
            };
            match by_id.get(counterpart) {
                None => report
                    .missing_counterparts
                    .push((family.id.clone(), counterpart.to_string())),
                Some(target) if !target.origin.is_natural() => report
                    .non_natural_counterparts
                    .push((family.id.clone(), counterpart.to_string())),
                Some(_) => {}
            }
        }
        report.multiple_primaries = primaries
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, _)| id.to_string())
            .collect();
        report.multiple_primaries.sort();
        if !report.is_clean() {
            warn!(
                orphaned = report.orphaned_expressions.len(),
                missing_counterparts = report.missing_counterparts.len(),
                non_natural_counterparts = report.non_natural_counterparts.len(),
                "catalog has referential problems"
            );
        }
        Ok(report)
    }
}

fn owned(families: Vec<&Family>) -> Vec<Family> {
    families.into_iter().cloned().collect()
}

fn substring_match(record: &FlatRecord, needle: &str) -> bool {
    let contains = |text: &str| text.to_lowercase().contains(needle);
    contains(&record.id)
        || contains(&record.name)
        || record.chemistry.as_deref().is_some_and(contains)
        || record.description.as_deref().is_some_and(contains)
        || record.localities.iter().any(|l| contains(l))
        || contains(record.origin.as_str())
        || record.growth_method.as_deref().is_some_and(contains)
}
