// used for persistence
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::datatype::{OptionalTextList, TextList};
use crate::error::{CatalogError, Result};
use crate::model::{
    Category, CutShapeFactor, Expression, Family, FlatRecord, ModelArtifacts, Pleochroism,
    Threshold, VolumeShapeFactor,
};
use crate::range::parse_range_text;

/// Version written by this build. Version 1 is the single-table layout that
/// predates families; it is upgraded in place. Version 3 rebuilt the search
/// index with accent-sensitive tokens.
pub const SCHEMA_VERSION: i64 = 3;

// ------------- Schema -------------
// Foreign keys are declared for documentation and tooling but not enforced,
// dangling references are reported by the validation pass instead.
const SCHEMA_V1: &str = "
    create table if not exists Mineral (
        id text not null,
        name text not null,
        cdl text not null,
        system text not null,
        point_group text,
        chemistry text,
        hardness text,
        description text,
        sg text,
        ri text,
        birefringence real,
        optical_character text,
        dispersion real,
        lustre text,
        cleavage text,
        fracture text,
        pleochroism text,
        twin_law text,
        phenomenon text,
        note text,
        localities_json text,
        forms_json text,
        colors_json text,
        treatments_json text,
        inclusions_json text,
        model_svg text,
        model_stl blob,
        model_gltf text,
        models_generated_at text,
        constraint referenceable_Mineral_id primary key (
            id
        )
    );
    create table if not exists Category (
        name text not null,
        ids_json text not null,
        constraint referenceable_Category_name primary key (
            name
        )
    );
    create index if not exists Mineral_by_system on Mineral(system);
    create index if not exists Mineral_by_twin_law on Mineral(twin_law);
";

/// Columns the flat table gained together with families.
const MINERAL_V2_COLUMNS: &[(&str, &str)] = &[
    ("pleochroism_strength", "text"),
    ("pleochroism_color1", "text"),
    ("pleochroism_color2", "text"),
    ("pleochroism_color3", "text"),
    ("pleochroism_notes", "text"),
    ("fluorescence", "text"),
    ("ri_min", "real"),
    ("ri_max", "real"),
    ("sg_min", "real"),
    ("sg_max", "real"),
    ("heat_treatment_temp_min", "real"),
    ("heat_treatment_temp_max", "real"),
    ("category", "text"),
    ("mineral_group", "text"),
    ("origin", "text not null default 'natural'"),
    ("growth_method", "text"),
    ("natural_counterpart_id", "text"),
    ("target_minerals_json", "text"),
    ("manufacturer", "text"),
    ("year_first_produced", "integer"),
    ("diagnostic_synthetic_features", "text"),
    ("family_id", "text"),
];

const SCHEMA_V2: &str = "
    create table if not exists Family (
        id text not null,
        name text not null,
        crystal_system text not null,
        point_group text,
        chemistry text,
        category text,
        mineral_group text,
        hardness_min real,
        hardness_max real,
        sg_min real,
        sg_max real,
        ri_min real,
        ri_max real,
        birefringence real,
        dispersion real,
        optical_character text,
        pleochroism text,
        pleochroism_strength text,
        pleochroism_color1 text,
        pleochroism_color2 text,
        pleochroism_color3 text,
        pleochroism_notes text,
        lustre text,
        cleavage text,
        fracture text,
        description text,
        notes text,
        diagnostic_features text,
        common_inclusions text,
        localities_json text,
        colors_json text,
        treatments_json text,
        inclusions_json text,
        forms_json text,
        heat_treatment_temp_min real,
        heat_treatment_temp_max real,
        twin_law text,
        phenomenon text,
        fluorescence text,
        origin text not null default 'natural',
        growth_method text,
        natural_counterpart_id text,
        target_minerals_json text,
        manufacturer text,
        year_first_produced integer,
        diagnostic_synthetic_features text,
        constraint referenceable_Family_id primary key (
            id
        ),
        constraint natural_Family_has_no_counterpart check (
            origin <> 'natural' or natural_counterpart_id is null
        )
    );
    create table if not exists Expression (
        id text not null,
        family_id text not null,
        name text not null,
        slug text not null,
        cdl text not null default '',
        point_group text,
        form_description text,
        habit text,
        forms_json text,
        is_primary integer not null default 0,
        sort_order integer not null default 0,
        note text,
        model_svg text,
        model_stl blob,
        model_gltf text,
        models_generated_at text,
        constraint referenceable_Expression_id primary key (
            id
        ),
        constraint Expression_of_Family foreign key (
            family_id
        ) references Family(id)
    );
    create table if not exists CutShapeFactor (
        id text not null,
        name text not null,
        factor real not null,
        description text,
        constraint referenceable_CutShapeFactor_id primary key (
            id
        )
    );
    create table if not exists VolumeShapeFactor (
        id text not null,
        name text not null,
        factor real not null,
        constraint referenceable_VolumeShapeFactor_id primary key (
            id
        )
    );
    create table if not exists Threshold (
        category text not null,
        level text not null,
        min_value real,
        max_value real,
        description text,
        constraint unique_Threshold primary key (
            category,
            level
        )
    );
    create index if not exists Expression_by_Family on Expression(family_id, is_primary desc, sort_order);
    create index if not exists Family_by_origin on Family(origin);
    create index if not exists Family_by_counterpart on Family(natural_counterpart_id);
";

// The search index keeps its own copy of the text so that the flat table
// layout can change without touching it. Diacritics are kept so that indexed
// words match exactly what a substring scan would match.
const SEARCH_SCHEMA: &str = "
    create virtual table if not exists Mineral_Search using fts5(
        id unindexed, name, chemistry, description, localities, origin, growth_method,
        tokenize = 'unicode61 remove_diacritics 0'
    );
    create trigger if not exists Mineral_Search_insert after insert on Mineral begin
        insert into Mineral_Search (id, name, chemistry, description, localities, origin, growth_method)
        values (new.id, new.name, new.chemistry, new.description, new.localities_json, new.origin, new.growth_method);
    end;
    create trigger if not exists Mineral_Search_delete after delete on Mineral begin
        delete from Mineral_Search where id = old.id;
    end;
    create trigger if not exists Mineral_Search_update after update on Mineral begin
        delete from Mineral_Search where id = old.id;
        insert into Mineral_Search (id, name, chemistry, description, localities, origin, growth_method)
        values (new.id, new.name, new.chemistry, new.description, new.localities_json, new.origin, new.growth_method);
    end;
";

const DROP_SEARCH: &str = "
    drop trigger if exists Mineral_Search_insert;
    drop trigger if exists Mineral_Search_delete;
    drop trigger if exists Mineral_Search_update;
    drop table if exists Mineral_Search;
";

const FAMILY_COLUMNS: &[&str] = &[
    "id", "name", "crystal_system", "point_group", "chemistry", "category", "mineral_group",
    "hardness_min", "hardness_max", "sg_min", "sg_max", "ri_min", "ri_max",
    "birefringence", "dispersion", "optical_character", "pleochroism",
    "pleochroism_strength", "pleochroism_color1", "pleochroism_color2", "pleochroism_color3",
    "pleochroism_notes", "lustre", "cleavage", "fracture", "description", "notes",
    "diagnostic_features", "common_inclusions", "localities_json", "colors_json",
    "treatments_json", "inclusions_json", "forms_json", "heat_treatment_temp_min",
    "heat_treatment_temp_max", "twin_law", "phenomenon", "fluorescence", "origin",
    "growth_method", "natural_counterpart_id", "target_minerals_json", "manufacturer",
    "year_first_produced", "diagnostic_synthetic_features",
];

const EXPRESSION_COLUMNS: &[&str] = &[
    "id", "family_id", "name", "slug", "cdl", "point_group", "form_description", "habit",
    "forms_json", "is_primary", "sort_order", "note",
];

const MINERAL_COLUMNS: &[&str] = &[
    "id", "name", "cdl", "system", "point_group", "chemistry", "hardness", "description",
    "sg", "ri", "birefringence", "optical_character", "dispersion", "lustre", "cleavage",
    "fracture", "pleochroism", "pleochroism_strength", "pleochroism_color1",
    "pleochroism_color2", "pleochroism_color3", "pleochroism_notes", "twin_law",
    "phenomenon", "fluorescence", "note", "localities_json", "forms_json", "colors_json",
    "treatments_json", "inclusions_json", "ri_min", "ri_max", "sg_min", "sg_max",
    "heat_treatment_temp_min", "heat_treatment_temp_max", "category", "mineral_group",
    "origin", "growth_method", "natural_counterpart_id", "target_minerals_json",
    "manufacturer", "year_first_produced", "diagnostic_synthetic_features", "family_id",
];

const ARTIFACT_COLUMNS: &[&str] = &["model_svg", "model_stl", "model_gltf", "models_generated_at"];

/// Builds `insert .. on conflict(id) do update` for the given columns. Columns
/// not listed keep their values, except generated artifacts which are
/// dropped once the notation they were generated from changes.
fn upsert_statement(table: &str, columns: &[&str], artifacts_follow_cdl: bool) -> String {
    let names = columns.join(", ");
    let values = columns.iter().map(|c| format!(":{c}")).collect::<Vec<_>>().join(", ");
    let mut updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != "id")
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    if artifacts_follow_cdl {
        updates.extend(ARTIFACT_COLUMNS.iter().map(|c| {
            format!("{c} = case when {table}.cdl = excluded.cdl then {table}.{c} end")
        }));
    }
    format!(
        "insert into {table} ({names}) values ({values}) on conflict(id) do update set {}",
        updates.join(", ")
    )
}

// ------------- Persistence -------------
pub struct Persistor<'db> {
    pub db: &'db Connection,
}
impl<'db> Persistor<'db> {
    pub fn new(connection: &'db Connection) -> Persistor<'db> {
        Persistor { db: connection }
    }

    // ------------- schema versioning -------------
    /// Creates or upgrades the schema to [`SCHEMA_VERSION`].
    pub fn init_schema(&self) -> Result<()> {
        let current = self.schema_version()?;
        if current == 0 {
            info!(version = SCHEMA_VERSION, "creating catalog schema");
            self.db.execute_batch(SCHEMA_V1)?;
            self.migrate_schema(1)?;
        } else if current < SCHEMA_VERSION {
            info!(from = current, to = SCHEMA_VERSION, "migrating catalog schema");
            self.migrate_schema(current)?;
        } else if current > SCHEMA_VERSION {
            return Err(CatalogError::DataCorruption {
                message: format!(
                    "schema version {current} is newer than supported version {SCHEMA_VERSION}"
                ),
            });
        } else {
            debug!(version = current, "catalog schema is up to date");
        }
        Ok(())
    }

    /// 0 for an empty database, 1 for a pre-versioning flat database.
    pub fn schema_version(&self) -> Result<i64> {
        if self.table_exists("SchemaVersion")? {
            let version = self
                .db
                .query_row("select version from SchemaVersion limit 1", [], |r| r.get(0))
                .optional()?;
            return Ok(version.unwrap_or(0));
        }
        if self.table_exists("Mineral")? {
            return Ok(1);
        }
        Ok(0)
    }

    fn set_schema_version(&self, version: i64) -> Result<()> {
        self.db.execute_batch(
            "create table if not exists SchemaVersion (version integer not null); delete from SchemaVersion;",
        )?;
        self.db.execute("insert into SchemaVersion (version) values (?)", [version])?;
        Ok(())
    }

    fn migrate_schema(&self, from_version: i64) -> Result<()> {
        if from_version < 2 {
            let existing = self.column_names("Mineral")?;
            for (column, definition) in MINERAL_V2_COLUMNS {
                if !existing.iter().any(|c| c == column) {
                    self.db
                        .execute_batch(&format!("alter table Mineral add column {column} {definition};"))?;
                }
            }
            self.db.execute_batch(SCHEMA_V2)?;
        }
        if from_version < 3 {
            if let Err(e) = self.db.execute_batch(DROP_SEARCH) {
                warn!(error = %e, "could not drop the old search index");
            }
        }
        self.init_search();
        self.set_schema_version(SCHEMA_VERSION)?;
        Ok(())
    }

    /// The search index is optional: without FTS5 queries fall back to scanning.
    fn init_search(&self) {
        match self.db.execute_batch(SEARCH_SCHEMA) {
            Ok(()) => {
                if let Err(e) = self.db.execute_batch(
                    "delete from Mineral_Search;
                     insert into Mineral_Search (id, name, chemistry, description, localities, origin, growth_method)
                     select id, name, chemistry, description, localities_json, origin, growth_method from Mineral;",
                ) {
                    warn!(error = %e, "could not rebuild the search index");
                }
            }
            Err(e) => warn!(error = %e, "full-text search unavailable, substring search only"),
        }
    }

    pub fn search_available(&self) -> Result<bool> {
        self.table_exists("Mineral_Search")
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let found = self
            .db
            .query_row(
                "select 1 from sqlite_master where type = 'table' and name = ?",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut statement = self.db.prepare(&format!("pragma table_info({table})"))?;
        let names = statement
            .query_map([], |row| row.get::<_, String>("name"))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn exists(&self, table: &str, id: &str) -> Result<bool> {
        let found = self
            .db
            .prepare_cached(&format!("select 1 from {table} where id = ?"))?
            .query_row([id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    // ------------- writers -------------
    /// Returns true when a family with the same id was already persisted.
    pub fn persist_family(&self, family: &Family) -> Result<bool> {
        let existing = self.exists("Family", &family.id)?;
        let p = &family.pleochroism_detail;
        self.db
            .prepare_cached(&upsert_statement("Family", FAMILY_COLUMNS, false))?
            .execute(named_params! {
                ":id": family.id,
                ":name": family.name,
                ":crystal_system": family.crystal_system,
                ":point_group": family.point_group,
                ":chemistry": family.chemistry,
                ":category": family.category,
                ":mineral_group": family.mineral_group,
                ":hardness_min": family.hardness_min,
                ":hardness_max": family.hardness_max,
                ":sg_min": family.sg_min,
                ":sg_max": family.sg_max,
                ":ri_min": family.ri_min,
                ":ri_max": family.ri_max,
                ":birefringence": family.birefringence,
                ":dispersion": family.dispersion,
                ":optical_character": family.optical_character,
                ":pleochroism": family.pleochroism,
                ":pleochroism_strength": p.strength,
                ":pleochroism_color1": p.color1,
                ":pleochroism_color2": p.color2,
                ":pleochroism_color3": p.color3,
                ":pleochroism_notes": p.notes,
                ":lustre": family.lustre,
                ":cleavage": family.cleavage,
                ":fracture": family.fracture,
                ":description": family.description,
                ":notes": family.notes,
                ":diagnostic_features": family.diagnostic_features,
                ":common_inclusions": family.common_inclusions,
                ":localities_json": TextList::from(&family.localities[..]),
                ":colors_json": TextList::from(&family.colors[..]),
                ":treatments_json": TextList::from(&family.treatments[..]),
                ":inclusions_json": TextList::from(&family.inclusions[..]),
                ":forms_json": TextList::from(&family.forms[..]),
                ":heat_treatment_temp_min": family.heat_treatment_temp_min,
                ":heat_treatment_temp_max": family.heat_treatment_temp_max,
                ":twin_law": family.twin_law,
                ":phenomenon": family.phenomenon,
                ":fluorescence": family.fluorescence,
                ":origin": family.origin,
                ":growth_method": family.growth_method,
                ":natural_counterpart_id": family.natural_counterpart_id,
                ":target_minerals_json": TextList::from(&family.target_minerals[..]),
                ":manufacturer": family.manufacturer,
                ":year_first_produced": family.year_first_produced,
                ":diagnostic_synthetic_features": family.diagnostic_synthetic_features,
            })?;
        Ok(existing)
    }

    pub fn persist_expression(&self, expression: &Expression) -> Result<bool> {
        let existing = self.exists("Expression", &expression.id)?;
        self.db
            .prepare_cached(&upsert_statement("Expression", EXPRESSION_COLUMNS, true))?
            .execute(named_params! {
                ":id": expression.id,
                ":family_id": expression.family_id,
                ":name": expression.name,
                ":slug": expression.slug,
                ":cdl": expression.cdl,
                ":point_group": expression.point_group,
                ":form_description": expression.form_description,
                ":habit": expression.habit,
                ":forms_json": OptionalTextList(expression.forms.clone()),
                ":is_primary": expression.is_primary,
                ":sort_order": expression.sort_order,
                ":note": expression.note,
            })?;
        Ok(existing)
    }

    pub fn persist_flat_record(&self, record: &FlatRecord) -> Result<bool> {
        let existing = self.exists("Mineral", &record.id)?;
        let p = &record.pleochroism_detail;
        self.db
            .prepare_cached(&upsert_statement("Mineral", MINERAL_COLUMNS, true))?
            .execute(named_params! {
                ":id": record.id,
                ":name": record.name,
                ":cdl": record.cdl,
                ":system": record.system,
                ":point_group": record.point_group,
                ":chemistry": record.chemistry,
                ":hardness": record.hardness,
                ":description": record.description,
                ":sg": record.sg,
                ":ri": record.ri,
                ":birefringence": record.birefringence,
                ":optical_character": record.optical_character,
                ":dispersion": record.dispersion,
                ":lustre": record.lustre,
                ":cleavage": record.cleavage,
                ":fracture": record.fracture,
                ":pleochroism": record.pleochroism,
                ":pleochroism_strength": p.strength,
                ":pleochroism_color1": p.color1,
                ":pleochroism_color2": p.color2,
                ":pleochroism_color3": p.color3,
                ":pleochroism_notes": p.notes,
                ":twin_law": record.twin_law,
                ":phenomenon": record.phenomenon,
                ":fluorescence": record.fluorescence,
                ":note": record.note,
                ":localities_json": TextList::from(&record.localities[..]),
                ":forms_json": TextList::from(&record.forms[..]),
                ":colors_json": TextList::from(&record.colors[..]),
                ":treatments_json": TextList::from(&record.treatments[..]),
                ":inclusions_json": TextList::from(&record.inclusions[..]),
                ":ri_min": record.ri_min,
                ":ri_max": record.ri_max,
                ":sg_min": record.sg_min,
                ":sg_max": record.sg_max,
                ":heat_treatment_temp_min": record.heat_treatment_temp_min,
                ":heat_treatment_temp_max": record.heat_treatment_temp_max,
                ":category": record.category,
                ":mineral_group": record.mineral_group,
                ":origin": record.origin,
                ":growth_method": record.growth_method,
                ":natural_counterpart_id": record.natural_counterpart_id,
                ":target_minerals_json": TextList::from(&record.target_minerals[..]),
                ":manufacturer": record.manufacturer,
                ":year_first_produced": record.year_first_produced,
                ":diagnostic_synthetic_features": record.diagnostic_synthetic_features,
                ":family_id": record.family_id,
            })?;
        Ok(existing)
    }

    /// Deletes the expressions of a family that are not in `keep`, together
    /// with their flat rows. Returns the number of expressions removed.
    pub fn retain_expressions(&self, family_id: &str, keep: &[&str]) -> Result<usize> {
        let stale: Vec<String> = self
            .db
            .prepare_cached("select id from Expression where family_id = ?")?
            .query_map([family_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?
            .into_iter()
            .filter(|id| !keep.contains(&id.as_str()))
            .collect();
        for id in &stale {
            self.db
                .prepare_cached("delete from Expression where id = ? and family_id = ?")?
                .execute(params![id, family_id])?;
            self.db
                .prepare_cached("delete from Mineral where id = ? and family_id = ?")?
                .execute(params![id, family_id])?;
        }
        Ok(stale.len())
    }

    pub fn persist_category(&self, category: &Category) -> Result<()> {
        self.db
            .prepare_cached(
                "insert into Category (name, ids_json) values (?, ?)
                    on conflict(name) do update set ids_json = excluded.ids_json",
            )?
            .execute(params![category.name, TextList::from(&category.ids[..])])?;
        Ok(())
    }

    /// Reference rows are seeded once; existing rows are left alone.
    pub fn persist_cut_shape_factor(&self, factor: &CutShapeFactor) -> Result<bool> {
        let added = self
            .db
            .prepare_cached(
                "insert or ignore into CutShapeFactor (id, name, factor, description) values (?, ?, ?, ?)",
            )?
            .execute(params![factor.id, factor.name, factor.factor, factor.description])?;
        Ok(added == 0)
    }

    pub fn persist_volume_shape_factor(&self, factor: &VolumeShapeFactor) -> Result<bool> {
        let added = self
            .db
            .prepare_cached("insert or ignore into VolumeShapeFactor (id, name, factor) values (?, ?, ?)")?
            .execute(params![factor.id, factor.name, factor.factor])?;
        Ok(added == 0)
    }

    pub fn persist_threshold(&self, threshold: &Threshold) -> Result<bool> {
        let added = self
            .db
            .prepare_cached(
                "insert or ignore into Threshold (category, level, min_value, max_value, description)
                    values (?, ?, ?, ?, ?)",
            )?
            .execute(params![
                threshold.category,
                threshold.level,
                threshold.min,
                threshold.max,
                threshold.description
            ])?;
        Ok(added == 0)
    }

    /// Writes generated artifacts onto the expression and onto the flat row
    /// sharing its id. Identity columns are never touched.
    pub fn update_models(&self, id: &str, artifacts: &ModelArtifacts) -> Result<bool> {
        let mut touched = 0;
        for table in ["Expression", "Mineral"] {
            touched += self
                .db
                .prepare_cached(&format!(
                    "update {table} set model_svg = ?, model_stl = ?, model_gltf = ?, models_generated_at = ?
                        where id = ?"
                ))?
                .execute(params![
                    artifacts.svg,
                    artifacts.stl,
                    artifacts.gltf,
                    artifacts.generated_at,
                    id
                ])?;
        }
        Ok(touched > 0)
    }

    // ------------- readers -------------
    pub fn family(&self, id: &str) -> Result<Option<Family>> {
        let family = self
            .db
            .prepare_cached("select * from Family where id = ?")?
            .query_row([id], family_from_row)
            .optional()?;
        Ok(family)
    }

    pub fn all_families(&self) -> Result<Vec<Family>> {
        let mut statement = self.db.prepare_cached("select * from Family order by id")?;
        let families = statement
            .query_map([], family_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(families)
    }

    pub fn expression(&self, id: &str) -> Result<Option<Expression>> {
        let expression = self
            .db
            .prepare_cached("select * from Expression where id = ?")?
            .query_row([id], expression_from_row)
            .optional()?;
        Ok(expression)
    }

    /// Display order: primary first, then by sort order.
    pub fn expressions_of(&self, family_id: &str) -> Result<Vec<Expression>> {
        let mut statement = self.db.prepare_cached(
            "select * from Expression where family_id = ? order by is_primary desc, sort_order asc, id asc",
        )?;
        let expressions = statement
            .query_map([family_id], expression_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(expressions)
    }

    pub fn all_expressions(&self) -> Result<Vec<Expression>> {
        let mut statement = self.db.prepare_cached(
            "select * from Expression order by family_id, is_primary desc, sort_order asc, id asc",
        )?;
        let expressions = statement
            .query_map([], expression_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(expressions)
    }

    pub fn flat_record(&self, id: &str) -> Result<Option<FlatRecord>> {
        let record = self
            .db
            .prepare_cached("select * from Mineral where id = ?")?
            .query_row([id], flat_record_from_row)
            .optional()?;
        Ok(record)
    }

    /// Rows with no owning family, i.e. records that only exist in the flat table.
    pub fn standalone_flat_records(&self) -> Result<Vec<FlatRecord>> {
        let mut statement = self.db.prepare_cached(
            "select m.* from Mineral m
                where not exists (select 1 from Expression e where e.id = m.id)
                order by m.id",
        )?;
        let records = statement
            .query_map([], flat_record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn category(&self, name: &str) -> Result<Option<Vec<String>>> {
        let ids = self
            .db
            .prepare_cached("select ids_json from Category where name = ?")?
            .query_row([name], |r| r.get::<_, TextList>(0))
            .optional()?;
        Ok(ids.map(TextList::into_inner))
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        let mut statement = self.db.prepare_cached("select name, ids_json from Category order by name")?;
        let categories = statement
            .query_map([], |r| {
                Ok(Category {
                    name: r.get(0)?,
                    ids: r.get::<_, TextList>(1)?.into_inner(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    pub fn cut_shape_factors(&self) -> Result<Vec<CutShapeFactor>> {
        let mut statement = self
            .db
            .prepare_cached("select id, name, factor, description from CutShapeFactor order by name")?;
        let factors = statement
            .query_map([], |r| {
                Ok(CutShapeFactor {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    factor: r.get(2)?,
                    description: r.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(factors)
    }

    pub fn volume_shape_factors(&self) -> Result<Vec<VolumeShapeFactor>> {
        let mut statement = self
            .db
            .prepare_cached("select id, name, factor from VolumeShapeFactor order by name")?;
        let factors = statement
            .query_map([], |r| {
                Ok(VolumeShapeFactor {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    factor: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(factors)
    }

    /// Rows of one category in classification order: ascending lower bound, open bound first.
    pub fn thresholds(&self, category: &str) -> Result<Vec<Threshold>> {
        let mut statement = self.db.prepare_cached(
            "select category, level, min_value, max_value, description from Threshold
                where category = ?
                order by min_value is not null, min_value asc, level asc",
        )?;
        let thresholds = statement
            .query_map([category], |r| {
                Ok(Threshold {
                    category: r.get(0)?,
                    level: r.get(1)?,
                    min: r.get(2)?,
                    max: r.get(3)?,
                    description: r.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(thresholds)
    }

    pub fn model_artifacts(&self, id: &str) -> Result<Option<ModelArtifacts>> {
        for table in ["Expression", "Mineral"] {
            let artifacts = self
                .db
                .prepare_cached(&format!(
                    "select model_svg, model_stl, model_gltf, models_generated_at from {table} where id = ?"
                ))?
                .query_row([id], artifacts_from_row)
                .optional()?;
            if artifacts.is_some() {
                return Ok(artifacts);
            }
        }
        Ok(None)
    }

    /// Ranked ids from the full-text index. `match_expression` must already be
    /// a valid FTS5 query.
    pub fn full_text_search(&self, match_expression: &str) -> Result<Vec<String>> {
        let mut statement = self
            .db
            .prepare_cached("select id from Mineral_Search where Mineral_Search match ? order by rank")?;
        let ids = statement
            .query_map([match_expression], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

// ------------- row conversion -------------
fn family_from_row(row: &Row) -> rusqlite::Result<Family> {
    Ok(Family {
        id: row.get("id")?,
        name: row.get("name")?,
        crystal_system: row.get("crystal_system")?,
        point_group: row.get("point_group")?,
        chemistry: row.get("chemistry")?,
        category: row.get("category")?,
        mineral_group: row.get("mineral_group")?,
        hardness_min: row.get("hardness_min")?,
        hardness_max: row.get("hardness_max")?,
        sg_min: row.get("sg_min")?,
        sg_max: row.get("sg_max")?,
        ri_min: row.get("ri_min")?,
        ri_max: row.get("ri_max")?,
        birefringence: row.get("birefringence")?,
        dispersion: row.get("dispersion")?,
        optical_character: row.get("optical_character")?,
        pleochroism: row.get("pleochroism")?,
        pleochroism_detail: pleochroism_from_row(row)?,
        lustre: row.get("lustre")?,
        cleavage: row.get("cleavage")?,
        fracture: row.get("fracture")?,
        description: row.get("description")?,
        notes: row.get("notes")?,
        diagnostic_features: row.get("diagnostic_features")?,
        common_inclusions: row.get("common_inclusions")?,
        localities: row.get::<_, TextList>("localities_json")?.into_inner(),
        colors: row.get::<_, TextList>("colors_json")?.into_inner(),
        treatments: row.get::<_, TextList>("treatments_json")?.into_inner(),
        inclusions: row.get::<_, TextList>("inclusions_json")?.into_inner(),
        forms: row.get::<_, TextList>("forms_json")?.into_inner(),
        heat_treatment_temp_min: row.get("heat_treatment_temp_min")?,
        heat_treatment_temp_max: row.get("heat_treatment_temp_max")?,
        twin_law: row.get("twin_law")?,
        phenomenon: row.get("phenomenon")?,
        fluorescence: row.get("fluorescence")?,
        origin: row.get("origin")?,
        growth_method: row.get("growth_method")?,
        natural_counterpart_id: row.get("natural_counterpart_id")?,
        target_minerals: row.get::<_, TextList>("target_minerals_json")?.into_inner(),
        manufacturer: row.get("manufacturer")?,
        year_first_produced: row.get("year_first_produced")?,
        diagnostic_synthetic_features: row.get("diagnostic_synthetic_features")?,
    })
}

fn expression_from_row(row: &Row) -> rusqlite::Result<Expression> {
    Ok(Expression {
        id: row.get("id")?,
        family_id: row.get("family_id")?,
        name: row.get("name")?,
        slug: row.get("slug")?,
        cdl: row.get("cdl")?,
        point_group: row.get("point_group")?,
        form_description: row.get("form_description")?,
        habit: row.get("habit")?,
        forms: row.get::<_, OptionalTextList>("forms_json")?.0,
        is_primary: row.get("is_primary")?,
        sort_order: row.get("sort_order")?,
        note: row.get("note")?,
        artifacts: artifacts_from_row(row)?,
    })
}

fn flat_record_from_row(row: &Row) -> rusqlite::Result<FlatRecord> {
    let hardness: Option<String> = row.get("hardness")?;
    let hardness_range = hardness.as_deref().and_then(parse_range_text);
    Ok(FlatRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        cdl: row.get("cdl")?,
        system: row.get("system")?,
        point_group: row.get("point_group")?,
        chemistry: row.get("chemistry")?,
        hardness,
        description: row.get("description")?,
        localities: row.get::<_, TextList>("localities_json")?.into_inner(),
        forms: row.get::<_, TextList>("forms_json")?.into_inner(),
        sg: row.get("sg")?,
        ri: row.get("ri")?,
        birefringence: row.get("birefringence")?,
        optical_character: row.get("optical_character")?,
        dispersion: row.get("dispersion")?,
        lustre: row.get("lustre")?,
        cleavage: row.get("cleavage")?,
        fracture: row.get("fracture")?,
        pleochroism: row.get("pleochroism")?,
        pleochroism_detail: pleochroism_from_row(row)?,
        colors: row.get::<_, TextList>("colors_json")?.into_inner(),
        treatments: row.get::<_, TextList>("treatments_json")?.into_inner(),
        inclusions: row.get::<_, TextList>("inclusions_json")?.into_inner(),
        twin_law: row.get("twin_law")?,
        phenomenon: row.get("phenomenon")?,
        fluorescence: row.get("fluorescence")?,
        note: row.get("note")?,
        hardness_min: hardness_range.map(|r| r.min),
        hardness_max: hardness_range.map(|r| r.max),
        ri_min: row.get("ri_min")?,
        ri_max: row.get("ri_max")?,
        sg_min: row.get("sg_min")?,
        sg_max: row.get("sg_max")?,
        heat_treatment_temp_min: row.get("heat_treatment_temp_min")?,
        heat_treatment_temp_max: row.get("heat_treatment_temp_max")?,
        category: row.get("category")?,
        mineral_group: row.get("mineral_group")?,
        origin: row.get("origin")?,
        growth_method: row.get("growth_method")?,
        natural_counterpart_id: row.get("natural_counterpart_id")?,
        target_minerals: row.get::<_, TextList>("target_minerals_json")?.into_inner(),
        manufacturer: row.get("manufacturer")?,
        year_first_produced: row.get("year_first_produced")?,
        diagnostic_synthetic_features: row.get("diagnostic_synthetic_features")?,
        family_id: row.get("family_id")?,
        artifacts: artifacts_from_row(row)?,
    })
}

fn pleochroism_from_row(row: &Row) -> rusqlite::Result<Pleochroism> {
    Ok(Pleochroism {
        strength: row.get("pleochroism_strength")?,
        color1: row.get("pleochroism_color1")?,
        color2: row.get("pleochroism_color2")?,
        color3: row.get("pleochroism_color3")?,
        notes: row.get("pleochroism_notes")?,
    })
}

fn artifacts_from_row(row: &Row) -> rusqlite::Result<ModelArtifacts> {
    Ok(ModelArtifacts {
        svg: row.get("model_svg")?,
        stl: row.get("model_stl")?,
        gltf: row.get("model_gltf")?,
        generated_at: row.get("models_generated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Origin;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        Persistor::new(&conn).init_schema().unwrap();
        conn
    }

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = open();
        let persistor = Persistor::new(&conn);
        assert_eq!(persistor.schema_version().unwrap(), SCHEMA_VERSION);
        // idempotent
        persistor.init_schema().unwrap();
        assert_eq!(persistor.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn flat_database_is_upgraded_in_place() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_V1).unwrap();
        conn.execute(
            "insert into Mineral (id, name, cdl, system, hardness, localities_json) values ('quartz', 'Quartz', 'trigonal[32]:{10-10}', 'trigonal', '7', '[\"Brazil\"]')",
            [],
        )
        .unwrap();
        let persistor = Persistor::new(&conn);
        assert_eq!(persistor.schema_version().unwrap(), 1);
        persistor.init_schema().unwrap();
        assert_eq!(persistor.schema_version().unwrap(), SCHEMA_VERSION);
        let record = persistor.flat_record("quartz").unwrap().unwrap();
        assert_eq!(record.origin, Origin::Natural);
        assert_eq!(record.localities, vec!["Brazil".to_string()]);
        assert_eq!(record.hardness_min, Some(7.0));
    }

    #[test]
    fn family_upsert_is_idempotent() {
        let conn = open();
        let persistor = Persistor::new(&conn);
        let mut family = Family::new("spinel", "Spinel", "cubic");
        family.localities = vec!["Myanmar".into()];
        assert!(!persistor.persist_family(&family).unwrap());
        family.name = "Spinel (Mg)".into();
        assert!(persistor.persist_family(&family).unwrap());
        let stored = persistor.family("spinel").unwrap().unwrap();
        assert_eq!(stored.name, "Spinel (Mg)");
        assert_eq!(stored.localities, vec!["Myanmar".to_string()]);
        assert_eq!(persistor.all_families().unwrap().len(), 1);
    }

    #[test]
    fn natural_family_with_counterpart_is_rejected_by_the_store() {
        let conn = open();
        let mut family = Family::new("ruby", "Ruby", "trigonal");
        family.natural_counterpart_id = Some("corundum".into());
        assert!(Persistor::new(&conn).persist_family(&family).is_err());
    }

    #[test]
    fn artifacts_survive_reingest_until_cdl_changes() {
        let conn = open();
        let persistor = Persistor::new(&conn);
        let mut expression = Expression {
            id: "spinel".into(),
            family_id: "spinel".into(),
            name: "Octahedron".into(),
            slug: "default".into(),
            cdl: "cubic[m3m]:{111}".into(),
            ..Default::default()
        };
        persistor.persist_expression(&expression).unwrap();
        let artifacts = ModelArtifacts::new(Some("<svg/>".into()), Some(vec![1, 2, 3]), None, "2024-01-01T00:00:00Z").unwrap();
        assert!(persistor.update_models("spinel", &artifacts).unwrap());

        expression.note = Some("re-ingested".into());
        persistor.persist_expression(&expression).unwrap();
        assert_eq!(persistor.expression("spinel").unwrap().unwrap().artifacts, artifacts);

        expression.cdl = "cubic[m3m]:{111}@1.0 + {100}@0.3".into();
        persistor.persist_expression(&expression).unwrap();
        assert!(!persistor.expression("spinel").unwrap().unwrap().artifacts.is_generated());
    }

    #[test]
    fn update_models_on_unknown_id_reports_nothing_touched() {
        let conn = open();
        let artifacts = ModelArtifacts::generated_now(None, None, None);
        assert!(!Persistor::new(&conn).update_models("nothing", &artifacts).unwrap());
    }

    #[test]
    fn flat_rows_are_indexed_for_search() {
        let conn = open();
        let persistor = Persistor::new(&conn);
        if !persistor.search_available().unwrap() {
            return;
        }
        let record = FlatRecord {
            id: "diamond".into(),
            name: "Diamond".into(),
            cdl: "cubic[m3m]:{111}".into(),
            system: "cubic".into(),
            chemistry: Some("C".into()),
            ..Default::default()
        };
        persistor.persist_flat_record(&record).unwrap();
        persistor.persist_flat_record(&record).unwrap();
        assert_eq!(persistor.full_text_search("\"diamond\"*").unwrap(), vec!["diamond".to_string()]);
    }

    #[test]
    fn search_index_keeps_accents() {
        let conn = open();
        let persistor = Persistor::new(&conn);
        if !persistor.search_available().unwrap() {
            return;
        }
        let record = FlatRecord {
            id: "topaz".into(),
            name: "Topaz".into(),
            system: "orthorhombic".into(),
            localities: vec!["Ouro Prêto".into()],
            ..Default::default()
        };
        persistor.persist_flat_record(&record).unwrap();
        assert_eq!(persistor.full_text_search("\"prêto\"*").unwrap(), vec!["topaz".to_string()]);
        assert!(persistor.full_text_search("\"preto\"*").unwrap().is_empty());
    }

    #[test]
    fn accent_folding_index_is_rebuilt_on_upgrade() {
        let conn = open();
        conn.execute_batch(DROP_SEARCH).unwrap();
        if conn
            .execute_batch(
                "create virtual table Mineral_Search using fts5(
                    id unindexed, name, chemistry, description, localities, origin, growth_method);
                 update SchemaVersion set version = 2;",
            )
            .is_err()
        {
            return;
        }
        conn.execute(
            "insert into Mineral (id, name, cdl, system, localities_json) values ('topaz', 'Topaz', '', 'orthorhombic', '[\"Ouro Prêto\"]')",
            [],
        )
        .unwrap();
        let persistor = Persistor::new(&conn);
        persistor.init_schema().unwrap();
        assert_eq!(persistor.schema_version().unwrap(), SCHEMA_VERSION);
        assert!(persistor.full_text_search("\"preto\"*").unwrap().is_empty());
        assert_eq!(persistor.full_text_search("\"prêto\"*").unwrap(), vec!["topaz".to_string()]);
    }

    #[test]
    fn stale_expressions_are_removed_with_their_flat_rows() {
        let conn = open();
        let persistor = Persistor::new(&conn);
        persistor.persist_family(&Family::new("diamond", "Diamond", "cubic")).unwrap();
        for (id, slug) in [("diamond", "default"), ("diamond-macle", "macle")] {
            persistor
                .persist_expression(&Expression {
                    id: id.into(),
                    family_id: "diamond".into(),
                    name: "Diamond".into(),
                    slug: slug.into(),
                    cdl: "cubic[m3m]:{111}".into(),
                    ..Default::default()
                })
                .unwrap();
            persistor
                .persist_flat_record(&FlatRecord {
                    id: id.into(),
                    name: "Diamond".into(),
                    system: "cubic".into(),
                    family_id: Some("diamond".into()),
                    ..Default::default()
                })
                .unwrap();
        }
        // legacy rows belong to no family
        persistor
            .persist_flat_record(&FlatRecord {
                id: "diamond-old".into(),
                name: "Diamond".into(),
                system: "cubic".into(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(persistor.retain_expressions("diamond", &["diamond"]).unwrap(), 1);
        assert!(persistor.expression("diamond-macle").unwrap().is_none());
        assert!(persistor.flat_record("diamond-macle").unwrap().is_none());
        assert!(persistor.flat_record("diamond").unwrap().is_some());
        assert!(persistor.flat_record("diamond-old").unwrap().is_some());
        assert_eq!(persistor.retain_expressions("diamond", &["diamond"]).unwrap(), 0);
    }

    #[test]
    fn thresholds_come_back_open_bound_first() {
        let conn = open();
        let persistor = Persistor::new(&conn);
        for (level, min, max) in [("high", Some(0.03), None), ("low", None, Some(0.02)), ("moderate", Some(0.02), Some(0.03))] {
            persistor
                .persist_threshold(&Threshold {
                    category: "dispersion".into(),
                    level: level.into(),
                    min,
                    max,
                    description: None,
                })
                .unwrap();
        }
        let levels: Vec<String> = persistor.thresholds("dispersion").unwrap().into_iter().map(|t| t.level).collect();
        assert_eq!(levels, vec!["low", "moderate", "high"]);
    }
}
