//! Mineral catalog – a read-oriented store of mineral species data.
//!
//! The catalog holds crystallographic, optical, physical and provenance
//! properties of gem minerals and serves them to visualization and
//! authoring tools. Data is organized as:
//! * A [`model::Family`] – a mineral species (or a synthetic, simulant or
//!   composite group) carrying the shared gemmological properties.
//! * An [`model::Expression`] – one crystal habit of a family, with its CDL
//!   notation and any generated 3-D/2-D model artifacts.
//! * A [`model::FlatRecord`] – the legacy single-record shape, derived on
//!   read from a family and one of its expressions.
//!
//! ## Modules
//! * [`range`] – scalar-or-range property values (`"1.762-1.770"`).
//! * [`persist`] – SQLite schema, versioning, full-text index and row mapping.
//! * [`datatype`] – SQL conversions for origins and list columns.
//! * [`compat`] – the flat-record view plus `Presets` / `Categories`.
//! * [`matcher`] – refractive index and specific gravity lookup within a tolerance.
//! * [`threshold`] – value to level classification (dispersion, birefringence, ...).
//! * [`provenance`] – synthetic and simulant relationships.
//! * [`ingest`] – the validated, transactional insert contract and seed data.
//! * [`catalog`] – the query façade tying the above together.
//! * [`settings`] – layered configuration for the command-line tool.
//!
//! ## Quick Start
//! ```
//! use mineral_catalog::catalog::Catalog;
//! use mineral_catalog::ingest::Batch;
//! let catalog = Catalog::in_memory().unwrap();
//! let batch = Batch::from_json(r#"{"id": "spinel", "name": "Spinel", "crystal_system": "cubic",
//!     "ri": "1.712-1.762", "expressions": [{"cdl": "cubic[m3m]:{111}"}]}"#).unwrap();
//! catalog.ingest(&batch).unwrap();
//! assert_eq!(catalog.get("Spinel").unwrap().unwrap().ri.as_deref(), Some("1.712-1.762"));
//! assert_eq!(catalog.classify("dispersion", 0.025).unwrap().as_deref(), Some("moderate"));
//! ```
//!
//! CDL parsing and geometry generation live outside this crate; their
//! output is stored verbatim through [`catalog::Catalog::update_models`].

pub mod catalog;
pub mod compat;
pub mod datatype;
pub mod error;
pub mod ingest;
pub mod matcher;
pub mod model;
pub mod persist;
pub mod provenance;
pub mod range;
pub mod settings;
pub mod threshold;

pub use catalog::{Catalog, Filter, PersistenceMode};
pub use error::{CatalogError, Result};
