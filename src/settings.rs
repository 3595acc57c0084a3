// used to layer defaults, an optional file and the environment
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Result;
use crate::matcher::PropertyKind;

pub const DEFAULT_DATABASE: &str = "minerals.db";
pub const DEFAULT_CONFIG_FILE: &str = "mineral-catalog";
pub const ENV_PREFIX: &str = "MINERAL_CATALOG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub database_path: PathBuf,
    pub log_filter: String,
    pub ri_tolerance: f64,
    pub sg_tolerance: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE),
            log_filter: "info".to_string(),
            ri_tolerance: PropertyKind::RefractiveIndex.default_tolerance(),
            sg_tolerance: PropertyKind::SpecificGravity.default_tolerance(),
        }
    }
}

impl Settings {
    /// Defaults, then `<file>.toml` if present, then `MINERAL_CATALOG_*` variables.
    pub fn load(file: Option<&str>) -> Result<Settings> {
        Settings::layered(file, Some(Environment::with_prefix(ENV_PREFIX).try_parsing(true)))
    }

    fn layered(file: Option<&str>, environment: Option<Environment>) -> Result<Settings> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("database_path", defaults.database_path.to_string_lossy().to_string())?
            .set_default("log_filter", defaults.log_filter)?
            .set_default("ri_tolerance", defaults.ri_tolerance)?
            .set_default("sg_tolerance", defaults.sg_tolerance)?
            .add_source(File::with_name(file.unwrap_or(DEFAULT_CONFIG_FILE)).required(file.is_some()));
        if let Some(environment) = environment {
            builder = builder.add_source(environment);
        }
        Ok(builder.build()?.try_deserialize::<Settings>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_sources() {
        let settings = Settings::layered(Some("/nonexistent/never-there"), None);
        assert!(settings.is_err(), "an explicitly named file must exist");
        let settings = Settings::layered(None, None).unwrap();
        assert_eq!(settings.ri_tolerance, 0.01);
        assert_eq!(settings.sg_tolerance, 0.05);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "database_path = \"/tmp/gems.db\"\nsg_tolerance = 0.1").unwrap();
        let settings = Settings::layered(Some(path.to_str().unwrap()), None).unwrap();
        assert_eq!(settings.database_path, PathBuf::from("/tmp/gems.db"));
        assert_eq!(settings.sg_tolerance, 0.1);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn environment_overrides_file() {
        let source = std::collections::HashMap::from([
            ("MINERAL_CATALOG_LOG_FILTER".to_string(), "debug".to_string()),
            ("MINERAL_CATALOG_RI_TOLERANCE".to_string(), "0.02".to_string()),
        ]);
        let environment = Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(source));
        let settings = Settings::layered(None, Some(environment)).unwrap();
        assert_eq!(settings.log_filter, "debug");
        assert_eq!(settings.ri_tolerance, 0.02);
    }
}
