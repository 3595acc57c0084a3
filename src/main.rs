use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use mineral_catalog::catalog::{Catalog, Filter, PersistenceMode};
use mineral_catalog::error::{CatalogError, Result};
use mineral_catalog::ingest::Batch;
use mineral_catalog::model::{Family, Origin};
use mineral_catalog::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "mineral-catalog", version, about = "Query the mineral catalog")]
struct Args {
    /// Database file, overrides the configured one
    #[arg(long, env = "MINERAL_CATALOG_DATABASE_PATH")]
    database: Option<PathBuf>,
    /// Configuration file (without or with the .toml extension)
    #[arg(long)]
    config: Option<String>,
    /// Log filter, e.g. "debug" or "mineral_catalog=trace"
    #[arg(long)]
    log_filter: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List ids, optionally of a category or crystal system
    List { category: Option<String> },
    /// Show a property group (or comma-separated keys) of a record
    Info {
        id: String,
        #[arg(default_value = "full")]
        group: String,
    },
    /// Print a record as JSON
    Json { id: String },
    /// Full-text search
    Search { query: String },
    /// Named categories and crystal systems
    Categories,
    Systems,
    Count,
    /// Filter by crystal system, hardness and twinning
    Filter {
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        min_hardness: Option<f64>,
        #[arg(long)]
        max_hardness: Option<f64>,
        #[arg(long)]
        twinned: bool,
    },
    /// Synthetics, optionally of one growth method
    Synthetics {
        #[arg(long)]
        method: Option<String>,
    },
    /// Simulants and composites, optionally imitating one stone
    Simulants {
        #[arg(long)]
        target: Option<String>,
    },
    /// Synthetics and simulants of a natural stone
    Counterparts { id: String },
    /// Families of one origin
    Origin { origin: Origin },
    /// Records matching a refractive index
    FindRi {
        value: f64,
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Records matching a specific gravity
    FindSg {
        value: f64,
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Resolve a value to a threshold level
    Classify { category: String, value: f64 },
    /// Cut and volume shape factors
    Shapes,
    /// Load a JSON batch of family documents
    Ingest { file: PathBuf },
    /// Report dangling references
    Validate,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let filter = args.log_filter.clone().unwrap_or_else(|| settings.log_filter.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let path = args.database.clone().unwrap_or_else(|| settings.database_path.clone());
    match run(args.command, path, &settings) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            println!("not found");
            ExitCode::from(1)
        }
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn print_ids(ids: &[String]) -> bool {
    for id in ids {
        println!("{id}");
    }
    !ids.is_empty()
}

fn print_families(families: &[Family]) -> bool {
    for family in families {
        println!("{}\t{}\t{}", family.id, family.name, family.origin);
    }
    !families.is_empty()
}

/// `Ok(false)` means nothing was found.
fn run(command: Command, path: PathBuf, settings: &Settings) -> Result<bool> {
    // only ingest may create the database
    if !matches!(command, Command::Ingest { .. }) && !path.exists() {
        return Err(CatalogError::Config(format!("no catalog database at {}", path.display())));
    }
    let catalog = Catalog::open(PersistenceMode::File(path))?
        .with_tolerances(settings.ri_tolerance, settings.sg_tolerance);
    match command {
        Command::List { category } => Ok(print_ids(&catalog.list(category.as_deref())?)),
        Command::Info { id, group } => {
            let panel = catalog.info(&id, &group)?;
            for (label, value) in panel.labelled() {
                println!("{label}: {value}");
            }
            Ok(!panel.is_empty())
        }
        Command::Json { id } => match catalog.get(&id)? {
            Some(record) => {
                println!("{}", serde_json::to_string_pretty(&record)?);
                Ok(true)
            }
            None => Ok(false),
        },
        Command::Search { query } => Ok(print_ids(&catalog.search(&query)?)),
        Command::Categories => {
            for (name, ids) in catalog.categories()?.iter() {
                println!("{name}: {}", ids.len());
            }
            Ok(true)
        }
        Command::Systems => Ok(print_ids(&catalog.systems()?)),
        Command::Count => {
            println!("{}", catalog.count()?);
            Ok(true)
        }
        Command::Filter { system, min_hardness, max_hardness, twinned } => {
            let mut filter = Filter::default().hardness(min_hardness, max_hardness);
            if let Some(system) = system {
                filter = filter.system(&system);
            }
            if twinned {
                filter = filter.twinned();
            }
            Ok(print_ids(&catalog.filter(&filter)?))
        }
        Command::Synthetics { method } => Ok(print_families(&catalog.list_synthetics(method.as_deref())?)),
        Command::Simulants { target } => Ok(print_families(&catalog.list_simulants(target.as_deref())?)),
        Command::Counterparts { id } => {
            let (synthetics, simulants) = catalog.counterparts(&id)?;
            println!("synthetics:");
            print_families(&synthetics);
            println!("simulants:");
            print_families(&simulants);
            Ok(!synthetics.is_empty() || !simulants.is_empty())
        }
        Command::Origin { origin } => Ok(print_families(&catalog.by_origin(origin)?)),
        Command::FindRi { value, tolerance } => {
            let found = catalog.find_by_ri(value, tolerance)?;
            for record in &found {
                println!("{}\t{}\t{}", record.id, record.name, record.ri.as_deref().unwrap_or("-"));
            }
            Ok(!found.is_empty())
        }
        Command::FindSg { value, tolerance } => {
            let found = catalog.find_by_sg(value, tolerance)?;
            for record in &found {
                println!("{}\t{}\t{}", record.id, record.name, record.sg.as_deref().unwrap_or("-"));
            }
            Ok(!found.is_empty())
        }
        Command::Classify { category, value } => match catalog.classify(&category, value)? {
            Some(level) => {
                println!("{level}");
                Ok(true)
            }
            None => Ok(false),
        },
        Command::Shapes => {
            for shape in catalog.cut_shape_factors()? {
                println!("cut\t{}\t{}", shape.id, shape.factor);
            }
            for shape in catalog.volume_shape_factors()? {
                println!("volume\t{}\t{}", shape.id, shape.factor);
            }
            Ok(true)
        }
        Command::Ingest { file } => {
            let text = std::fs::read_to_string(&file).map_err(|e| {
                CatalogError::ingestion(file.display().to_string(), e.to_string())
            })?;
            let report = catalog.ingest(&Batch::from_json(&text)?)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(true)
        }
        Command::Validate => {
            let report = catalog.validate()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_commands_do_not_create_a_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let result = run(Command::Count, path.clone(), &Settings::default());
        assert!(matches!(result, Err(CatalogError::Config(_))));
        let result = run(Command::Json { id: "ruby".into() }, path.clone(), &Settings::default());
        assert!(matches!(result, Err(CatalogError::Config(_))));
        assert!(!path.exists());
    }

    #[test]
    fn ingest_creates_the_database_and_lookups_then_report_missing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minerals.db");
        let file = dir.path().join("batch.json");
        std::fs::write(
            &file,
            r#"{"id": "spinel", "name": "Spinel", "crystal_system": "cubic", "expressions": [{"cdl": "cubic[m3m]:{111}"}]}"#,
        )
        .unwrap();
        assert!(run(Command::Ingest { file }, path.clone(), &Settings::default()).unwrap());
        assert!(path.exists());
        assert!(run(Command::Json { id: "spinel".into() }, path.clone(), &Settings::default()).unwrap());
        assert!(!run(Command::Json { id: "ruby".into() }, path, &Settings::default()).unwrap());
    }
}
