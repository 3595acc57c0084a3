use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Ingestion failed for '{id}': {message}")]
    Ingestion { id: String, message: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

// Helper conversions
impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self { Self::DataCorruption { message: e.to_string() } }
}
impl From<config::ConfigError> for CatalogError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}

impl CatalogError {
    pub fn ingestion(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingestion { id: id.into(), message: message.into() }
    }
}
