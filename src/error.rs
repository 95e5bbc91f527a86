use thiserror::Error;

use crate::grammar::JurisdictionId;

#[derive(Error, Debug)]
pub enum PlateOriginError {
    #[error("Malformed grammar for {jurisdiction}: {reason}")]
    MalformedGrammar { jurisdiction: String, reason: String },
    #[error("Plate text is empty after normalization")]
    EmptyInput,
    #[error("Evidence source already added to this session: {0}")]
    DuplicateSignalSource(String),
    #[error("Invalid value {value} in signal {source_name}")]
    InvalidSignalScore {
        source_name: String,
        jurisdiction: Option<JurisdictionId>,
        value: f64,
    },
    #[error("Config error: {0}")]
    Config(String),
    #[error("Ingestion error: {0}")]
    Ingestion(String),
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
}

pub type Result<T> = std::result::Result<T, PlateOriginError>;

// Helper conversions
impl From<config::ConfigError> for PlateOriginError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for PlateOriginError {
    fn from(e: serde_json::Error) -> Self { Self::Ingestion(e.to_string()) }
}
impl From<std::io::Error> for PlateOriginError {
    fn from(e: std::io::Error) -> Self { Self::Ingestion(e.to_string()) }
}
