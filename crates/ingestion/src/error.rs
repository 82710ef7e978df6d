//! Error types for the ingestion crate.

use std::path::PathBuf;

use h3_grid::GridError;
use storage::StorageError;
use thiserror::Error;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("No block of {table} produced any cell")]
    EmptyDataset { table: String },

    #[error("Invalid table schema: {0}")]
    InvalidSchema(String),

    #[error("Indicator with nameCode '{name_code}' does not exist")]
    UnknownIndicator { name_code: String },

    #[error("Contextual layer category '{category}' not supported, expected one of: {}", allowed.join(", "))]
    UnknownCategory {
        category: String,
        allowed: Vec<String>,
    },

    #[error("No material for column {column} (datasetId {})", dataset_id.as_deref().unwrap_or("unresolvable"))]
    UnresolvedMaterial {
        column: String,
        dataset_id: Option<String>,
    },

    #[error("No {kind} files found in {}", folder.display())]
    NoSourceFiles { folder: PathBuf, kind: &'static str },

    #[error("Expected exactly one vector file in {}, found: {}", folder.display(), files.join(", "))]
    MultipleVectorFiles { folder: PathBuf, files: Vec<String> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ingestion cancelled")]
    Cancelled,

    #[error("Conversion task failed: {0}")]
    Task(String),

    #[error("Table {table} was loaded but its registration was rolled back: {source}")]
    Registration {
        table: String,
        #[source]
        source: Box<IngestionError>,
    },
}

impl IngestionError {
    pub fn registration(table: &str, source: IngestionError) -> Self {
        IngestionError::Registration {
            table: table.to_string(),
            source: Box::new(source),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
