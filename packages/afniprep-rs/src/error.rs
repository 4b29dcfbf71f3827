use thiserror::Error;

#[derive(Error, Debug)]
pub enum AfniPrepError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Failed to parse {0}")]
    ParseError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unexpected directory layout: {0}")]
    Layout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AfniPrepError>;
