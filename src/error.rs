use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("XML parse error at position {position}: {source}")]
    Xml {
        source: quick_xml::Error,
        position: usize,
    },

    #[error("Unsupported version: '{found}', expecting {expected}")]
    UnsupportedVersion { found: String, expected: String },

    #[error("Invalid type: {0}")]
    IllegalMetricKind(String),

    #[error("Malformed {kind} value: '{value}'")]
    MalformedValue { kind: String, value: String },

    #[error("No coverage reports found")]
    NoReportsFound,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Build not found: {0}")]
    BuildNotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CovError>;
