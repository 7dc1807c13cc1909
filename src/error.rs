use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed dump: {0}")]
    MalformedDump(&'static str),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid signature for test case {test_id}: {}", .violations.join("; "))]
    InvalidSignature { test_id: String, violations: Vec<String> },

    #[error("demangling {symbol:?} failed: {reason}")]
    Demangle { symbol: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}
