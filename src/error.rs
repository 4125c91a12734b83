use thiserror::Error;

#[derive(Error, Debug)]
pub enum YtdlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Engine(#[from] ErrorKind),
}

/// Why a single download or metadata query did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("Binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("External tool failed ({}){}", exit_label(.exit_code), message_suffix(.message))]
    ExternalTool {
        exit_code: Option<i32>,
        message: Option<String>,
    },

    #[error("Download finished but the output file could not be determined")]
    IndeterminateOutput,

    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Timed out after {0}s")]
    TimedOut(u64),

    #[error("Cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Stable identifier used in logs and reports.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::BinaryNotFound(_) => "binary-not-found",
            ErrorKind::InvalidUrl(_) => "invalid-url",
            ErrorKind::ExternalTool { .. } => "external-tool-error",
            ErrorKind::IndeterminateOutput => "indeterminate-output",
            ErrorKind::MetadataUnavailable(_) => "metadata-unavailable",
            ErrorKind::TimedOut(_) => "timed-out",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {}", message),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, YtdlError>;
