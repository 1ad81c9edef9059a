use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Required tool not found: {0} (install it and make sure it is on PATH)")]
    MissingDependency(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Artifact generation failed: {0}")]
    Generation(#[from] GeneratorError),

    #[error("External command `{command}` failed: {message}")]
    ExternalCommandFailed { command: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration document unreadable at {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingRequiredField(String),

    #[error("Invalid value for {path}: {reason}")]
    InvalidValue { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("No pinned version for {0} (set versions.{0})")]
    MissingVersion(String),

    #[error("Template rendering failed: {0}")]
    TemplateRendering(String),
}

impl From<tera::Error> for GeneratorError {
    fn from(err: tera::Error) -> Self {
        // tera nests the useful part of the message in its source chain
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        GeneratorError::TemplateRendering(message)
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
