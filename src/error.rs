use crate::domain::step::ApiStep;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum ConsentError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[diagnostic(help("place the .p12 file in one of the searched locations"))]
    #[error("Certificate not found: {file_name} (searched: {})", display_paths(.searched))]
    CertificateNotFound {
        file_name: String,
        searched: Vec<PathBuf>,
    },
    #[diagnostic(help("set --certificate-password or PSD2FLOW_CERTIFICATE_PASSWORD"))]
    #[error("Invalid certificate password for {}", .0.display())]
    InvalidCertificatePassword(PathBuf),
    #[error("Invalid certificate format in {}: {reason}", .path.display())]
    InvalidCertificateFormat { path: PathBuf, reason: String },
    #[error("No value available for placeholder {0}")]
    MissingCorrelationValue(&'static str),
    #[error("{step} failed with status code: {status}")]
    NonSuccessStatus { step: ApiStep, status: u16 },
    #[error("Unparsable response: {0}")]
    UnparsableResponse(String),
    #[error("{step} cannot run yet: {reason}")]
    StepNotRunnable { step: ApiStep, reason: String },
    #[error("Invalid environment label: {0:?}")]
    InvalidEnvironment(String),
    #[error("Unknown API step: {0:?}")]
    InvalidStep(String),
    #[error("Invalid cURL command: {0}")]
    InvalidCurl(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, ConsentError>;

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Flattens an error and its `source()` chain into one line.
///
/// reqwest and native-tls wrap the interesting message a few levels down.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}
