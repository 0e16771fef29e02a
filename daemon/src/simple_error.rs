//! Simple daemon error types

use vigil_core::CoreError;

#[derive(Debug)]
pub enum DaemonError {
    ServerError(String),
    HttpError(hyper::http::Error),
    HyperError(hyper::Error),
    CoreError(CoreError),
    IoError(std::io::Error),
    SerializationError(serde_json::Error),
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::ServerError(msg) => write!(f, "Server error: {}", msg),
            DaemonError::HttpError(err) => write!(f, "HTTP error: {}", err),
            DaemonError::HyperError(err) => write!(f, "Hyper error: {}", err),
            DaemonError::CoreError(err) => write!(f, "{}", err),
            DaemonError::IoError(err) => write!(f, "I/O error: {}", err),
            DaemonError::SerializationError(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::ServerError(_) => None,
            DaemonError::HttpError(err) => Some(err),
            DaemonError::HyperError(err) => Some(err),
            DaemonError::CoreError(err) => Some(err),
            DaemonError::IoError(err) => Some(err),
            DaemonError::SerializationError(err) => Some(err),
        }
    }
}

impl From<hyper::http::Error> for DaemonError {
    fn from(err: hyper::http::Error) -> Self {
        DaemonError::HttpError(err)
    }
}

impl From<hyper::Error> for DaemonError {
    fn from(err: hyper::Error) -> Self {
        DaemonError::HyperError(err)
    }
}

impl From<CoreError> for DaemonError {
    fn from(err: CoreError) -> Self {
        DaemonError::CoreError(err)
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(err: std::io::Error) -> Self {
        DaemonError::IoError(err)
    }
}

impl From<serde_json::Error> for DaemonError {
    fn from(err: serde_json::Error) -> Self {
        DaemonError::SerializationError(err)
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
