use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CityscanError {
    #[error("malformed asset name {name:?}: {reason}")]
    MalformedName { name: String, reason: String },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("unknown analysis type: {0}")]
    UnknownAnalysisType(String),

    #[error("remote listing failed: {0}")]
    RemoteList(String),

    #[error("remote listing returned status {status}: {message}")]
    RemoteListStatus { status: u16, message: String },

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("fetch returned status {status}")]
    FetchStatus { status: u16 },

    #[error("tiling failed: {0}")]
    Tiling(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("invalid zoom range: {0}")]
    InvalidZoomRange(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidConfig { key: String, value: String },

    #[error("missing required setting {0}")]
    MissingConfig(String),

    #[error("invalid city name: {0}")]
    UnknownCity(String),

    #[error("raster not found: {0}")]
    ArtifactNotFound(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CityscanError {
    pub fn malformed(name: &str, reason: impl Into<String>) -> Self {
        Self::MalformedName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Status code the read API answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnknownCity(_)
            | Self::UnknownAnalysisType(_)
            | Self::InvalidDate(_)
            | Self::MalformedName { .. } => 400,
            Self::ArtifactNotFound(_) => 404,
            Self::RemoteList(_)
            | Self::RemoteListStatus { .. }
            | Self::Fetch(_)
            | Self::FetchStatus { .. } => 502,
            _ => 500,
        }
    }
}
