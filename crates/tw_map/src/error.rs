use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    /// Structurally invalid map: bad signature, unsupported version, unknown
    /// entity type, impossible dimensions.
    #[error("invalid map format: {0}")]
    Format(String),
    /// The stream ended before `context` could be read.
    #[error("map data truncated while reading {context}")]
    Truncated { context: String },
    /// A resource the map depends on (its tileset, the file itself) could not be loaded.
    #[error("map resource unavailable: {0}")]
    Resource(String),
}

impl MapError {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub fn truncated(context: impl Into<String>) -> Self {
        Self::Truncated {
            context: context.into(),
        }
    }
}

impl From<io::Error> for MapError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::truncated("stream"),
            _ => Self::Resource(err.to_string()),
        }
    }
}
