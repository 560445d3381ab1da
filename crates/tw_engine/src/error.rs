use thiserror::Error;
use tw_map::MapError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unable to load map '{filename}': {source}")]
    MapLoad {
        filename: String,
        #[source]
        source: MapError,
    },
    /// A host call with an argument outside its valid range.
    #[error("{op}: {message}")]
    Validation { op: &'static str, message: String },
    #[error("{op}: no such person '{name}'")]
    UnknownPerson { op: &'static str, name: String },
    #[error("{op}: map engine is not running")]
    NotRunning { op: &'static str },
    #[error("MapEngine(): map engine is already running")]
    AlreadyRunning,
    #[error("script error: {0}")]
    Script(String),
    #[error("frame timer failure: {0}")]
    Frame(String),
}

impl EngineError {
    pub fn validation(op: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            op,
            message: message.into(),
        }
    }

    /// Errors that end the running session instead of being logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Script(_) | Self::Frame(_))
    }
}

/// Check a host-supplied layer index against `layer_count`.
pub(crate) fn check_layer(
    op: &'static str,
    layer: i32,
    layer_count: usize,
) -> Result<usize, EngineError> {
    match usize::try_from(layer) {
        Ok(index) if index < layer_count => Ok(index),
        _ => Err(EngineError::validation(
            op,
            format!(
                "invalid layer index; valid range is 0-{}, caller passed {layer}",
                layer_count.saturating_sub(1)
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_check_accepts_last_index_only() {
        assert_eq!(check_layer("GetLayerWidth()", 2, 3).unwrap(), 2);
        assert!(check_layer("GetLayerWidth()", 3, 3).is_err());
        assert!(check_layer("GetLayerWidth()", -1, 3).is_err());
    }

    #[test]
    fn layer_error_names_op_and_range() {
        let err = check_layer("GetLayerWidth()", 5, 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "GetLayerWidth(): invalid layer index; valid range is 0-2, caller passed 5"
        );
    }

    #[test]
    fn only_script_and_frame_errors_are_fatal() {
        assert!(EngineError::Script("boom".into()).is_fatal());
        assert!(EngineError::Frame("clock".into()).is_fatal());
        assert!(!EngineError::NotRunning { op: "ExitMapEngine()" }.is_fatal());
        assert!(!EngineError::MapLoad {
            filename: "a.rmp".into(),
            source: MapError::format("bad"),
        }
        .is_fatal());
    }
}
