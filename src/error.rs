use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read settings from {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: Box<ViewerError>,
    },
}

pub type Result<T> = std::result::Result<T, ViewerError>;

impl ViewerError {
    pub(crate) fn settings(path: impl Into<PathBuf>, source: impl Into<ViewerError>) -> Self {
        ViewerError::Settings {
            path: path.into(),
            source: Box::new(source.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_error_names_the_file() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ViewerError::settings("/tmp/corpus.json", io);
        let message = err.to_string();
        assert!(message.contains("/tmp/corpus.json"));
        assert!(message.contains("gone"));
    }
}
