use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the sampling, estimation and significance stages.
///
/// Arithmetic edge cases (empty samples, zero relative frequencies) are not
/// errors; they are recovered where they occur.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no TOTALS row found and corpus sizes were not supplied (use --ssc_words and --lec_words)")]
    MissingTotalsRow,

    #[error("invalid {corpus} corpus size: {value} (must be a finite number > 0)")]
    InvalidCorpusSize { corpus: &'static str, value: f64 },

    #[error("{context}: {message}")]
    Schema { context: String, message: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn schema(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            context: context.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Error::Csv {
            path: path.into(),
            source,
        }
    }
}
