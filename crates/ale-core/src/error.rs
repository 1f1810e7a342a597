use thiserror::Error;

#[derive(Error, Debug)]
pub enum AleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid experiment '{article}': {reason}")]
    InvalidExperiment { article: String, reason: String },

    #[error("Subject count must be positive, got {0}")]
    InvalidSubjects(i64),

    #[error("Empty experiment set")]
    EmptyExperimentSet,

    #[error("Invalid volume file: {0}")]
    InvalidVolume(String),

    #[error("Volume shape {actual:?} does not match grid {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error("Invalid subsample request: target_n {target_n} of total_n {total_n}")]
    InvalidSubsample { total_n: usize, target_n: usize },

    #[error("Result '{0}' not found in store")]
    MissingResult(String),

    #[error("Histogram error: {0}")]
    Histogram(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AleError>;
