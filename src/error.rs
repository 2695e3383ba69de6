use thiserror::Error;

#[derive(Error, Debug)]
pub enum DavisError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("numerical instability in basis matrix ({n},{k}): {detail}")]
    NumericalInstability { n: usize, k: usize, detail: String },

    #[error("dependency error: {0}")]
    Dependency(String),

    #[error("precalculation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DavisResult<T> = Result<T, DavisError>;
