#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Math(#[from] math::Error),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error("diffuse initialization is not supported by the ordinary filter")]
    DiffuseInitialization,
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("invalid range [{start}, {end}) for length {len}")]
    InvalidRange {
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("filter output at position {0} has no covariance")]
    MissingCovariance(usize),
    #[error("no filter output at position {0}")]
    MissingFilterOutput(usize),
    #[error("smoother not started")]
    NotStarted,
}
