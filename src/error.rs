use thiserror::Error;

/// Failure of a single optimize call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimizeError {
    /// Malformed request: empty lesson group, bad time range, weekend lesson, ...
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Valid input, but no conflict-free timetable was found.
    #[error("no conflict-free timetable found (nodes searched: {nodes}, budget exhausted: {budget_exhausted})")]
    Infeasible { nodes: u64, budget_exhausted: bool },

    /// The caller aborted the search.
    #[error("optimization cancelled")]
    Cancelled,

    /// An optimize call is already running on this session.
    #[error("an optimization is already running")]
    Busy,
}

impl OptimizeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        OptimizeError::InvalidInput(message.into())
    }
}

/// Errors surfaced by the binaries and the file adapters.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Optimize(#[from] OptimizeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(Box::new(err))
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
