use thiserror::Error;

/// Errors raised by the simulation engine.
///
/// Precondition violations (bad indices, malformed breakpoint lists, empty
/// populations) are caller bugs and are always reported. `Invariant` is only
/// produced when invariant checking is switched on.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("population size must be positive")]
    EmptyPopulation,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("{kind} index {index} out of range (len = {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },
    #[error("malformed breakpoint list: {0}")]
    MalformedBreakpoints(String),
    #[error("position {0} is already occupied by a segregating mutation")]
    PositionCollision(f64),
    #[error("diploid {index} has invalid fitness {value}")]
    InvalidFitness { index: usize, value: f64 },
    #[error("all {0} diploids have zero fitness")]
    ZeroFitness(usize),
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub(crate) fn index(kind: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { kind, index, len }
    }
}
