use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("parameter vector has {actual} entries, expected {expected} for {clubs} clubs")]
    InvalidVectorLength {
        actual: usize,
        expected: usize,
        clubs: usize,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("club `{0}` is not registered for this season")]
    UnknownClub(String),

    #[error("malformed result `{0}`: expected two non-negative goal counts like `2 x 1`")]
    MalformedResult(String),

    #[error("season {year} lists more than {limit} clubs (first extra club: `{club}`)")]
    SeasonSizeExceeded { year: i32, limit: usize, club: String },

    #[error("no fixtures scheduled in round {round} of {year}")]
    EmptyRound { year: i32, round: u32 },

    #[error("cannot train a model on an empty fit set")]
    EmptyFitSet,

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("optimizer failed: {0}")]
    Optimizer(String),
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::Dataset(err.to_string())
    }
}

impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        ForecastError::Dataset(err.to_string())
    }
}
