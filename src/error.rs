use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing data key: {0}")]
    MissingKey(String),

    #[error("Missing metadata field: {0}")]
    MissingMetadata(String),

    #[error("Numeric instability: {0}")]
    NumericInstability(String),
}

pub type Result<T> = std::result::Result<T, Error>;
