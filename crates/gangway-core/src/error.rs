use thiserror::Error;

#[derive(Error, Debug)]
pub enum GangwayError {
    #[error("malformed tree item: {0}")]
    Meta(String),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GangwayError>;
