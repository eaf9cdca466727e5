#[derive(Debug, thiserror::Error)]
pub enum DaoError {
    #[error("Resource not found")]
    NotFound,
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type DaoResult<T> = Result<T, DaoError>;
