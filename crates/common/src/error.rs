use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrataError {
    #[error("configuration error: {0}")]
    Config(String),

    /// A credential reference that cannot be turned into a secret.
    #[error("credential error: {0}")]
    Credential(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type StrataResult<T> = Result<T, StrataError>;
