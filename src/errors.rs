use miette::Diagnostic;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthError {
    #[error("invalid credentials")]
    #[diagnostic(code(palisade::invalid_credentials))]
    InvalidCredentials,

    #[error("invalid or expired token")]
    #[diagnostic(code(palisade::invalid_token))]
    InvalidToken,

    #[error("{0} not found")]
    #[diagnostic(code(palisade::not_found))]
    NotFound(String),

    #[error("{0}")]
    #[diagnostic(code(palisade::conflict))]
    Conflict(String),

    #[error("{0}")]
    #[diagnostic(code(palisade::validation))]
    Validation(String),

    #[error("maximum role inheritance depth exceeded")]
    #[diagnostic(code(palisade::max_depth))]
    MaxDepthExceeded,

    #[error("password hashing failed: {0}")]
    #[diagnostic(code(palisade::hash))]
    Hash(String),

    #[error("store error: {0}")]
    #[diagnostic(code(palisade::store))]
    Store(#[from] StoreError),

    #[error("auth provider error: {0}")]
    #[diagnostic(code(palisade::provider))]
    Provider(String),

    #[error("config error: {0}")]
    #[diagnostic(code(palisade::config))]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(palisade::io))]
    Io(#[from] std::io::Error),
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(value: bcrypt::BcryptError) -> Self {
        AuthError::Hash(value.to_string())
    }
}
