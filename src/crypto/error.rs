use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Master key initialization failed: {0}")]
    Initialization(String),

    #[error("Authentication failed: ciphertext or IV was altered")]
    Authentication,

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Invalid IV length: expected {expected} bytes, got {actual}")]
    InvalidIv { expected: usize, actual: usize },

    #[error("Buffer too short: need at least {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
