use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Failed to read key material from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid password or corrupted certificate file")]
    InvalidPassword,

    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("DER encoding failed: {0}")]
    Encoding(#[from] der::Error),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
