use firma_crypto::CryptoError;
use firma_pdf::PdfError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure categories callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    InvalidPassword,
    MalformedCertificate,
    UnsupportedKeyType,
    EmptyDocument,
    EncodingOverflow,
    SigningError,
    MalformedDocument,
}

#[derive(Error, Debug)]
pub enum SignError {
    #[error("{}: {source}", .path.display())]
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

    #[error("Document has no pages")]
    EmptyDocument,

    #[error("Signature needs {needed} bytes but only {reserved} were reserved")]
    EncodingOverflow { needed: usize, reserved: usize },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Malformed PDF: {0}")]
    MalformedDocument(String),
}

impl SignError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::InvalidPassword => ErrorKind::InvalidPassword,
            Self::MalformedCertificate(_) => ErrorKind::MalformedCertificate,
            Self::UnsupportedKeyType(_) => ErrorKind::UnsupportedKeyType,
            Self::EmptyDocument => ErrorKind::EmptyDocument,
            Self::EncodingOverflow { .. } => ErrorKind::EncodingOverflow,
            Self::Signing(_) => ErrorKind::SigningError,
            Self::MalformedDocument(_) => ErrorKind::MalformedDocument,
        }
    }
}

impl From<CryptoError> for SignError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Io { path, source } => Self::io(path, source),
            CryptoError::InvalidPassword => Self::InvalidPassword,
            CryptoError::MalformedCertificate(msg) => Self::MalformedCertificate(msg),
            CryptoError::UnsupportedKeyType(msg) => Self::UnsupportedKeyType(msg),
            CryptoError::Signing(msg) => Self::Signing(msg),
            CryptoError::Encoding(e) => Self::Signing(format!("DER encoding failed: {e}")),
        }
    }
}

impl From<PdfError> for SignError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::EmptyDocument => Self::EmptyDocument,
            PdfError::EncodingOverflow { needed, reserved } => {
                Self::EncodingOverflow { needed, reserved }
            }
            other => Self::MalformedDocument(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_errors_map_to_taxonomy() {
        let cases = [
            (PdfError::EmptyDocument, ErrorKind::EmptyDocument),
            (
                PdfError::EncodingOverflow {
                    needed: 20_000,
                    reserved: 16_384,
                },
                ErrorKind::EncodingOverflow,
            ),
            (PdfError::Encrypted, ErrorKind::MalformedDocument),
            (
                PdfError::ParseError("bad xref".to_string()),
                ErrorKind::MalformedDocument,
            ),
            (
                PdfError::PageNotFound { index: 4, count: 1 },
                ErrorKind::MalformedDocument,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(SignError::from(err).kind(), kind);
        }
    }

    #[test]
    fn test_crypto_errors_map_to_taxonomy() {
        assert_eq!(
            SignError::from(CryptoError::InvalidPassword).kind(),
            ErrorKind::InvalidPassword
        );
        assert_eq!(
            SignError::from(CryptoError::UnsupportedKeyType("Ed25519".to_string())).kind(),
            ErrorKind::UnsupportedKeyType
        );
        assert_eq!(
            SignError::from(CryptoError::Signing("bad digest".to_string())).kind(),
            ErrorKind::SigningError
        );
    }

    #[test]
    fn test_key_material_io_keeps_path() {
        let crypto =
            firma_crypto::KeyMaterial::load("/nonexistent/firma/id.p12", "pw").unwrap_err();
        let err = SignError::from(crypto);
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(matches!(&err, SignError::Io { path, .. } if path.ends_with("id.p12")));
        assert!(err.to_string().starts_with("/nonexistent/firma/id.p12"));
    }

    #[test]
    fn test_overflow_message_names_both_sizes() {
        let err = SignError::from(PdfError::EncodingOverflow {
            needed: 20_000,
            reserved: 16_384,
        });
        let message = err.to_string();
        assert!(message.contains("20000"));
        assert!(message.contains("16384"));
    }

    #[test]
    fn test_io_message_includes_path() {
        let err = SignError::io(
            "missing.pdf",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().starts_with("missing.pdf"));
    }
}
