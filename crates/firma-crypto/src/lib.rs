//! Key material and CMS signatures for PDF signing
//!
//! This crate loads PKCS#12 archives into [`KeyMaterial`] and builds the
//! detached CMS SignedData that a PDF signature dictionary carries.

pub mod cert;
pub mod cms;
pub mod error;
pub mod keys;

#[cfg(test)]
pub(crate) mod fixtures;

pub use cms::{sign_detached, AttributeProfile, CmsSignature};
pub use error::{CryptoError, Result};
pub use keys::{ensure_legacy_provider, KeyMaterial, PrivateKey, SignatureAlgorithm, SigningIdentity};
