//! PKCS#12 key material and the signing identity abstraction
//!
//! The archive is decrypted with OpenSSL, then the private key and the
//! certificates are re-read into RustCrypto types so the rest of the crate
//! only deals with `rsa`, `p256` and `x509-cert` values.

use crate::cert::{self, Validity};
use crate::error::{CryptoError, Result};
use der::Decode;
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{Id, PKey, Private};
use openssl::provider::Provider;
use openssl::x509::X509;
use pkcs8::DecodePrivateKey;
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use x509_cert::Certificate;
use zeroize::Zeroizing;

/// OpenSSL 3 legacy provider, loaded once and kept for the process lifetime
static LEGACY_PROVIDER: OnceLock<Option<Provider>> = OnceLock::new();

/// Load the legacy provider next to the default one
///
/// Archives exported with RC2-40 (`openssl pkcs12 -legacy`, older Windows and
/// CA tooling) only decrypt with it. Returns whether it is available.
pub fn ensure_legacy_provider() -> bool {
    LEGACY_PROVIDER
        .get_or_init(|| match Provider::try_load(None, "legacy", true) {
            Ok(provider) => Some(provider),
            Err(e) => {
                tracing::warn!(error = %e, "OpenSSL legacy provider unavailable");
                None
            }
        })
        .is_some()
}

/// Algorithm a key signs with inside a CMS SignerInfo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// sha256WithRSAEncryption (PKCS#1 v1.5)
    RsaPkcs1Sha256,
    /// ecdsa-with-SHA256 on P-256
    EcdsaP256Sha256,
}

/// Trait for any identity that can sign documents
pub trait SigningIdentity {
    /// End-entity certificate
    fn certificate(&self) -> &Certificate;

    /// Intermediate certificates to embed after the end-entity certificate
    fn chain(&self) -> &[Certificate] {
        &[]
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm;

    /// Sign raw data, hashing it with SHA-256 first
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Get the signer name (certificate common name, or the subject DN)
    fn signer_name(&self) -> String {
        cert::subject_common_name(self.certificate())
    }
}

/// Private key of a supported algorithm
///
/// Both variants zeroize their secret material on drop.
pub enum PrivateKey {
    Rsa(rsa::RsaPrivateKey),
    EcP256(p256::SecretKey),
}

impl PrivateKey {
    fn from_openssl(pkey: &PKey<Private>) -> Result<Self> {
        let id = pkey.id();
        let der = pkey
            .private_key_to_pkcs8()
            .map(Zeroizing::new)
            .map_err(|e| CryptoError::MalformedCertificate(format!("private key export: {e}")))?;

        if id == Id::RSA {
            let key = rsa::RsaPrivateKey::from_pkcs8_der(der.as_slice())
                .map_err(|e| CryptoError::MalformedCertificate(format!("RSA key: {e}")))?;
            return Ok(Self::Rsa(key));
        }

        if id == Id::EC {
            let curve = pkey.ec_key().ok().and_then(|ec| ec.group().curve_name());
            return match curve {
                Some(Nid::X9_62_PRIME256V1) => {
                    let key = p256::SecretKey::from_pkcs8_der(der.as_slice())
                        .map_err(|e| CryptoError::MalformedCertificate(format!("EC key: {e}")))?;
                    Ok(Self::EcP256(key))
                }
                Some(other) => Err(CryptoError::UnsupportedKeyType(format!(
                    "EC curve {}",
                    other.short_name().unwrap_or("unnamed")
                ))),
                None => Err(CryptoError::UnsupportedKeyType(
                    "EC key with explicit curve parameters".to_string(),
                )),
            };
        }

        let name = Nid::from_raw(id.as_raw())
            .short_name()
            .unwrap_or("unknown");
        Err(CryptoError::UnsupportedKeyType(name.to_string()))
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Rsa(_) => SignatureAlgorithm::RsaPkcs1Sha256,
            Self::EcP256(_) => SignatureAlgorithm::EcdsaP256Sha256,
        }
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Rsa(key) => sign_rsa(key, data),
            Self::EcP256(key) => sign_ecdsa(key, data),
        }
    }
}

fn sign_rsa(key: &rsa::RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::{SignatureEncoding, Signer};

    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let signature = signing_key
        .try_sign(data)
        .map_err(|e| CryptoError::Signing(e.to_string()))?;
    Ok(signature.to_vec())
}

fn sign_ecdsa(key: &p256::SecretKey, data: &[u8]) -> Result<Vec<u8>> {
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};

    let signing_key = SigningKey::from(key);
    let signature: Signature = signing_key
        .try_sign(data)
        .map_err(|e| CryptoError::Signing(e.to_string()))?;
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Private key, end-entity certificate and chain from one PKCS#12 archive
pub struct KeyMaterial {
    key: PrivateKey,
    certificate: Certificate,
    chain: Vec<Certificate>,
}

impl KeyMaterial {
    /// Read and decrypt a PKCS#12 file
    ///
    /// An empty password is a real password, not "none".
    pub fn load(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CryptoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "read PKCS#12 archive");
        Self::from_pkcs12(&bytes, password)
    }

    /// Decrypt an in-memory PKCS#12 archive
    pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Self> {
        let archive = Pkcs12::from_der(der).map_err(|_| CryptoError::InvalidPassword)?;
        ensure_legacy_provider();
        let parsed = archive.parse2(password).map_err(decryption_error)?;

        let pkey = parsed.pkey.ok_or_else(|| {
            CryptoError::MalformedCertificate("archive contains no private key".to_string())
        })?;
        let key = PrivateKey::from_openssl(&pkey)?;

        let mut candidates: Vec<X509> = Vec::new();
        if let Some(cert) = parsed.cert {
            candidates.push(cert);
        }
        if let Some(ca) = parsed.ca {
            candidates.extend(ca);
        }
        if candidates.is_empty() {
            return Err(CryptoError::MalformedCertificate(
                "archive contains no certificate".to_string(),
            ));
        }

        let leaf_index = candidates
            .iter()
            .position(|cert| {
                cert.public_key()
                    .map(|public| public.public_eq(&pkey))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                CryptoError::MalformedCertificate(
                    "no certificate matches the private key".to_string(),
                )
            })?;
        let leaf_der = to_der(&candidates.remove(leaf_index))?;
        let certificate = parse_certificate(&leaf_der)?;

        let mut seen = vec![leaf_der];
        let mut chain = Vec::new();
        for cert in candidates {
            let der = to_der(&cert)?;
            if seen.contains(&der) {
                continue;
            }
            chain.push(parse_certificate(&der)?);
            seen.push(der);
        }

        tracing::debug!(
            algorithm = ?key.algorithm(),
            chain_len = chain.len(),
            fingerprint = %hex::encode(cert::fingerprint_sha256(&certificate)?),
            "loaded key material"
        );

        Ok(Self {
            key,
            certificate,
            chain,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.key.algorithm()
    }

    /// Subject common name, falling back to the subject DN
    pub fn common_name(&self) -> String {
        cert::subject_common_name(&self.certificate)
    }

    pub fn subject(&self) -> String {
        cert::subject_dn(&self.certificate)
    }

    pub fn validity(&self) -> Validity {
        cert::validity(&self.certificate)
    }
}

impl SigningIdentity for KeyMaterial {
    fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.key.algorithm()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.key.sign(data)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"<redacted>")
            .field("algorithm", &self.key.algorithm())
            .field("subject", &self.subject())
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

/// A wrong password fails the MAC check; a missing cipher reports "unsupported"
fn decryption_error(stack: ErrorStack) -> CryptoError {
    let unsupported = stack
        .errors()
        .iter()
        .any(|e| e.reason().is_some_and(|reason| reason.contains("unsupported")));
    if unsupported {
        CryptoError::UnsupportedKeyType(format!(
            "archive encryption algorithm unavailable: {stack}"
        ))
    } else {
        CryptoError::InvalidPassword
    }
}

fn to_der(cert: &X509) -> Result<Vec<u8>> {
    cert.to_der()
        .map_err(|e| CryptoError::MalformedCertificate(format!("certificate export: {e}")))
}

fn parse_certificate(der: &[u8]) -> Result<Certificate> {
    Certificate::from_der(der).map_err(|e| CryptoError::MalformedCertificate(e.to_string()))
}
