//! X.509 certificate inspection
//!
//! Read-only helpers over [`x509_cert::Certificate`]: the subject common name
//! used for the visible stamp, the validity window, and the SHA-256
//! fingerprint referenced by the ESS signing-certificate attribute.
//! Nothing here validates trust.

use crate::error::Result;
use chrono::{DateTime, Utc};
use der::asn1::ObjectIdentifier;
use der::{Encode, Tag, Tagged};
use sha2::{Digest, Sha256};
use x509_cert::name::Name;
use x509_cert::time::Time;
use x509_cert::Certificate;

const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Validity window of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl Validity {
    /// Whether `instant` falls inside the window (inclusive)
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

/// First common name (2.5.4.3) found in a distinguished name
pub fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == OID_COMMON_NAME)
        .and_then(|atv| decode_directory_string(atv.value.tag(), atv.value.value()))
}

/// Subject common name, falling back to the full subject DN
pub fn subject_common_name(cert: &Certificate) -> String {
    common_name(&cert.tbs_certificate.subject).unwrap_or_else(|| subject_dn(cert))
}

/// Subject distinguished name in RFC 4514 form
pub fn subject_dn(cert: &Certificate) -> String {
    cert.tbs_certificate.subject.to_string()
}

pub fn validity(cert: &Certificate) -> Validity {
    let window = &cert.tbs_certificate.validity;
    Validity {
        not_before: to_chrono(&window.not_before),
        not_after: to_chrono(&window.not_after),
    }
}

/// SHA-256 over the certificate's DER encoding
pub fn fingerprint_sha256(cert: &Certificate) -> Result<[u8; 32]> {
    let der = cert.to_der()?;
    Ok(Sha256::digest(&der).into())
}

fn to_chrono(time: &Time) -> DateTime<Utc> {
    let since_epoch = time.to_unix_duration();
    DateTime::<Utc>::from_timestamp(since_epoch.as_secs() as i64, 0).unwrap_or_default()
}

/// Decode the string flavours a DirectoryString may carry
fn decode_directory_string(tag: Tag, bytes: &[u8]) -> Option<String> {
    match tag {
        Tag::BmpString => {
            if bytes.len() % 2 != 0 {
                return None;
            }
            let units = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
        }
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(bytes).ok().map(str::to_owned)
        }
        _ => None,
    }
}
