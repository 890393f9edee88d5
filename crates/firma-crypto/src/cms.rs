//! CMS (Cryptographic Message Syntax) construction for PDF signatures
//!
//! Produces a detached SignedData over the two ByteRange spans of a PDF with
//! these signed attributes:
//! - content-type (id-data)
//! - message-digest (SHA-256 of the spans)
//! - signing-time, only for [`AttributeProfile::Pkcs7Detached`]
//! - signing-certificate-v2 (ESS, binds the signer certificate)
//!
//! PAdES baseline signatures (`ETSI.CAdES.detached`) must not carry
//! signing-time; the claimed time goes in the dictionary's `/M` instead.
//!
//! PKCS#1 v1.5 and RFC 6979 ECDSA are both deterministic, so equal inputs
//! and an equal signing time yield byte-identical output.

use crate::cert;
use crate::error::{CryptoError, Result};
use crate::keys::{SignatureAlgorithm, SigningIdentity};
use chrono::{DateTime, Datelike, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier,
    SignerInfo, SignerInfos,
};
use der::asn1::{GeneralizedTime, Null, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::{Any, Encode, Sequence};
use sha2::{Digest, Sha256};
use spki::AlgorithmIdentifierOwned;
use std::time::Duration;
use x509_cert::attr::Attribute;
use x509_cert::time::Time;

/// id-sha256: 2.16.840.1.101.3.4.2.1
pub const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// sha256WithRSAEncryption: 1.2.840.113549.1.1.11
pub const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// ecdsa-with-SHA256: 1.2.840.10045.4.3.2
pub const OID_ECDSA_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

/// id-data: 1.2.840.113549.1.7.1
pub const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");

/// id-signedData: 1.2.840.113549.1.7.2
pub const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// content-type attribute: 1.2.840.113549.1.9.3
pub const OID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");

/// message-digest attribute: 1.2.840.113549.1.9.4
pub const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// signing-time attribute: 1.2.840.113549.1.9.5
pub const OID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");

/// id-aa-signingCertificateV2: 1.2.840.113549.1.9.16.2.47
pub const OID_SIGNING_CERTIFICATE_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");

/// ESSCertIDv2 with the default (SHA-256) hash algorithm omitted
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct EssCertIdV2 {
    cert_hash: OctetString,
}

/// SigningCertificateV2 without policies
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct SigningCertificateV2 {
    certs: Vec<EssCertIdV2>,
}

/// Which signed attributes the SignerInfo carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttributeProfile {
    /// `adbe.pkcs7.detached`: includes signing-time
    #[default]
    Pkcs7Detached,
    /// `ETSI.CAdES.detached`: PAdES baseline, no signing-time
    CadesDetached,
}

/// DER-encoded ContentInfo wrapping a detached SignedData
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmsSignature {
    der: Vec<u8>,
    message_digest: [u8; 32],
}

impl CmsSignature {
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn len(&self) -> usize {
        self.der.len()
    }

    pub fn is_empty(&self) -> bool {
        self.der.is_empty()
    }

    /// SHA-256 over the signed spans, as carried in the message-digest attribute
    pub fn message_digest(&self) -> &[u8; 32] {
        &self.message_digest
    }
}

/// SHA-256 over `spans` in order, without concatenating them
pub fn digest_spans(spans: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for span in spans {
        hasher.update(span);
    }
    hasher.finalize().into()
}

/// Build a detached CMS SignedData over `spans`
///
/// # Arguments
/// * `spans` - The byte ranges being authenticated, in file order
/// * `identity` - Key and certificates of the signer
/// * `signing_time` - Instant recorded in the signing-time attribute
/// * `profile` - Attribute set matching the PDF sub-filter
pub fn sign_detached<I: SigningIdentity>(
    spans: &[&[u8]],
    identity: &I,
    signing_time: DateTime<Utc>,
    profile: AttributeProfile,
) -> Result<CmsSignature> {
    let message_digest = digest_spans(spans);
    let certificate = identity.certificate();

    let signing_time = (profile == AttributeProfile::Pkcs7Detached).then_some(signing_time);
    let signed_attrs = build_signed_attributes(&message_digest, signing_time, certificate)?;
    let to_be_signed = signed_attrs.to_der()?;
    let signature = identity.sign(&to_be_signed)?;

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: certificate.tbs_certificate.issuer.clone(),
            serial_number: certificate.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: sha256_algorithm(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: signature_algorithm(identity.signature_algorithm())?,
        signature: OctetString::new(signature)?,
        unsigned_attrs: None,
    };

    let certificates = std::iter::once(certificate)
        .chain(identity.chain())
        .map(|cert| CertificateChoices::Certificate(cert.clone()))
        .collect::<Vec<_>>();

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![sha256_algorithm()])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: OID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(certificates)?)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };

    let content_info = ContentInfo {
        content_type: OID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    let der = content_info.to_der()?;

    tracing::debug!(
        size = der.len(),
        algorithm = ?identity.signature_algorithm(),
        chain_len = identity.chain().len(),
        ?profile,
        "built CMS signature"
    );

    Ok(CmsSignature {
        der,
        message_digest,
    })
}

/// Signed attributes: content-type, message-digest, optional signing-time, signing-certificate-v2
fn build_signed_attributes(
    message_digest: &[u8; 32],
    signing_time: Option<DateTime<Utc>>,
    certificate: &x509_cert::Certificate,
) -> Result<SignedAttributes> {
    let cert_hash = cert::fingerprint_sha256(certificate)?;
    let signing_certificate = SigningCertificateV2 {
        certs: vec![EssCertIdV2 {
            cert_hash: OctetString::new(cert_hash.to_vec())?,
        }],
    };

    let mut attributes = vec![
        attribute(OID_CONTENT_TYPE, Any::encode_from(&OID_DATA)?)?,
        attribute(
            OID_MESSAGE_DIGEST,
            Any::encode_from(&OctetString::new(message_digest.to_vec())?)?,
        )?,
        attribute(
            OID_SIGNING_CERTIFICATE_V2,
            Any::encode_from(&signing_certificate)?,
        )?,
    ];
    if let Some(instant) = signing_time {
        attributes.push(attribute(
            OID_SIGNING_TIME,
            Any::encode_from(&asn1_time(instant)?)?,
        )?);
    }

    // DER SET OF ordering is applied by SetOfVec
    Ok(SetOfVec::try_from(attributes)?)
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

/// UTCTime through 2049, GeneralizedTime from 2050 on (RFC 5652, 11.3)
fn asn1_time(instant: DateTime<Utc>) -> Result<Time> {
    let secs = u64::try_from(instant.timestamp()).map_err(|_| {
        CryptoError::Signing(format!("signing time {instant} precedes the Unix epoch"))
    })?;
    let since_epoch = Duration::from_secs(secs);
    if instant.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_unix_duration(since_epoch)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_unix_duration(
            since_epoch,
        )?))
    }
}

fn sha256_algorithm() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: OID_SHA256,
        parameters: None,
    }
}

fn signature_algorithm(algorithm: SignatureAlgorithm) -> Result<AlgorithmIdentifierOwned> {
    Ok(match algorithm {
        SignatureAlgorithm::RsaPkcs1Sha256 => AlgorithmIdentifierOwned {
            oid: OID_SHA256_WITH_RSA,
            parameters: Some(Any::encode_from(&Null)?),
        },
        SignatureAlgorithm::EcdsaP256Sha256 => AlgorithmIdentifierOwned {
            oid: OID_ECDSA_SHA256,
            parameters: None,
        },
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: digesting split spans equals digesting the concatenation
        #[test]
        fn span_digest_is_split_invariant(
            data in prop::collection::vec(any::<u8>(), 0..2048),
            split in 0usize..2048,
        ) {
            let split = split.min(data.len());
            let (left, right) = data.split_at(split);
            prop_assert_eq!(digest_spans(&[left, right]), <[u8; 32]>::from(Sha256::digest(&data)));
        }
    }
}
