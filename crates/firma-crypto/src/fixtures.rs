//! Throwaway keys, certificates and PKCS#12 archives for unit tests

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::{X509Name, X509NameBuilder, X509};
use std::sync::atomic::{AtomicU32, Ordering};

static SERIAL: AtomicU32 = AtomicU32::new(1);

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub fn p256_key() -> PKey<Private> {
    ec_key(Nid::X9_62_PRIME256V1)
}

pub fn p384_key() -> PKey<Private> {
    ec_key(Nid::SECP384R1)
}

fn ec_key(curve: Nid) -> PKey<Private> {
    let group = EcGroup::from_curve_name(curve).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(cn: Option<&str>, org: Option<&str>) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    if let Some(org) = org {
        builder.append_entry_by_nid(Nid::ORGANIZATIONNAME, org).unwrap();
    }
    if let Some(cn) = cn {
        builder.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    }
    builder.build()
}

/// Certificate for `subject_key` signed by `issuer_key` under `issuer_name`
pub fn certificate(
    subject: &X509Name,
    subject_key: &PKey<Private>,
    issuer: &X509Name,
    issuer_key: &PKey<Private>,
) -> X509 {
    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(SERIAL.fetch_add(1, Ordering::Relaxed))
        .unwrap()
        .to_asn1_integer()
        .unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(subject).unwrap();
    builder.set_issuer_name(issuer).unwrap();
    builder.set_pubkey(subject_key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(issuer_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

pub fn self_signed(cn: &str, key: &PKey<Private>) -> X509 {
    let subject = name(Some(cn), None);
    certificate(&subject, key, &subject, key)
}

pub fn self_signed_with_org_only(org: &str, key: &PKey<Private>) -> X509 {
    let subject = name(None, Some(org));
    certificate(&subject, key, &subject, key)
}

/// Leaf issued by a fresh intermediate, returned as (leaf, intermediate)
pub fn issued_by_intermediate(cn: &str, key: &PKey<Private>) -> (X509, X509) {
    let ca_key = p256_key();
    let ca_name = name(Some("Firma Test CA"), Some("Firma"));
    let ca = certificate(&ca_name, &ca_key, &ca_name, &ca_key);
    let leaf = certificate(&name(Some(cn), None), key, &ca_name, &ca_key);
    (leaf, ca)
}

pub fn pkcs12(password: &str, key: &PKey<Private>, cert: &X509, chain: &[X509]) -> Vec<u8> {
    let mut builder = Pkcs12::builder();
    builder.name("firma").pkey(key).cert(cert);
    if !chain.is_empty() {
        let mut stack = Stack::new().unwrap();
        for ca in chain {
            stack.push(ca.clone()).unwrap();
        }
        builder.ca(stack);
    }
    builder.build2(password).unwrap().to_der().unwrap()
}

/// Archive with explicit key and certificate-bag encryption, SHA-1 MAC
pub fn pkcs12_with(
    password: &str,
    key: &PKey<Private>,
    cert: &X509,
    key_algorithm: Nid,
    cert_algorithm: Nid,
) -> Vec<u8> {
    let mut builder = Pkcs12::builder();
    builder
        .name("firma")
        .pkey(key)
        .cert(cert)
        .key_algorithm(key_algorithm)
        .cert_algorithm(cert_algorithm)
        .mac_md(MessageDigest::sha1());
    builder.build2(password).unwrap().to_der().unwrap()
}

/// What `openssl pkcs12 -export -legacy` writes: 3DES key bag, RC2-40 certificates
pub fn legacy_pkcs12(password: &str, key: &PKey<Private>, cert: &X509) -> Vec<u8> {
    pkcs12_with(
        password,
        key,
        cert,
        Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC,
        Nid::PBE_WITHSHA1AND40BITRC2_CBC,
    )
}
