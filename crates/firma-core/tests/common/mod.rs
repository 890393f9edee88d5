//! Shared fixtures for pipeline tests
#![allow(dead_code)]

use lopdf::{Dictionary, Document, Object, Stream};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Name, X509NameBuilder, X509};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

static SERIAL: AtomicU32 = AtomicU32::new(100);

pub const PASSWORD: &str = "correct horse";

// ============================================================
// Keys and certificates
// ============================================================

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub fn ec_key(curve: Nid) -> PKey<Private> {
    let group = EcGroup::from_curve_name(curve).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

pub fn name(cn: &str) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    builder.build()
}

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
    let subject = name(cn);
    certificate(&subject, key, &subject, key)
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

/// A PKCS#12 file on disk plus the certificate it holds
pub struct Identity {
    pub path: PathBuf,
    pub certificate: X509,
}

pub fn write_identity(dir: &Path, file: &str, cn: &str, key: &PKey<Private>) -> Identity {
    let certificate = self_signed(cn, key);
    let path = dir.join(file);
    std::fs::write(&path, pkcs12(PASSWORD, key, &certificate, &[])).unwrap();
    Identity { path, certificate }
}

/// Leaf issued under a chain of `depth` RSA intermediates
pub fn write_chained_identity(dir: &Path, cn: &str, depth: usize) -> Identity {
    let mut issuer_key = rsa_key();
    let mut issuer_name = name("Firma Root");
    let mut chain = vec![certificate(&issuer_name, &issuer_key, &issuer_name, &issuer_key)];
    for level in 0..depth {
        let key = rsa_key();
        let subject = name(&format!("Firma Intermediate {level}"));
        chain.push(certificate(&subject, &key, &issuer_name, &issuer_key));
        issuer_key = key;
        issuer_name = subject;
    }

    let key = rsa_key();
    let leaf = certificate(&name(cn), &key, &issuer_name, &issuer_key);
    let path = dir.join("chained.p12");
    std::fs::write(&path, pkcs12(PASSWORD, &key, &leaf, &chain)).unwrap();
    Identity {
        path,
        certificate: leaf,
    }
}

// ============================================================
// Documents
// ============================================================

/// US Letter pages, each drawing `<prefix>-Page-<n>`
pub fn create_test_pdf(num_pages: u32, content_prefix: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut page_ids = Vec::new();

    for page_num in 0..num_pages {
        let content = format!(
            "BT /F1 12 Tf 50 700 Td ({}-Page-{}) Tj ET",
            content_prefix,
            page_num + 1
        );
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Contents", Object::Reference(content_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        );
        page_ids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(i64::from(num_pages)));
    pages.set("Kids", Object::Array(page_ids));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

// ============================================================
// Signature inspection
// ============================================================

/// The last `/ByteRange` array in the file
pub fn byte_range(bytes: &[u8]) -> [usize; 4] {
    let marker = b"/ByteRange";
    let at = (0..=bytes.len() - marker.len())
        .rev()
        .find(|&i| &bytes[i..i + marker.len()] == marker)
        .expect("no /ByteRange");
    let open = at + bytes[at..].iter().position(|&b| b == b'[').unwrap();
    let close = open + bytes[open..].iter().position(|&b| b == b']').unwrap();
    let values: Vec<usize> = std::str::from_utf8(&bytes[open + 1..close])
        .unwrap()
        .split_whitespace()
        .map(|v| v.parse().unwrap())
        .collect();
    [values[0], values[1], values[2], values[3]]
}

/// Length of the DER TLV at the start of `bytes`
pub fn der_len(bytes: &[u8]) -> usize {
    let first = bytes[1];
    if first < 0x80 {
        return 2 + usize::from(first);
    }
    let count = usize::from(first & 0x7f);
    let len = bytes[2..2 + count]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
    2 + count + len
}

/// Signed spans and the trimmed CMS blob of the last signature
pub fn extract_signature(bytes: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let [start1, len1, start2, len2] = byte_range(bytes);
    assert_eq!(start1, 0);
    assert_eq!(start2 + len2, bytes.len(), "ByteRange must reach end of file");
    assert_eq!(bytes[len1], b'<');
    assert_eq!(bytes[start2 - 1], b'>');

    let mut signed = bytes[start1..start1 + len1].to_vec();
    signed.extend_from_slice(&bytes[start2..start2 + len2]);

    let padded = hex::decode(&bytes[len1 + 1..start2 - 1]).unwrap();
    let der = padded[..der_len(&padded)].to_vec();
    (signed, der)
}

/// Verify the last signature with OpenSSL over exactly the ByteRange spans
pub fn verify_with_openssl(bytes: &[u8]) -> Result<(), openssl::error::ErrorStack> {
    let (signed, der) = extract_signature(bytes);
    let pkcs7 = Pkcs7::from_der(&der)?;
    let store = X509StoreBuilder::new()?.build();
    let extra: Stack<X509> = Stack::new()?;
    pkcs7.verify(
        &extra,
        &store,
        Some(&signed),
        None,
        Pkcs7Flags::NOVERIFY | Pkcs7Flags::BINARY,
    )
}

/// Page count as lopdf sees it
pub fn page_count(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).unwrap().get_pages().len()
}
