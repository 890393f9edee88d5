//! Firma signing pipeline
//!
//! Loads key material, optionally stamps the document, reserves a signature
//! placeholder, signs the two byte-range spans and writes the result
//! atomically next to the requested output path.
//!
//! ```no_run
//! use firma_core::{sign, SignRequest, SignerConfig};
//!
//! # fn example() -> Result<(), firma_core::SignError> {
//! let request = SignRequest::new("contract.pdf", "signer.p12", "secret").with_visible(true);
//! let output = sign(&request, &SignerConfig::default())?;
//! println!("signed: {}", output.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;

pub use config::{ConfigError, SignerConfig};
pub use error::{ErrorKind, Result, SignError};
pub use firma_crypto::{KeyMaterial, SigningIdentity};
pub use firma_pdf::{Placement, SignatureDescriptor, SubFilter};

use chrono::{FixedOffset, Offset, Utc};
use firma_crypto::AttributeProfile;
use firma_pdf::{composite, finalize, reserve, PdfDocument, WatermarkSpec};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Inputs of one signing run
#[derive(Clone)]
pub struct SignRequest {
    pub input: PathBuf,
    /// PKCS#12 archive with key, certificate and chain
    pub certificate: PathBuf,
    pub password: String,
    /// Defaults to `<stem>_signed.pdf` next to the input
    pub output: Option<PathBuf>,
    pub visible: bool,
    /// Rotated stamp along the left margin; needs `visible`
    pub vertical_left: bool,
    /// Stamp every page; needs `visible`
    pub all_pages: bool,
    /// Offset the stamp date is shown in (default: UTC)
    pub utc_offset: FixedOffset,
}

impl SignRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        certificate: impl Into<PathBuf>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            certificate: certificate.into(),
            password: password.into(),
            output: None,
            visible: false,
            vertical_left: false,
            all_pages: false,
            utc_offset: Utc.fix(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_vertical_left(mut self, vertical_left: bool) -> Self {
        self.vertical_left = vertical_left;
        self
    }

    pub fn with_all_pages(mut self, all_pages: bool) -> Self {
        self.all_pages = all_pages;
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }

    fn placement(&self) -> Placement {
        if self.vertical_left {
            Placement::VerticalLeft
        } else {
            Placement::BottomLeft
        }
    }
}

impl fmt::Debug for SignRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignRequest")
            .field("input", &self.input)
            .field("certificate", &self.certificate)
            .field("password", &"<redacted>")
            .field("output", &self.output)
            .field("visible", &self.visible)
            .field("vertical_left", &self.vertical_left)
            .field("all_pages", &self.all_pages)
            .field("utc_offset", &self.utc_offset)
            .finish()
    }
}

/// `<dir>/<stem>_signed.pdf` for `<dir>/<stem>.<ext>`
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}_signed.pdf"))
}

/// Sign the file named by `request` and return the path written
#[tracing::instrument(skip_all, fields(input = %request.input.display()))]
pub fn sign(request: &SignRequest, config: &SignerConfig) -> Result<PathBuf> {
    let pdf = fs::read(&request.input).map_err(|e| SignError::io(&request.input, e))?;
    let archive =
        fs::read(&request.certificate).map_err(|e| SignError::io(&request.certificate, e))?;

    let key = KeyMaterial::from_pkcs12(&archive, &request.password)?;
    tracing::info!(
        signer = %key.common_name(),
        algorithm = ?key.algorithm(),
        chain = key.chain().len(),
        "loaded key material"
    );

    let now = Utc::now();
    if !key.validity().contains(now) {
        tracing::warn!(
            signer = %key.common_name(),
            "certificate is outside its validity window"
        );
    }

    let mut descriptor = config
        .descriptor(now)
        .with_all_pages(request.all_pages)
        .with_stamp_offset(request.utc_offset);
    if request.visible {
        descriptor = descriptor.with_stamp(request.placement());
    }

    let signed = sign_bytes(pdf, &key, &descriptor, config)?;
    drop(key);

    let output = request.output_path();
    write_atomically(&output, &signed)?;
    tracing::info!(output = %output.display(), bytes = signed.len(), "wrote signed document");
    Ok(output)
}

/// Run the pipeline on in-memory bytes
///
/// The stamp text uses the signer's common name and the signing time in the
/// descriptor's stamp offset. Identical inputs and descriptor give identical
/// output.
pub fn sign_bytes(
    pdf: Vec<u8>,
    key: &KeyMaterial,
    descriptor: &SignatureDescriptor,
    config: &SignerConfig,
) -> Result<Vec<u8>> {
    let mut document = PdfDocument::from_bytes(pdf)?;
    if document.page_count() == 0 {
        return Err(SignError::EmptyDocument);
    }

    if descriptor.visible {
        let spec = WatermarkSpec::for_signer(
            &key.common_name(),
            &descriptor.stamp_time(),
            descriptor.placement,
        );
        let stamped = composite(
            &document,
            &spec,
            descriptor.stamp_pages(),
            &config.watermark,
        )?;
        document = PdfDocument::from_bytes(stamped)?;
    }

    let prepared = reserve(&document, descriptor, config.signature_size)?;
    let signature = firma_crypto::sign_detached(
        &prepared.signed_spans()?,
        key,
        descriptor.signing_time,
        attribute_profile(descriptor.sub_filter),
    )?;
    tracing::debug!(
        cms_bytes = signature.len(),
        reserved = prepared.reserved_bytes(),
        "built CMS signature"
    );

    Ok(finalize(prepared, signature.as_der())?)
}

/// CMS attribute set each sub-filter requires
fn attribute_profile(sub_filter: SubFilter) -> AttributeProfile {
    match sub_filter {
        SubFilter::AdbePkcs7Detached => AttributeProfile::Pkcs7Detached,
        SubFilter::EtsiCadesDetached => AttributeProfile::CadesDetached,
    }
}

/// Write through a temp file in the destination directory, then rename
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| SignError::io(dir, e))?;
    file.write_all(bytes)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| SignError::io(path, e))?;
    file.persist(path)
        .map_err(|e| SignError::io(path, e.error))?;
    Ok(())
}
