//! Signer configuration
//!
//! Everything a signing run needs besides its inputs: signature dictionary
//! metadata, the placeholder budget and the stamp layout. Loaded from TOML;
//! every field has a default so partial files work.

use chrono::{DateTime, Utc};
use firma_pdf::{
    CompositorConfig, SignatureDescriptor, SubFilter, DEFAULT_RESERVED_BYTES, MAX_RESERVED_BYTES,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// `/Reason` of the signature dictionary
    pub reason: String,
    /// `/Location`, omitted when empty
    pub location: String,
    /// `/ContactInfo`, omitted when empty
    pub contact: String,
    pub sub_filter: SubFilter,
    /// Bytes reserved for the CMS blob (default: 16384)
    pub signature_size: usize,
    /// Layout of the visible stamp
    pub watermark: CompositorConfig,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            reason: "Signed with Firma".to_string(),
            location: String::new(),
            contact: String::new(),
            sub_filter: SubFilter::default(),
            signature_size: DEFAULT_RESERVED_BYTES,
            watermark: CompositorConfig::default(),
        }
    }
}

impl SignerConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - A value is out of range
    ///
    /// # Example
    ///
    /// ```no_run
    /// use firma_core::SignerConfig;
    ///
    /// # fn example() -> Result<(), firma_core::ConfigError> {
    /// let config = SignerConfig::from_file("firma.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Example
    ///
    /// ```
    /// use firma_core::SignerConfig;
    ///
    /// # fn example() -> Result<(), firma_core::ConfigError> {
    /// let toml = r#"
    ///     reason = "Approved"
    ///     signature_size = 32768
    ///
    ///     [watermark]
    ///     font_size = 9.0
    /// "#;
    /// let config = SignerConfig::from_toml_str(toml)?;
    /// assert_eq!(config.signature_size, 32768);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signature_size == 0 || self.signature_size > MAX_RESERVED_BYTES {
            return Err(ConfigError::Invalid(format!(
                "signature_size must be between 1 and {MAX_RESERVED_BYTES}, got {}",
                self.signature_size
            )));
        }

        let w = &self.watermark;
        let positive = [
            ("watermark.font_size", w.font_size),
            ("watermark.default_page_size[0]", w.default_page_size[0]),
            ("watermark.default_page_size[1]", w.default_page_size[1]),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        let finite = [
            ("watermark.line_spacing", w.line_spacing),
            ("watermark.left_margin", w.left_margin),
            ("watermark.origin[0]", w.origin[0]),
            ("watermark.origin[1]", w.origin[1]),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!("{name} must be finite")));
        }
        Ok(())
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    pub fn with_sub_filter(mut self, sub_filter: SubFilter) -> Self {
        self.sub_filter = sub_filter;
        self
    }

    pub fn with_signature_size(mut self, bytes: usize) -> Self {
        self.signature_size = bytes;
        self
    }

    pub fn with_watermark(mut self, watermark: CompositorConfig) -> Self {
        self.watermark = watermark;
        self
    }

    /// Signature metadata for one run, with empty strings left out
    pub fn descriptor(&self, signing_time: DateTime<Utc>) -> SignatureDescriptor {
        let mut descriptor =
            SignatureDescriptor::new(signing_time).with_sub_filter(self.sub_filter);
        descriptor.reason = non_empty(&self.reason);
        descriptor.location = non_empty(&self.location);
        descriptor.contact = non_empty(&self.contact);
        descriptor
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
