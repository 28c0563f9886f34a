//! Signing options, results, and verification types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// How the signature is recorded in the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignatureMode {
    /// Certification label in the Info dictionary only
    #[default]
    MetadataOnly,
    /// Label plus a CMS detached signature over the ByteRange
    Embedded,
}

/// Signature sub-filter of a signature dictionary.
///
/// The signer always writes `adbe.pkcs7.detached`. `ETSI.CAdES.detached` is
/// only recognised when reading signatures made elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached
    #[default]
    Pkcs7Detached,
    /// ETSI.CAdES.detached (read only)
    CadesDetached,
}

impl SignatureSubFilter {
    /// PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
        }
    }

    /// Parse a PDF name.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            _ => None,
        }
    }
}

/// Placement of a visible signature block, in default user space units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignatureAppearance {
    /// Lower-left x
    pub x: f32,
    /// Lower-left y
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
    /// Text size
    pub font_size: f32,
}

impl Default for SignatureAppearance {
    fn default() -> Self {
        Self {
            x: 72.0,
            y: 72.0,
            width: 220.0,
            height: 60.0,
            font_size: 9.0,
        }
    }
}

/// Caller-supplied signing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SigningOptions {
    /// Reason for signing
    pub reason: String,
    /// Where the document was signed
    pub location: String,
    /// How to reach the signer
    pub contact_info: String,
    /// Draw a visible signature block
    pub visible: bool,
    /// 0-based page for the visible block (page 0 when absent)
    pub page_number: Option<u32>,
    /// Metadata-only or embedded signature
    pub mode: SignatureMode,
    /// Visible block placement
    pub appearance: SignatureAppearance,
}

impl SigningOptions {
    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the contact information.
    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = contact_info.into();
        self
    }

    /// Request a visible signature block on a page.
    pub fn with_visible_signature(mut self, page_number: Option<u32>) -> Self {
        self.visible = true;
        self.page_number = page_number;
        self
    }

    /// Select the signature mode.
    pub fn with_mode(mut self, mode: SignatureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Page the visible block goes on.
    pub fn target_page(&self) -> u32 {
        self.page_number.unwrap_or(0)
    }
}

/// Signing timestamp in the exact form embedded in the document.
pub fn iso_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_iso<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_timestamp(timestamp))
}

/// What was signed, by whom, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerMetadata {
    /// Signer common name
    pub signer: String,
    /// Signing instant (millisecond precision)
    #[serde(serialize_with = "serialize_iso")]
    pub signed_at: DateTime<Utc>,
    /// Reason for signing
    pub reason: String,
    /// Where the document was signed
    pub location: String,
    /// How to reach the signer
    pub contact_info: String,
    /// Whether a CMS signature was embedded
    pub embedded_signature: bool,
}

impl SignerMetadata {
    /// `signed_at` as embedded in the Keywords and Subject.
    pub fn signed_at_iso(&self) -> String {
        iso_timestamp(&self.signed_at)
    }
}

/// Output of [`DocumentSigner::sign`](super::DocumentSigner::sign).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningResult {
    /// Rewritten document
    #[serde(skip)]
    pub signed_document: Vec<u8>,
    /// Signing metadata
    pub metadata: SignerMetadata,
}

/// Certification label read back from a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificationLabel {
    /// Signer common name
    pub signer: String,
    /// Signing timestamp, exactly as embedded
    pub signed_at: String,
    /// Reason, if recorded
    pub reason: Option<String>,
    /// Location, if recorded
    pub location: Option<String>,
    /// Contact information, if recorded
    pub contact_info: Option<String>,
    /// Document title
    pub title: Option<String>,
    /// Document subject
    pub subject: Option<String>,
}

/// Result of [`extract_metadata`](super::extract_metadata).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMetadata {
    /// Whether the Keywords entry carries the certification label
    pub signed: bool,
    /// Parsed label, when signed
    pub metadata: Option<CertificationLabel>,
}

/// Information read from a signature dictionary.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    /// /Name
    pub signer_name: Option<String>,
    /// /M
    pub signing_time: Option<String>,
    /// /Reason
    pub reason: Option<String>,
    /// /Location
    pub location: Option<String>,
    /// /ContactInfo
    pub contact_info: Option<String>,
    /// /SubFilter
    #[serde(skip)]
    pub sub_filter: Option<SignatureSubFilter>,
    /// /ByteRange
    pub byte_range: Vec<i64>,
    /// Subject CN of the embedded signer certificate
    pub certificate_cn: Option<String>,
}

/// Verification status of an embedded signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationStatus {
    /// Digest and signature both check out
    Valid,
    /// Digest mismatch or bad signature
    Invalid,
    /// Not enough information to decide
    Unknown,
}

impl VerificationStatus {
    /// Whether the signature verified.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }
}

/// Result of verifying one embedded signature.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Overall status
    pub status: VerificationStatus,
    /// Signature dictionary contents
    pub signature_info: SignatureInfo,
    /// Whether the ByteRange spans the whole file except /Contents
    pub covers_whole_document: bool,
    /// Whether the covered bytes hash to the signed message digest
    pub digest_matches: bool,
    /// Whether the RSA signature over the signed attributes verifies
    pub signature_valid: bool,
    /// Problems found along the way
    pub messages: Vec<String>,
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self {
            status: VerificationStatus::Unknown,
            signature_info: SignatureInfo::default(),
            covers_whole_document: false,
            digest_matches: false,
            signature_valid: false,
            messages: Vec::new(),
        }
    }
}
