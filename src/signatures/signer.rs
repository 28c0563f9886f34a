//! Document signing.
//!
//! Every signature records a certification label in the Info dictionary.
//! In [`SignatureMode::Embedded`] a CMS detached signature over the
//! ByteRange is added as well.

use chrono::{DateTime, SubsecRound, Utc};
use lopdf::{dictionary, Document, Object, StringFormat};

use super::appearance::{add_signature_field, appearance_lines, FieldPlacement};
use super::byterange::{ByteRangeCalculator, BYTE_RANGE_PLACEHOLDER};
use super::cms::{build_detached_signature, digest_signed_bytes, to_hex};
use super::extraction::CERTIFIED_KEYWORD;
use super::types::{SignatureMode, SignatureSubFilter, SignerMetadata, SigningOptions, SigningResult};
use crate::document;
use crate::error::{Error, Result, Stage};
use crate::identity::{Identity, IdentityStore};
use crate::validation::{CertificateValidator, ValidationIssue};

/// Producer written to signed documents.
pub const PRODUCER: &str = crate::NAME;

const DEFAULT_TITLE: &str = "Document";
const TITLE_SUFFIX: &str = " - Certified";
const SIGNED_KEYWORD: &str = "signed";

/// Largest DER signature the `/Contents` placeholder can hold.
pub const DEFAULT_SIGNATURE_SIZE: usize = 8192;

/// Signs documents with a validated identity.
#[derive(Debug, Clone)]
pub struct DocumentSigner {
    signature_size: usize,
}

impl Default for DocumentSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSigner {
    /// Signer with the default signature reservation.
    pub fn new() -> Self {
        Self {
            signature_size: DEFAULT_SIGNATURE_SIZE,
        }
    }

    /// Override the number of bytes reserved for an embedded signature.
    pub fn with_signature_size(mut self, signature_size: usize) -> Self {
        self.signature_size = signature_size;
        self
    }

    /// Sign `document` with an already loaded identity.
    ///
    /// The identity is validated again here so an identity that expired
    /// after loading is still refused.
    pub fn sign(
        &self,
        document: &[u8],
        identity: &Identity,
        options: &SigningOptions,
    ) -> Result<SigningResult> {
        self.sign_at(document, identity, options, Utc::now())
    }

    /// Load an identity from `store`, then sign.
    pub fn sign_with_store(
        &self,
        document: &[u8],
        store: &IdentityStore,
        options: &SigningOptions,
    ) -> Result<SigningResult> {
        let identity = store.load()?;
        self.sign(document, &identity, options)
    }

    /// Sign as of `now`.
    pub fn sign_at(
        &self,
        document: &[u8],
        identity: &Identity,
        options: &SigningOptions,
        now: DateTime<Utc>,
    ) -> Result<SigningResult> {
        CertificateValidator::validate_at(identity, now).map_err(Error::Validation)?;

        let signed_at = now.trunc_subsecs(3);
        let metadata = SignerMetadata {
            signer: identity.common_name().to_string(),
            signed_at,
            reason: options.reason.clone(),
            location: options.location.clone(),
            contact_info: options.contact_info.clone(),
            embedded_signature: options.mode == SignatureMode::Embedded,
        };

        let signed_document = self
            .apply(document, identity, options, &metadata)
            .map_err(|e| e.in_stage(Stage::Sign))?;

        if signed_document.is_empty() {
            return Err(Error::EmptyOutput("signing").in_stage(Stage::Sign));
        }

        log::info!(
            "Signed document as '{}' ({:?}, {} -> {} bytes)",
            metadata.signer,
            options.mode,
            document.len(),
            signed_document.len()
        );

        Ok(SigningResult {
            signed_document,
            metadata,
        })
    }

    fn apply(
        &self,
        bytes: &[u8],
        identity: &Identity,
        options: &SigningOptions,
        metadata: &SignerMetadata,
    ) -> Result<Vec<u8>> {
        let mut doc = document::load(bytes)?;

        let page_count = document::page_count(&doc);
        let target_page = options.target_page();
        let page_id = match document::page_id(&doc, target_page) {
            Some(id) => Some(id),
            None if options.visible || options.mode == SignatureMode::Embedded => {
                return Err(Error::Validation(vec![ValidationIssue::PageOutOfRange {
                    page: target_page,
                    page_count,
                }]));
            },
            None => None,
        };

        write_certification_label(&mut doc, metadata);

        let signature_id = match options.mode {
            SignatureMode::MetadataOnly => None,
            SignatureMode::Embedded => Some(doc.add_object(self.signature_dictionary(metadata))),
        };

        if options.visible || signature_id.is_some() {
            let placement = if options.visible {
                FieldPlacement::Visible {
                    appearance: &options.appearance,
                    lines: appearance_lines(metadata),
                }
            } else {
                FieldPlacement::Invisible
            };
            if let Some(page_id) = page_id {
                add_signature_field(&mut doc, page_id, placement, signature_id)?;
            }
        }

        let mut output = document::save(&mut doc)?;
        if signature_id.is_some() {
            self.embed_signature(&mut output, identity)?;
        }
        Ok(output)
    }

    fn signature_dictionary(&self, metadata: &SignerMetadata) -> lopdf::Dictionary {
        let calculator = ByteRangeCalculator::new(self.signature_size);
        let mut dict = dictionary! {
            "Type" => "Sig",
            "Filter" => "Adobe.PPKLite",
            "SubFilter" => SignatureSubFilter::Pkcs7Detached.as_pdf_name(),
            "ByteRange" => vec![
                0.into(),
                BYTE_RANGE_PLACEHOLDER.into(),
                BYTE_RANGE_PLACEHOLDER.into(),
                BYTE_RANGE_PLACEHOLDER.into(),
            ],
            "Contents" => Object::String(calculator.placeholder_bytes(), StringFormat::Hexadecimal),
            "Name" => document::text_string(&metadata.signer),
            "M" => Object::string_literal(document::pdf_date(metadata.signed_at)),
        };
        if !metadata.reason.is_empty() {
            dict.set("Reason", document::text_string(&metadata.reason));
        }
        if !metadata.location.is_empty() {
            dict.set("Location", document::text_string(&metadata.location));
        }
        if !metadata.contact_info.is_empty() {
            dict.set("ContactInfo", document::text_string(&metadata.contact_info));
        }
        dict
    }

    /// Patch the ByteRange and `/Contents` placeholders in serialized output.
    fn embed_signature(&self, output: &mut [u8], identity: &Identity) -> Result<()> {
        let calculator = ByteRangeCalculator::new(self.signature_size);
        let contents_offset = calculator
            .find_contents_offset(output)
            .ok_or_else(|| Error::Parse("Signature /Contents placeholder not found".to_string()))?;
        let byte_range = calculator.calculate_byte_range(output.len(), contents_offset);
        ByteRangeCalculator::write_byte_range(output, &byte_range)?;

        let signed_bytes = ByteRangeCalculator::extract_signed_bytes(output, &byte_range)?;
        let digest = digest_signed_bytes(&signed_bytes);
        let signature = build_detached_signature(&digest, identity)?;
        log::debug!(
            "Embedding {} byte CMS signature over ByteRange {}",
            signature.len(),
            ByteRangeCalculator::format_byte_range(&byte_range)
        );
        calculator.insert_signature(output, contents_offset, &to_hex(&signature))
    }
}

/// Rewrite the Info dictionary with the certification label.
fn write_certification_label(doc: &mut Document, metadata: &SignerMetadata) {
    let signed_at = metadata.signed_at_iso();
    let mut info = document::info(doc);

    let title = document::text_entry(&info, b"Title")
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    info.set("Title", document::text_string(&format!("{title}{TITLE_SUFFIX}")));
    info.set(
        "Subject",
        document::text_string(&format!(
            "Digitally certified by {} on {}",
            metadata.signer, signed_at
        )),
    );
    info.set("Producer", document::text_string(PRODUCER));
    info.set(
        "Creator",
        document::text_string(&format!("{} {}", crate::NAME, crate::VERSION)),
    );
    let keywords = [CERTIFIED_KEYWORD, SIGNED_KEYWORD, metadata.signer.as_str(), signed_at.as_str()];
    info.set("Keywords", document::text_string(&keywords.join(" ")));
    info.set("ModDate", Object::string_literal(document::pdf_date(metadata.signed_at)));
    info.set("CertifyReason", document::text_string(&metadata.reason));
    info.set("CertifyLocation", document::text_string(&metadata.location));
    info.set("CertifyContactInfo", document::text_string(&metadata.contact_info));

    document::set_info(doc, info);
}
