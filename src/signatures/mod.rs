//! Document signing, certification labels, and signature verification.
//!
//! ## Modes
//!
//! - **Metadata only** (default): the Info dictionary records who certified
//!   the document and when. [`extract_metadata`] reads the label back.
//! - **Embedded**: the label plus a CMS detached signature
//!   (adbe.pkcs7.detached, RSA PKCS#1 v1.5 with SHA-256) over the ByteRange.
//!   [`SignatureVerifier`] checks it.
//!
//! ## Example
//!
//! ```ignore
//! use pdf_certify::identity::IdentityStore;
//! use pdf_certify::signatures::{DocumentSigner, SigningOptions, extract_metadata};
//!
//! let identity = IdentityStore::from_env().load()?;
//! let result = DocumentSigner::new().sign(&pdf, &identity, &SigningOptions::default())?;
//! assert!(extract_metadata(&result.signed_document)?.signed);
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.7.4.5 - Signature Fields
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures

mod appearance;
mod byterange;
mod cms;
mod extraction;
mod signer;
mod types;
mod verifier;

pub use byterange::ByteRangeCalculator;
pub use cms::{build_detached_signature, digest_signed_bytes};
pub use extraction::{extract_metadata, CERTIFIED_KEYWORD};
pub use signer::{DocumentSigner, DEFAULT_SIGNATURE_SIZE, PRODUCER};
pub use types::{
    iso_timestamp, CertificationLabel, ExtractedMetadata, SignatureAppearance, SignatureInfo,
    SignatureMode, SignatureSubFilter, SignerMetadata, SigningOptions, SigningResult,
    VerificationResult, VerificationStatus,
};
pub use verifier::SignatureVerifier;
