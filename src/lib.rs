// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::match_like_matches_macro)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]
#![cfg_attr(test, allow(unused_variables))]

//! # PDF Certify
//!
//! Certificate-based PDF certification: load a PKCS#12 identity, validate it,
//! sign a document, and optionally re-encrypt it with passwords and
//! permission flags.
//!
//! ## Core Features
//!
//! - **Identity loading**: ordered source chain (inline base64, explicit file,
//!   default path, OS keychain) with one aggregate error when nothing works
//! - **Validation**: validity window and key/certificate presence, all issues
//!   reported at once
//! - **Signing**: certification label in the Info dictionary, optional visible
//!   signature field, optional embedded CMS detached signature
//! - **Encryption**: Standard security handler (AES-128 or RC4-128) with
//!   fail-closed permission flags, run under a watchdog timeout
//! - **Orchestration**: sign then encrypt; an encryption failure still returns
//!   the signed document with a warning
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_certify::identity::IdentityStore;
//! use pdf_certify::pipeline::{CertifyOptions, SignAndCertify};
//! use pdf_certify::encryption::EncryptionOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pdf = std::fs::read("contract.pdf")?;
//! let identity = IdentityStore::from_env().load()?;
//!
//! let mut options = CertifyOptions::default();
//! options.signing.reason = "Approved".to_string();
//! options.encryption = EncryptionOptions::new(Some("open-sesame"), None);
//!
//! let result = SignAndCertify::new().sign_and_certify(&pdf, &identity, &options)?;
//! if let Some(warning) = &result.warning {
//!     eprintln!("{warning}");
//! }
//! std::fs::write("contract.certified.pdf", &result.document)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Configuration
pub mod config;

// PDF container helpers
pub mod document;

// Identity loading and validation
pub mod identity;
pub mod validation;

// Signing and verification
pub mod signatures;

// Encryption support
pub mod encryption;

// Sign-then-encrypt orchestration
pub mod pipeline;

// Re-exports
pub use config::{IdentityConfig, PipelineConfig};
pub use encryption::{DocumentEncryptor, EncryptionOptions, Permissions, PrintPermission};
pub use error::{Error, Result};
pub use identity::{Identity, IdentityStore};
pub use pipeline::{CertifyOptions, CombinedResult, SignAndCertify};
pub use signatures::{extract_metadata, DocumentSigner, SignatureVerifier, SigningOptions};
pub use validation::{CertificateValidator, ValidationIssue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
