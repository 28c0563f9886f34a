//! Identity and option validation.
//!
//! [`CertificateValidator`] is a pure function of a clock and the identity's
//! structure. Every check runs; callers see all issues at once.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::identity::Identity;

/// Minimum length of a user or owner password.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationIssue {
    /// Current time is before the certificate's notBefore
    NotYetValid {
        /// Start of the validity window
        not_before: DateTime<Utc>,
    },
    /// Current time is after the certificate's notAfter
    Expired {
        /// End of the validity window
        not_after: DateTime<Utc>,
    },
    /// Identity carries no private key
    PrivateKeyMissing,
    /// Identity carries no certificate
    CertificateMissing,
    /// User password shorter than [`MIN_PASSWORD_LENGTH`]
    UserPasswordTooShort,
    /// Owner password shorter than [`MIN_PASSWORD_LENGTH`]
    OwnerPasswordTooShort,
    /// Encryption enabled without any password
    PasswordRequired,
    /// Visible signature requested on a page that does not exist
    PageOutOfRange {
        /// Requested 0-based page index
        page: u32,
        /// Number of pages in the document
        page_count: usize,
    },
    /// Embedded signatures cannot be re-encrypted after signing
    EmbeddedSignatureWithEncryption,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NotYetValid { not_before } => write!(
                f,
                "Certificate is not yet valid (valid from {})",
                not_before.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            ValidationIssue::Expired { not_after } => write!(
                f,
                "Certificate has expired (expired on {})",
                not_after.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            ValidationIssue::PrivateKeyMissing => f.write_str("Private key missing"),
            ValidationIssue::CertificateMissing => f.write_str("Certificate missing"),
            ValidationIssue::UserPasswordTooShort => write!(
                f,
                "User password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            ),
            ValidationIssue::OwnerPasswordTooShort => write!(
                f,
                "Owner password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            ),
            ValidationIssue::PasswordRequired => {
                f.write_str("At least one of user or owner password is required")
            },
            ValidationIssue::PageOutOfRange { page, page_count } => write!(
                f,
                "Signature page {} is out of range (document has {} pages)",
                page, page_count
            ),
            ValidationIssue::EmbeddedSignatureWithEncryption => f.write_str(
                "Embedded signatures cannot be combined with encryption; \
                 use metadata-only signing or disable encryption",
            ),
        }
    }
}

/// Validates a loaded identity before it is used for signing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CertificateValidator;

impl CertificateValidator {
    /// Validate against the current time.
    pub fn validate(identity: &Identity) -> Result<(), Vec<ValidationIssue>> {
        Self::validate_at(identity, Utc::now())
    }

    /// Validate against a fixed point in time.
    pub fn validate_at(identity: &Identity, now: DateTime<Utc>) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        match identity.certificate() {
            Some(certificate) => {
                if now < certificate.not_before() {
                    issues.push(ValidationIssue::NotYetValid {
                        not_before: certificate.not_before(),
                    });
                }
                if now > certificate.not_after() {
                    issues.push(ValidationIssue::Expired {
                        not_after: certificate.not_after(),
                    });
                }
            },
            None => issues.push(ValidationIssue::CertificateMissing),
        }

        if !identity.has_private_key() {
            issues.push(ValidationIssue::PrivateKeyMissing);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            log::warn!(
                "Identity '{}' failed validation with {} issue(s)",
                identity.common_name(),
                issues.len()
            );
            Err(issues)
        }
    }
}
