//! Error types for the certification pipeline.
//!
//! Lower layers (identity loading, validation) return these variants directly.
//! The signer and encryptor wrap failures from their own work in
//! [`Error::Stage`] so the caller can tell which stage broke, while
//! [`Error::root_cause`] still exposes the underlying variant.

use std::fmt;
use std::time::Duration;

use crate::validation::ValidationIssue;

/// Result type alias for certification operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage that produced a wrapped error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Signing (metadata rewrite, signature embedding)
    Sign,
    /// Password encryption
    Encrypt,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Sign => f.write_str("signing"),
            Stage::Encrypt => f.write_str("encryption"),
        }
    }
}

/// Error types that can occur while certifying a document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No identity source produced a usable identity
    #[error("No signing identity could be loaded ({}).\nConfigure one of:\n{}", .reasons.join("; "), remediation_hint())]
    Configuration {
        /// Why each attempted source failed, in priority order
        reasons: Vec<String>,
    },

    /// The OS keychain holds a matching certificate but the private key cannot be exported
    #[error(
        "Certificate '{certificate}' was found in the keychain, but its private key cannot be \
         extracted from the command line. Export it manually as a .p12 file (Keychain Access > \
         Export Items) and configure PDF_CERTIFY_P12_PATH or PDF_CERTIFY_P12_BASE64"
    )]
    KeychainExportRequired {
        /// Name of the certificate that was found
        certificate: String,
    },

    /// One or more validation checks failed
    #[error("Validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// Inline base64 identity could not be decoded
    #[error("Failed to decode base64 identity ({length} characters after cleanup): {reason}")]
    Base64 {
        /// Length of the cleaned input
        length: usize,
        /// Fixed description; never includes input bytes or offsets
        reason: String,
    },

    /// Malformed PKCS#12 container, wrong password, or unexpected bag layout
    #[error("PKCS#12 error: {0}")]
    Pkcs12(String),

    /// Certificate could not be parsed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Document container could not be parsed or is unusable
    #[error("Document parse error: {0}")]
    Parse(String),

    /// Underlying signing or encryption primitive failed
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// A CPU-bound step exceeded its watchdog
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A stage produced an empty buffer where output was expected
    #[error("{0} produced an empty document")]
    EmptyOutput(&'static str),

    /// Failure inside a pipeline stage
    #[error("{stage} failed: {source}")]
    Stage {
        /// Stage that failed
        stage: Stage,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the PDF object layer
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

impl Error {
    /// Wrap this error with the stage it occurred in.
    pub(crate) fn in_stage(self, stage: Stage) -> Self {
        match self {
            // Validation failures are reported as-is so callers can match them directly.
            err @ Error::Validation(_) => err,
            err @ Error::Stage { .. } => err,
            err => Error::Stage {
                stage,
                source: Box::new(err),
            },
        }
    }

    /// The innermost error, skipping stage wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Validation issues carried by this error, if it is a validation failure.
    pub fn validation_issues(&self) -> Option<&[ValidationIssue]> {
        match self.root_cause() {
            Error::Validation(issues) => Some(issues),
            _ => None,
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn remediation_hint() -> &'static str {
    "  1. PDF_CERTIFY_P12_BASE64 + PDF_CERTIFY_P12_PASSWORD (inline base64 .p12)\n  \
     2. PDF_CERTIFY_P12_PATH + PDF_CERTIFY_P12_PASSWORD (path to a .p12/.pfx file)\n  \
     3. certificates/certificate.p12 + PDF_CERTIFY_P12_PASSWORD (default location)\n  \
     4. macOS keychain (certificate only; export the identity manually as .p12)"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_lists_remediations() {
        let err = Error::Configuration {
            reasons: vec!["inline: not configured".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("inline: not configured"));
        assert!(msg.contains("PDF_CERTIFY_P12_BASE64"));
        assert!(msg.contains("PDF_CERTIFY_P12_PATH"));
        assert!(msg.contains("certificates/certificate.p12"));
        assert!(msg.contains("keychain"));
    }

    #[test]
    fn test_validation_error_joins_issues() {
        let err = Error::Validation(vec![
            ValidationIssue::PrivateKeyMissing,
            ValidationIssue::CertificateMissing,
        ]);
        let msg = err.to_string();
        assert!(msg.contains("Private key missing; Certificate missing"));
    }

    #[test]
    fn test_base64_error_reports_length_only() {
        let err = Error::Base64 {
            length: 42,
            reason: "not valid base64".to_string(),
        };
        assert!(err.to_string().contains("42 characters"));
    }

    #[test]
    fn test_stage_wrapping_keeps_root_cause() {
        let err = Error::Parse("bad xref".to_string()).in_stage(Stage::Sign);
        assert!(err.to_string().starts_with("signing failed"));
        assert!(matches!(err.root_cause(), Error::Parse(_)));
    }

    #[test]
    fn test_validation_is_never_wrapped() {
        let err = Error::Validation(vec![ValidationIssue::UserPasswordTooShort])
            .in_stage(Stage::Encrypt);
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.validation_issues().map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
