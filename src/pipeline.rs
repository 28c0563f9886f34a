//! Sign-then-encrypt orchestration.
//!
//! Signing failures are terminal. Encryption failures are not: the caller
//! gets the signed document with `success = true` and a `warning`.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::encryption::{DocumentEncryptor, Encrypt, EncryptionMetadata, EncryptionOptions};
use crate::error::{Error, Result};
use crate::identity::{Identity, IdentityStore};
use crate::signatures::{DocumentSigner, SignatureMode, SignerMetadata, SigningOptions};
use crate::validation::ValidationIssue;

/// Signing and encryption request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertifyOptions {
    /// Signing options
    pub signing: SigningOptions,
    /// Encryption options
    pub encryption: EncryptionOptions,
}

impl CertifyOptions {
    /// Options with the given signing and encryption parts.
    pub fn new(signing: SigningOptions, encryption: EncryptionOptions) -> Self {
        Self {
            signing,
            encryption,
        }
    }
}

/// Metadata from both stages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedMetadata {
    /// Signing stage
    pub signing: SignerMetadata,
    /// Encryption stage
    pub encryption: EncryptionMetadata,
}

/// Result of [`SignAndCertify::sign_and_certify`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResult {
    /// Always true; signing failures are returned as errors
    pub success: bool,
    /// Signed and, when requested and possible, encrypted document
    #[serde(skip)]
    pub document: Vec<u8>,
    /// Stage metadata
    pub metadata: CombinedMetadata,
    /// Why encryption was skipped, if it failed
    pub warning: Option<String>,
}

/// Signs a document, then encrypts it if requested.
#[derive(Debug, Clone)]
pub struct SignAndCertify<E: Encrypt = DocumentEncryptor> {
    signer: DocumentSigner,
    encryptor: E,
}

impl Default for SignAndCertify {
    fn default() -> Self {
        Self::new()
    }
}

impl SignAndCertify {
    /// Pipeline with default signer and encryptor.
    pub fn new() -> Self {
        Self::with_stages(DocumentSigner::new(), DocumentEncryptor::new())
    }

    /// Pipeline configured from `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_stages(DocumentSigner::new(), DocumentEncryptor::from_config(config))
    }
}

impl<E: Encrypt> SignAndCertify<E> {
    /// Pipeline with explicit stages.
    pub fn with_stages(signer: DocumentSigner, encryptor: E) -> Self {
        Self { signer, encryptor }
    }

    /// Load an identity from `store`, then sign and encrypt.
    pub fn sign_and_certify_with_store(
        &self,
        document: &[u8],
        store: &IdentityStore,
        options: &CertifyOptions,
    ) -> Result<CombinedResult> {
        let identity = store.load()?;
        self.sign_and_certify(document, &identity, options)
    }

    /// Sign `document`, then encrypt the signed bytes if requested.
    pub fn sign_and_certify(
        &self,
        document: &[u8],
        identity: &Identity,
        options: &CertifyOptions,
    ) -> Result<CombinedResult> {
        // A full rewrite during encryption would invalidate the ByteRange.
        if options.signing.mode == SignatureMode::Embedded && options.encryption.enabled {
            return Err(Error::Validation(vec![
                ValidationIssue::EmbeddedSignatureWithEncryption,
            ]));
        }

        let signed = self.signer.sign(document, identity, &options.signing)?;

        if !options.encryption.enabled {
            return Ok(CombinedResult {
                success: true,
                document: signed.signed_document,
                metadata: CombinedMetadata {
                    signing: signed.metadata,
                    encryption: unencrypted_metadata(&options.encryption),
                },
                warning: None,
            });
        }

        let encrypted = self
            .encryptor
            .encrypt(&signed.signed_document, &options.encryption)
            .and_then(|result| match result.encrypted_document {
                Some(bytes) if !bytes.is_empty() => Ok((bytes, result.metadata)),
                _ => Err(Error::EmptyOutput("encryption")),
            });

        match encrypted {
            Ok((bytes, encryption)) => Ok(CombinedResult {
                success: true,
                document: bytes,
                metadata: CombinedMetadata {
                    signing: signed.metadata,
                    encryption,
                },
                warning: None,
            }),
            Err(err) => {
                log::warn!("Encryption failed, returning signed document only: {}", err);
                Ok(CombinedResult {
                    success: true,
                    document: signed.signed_document,
                    metadata: CombinedMetadata {
                        signing: signed.metadata,
                        encryption: unencrypted_metadata(&options.encryption),
                    },
                    warning: Some(format!("Document was signed but not encrypted: {err}")),
                })
            },
        }
    }
}

fn unencrypted_metadata(options: &EncryptionOptions) -> EncryptionMetadata {
    EncryptionMetadata {
        encrypted: false,
        permissions: options.permissions,
        permission_flags: None,
        has_user_password: options.user_password().is_some(),
        has_owner_password: options.owner_password().is_some(),
        algorithm: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::test_support::sample_pdf;
    use crate::encryption::EncryptionResult;
    use crate::identity::test_support::fixture_identity;
    use crate::signatures::extract_metadata;

    struct FailingEncryptor;

    impl Encrypt for FailingEncryptor {
        fn encrypt(&self, _: &[u8], _: &EncryptionOptions) -> Result<EncryptionResult> {
            Err(Error::Crypto("forced failure".to_string()))
        }
    }

    #[test]
    fn test_signing_only() {
        let result = SignAndCertify::new()
            .sign_and_certify(&sample_pdf(1, None), &fixture_identity(), &CertifyOptions::default())
            .unwrap();
        assert!(result.success);
        assert!(result.warning.is_none());
        assert!(!result.metadata.encryption.encrypted);
        assert!(extract_metadata(&result.document).unwrap().signed);
    }

    #[test]
    fn test_encryption_failure_degrades() {
        let options = CertifyOptions::new(
            SigningOptions::default(),
            EncryptionOptions::new(Some("user-pass"), None),
        );
        let pipeline = SignAndCertify::with_stages(DocumentSigner::new(), FailingEncryptor);
        let result = pipeline
            .sign_and_certify(&sample_pdf(1, None), &fixture_identity(), &options)
            .unwrap();
        assert!(result.success);
        assert!(result.warning.as_deref().unwrap().contains("forced failure"));
        assert!(!result.metadata.encryption.encrypted);
        assert!(extract_metadata(&result.document).unwrap().signed);
    }

    #[test]
    fn test_embedded_with_encryption_rejected() {
        let options = CertifyOptions::new(
            SigningOptions::default().with_mode(SignatureMode::Embedded),
            EncryptionOptions::new(Some("user-pass"), None),
        );
        let err = SignAndCertify::new()
            .sign_and_certify(&sample_pdf(1, None), &fixture_identity(), &options)
            .unwrap_err();
        assert_eq!(
            err.validation_issues(),
            Some(&[ValidationIssue::EmbeddedSignatureWithEncryption][..])
        );
    }

    #[test]
    fn test_sign_and_encrypt() {
        let options = CertifyOptions::new(
            SigningOptions::default(),
            EncryptionOptions::new(Some("user-pass"), Some("owner-pass")),
        );
        let result = SignAndCertify::new()
            .sign_and_certify(&sample_pdf(1, None), &fixture_identity(), &options)
            .unwrap();
        assert!(result.warning.is_none());
        assert!(result.metadata.encryption.encrypted);
        assert!(result.metadata.encryption.has_user_password);
    }

    #[test]
    fn test_options_from_json() {
        let options: CertifyOptions = serde_json::from_str(
            r#"{"signing": {"reason": "Approval"},
                "encryption": {"enabled": true, "userPassword": "secret1",
                               "permissions": {"printing": "highResolution", "copying": true}}}"#,
        )
        .unwrap();
        assert_eq!(options.signing.reason, "Approval");
        assert!(options.encryption.enabled);
        assert_eq!(options.encryption.user_password(), Some("secret1"));
        assert!(options.encryption.permissions.copying);
    }
}
