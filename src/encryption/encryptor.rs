//! Document encryption on a watchdog-bounded worker thread.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::Rng;
use zeroize::Zeroizing;

use super::write_handler::{encrypt_document, EncryptionJob};
use super::{EncryptionMetadata, EncryptionOptions, EncryptionResult};
use crate::config::{PipelineConfig, DEFAULT_ENCRYPTION_TIMEOUT};
use crate::error::{Error, Result, Stage};

const GENERATED_OWNER_PASSWORD_LENGTH: usize = 32;

/// Password-based encryption of a document buffer.
pub trait Encrypt: Send + Sync {
    /// Encrypt `document` according to `options`.
    fn encrypt(&self, document: &[u8], options: &EncryptionOptions) -> Result<EncryptionResult>;
}

/// Standard security handler encryptor.
///
/// The CPU-bound rewrite runs on a dedicated thread. If it does not finish
/// within the timeout the caller gets [`Error::Timeout`]; the worker is
/// left to finish on its own and its result is discarded.
#[derive(Debug, Clone)]
pub struct DocumentEncryptor {
    timeout: Duration,
}

impl Default for DocumentEncryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentEncryptor {
    /// Encryptor with the default 60 second watchdog.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_ENCRYPTION_TIMEOUT,
        }
    }

    /// Encryptor configured from pipeline settings.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new().with_timeout(config.encryption_timeout)
    }

    /// Override the watchdog.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current watchdog.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Encrypt for DocumentEncryptor {
    fn encrypt(&self, document: &[u8], options: &EncryptionOptions) -> Result<EncryptionResult> {
        let mut metadata = EncryptionMetadata {
            encrypted: false,
            permissions: options.permissions,
            permission_flags: None,
            has_user_password: options.user_password().is_some(),
            has_owner_password: options.owner_password().is_some(),
            algorithm: None,
        };

        if !options.enabled {
            log::debug!("Encryption disabled, passing document through");
            return Ok(EncryptionResult {
                encrypted_document: Some(document.to_vec()),
                metadata,
            });
        }

        options.validate().map_err(Error::Validation)?;

        let owner_password = match options.owner_password() {
            Some(password) => Zeroizing::new(password.to_string()),
            None => {
                log::debug!("No owner password supplied, generating one");
                generate_owner_password()
            },
        };
        let job = EncryptionJob {
            document: document.to_vec(),
            user_password: Zeroizing::new(options.user_password().unwrap_or_default().to_string()),
            owner_password,
            permissions: options.permissions,
            algorithm: options.algorithm,
        };

        let started = Instant::now();
        let encrypted = run_with_timeout("encryption", self.timeout, move || encrypt_document(&job))
            .map_err(|e| e.in_stage(Stage::Encrypt))?;

        if encrypted.is_empty() {
            return Err(Error::EmptyOutput("encryption").in_stage(Stage::Encrypt));
        }

        log::info!(
            "Encrypted document with {:?} in {:?} ({} -> {} bytes)",
            options.algorithm,
            started.elapsed(),
            document.len(),
            encrypted.len()
        );

        metadata.encrypted = true;
        metadata.permission_flags = Some(options.permissions.p_value());
        metadata.algorithm = Some(options.algorithm);
        Ok(EncryptionResult {
            encrypted_document: Some(encrypted),
            metadata,
        })
    }
}

fn generate_owner_password() -> Zeroizing<String> {
    Zeroizing::new(
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_OWNER_PASSWORD_LENGTH)
            .map(char::from)
            .collect(),
    )
}

/// Run `job` on a new thread and wait at most `timeout` for its result.
pub(crate) fn run_with_timeout<T, F>(operation: &str, timeout: Duration, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(format!("pdf-certify-{operation}"))
        .spawn(move || {
            // The receiver is gone after a timeout.
            let _ = sender.send(job());
        })?;

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            log::error!("Operation '{}' timed out after {:?}", operation, timeout);
            Err(Error::Timeout(timeout))
        },
        Err(RecvTimeoutError::Disconnected) => Err(Error::Crypto(format!(
            "{operation} worker terminated without producing a result"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::test_support::sample_pdf;
    use crate::validation::ValidationIssue;

    #[test]
    fn test_disabled_passes_through() {
        let input = sample_pdf(1, None);
        let result = DocumentEncryptor::new()
            .encrypt(&input, &EncryptionOptions::disabled())
            .unwrap();
        assert!(!result.metadata.encrypted);
        assert_eq!(result.encrypted_document.as_deref(), Some(input.as_slice()));
    }

    #[test]
    fn test_short_password_rejected_before_work() {
        let err = DocumentEncryptor::new()
            .encrypt(b"not even a pdf", &EncryptionOptions::new(Some("abc"), None))
            .unwrap_err();
        assert_eq!(
            err.validation_issues(),
            Some(&[ValidationIssue::UserPasswordTooShort][..])
        );
    }

    #[test]
    fn test_unparseable_input_is_encrypt_stage_error() {
        let err = DocumentEncryptor::new()
            .encrypt(b"not even a pdf", &EncryptionOptions::new(Some("user-pass"), None))
            .unwrap_err();
        assert!(matches!(err, Error::Stage { stage: Stage::Encrypt, .. }));
        assert!(matches!(err.root_cause(), Error::Parse(_)));
    }

    #[test]
    fn test_metadata_reports_passwords_and_flags() {
        let result = DocumentEncryptor::new()
            .encrypt(&sample_pdf(1, None), &EncryptionOptions::new(None, Some("owner-pass")))
            .unwrap();
        assert!(result.metadata.encrypted);
        assert!(!result.metadata.has_user_password);
        assert!(result.metadata.has_owner_password);
        assert_eq!(result.metadata.permission_flags, Some(0xFFFF_F0C0u32 as i32));
    }

    #[test]
    fn test_generated_owner_password() {
        let password = generate_owner_password();
        assert_eq!(password.len(), GENERATED_OWNER_PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_run_with_timeout_times_out() {
        let err = run_with_timeout("sleep", Duration::from_millis(10), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(10)));
    }

    #[test]
    fn test_run_with_timeout_panicking_worker() {
        let err = run_with_timeout::<(), _>("panic", Duration::from_secs(5), || panic!("boom"))
            .unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_run_with_timeout_returns_value() {
        let value = run_with_timeout("quick", Duration::from_secs(5), || Ok(42)).unwrap();
        assert_eq!(value, 42);
    }
}
