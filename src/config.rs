//! Configuration for identity loading and the certification pipeline.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Inline base64 PKCS#12 container.
pub const ENV_P12_BASE64: &str = "PDF_CERTIFY_P12_BASE64";
/// Password for whichever container is used.
pub const ENV_P12_PASSWORD: &str = "PDF_CERTIFY_P12_PASSWORD";
/// Explicit `.p12`/`.pfx` path.
pub const ENV_P12_PATH: &str = "PDF_CERTIFY_P12_PATH";
/// Override for the conventional default path.
pub const ENV_DEFAULT_P12_PATH: &str = "PDF_CERTIFY_DEFAULT_P12_PATH";
/// Certificate name to look up in the OS keychain.
pub const ENV_KEYCHAIN_NAME: &str = "PDF_CERTIFY_KEYCHAIN_NAME";
/// Encryption watchdog in whole seconds.
pub const ENV_ENCRYPTION_TIMEOUT_SECS: &str = "PDF_CERTIFY_ENCRYPTION_TIMEOUT_SECS";

/// Conventional identity location, relative to the working directory.
pub const DEFAULT_P12_PATH: &str = "certificates/certificate.p12";

/// Default encryption watchdog.
pub const DEFAULT_ENCRYPTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Where to look for a signing identity.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Base64-encoded PKCS#12 container
    pub inline_base64: Option<String>,
    /// Container password
    pub password: Option<String>,
    /// Explicit container path
    pub path: Option<PathBuf>,
    /// Conventional container path
    pub default_path: PathBuf,
    /// Keychain certificate name
    pub keychain_name: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityConfig {
    /// Empty configuration with the conventional default path.
    pub fn new() -> Self {
        Self {
            inline_base64: None,
            password: None,
            path: None,
            default_path: PathBuf::from(DEFAULT_P12_PATH),
            keychain_name: None,
        }
    }

    /// Read configuration from `PDF_CERTIFY_*` environment variables.
    ///
    /// Empty values are treated as unset.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.inline_base64 = non_empty_var(ENV_P12_BASE64);
        config.password = non_empty_var(ENV_P12_PASSWORD);
        config.path = non_empty_var(ENV_P12_PATH).map(PathBuf::from);
        if let Some(path) = non_empty_var(ENV_DEFAULT_P12_PATH) {
            config.default_path = PathBuf::from(path);
        }
        config.keychain_name = non_empty_var(ENV_KEYCHAIN_NAME);
        config
    }

    /// Set the inline base64 container.
    pub fn with_inline_base64(mut self, value: impl Into<String>) -> Self {
        self.inline_base64 = Some(value.into());
        self
    }

    /// Set the container password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set an explicit container path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Override the conventional default path.
    pub fn with_default_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_path = path.into();
        self
    }

    /// Set the keychain certificate name.
    pub fn with_keychain_name(mut self, name: impl Into<String>) -> Self {
        self.keychain_name = Some(name.into());
        self
    }
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("inline_base64", &self.inline_base64.as_ref().map(|v| format!("<{} chars>", v.len())))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("path", &self.path)
            .field("default_path", &self.default_path)
            .field("keychain_name", &self.keychain_name)
            .finish()
    }
}

/// Pipeline tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Watchdog for the encryption worker
    pub encryption_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfig {
    /// Defaults: 60 second encryption watchdog.
    pub fn new() -> Self {
        Self {
            encryption_timeout: DEFAULT_ENCRYPTION_TIMEOUT,
        }
    }

    /// Read tunables from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(raw) = non_empty_var(ENV_ENCRYPTION_TIMEOUT_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.encryption_timeout = Duration::from_secs(secs),
                _ => log::warn!(
                    "Ignoring invalid {}={:?}, using {:?}",
                    ENV_ENCRYPTION_TIMEOUT_SECS,
                    raw,
                    DEFAULT_ENCRYPTION_TIMEOUT
                ),
            }
        }
        config
    }

    /// Set the encryption watchdog.
    pub fn with_encryption_timeout(mut self, timeout: Duration) -> Self {
        self.encryption_timeout = timeout;
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_config_defaults() {
        let config = IdentityConfig::default();
        assert!(config.inline_base64.is_none());
        assert!(config.password.is_none());
        assert_eq!(config.default_path, PathBuf::from("certificates/certificate.p12"));
    }

    #[test]
    fn test_identity_config_builder() {
        let config = IdentityConfig::new()
            .with_path("/tmp/id.pfx")
            .with_password("hunter22")
            .with_keychain_name("Signer");
        assert_eq!(config.path, Some(PathBuf::from("/tmp/id.pfx")));
        assert_eq!(config.password.as_deref(), Some("hunter22"));
        assert_eq!(config.keychain_name.as_deref(), Some("Signer"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = IdentityConfig::new()
            .with_inline_base64("TUlJQ")
            .with_password("hunter22");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter22"));
        assert!(!rendered.contains("TUlJQ"));
        assert!(rendered.contains("<5 chars>"));
    }

    #[test]
    fn test_pipeline_config_defaults() {
        assert_eq!(PipelineConfig::default().encryption_timeout, Duration::from_secs(60));
        let custom = PipelineConfig::new().with_encryption_timeout(Duration::from_millis(5));
        assert_eq!(custom.encryption_timeout, Duration::from_millis(5));
    }
}
