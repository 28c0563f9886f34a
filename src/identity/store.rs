//! Ordered identity source chain.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::keychain;
use super::pkcs12::decode_base64;
use super::{Identity, IdentitySourceKind};
use crate::config::IdentityConfig;
use crate::error::{Error, Result};

/// Result of asking one source for an identity.
pub enum SourceOutcome {
    /// Identity decoded
    Loaded(Identity),
    /// Source is not configured
    Skipped(String),
    /// Source is configured but failed
    Failed(Error),
}

impl fmt::Debug for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOutcome::Loaded(identity) => f.debug_tuple("Loaded").field(identity).finish(),
            SourceOutcome::Skipped(reason) => f.debug_tuple("Skipped").field(reason).finish(),
            SourceOutcome::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// A place a signing identity can come from.
pub trait IdentitySource: Send + Sync {
    /// Which kind of source this is.
    fn kind(&self) -> IdentitySourceKind;

    /// Try to produce an identity.
    fn load(&self) -> SourceOutcome;
}

/// Base64 container supplied through configuration.
#[derive(Clone)]
pub struct InlineBase64Source {
    value: Option<String>,
    password: Option<String>,
}

impl InlineBase64Source {
    /// Create a source from an optional value and password.
    pub fn new(value: Option<String>, password: Option<String>) -> Self {
        Self { value, password }
    }
}

impl IdentitySource for InlineBase64Source {
    fn kind(&self) -> IdentitySourceKind {
        IdentitySourceKind::InlineBase64
    }

    fn load(&self) -> SourceOutcome {
        let Some(value) = self.value.as_deref() else {
            return SourceOutcome::Skipped("inline base64 not configured".to_string());
        };
        let Some(password) = self.password.as_deref() else {
            return SourceOutcome::Skipped("inline base64 set but no password configured".to_string());
        };

        let bytes = match decode_base64(value) {
            Ok(bytes) => bytes,
            Err(err) => return SourceOutcome::Failed(err),
        };
        log::debug!("Decoded inline identity ({} bytes)", bytes.len());
        outcome(Identity::from_pkcs12(&bytes, password, self.kind()))
    }
}

/// Container at an explicit path.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: Option<PathBuf>,
    password: Option<String>,
}

impl FileSource {
    /// Create a source from an optional path and password.
    pub fn new(path: Option<PathBuf>, password: Option<String>) -> Self {
        Self { path, password }
    }
}

impl IdentitySource for FileSource {
    fn kind(&self) -> IdentitySourceKind {
        IdentitySourceKind::File
    }

    fn load(&self) -> SourceOutcome {
        let Some(path) = self.path.as_deref() else {
            return SourceOutcome::Skipped("no identity path configured".to_string());
        };
        let Some(password) = self.password.as_deref() else {
            return SourceOutcome::Skipped(format!(
                "{} set but no password configured",
                path.display()
            ));
        };
        load_file(path, password, self.kind())
    }
}

/// Container at the conventional location.
#[derive(Debug, Clone)]
pub struct DefaultPathSource {
    path: PathBuf,
    password: Option<String>,
}

impl DefaultPathSource {
    /// Create a source for the given default path.
    pub fn new(path: PathBuf, password: Option<String>) -> Self {
        Self { path, password }
    }
}

impl IdentitySource for DefaultPathSource {
    fn kind(&self) -> IdentitySourceKind {
        IdentitySourceKind::DefaultPath
    }

    fn load(&self) -> SourceOutcome {
        if !self.path.is_file() {
            return SourceOutcome::Skipped(format!("{} does not exist", self.path.display()));
        }
        let Some(password) = self.password.as_deref() else {
            return SourceOutcome::Skipped(format!(
                "{} exists but no password configured",
                self.path.display()
            ));
        };
        load_file(&self.path, password, self.kind())
    }
}

/// macOS keychain lookup.
///
/// With a certificate name the lookup is by name; without one any valid
/// signing identity counts as a hit.
#[derive(Debug, Clone)]
pub struct KeychainSource {
    name: Option<String>,
}

impl KeychainSource {
    /// Create a source for the given certificate name.
    pub fn new(name: Option<String>) -> Self {
        Self { name }
    }
}

impl IdentitySource for KeychainSource {
    fn kind(&self) -> IdentitySourceKind {
        IdentitySourceKind::Keychain
    }

    fn load(&self) -> SourceOutcome {
        match keychain::find_certificate(self.name.as_deref()) {
            Ok(lookup) => match keychain::export_required(lookup) {
                Ok(err) => SourceOutcome::Failed(err),
                Err(reason) => SourceOutcome::Skipped(reason),
            },
            Err(err) => SourceOutcome::Failed(err),
        }
    }
}

fn load_file(path: &Path, password: &str, kind: IdentitySourceKind) -> SourceOutcome {
    match fs::read(path) {
        Ok(bytes) => {
            log::debug!("Read identity from {} ({} bytes)", path.display(), bytes.len());
            outcome(Identity::from_pkcs12(&bytes, password, kind))
        },
        Err(err) => SourceOutcome::Failed(Error::Io(err)),
    }
}

fn outcome(result: Result<Identity>) -> SourceOutcome {
    match result {
        Ok(identity) => SourceOutcome::Loaded(identity),
        Err(err) => SourceOutcome::Failed(err),
    }
}

/// Resolves a signing identity from an ordered chain of sources.
///
/// Sources are tried in order and the first success wins. A keychain hit
/// is returned as [`Error::KeychainExportRequired`] rather than folded into
/// the aggregate configuration error.
pub struct IdentityStore {
    sources: Vec<Box<dyn IdentitySource>>,
}

impl fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<_> = self.sources.iter().map(|s| s.kind()).collect();
        f.debug_struct("IdentityStore").field("sources", &kinds).finish()
    }
}

impl IdentityStore {
    /// Standard chain: inline base64, explicit path, default path, keychain.
    pub fn new(config: &IdentityConfig) -> Self {
        Self::with_sources(vec![
            Box::new(InlineBase64Source::new(
                config.inline_base64.clone(),
                config.password.clone(),
            )),
            Box::new(FileSource::new(config.path.clone(), config.password.clone())),
            Box::new(DefaultPathSource::new(
                config.default_path.clone(),
                config.password.clone(),
            )),
            Box::new(KeychainSource::new(config.keychain_name.clone())),
        ])
    }

    /// Standard chain configured from `PDF_CERTIFY_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(&IdentityConfig::from_env())
    }

    /// Custom chain, tried in the given order.
    pub fn with_sources(sources: Vec<Box<dyn IdentitySource>>) -> Self {
        Self { sources }
    }

    /// Load the first identity any source can produce.
    pub fn load(&self) -> Result<Identity> {
        let mut reasons = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let kind = source.kind();
            match source.load() {
                SourceOutcome::Loaded(identity) => {
                    log::info!(
                        "Loaded signing identity '{}' from {}",
                        identity.common_name(),
                        kind
                    );
                    return Ok(identity);
                },
                SourceOutcome::Skipped(reason) => {
                    log::debug!("Skipping {} identity source: {}", kind, reason);
                    reasons.push(format!("{kind}: {reason}"));
                },
                SourceOutcome::Failed(err @ Error::KeychainExportRequired { .. }) => {
                    log::warn!("{}", err);
                    return Err(err);
                },
                SourceOutcome::Failed(err) => {
                    log::warn!("{} identity source failed: {}", kind, err);
                    reasons.push(format!("{kind}: {err}"));
                },
            }
        }

        Err(Error::Configuration { reasons })
    }
}
