//! OS keychain lookup.
//!
//! The macOS `security` tool can locate a certificate or signing identity but cannot
//! export the matching private key non-interactively, so a hit always ends
//! in [`Error::KeychainExportRequired`].

use crate::error::{Error, Result};

/// Outcome of a keychain lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KeychainLookup {
    /// A certificate with this name exists
    Found(String),
    /// Nothing matched, with the reason
    NotFound(String),
}

/// Look up a certificate by name, or any identity when no name is configured.
#[cfg(target_os = "macos")]
pub(crate) fn find_certificate(name: Option<&str>) -> Result<KeychainLookup> {
    use std::process::Command;

    let Some(name) = name else {
        log::debug!("Searching keychain for any valid signing identity");
        let output = Command::new("security")
            .args(["find-identity", "-v", "-p", "codesigning"])
            .output()?;
        let listing = String::from_utf8_lossy(&output.stdout);
        return Ok(match first_identity(&listing) {
            Some(found) if output.status.success() => KeychainLookup::Found(found),
            _ => KeychainLookup::NotFound("no signing identity in the keychain".to_string()),
        });
    };

    log::debug!("Searching keychain for certificate '{}'", name);
    let output = Command::new("security")
        .args(["find-certificate", "-c", name, "-p"])
        .output()?;

    let pem = String::from_utf8_lossy(&output.stdout);
    if output.status.success() && pem.contains("BEGIN CERTIFICATE") {
        Ok(KeychainLookup::Found(name.to_string()))
    } else {
        Ok(KeychainLookup::NotFound(format!(
            "no certificate named '{}' in the keychain",
            name
        )))
    }
}

/// Look up a certificate by name, or any identity when no name is configured.
#[cfg(not(target_os = "macos"))]
pub(crate) fn find_certificate(_name: Option<&str>) -> Result<KeychainLookup> {
    Ok(KeychainLookup::NotFound(
        "keychain lookup is only supported on macOS".to_string(),
    ))
}

/// Name of the first entry in `security find-identity` output.
///
/// Entries look like `  1) 3F2A...C9 "Developer ID Application: Jane (TEAM)"`.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn first_identity(listing: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let (index, rest) = line.trim_start().split_once(')')?;
        index.parse::<u32>().ok()?;
        let start = rest.find('"')?;
        let end = rest.rfind('"')?;
        (end > start + 1).then(|| rest[start + 1..end].to_string())
    })
}

/// Map a successful lookup to the manual-export error.
pub(crate) fn export_required(lookup: KeychainLookup) -> std::result::Result<Error, String> {
    match lookup {
        KeychainLookup::Found(certificate) => Ok(Error::KeychainExportRequired { certificate }),
        KeychainLookup::NotFound(reason) => Err(reason),
    }
}
