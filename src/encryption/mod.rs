//! Password-based PDF encryption.
//!
//! Implements the Standard security handler (ISO 32000-1:2008, Section 7.6.3)
//! for writing: AES-128 (V=4, R=4) by default and RC4-128 (V=2, R=3) for
//! older readers.
//!
//! Permissions are fail-closed. Anything not explicitly granted ends up in
//! the [`Restrictions`] mask, and the `/P` value is derived from that mask.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize};

use crate::validation::{ValidationIssue, MIN_PASSWORD_LENGTH};

mod aes;
mod algorithms;
mod encryptor;
mod rc4;
mod write_handler;

pub use encryptor::{DocumentEncryptor, Encrypt};

/// Reserved `/P` bits that must be set (bits 7-8 and 13-32).
pub const PERMISSION_TEMPLATE: u32 = 0xFFFF_F0C0;

/// Encryption algorithm written to the security handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EncryptionAlgorithm {
    /// AES-128 in CBC mode (PDF 1.6, V=4, R=4)
    #[default]
    Aes128,
    /// RC4 with a 128-bit key (PDF 1.4, V=2, R=3)
    #[serde(rename = "rc4_128")]
    Rc4_128,
}

impl EncryptionAlgorithm {
    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        16
    }

    /// `(V, R)` for the encryption dictionary.
    pub fn version_revision(&self) -> (i64, u32) {
        match self {
            EncryptionAlgorithm::Aes128 => (4, 4),
            EncryptionAlgorithm::Rc4_128 => (2, 3),
        }
    }

    /// Whether this is an AES algorithm.
    pub fn is_aes(&self) -> bool {
        matches!(self, EncryptionAlgorithm::Aes128)
    }

    /// Minimum PDF version that understands this algorithm.
    pub fn min_pdf_version(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes128 => "1.6",
            EncryptionAlgorithm::Rc4_128 => "1.4",
        }
    }
}

bitflags! {
    /// Operations forbidden on the encrypted document.
    ///
    /// Bit positions follow PDF Table 22 (user access permissions).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Restrictions: u32 {
        /// Bit 3: print
        const PRINT = 1 << 2;
        /// Bit 4: modify contents
        const MODIFY = 1 << 3;
        /// Bit 5: copy or extract text and graphics
        const COPY = 1 << 4;
        /// Bit 6: add or modify annotations
        const ANNOTATE = 1 << 5;
        /// Bit 9: fill in form fields
        const FILL_FORMS = 1 << 8;
        /// Bit 10: extract for accessibility
        const ACCESSIBILITY = 1 << 9;
        /// Bit 11: assemble (insert, rotate, delete pages)
        const ASSEMBLE = 1 << 10;
        /// Bit 12: print at full quality
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Restrictions {
    /// The signed `/P` value: every bit allowed except the restricted ones.
    pub fn p_value(&self) -> i32 {
        (PERMISSION_TEMPLATE | (Restrictions::all().bits() & !self.bits())) as i32
    }
}

/// Printing permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PrintPermission {
    /// Printing forbidden
    #[default]
    None,
    /// Degraded printing only
    LowResolution,
    /// Full-quality printing
    HighResolution,
}

impl<'de> Deserialize<'de> for PrintPermission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match LooseValue::deserialize(deserializer)? {
            LooseValue::Missing => Ok(PrintPermission::None),
            LooseValue::Bool(true) => Ok(PrintPermission::HighResolution),
            LooseValue::Bool(false) => Ok(PrintPermission::None),
            LooseValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "highresolution" | "high" | "true" => Ok(PrintPermission::HighResolution),
                "lowresolution" | "low" => Ok(PrintPermission::LowResolution),
                "none" | "false" | "" => Ok(PrintPermission::None),
                other => Err(serde::de::Error::custom(format!(
                    "unknown printing permission '{other}'"
                ))),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseValue {
    Missing,
    Bool(bool),
    Text(String),
}

fn loose_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Option::<LooseValue>::deserialize(deserializer)? {
        None | Some(LooseValue::Missing) => Ok(false),
        Some(LooseValue::Bool(value)) => Ok(value),
        Some(LooseValue::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "allowed" => Ok(true),
            "false" | "no" | "none" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean permission, got '{other}'"
            ))),
        },
    }
}

/// What a user opening the document may do. Absent means forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permissions {
    /// Printing tri-state
    pub printing: PrintPermission,
    /// Modify contents
    #[serde(deserialize_with = "loose_bool")]
    pub modifying: bool,
    /// Copy text and graphics
    #[serde(deserialize_with = "loose_bool")]
    pub copying: bool,
    /// Add or modify annotations
    #[serde(deserialize_with = "loose_bool")]
    pub annotating: bool,
    /// Fill in form fields
    #[serde(deserialize_with = "loose_bool")]
    pub filling_forms: bool,
    /// Extract content for accessibility tools
    #[serde(deserialize_with = "loose_bool")]
    pub content_accessibility: bool,
    /// Insert, rotate, or delete pages
    #[serde(deserialize_with = "loose_bool")]
    pub document_assembly: bool,
}

impl Permissions {
    /// Everything permitted.
    pub fn all() -> Self {
        Self {
            printing: PrintPermission::HighResolution,
            modifying: true,
            copying: true,
            annotating: true,
            filling_forms: true,
            content_accessibility: true,
            document_assembly: true,
        }
    }

    /// Nothing permitted.
    pub fn none() -> Self {
        Self::default()
    }

    /// Restriction mask: one bit per forbidden operation.
    pub fn restrictions(&self) -> Restrictions {
        let mut restrictions = Restrictions::empty();
        match self.printing {
            PrintPermission::None => {
                restrictions |= Restrictions::PRINT | Restrictions::PRINT_HIGH_QUALITY
            },
            PrintPermission::LowResolution => restrictions |= Restrictions::PRINT_HIGH_QUALITY,
            PrintPermission::HighResolution => {},
        }
        restrictions.set(Restrictions::MODIFY, !self.modifying);
        restrictions.set(Restrictions::COPY, !self.copying);
        restrictions.set(Restrictions::ANNOTATE, !self.annotating);
        restrictions.set(Restrictions::FILL_FORMS, !self.filling_forms);
        restrictions.set(Restrictions::ACCESSIBILITY, !self.content_accessibility);
        restrictions.set(Restrictions::ASSEMBLE, !self.document_assembly);
        restrictions
    }

    /// `/P` value for the encryption dictionary.
    pub fn p_value(&self) -> i32 {
        self.restrictions().p_value()
    }
}

/// Caller-supplied encryption request.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncryptionOptions {
    /// Whether to encrypt at all
    pub enabled: bool,
    /// Password required to open the document
    #[serde(skip_serializing)]
    pub user_password: Option<String>,
    /// Password granting full access
    #[serde(skip_serializing)]
    pub owner_password: Option<String>,
    /// Granted permissions
    pub permissions: Permissions,
    /// Cipher to use
    pub algorithm: EncryptionAlgorithm,
}

impl fmt::Debug for EncryptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionOptions")
            .field("enabled", &self.enabled)
            .field("user_password", &self.user_password().map(|_| "<redacted>"))
            .field("owner_password", &self.owner_password().map(|_| "<redacted>"))
            .field("permissions", &self.permissions)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl EncryptionOptions {
    /// Disabled options.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enabled options with default (fully restricted) permissions.
    pub fn new(user_password: Option<&str>, owner_password: Option<&str>) -> Self {
        Self {
            enabled: true,
            user_password: user_password.map(str::to_string),
            owner_password: owner_password.map(str::to_string),
            ..Self::default()
        }
    }

    /// Set the granted permissions.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Set the cipher.
    pub fn with_algorithm(mut self, algorithm: EncryptionAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// User password, treating an empty string as absent.
    pub fn user_password(&self) -> Option<&str> {
        self.user_password.as_deref().filter(|p| !p.is_empty())
    }

    /// Owner password, treating an empty string as absent.
    pub fn owner_password(&self) -> Option<&str> {
        self.owner_password.as_deref().filter(|p| !p.is_empty())
    }

    /// Check password presence and length. Only meaningful when enabled.
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let user = self.user_password();
        let owner = self.owner_password();

        if user.is_none() && owner.is_none() {
            issues.push(ValidationIssue::PasswordRequired);
        }
        if user.is_some_and(|p| p.chars().count() < MIN_PASSWORD_LENGTH) {
            issues.push(ValidationIssue::UserPasswordTooShort);
        }
        if owner.is_some_and(|p| p.chars().count() < MIN_PASSWORD_LENGTH) {
            issues.push(ValidationIssue::OwnerPasswordTooShort);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Metadata describing an encryption outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMetadata {
    /// Whether the output is encrypted
    pub encrypted: bool,
    /// Permissions that were requested
    pub permissions: Permissions,
    /// `/P` value written, when encrypted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_flags: Option<i32>,
    /// Whether the caller supplied a user password
    pub has_user_password: bool,
    /// Whether the caller supplied an owner password
    pub has_owner_password: bool,
    /// Cipher used, when encrypted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<EncryptionAlgorithm>,
}

/// Output of [`Encrypt::encrypt`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionResult {
    /// Output buffer
    #[serde(skip)]
    pub encrypted_document: Option<Vec<u8>>,
    /// What was done
    pub metadata: EncryptionMetadata,
}
