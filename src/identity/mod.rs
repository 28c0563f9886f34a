//! Signing identities: a certificate plus its private key.
//!
//! An [`Identity`] is built once per operation by the [`IdentityStore`] and
//! dropped when the operation returns. The private key is held in a
//! zeroizing buffer and has no `Debug` or `Display` representation.

mod keychain;
mod pkcs12;
mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub use store::{
    DefaultPathSource, FileSource, IdentitySource, IdentityStore, InlineBase64Source,
    KeychainSource, SourceOutcome,
};

/// Fallback for a missing subject or issuer common name.
pub const UNKNOWN_NAME: &str = "Unknown";

const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_ED25519: &str = "1.3.101.112";

/// Where an identity was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentitySourceKind {
    /// Base64 value from configuration
    InlineBase64,
    /// Explicit `.p12`/`.pfx` path
    File,
    /// Conventional local path
    DefaultPath,
    /// OS keychain
    Keychain,
}

impl fmt::Display for IdentitySourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentitySourceKind::InlineBase64 => "inline base64",
            IdentitySourceKind::File => "file path",
            IdentitySourceKind::DefaultPath => "default path",
            IdentitySourceKind::Keychain => "keychain",
        };
        f.write_str(name)
    }
}

/// Public key algorithm of a certificate or private key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeyAlgorithm {
    /// RSA (rsaEncryption)
    Rsa,
    /// Elliptic curve (id-ecPublicKey)
    Ec,
    /// Ed25519
    Ed25519,
    /// Anything else, by OID
    Other(String),
}

impl KeyAlgorithm {
    fn from_oid(oid: &str) -> Self {
        match oid {
            OID_RSA_ENCRYPTION => KeyAlgorithm::Rsa,
            OID_EC_PUBLIC_KEY => KeyAlgorithm::Ec,
            OID_ED25519 => KeyAlgorithm::Ed25519,
            other => KeyAlgorithm::Other(other.to_string()),
        }
    }
}

/// Public key details, for display and diagnostics only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    /// Key algorithm
    pub algorithm: KeyAlgorithm,
    /// Key size in bits (0 when unknown)
    pub key_size: usize,
    /// DER-encoded SubjectPublicKeyInfo
    #[serde(skip)]
    pub spki_der: Vec<u8>,
}

/// Parsed X.509 certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    common_name: Option<String>,
    issuer_common_name: Option<String>,
    serial_number: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    signature_algorithm: String,
    public_key: PublicKeyInfo,
}

impl Certificate {
    /// Parse a DER-encoded X.509 certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let parsed = {
            let (_, cert) = X509Certificate::from_der(&der)
                .map_err(|e| Error::Certificate(format!("Failed to parse X.509 certificate: {e}")))?;

            let common_name = cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string);
            let issuer_common_name = cert
                .issuer()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string);

            let validity = cert.validity();
            let not_before = timestamp_to_utc(validity.not_before.timestamp())?;
            let not_after = timestamp_to_utc(validity.not_after.timestamp())?;

            let spki = cert.public_key();
            let key_size = match spki.parsed() {
                Ok(PublicKey::RSA(rsa)) => rsa.key_size(),
                Ok(PublicKey::EC(point)) => point.key_size(),
                _ => 0,
            };
            let public_key = PublicKeyInfo {
                algorithm: KeyAlgorithm::from_oid(&spki.algorithm.algorithm.to_id_string()),
                key_size,
                spki_der: spki.raw.to_vec(),
            };

            (
                cert.subject().to_string(),
                cert.issuer().to_string(),
                common_name,
                issuer_common_name,
                cert.tbs_certificate.raw_serial_as_string(),
                not_before,
                not_after,
                cert.signature_algorithm.algorithm.to_id_string(),
                public_key,
            )
        };

        let (
            subject,
            issuer,
            common_name,
            issuer_common_name,
            serial_number,
            not_before,
            not_after,
            signature_algorithm,
            public_key,
        ) = parsed;

        Ok(Self {
            der,
            subject,
            issuer,
            common_name,
            issuer_common_name,
            serial_number,
            not_before,
            not_after,
            signature_algorithm,
            public_key,
        })
    }

    /// DER encoding of the certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject distinguished name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Subject common name, if the subject carries one.
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// Serial number as colon-separated hex.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Start of the validity window.
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Signature algorithm OID.
    pub fn signature_algorithm(&self) -> &str {
        &self.signature_algorithm
    }

    /// Subject public key.
    pub fn public_key(&self) -> &PublicKeyInfo {
        &self.public_key
    }
}

fn timestamp_to_utc(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| Error::Certificate(format!("Validity timestamp out of range: {seconds}")))
}

/// Opaque private key handle.
///
/// Holds PKCS#8 DER bytes that are wiped on drop. Deliberately implements
/// neither `Debug`, `Display`, `Clone` nor `Serialize`.
pub struct PrivateKey {
    der: Zeroizing<Vec<u8>>,
    algorithm: KeyAlgorithm,
}

impl PrivateKey {
    pub(crate) fn from_pkcs8_der(der: Zeroizing<Vec<u8>>) -> Result<Self> {
        let algorithm = {
            let info = pkcs8::PrivateKeyInfo::try_from(der.as_slice())
                .map_err(|e| Error::Pkcs12(format!("Private key is not valid PKCS#8: {e}")))?;
            KeyAlgorithm::from_oid(&info.algorithm.oid.to_string())
        };
        Ok(Self { der, algorithm })
    }

    /// Key algorithm.
    pub fn algorithm(&self) -> &KeyAlgorithm {
        &self.algorithm
    }

    /// Decode as an RSA key for the signing primitive.
    pub(crate) fn to_rsa(&self) -> Result<rsa::RsaPrivateKey> {
        use rsa::pkcs8::DecodePrivateKey;

        if self.algorithm != KeyAlgorithm::Rsa {
            return Err(Error::Crypto(format!(
                "Embedded signatures require an RSA key, found {:?}",
                self.algorithm
            )));
        }
        rsa::RsaPrivateKey::from_pkcs8_der(&self.der)
            .map_err(|e| Error::Crypto(format!("Failed to decode RSA private key: {e}")))
    }
}

/// A decoded signing identity.
pub struct Identity {
    certificate: Option<Certificate>,
    private_key: Option<PrivateKey>,
    common_name: String,
    issuer_name: String,
    source: IdentitySourceKind,
}

impl Identity {
    /// Decode a PKCS#12 container.
    ///
    /// The container must hold exactly one certificate and exactly one
    /// private key.
    pub fn from_pkcs12(bytes: &[u8], password: &str, source: IdentitySourceKind) -> Result<Self> {
        let decoded = pkcs12::decode(bytes, password)?;
        let certificate = Certificate::from_der(decoded.certificate_der)?;
        let private_key = PrivateKey::from_pkcs8_der(decoded.private_key_der)?;
        Ok(Self::from_parts(Some(certificate), Some(private_key), source))
    }

    pub(crate) fn from_parts(
        certificate: Option<Certificate>,
        private_key: Option<PrivateKey>,
        source: IdentitySourceKind,
    ) -> Self {
        let common_name = certificate
            .as_ref()
            .and_then(|c| c.common_name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        let issuer_name = certificate
            .as_ref()
            .and_then(|c| c.issuer_common_name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        Self {
            certificate,
            private_key,
            common_name,
            issuer_name,
            source,
        }
    }

    /// Parsed certificate, if present.
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    /// Public key derived from the certificate.
    pub fn public_key(&self) -> Option<&PublicKeyInfo> {
        self.certificate.as_ref().map(Certificate::public_key)
    }

    /// Whether a private key is present.
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub(crate) fn private_key(&self) -> Result<&PrivateKey> {
        self.private_key
            .as_ref()
            .ok_or(Error::Validation(vec![crate::validation::ValidationIssue::PrivateKeyMissing]))
    }

    /// Subject common name, or `"Unknown"`.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Issuer common name, or `"Unknown"`.
    pub fn issuer_name(&self) -> &str {
        &self.issuer_name
    }

    /// Source the identity was loaded from.
    pub fn source(&self) -> IdentitySourceKind {
        self.source
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("common_name", &self.common_name)
            .field("issuer_name", &self.issuer_name)
            .field("certificate", &self.certificate.as_ref().map(Certificate::subject))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) const FIXTURE_PASSWORD: &str = "test-password";
    pub(crate) const FIXTURE_CN: &str = "Test Signer";

    pub(crate) fn fixture_bytes() -> &'static [u8] {
        include_bytes!("../../tests/fixtures/identity.p12")
    }

    pub(crate) fn fixture_identity() -> Identity {
        Identity::from_pkcs12(fixture_bytes(), FIXTURE_PASSWORD, IdentitySourceKind::File)
            .expect("fixture identity decodes")
    }

    pub(crate) fn identity_with_validity(
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Identity {
        let mut identity = fixture_identity();
        if let Some(certificate) = identity.certificate.as_mut() {
            certificate.not_before = not_before;
            certificate.not_after = not_after;
        }
        identity
    }

    impl Identity {
        pub(crate) fn without_private_key(mut self) -> Self {
            self.private_key = None;
            self
        }

        pub(crate) fn without_certificate(mut self) -> Self {
            self.certificate = None;
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_fixture_identity_fields() {
        let identity = fixture_identity();
        assert_eq!(identity.common_name(), FIXTURE_CN);
        assert_eq!(identity.issuer_name(), FIXTURE_CN);
        assert!(identity.has_private_key());

        let certificate = identity.certificate().unwrap();
        assert!(certificate.subject().contains("CN=Test Signer"));
        assert!(!certificate.serial_number().is_empty());
        assert!(certificate.not_before() < certificate.not_after());
        assert_eq!(certificate.signature_algorithm(), "1.2.840.113549.1.1.11");

        let public_key = identity.public_key().unwrap();
        assert_eq!(public_key.algorithm, KeyAlgorithm::Rsa);
        assert_eq!(public_key.key_size, 2048);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let rendered = format!("{:?}", fixture_identity());
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("Test Signer"));
    }

    #[test]
    fn test_missing_certificate_defaults_names() {
        let identity = Identity::from_parts(None, None, IdentitySourceKind::Keychain);
        assert_eq!(identity.common_name(), UNKNOWN_NAME);
        assert_eq!(identity.issuer_name(), UNKNOWN_NAME);
        assert!(identity.public_key().is_none());
    }

    #[test]
    fn test_private_key_converts_to_rsa() {
        let identity = fixture_identity();
        let key = identity.private_key().unwrap();
        assert_eq!(key.algorithm(), &KeyAlgorithm::Rsa);
        assert!(key.to_rsa().is_ok());
    }

    #[test]
    fn test_garbage_certificate_rejected() {
        let err = Certificate::from_der(vec![0x30, 0x03, 0x02, 0x01, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Certificate(_)));
    }
}
