//! PKCS#12 container decoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p12_keystore::{KeyStore, KeyStoreEntry};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Certificate and key bags extracted from a container.
pub(crate) struct DecodedContainer {
    pub certificate_der: Vec<u8>,
    pub private_key_der: Zeroizing<Vec<u8>>,
}

/// Decode a PKCS#12 container into exactly one certificate and one key.
///
/// Both legacy (SHA-1 MAC, 3DES/RC2 PBE) and current (SHA-256 MAC, PBES2 with
/// AES) containers are accepted.
pub(crate) fn decode(bytes: &[u8], password: &str) -> Result<DecodedContainer> {
    if bytes.is_empty() {
        return Err(Error::Pkcs12("Container is empty".to_string()));
    }

    let keystore = KeyStore::from_pkcs12(bytes, password).map_err(open_error)?;

    let mut certificates: Vec<Vec<u8>> = Vec::new();
    let mut keys: Vec<Zeroizing<Vec<u8>>> = Vec::new();
    let mut add_certificate = |der: &[u8]| {
        if !certificates.iter().any(|known| known.as_slice() == der) {
            certificates.push(der.to_vec());
        }
    };
    for (_, entry) in keystore.entries() {
        match entry {
            KeyStoreEntry::PrivateKeyChain(chain) => {
                keys.push(Zeroizing::new(chain.key().to_vec()));
                for certificate in chain.chain() {
                    add_certificate(certificate.as_der());
                }
            },
            KeyStoreEntry::Certificate(certificate) => add_certificate(certificate.as_der()),
            #[allow(unreachable_patterns)]
            _ => {},
        }
    }

    log::debug!(
        "PKCS#12 container holds {} certificate(s) and {} key(s)",
        certificates.len(),
        keys.len()
    );

    let certificate_der = match certificates.len() {
        0 => return Err(Error::Pkcs12("No certificate found".to_string())),
        1 => certificates.remove(0),
        n => {
            return Err(Error::Pkcs12(format!(
                "Expected exactly one certificate, found {n}"
            )))
        },
    };
    let private_key_der = match keys.len() {
        0 => return Err(Error::Pkcs12("No private key found".to_string())),
        1 => keys.remove(0),
        n => {
            return Err(Error::Pkcs12(format!(
                "Expected exactly one private key, found {n}"
            )))
        },
    };

    Ok(DecodedContainer {
        certificate_der,
        private_key_der,
    })
}

/// Map a container failure to a message that never echoes the password.
fn open_error(err: impl std::fmt::Display) -> Error {
    let detail = err.to_string();
    let lower = detail.to_ascii_lowercase();
    let bad_mac = lower.contains("mac") && !lower.contains("unsupported");
    if bad_mac || lower.contains("password") {
        Error::Pkcs12(
            "MAC verification failed (wrong password or corrupted container)".to_string(),
        )
    } else {
        Error::Pkcs12(format!("Malformed PKCS#12 container: {detail}"))
    }
}

/// Strip surrounding quotes and all whitespace from a configured value.
pub(crate) fn clean_base64(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Decode an inline base64 container, reporting only the input length on failure.
pub(crate) fn decode_base64(raw: &str) -> Result<Zeroizing<Vec<u8>>> {
    let cleaned = Zeroizing::new(clean_base64(raw));
    STANDARD
        .decode(cleaned.as_bytes())
        .map(Zeroizing::new)
        .map_err(|_| Error::Base64 {
            length: cleaned.len(),
            reason: "not valid base64".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::test_support::{fixture_bytes, FIXTURE_PASSWORD};

    #[test]
    fn test_decode_fixture() {
        let decoded = decode(fixture_bytes(), FIXTURE_PASSWORD).unwrap();
        assert!(!decoded.certificate_der.is_empty());
        assert!(!decoded.private_key_der.is_empty());
    }

    #[test]
    fn test_wrong_password() {
        let err = decode(fixture_bytes(), "not-the-password").err().unwrap();
        assert!(err.to_string().contains("MAC verification failed"));
    }

    #[test]
    fn test_garbage_container() {
        assert!(matches!(decode(b"not a pfx", "x"), Err(Error::Pkcs12(_))));
        assert!(matches!(decode(b"", "x"), Err(Error::Pkcs12(_))));
    }

    #[test]
    fn test_multiple_certificates_rejected() {
        let bytes = include_bytes!("../../tests/fixtures/multi_cert.p12");
        let err = decode(bytes, FIXTURE_PASSWORD).err().unwrap();
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn test_missing_key_rejected() {
        let bytes = include_bytes!("../../tests/fixtures/no_key.p12");
        let err = decode(bytes, FIXTURE_PASSWORD).err().unwrap();
        assert!(err.to_string().contains("No private key found"));
    }

    #[test]
    fn test_clean_base64_strips_quotes_and_whitespace() {
        assert_eq!(clean_base64("  \"QUJD\nREVG\r\n\"  "), "QUJDREVG");
        assert_eq!(clean_base64("'QU JD'"), "QUJD");
    }

    #[test]
    fn test_decode_base64_reports_length_not_content() {
        let err = decode_base64("\"secret!!value\"").unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::Base64 { length: 13, .. }));
        assert!(!msg.contains("secret"));
    }

    #[test]
    fn test_decode_base64_error_hides_offending_byte() {
        // '!' is byte 33 at offset 4
        let msg = decode_base64("QUJD!EVG").unwrap_err().to_string();
        assert!(msg.contains("8 characters"));
        assert!(!msg.contains("33"));
        assert!(!msg.contains("offset"));
    }

    #[test]
    fn test_decode_legacy_container() {
        let bytes = include_bytes!("../../tests/fixtures/identity_legacy.p12");
        let legacy = decode(bytes, FIXTURE_PASSWORD).unwrap();
        let current = decode(fixture_bytes(), FIXTURE_PASSWORD).unwrap();
        assert_eq!(legacy.certificate_der, current.certificate_der);
    }

    #[test]
    fn test_decode_wrapped_fixture_base64() {
        let wrapped = include_str!("../../tests/fixtures/identity.p12.b64");
        let bytes = decode_base64(wrapped).unwrap();
        assert_eq!(bytes.as_slice(), fixture_bytes());
    }
}
