//! CMS (PKCS#7) detached signatures over a precomputed digest.

use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::signed_data::{EncapsulatedContentInfo, SignerIdentifier};
use der::oid::ObjectIdentifier;
use der::{Decode, Encode};
use rsa::pkcs1v15::SigningKey;
use sha2::{Digest, Sha256};
use spki::AlgorithmIdentifierOwned;

use crate::error::{Error, Result};
use crate::identity::Identity;

/// id-data
pub(crate) const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
/// id-signedData
pub(crate) const OID_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
/// id-messageDigest
pub(crate) const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
/// id-sha256
pub(crate) const OID_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// SHA-256 of the bytes covered by the ByteRange.
pub fn digest_signed_bytes(signed_bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(signed_bytes).to_vec()
}

/// Build a DER-encoded detached CMS SignedData for `digest`.
///
/// The signer certificate is embedded and identified by issuer and serial.
/// Only RSA keys are supported.
pub fn build_detached_signature(digest: &[u8], identity: &Identity) -> Result<Vec<u8>> {
    let certificate = identity.certificate().ok_or_else(|| {
        Error::Validation(vec![crate::validation::ValidationIssue::CertificateMissing])
    })?;
    let certificate = x509_cert::Certificate::from_der(certificate.der())
        .map_err(|e| Error::Certificate(format!("Failed to decode certificate for CMS: {e}")))?;
    let signing_key = SigningKey::<Sha256>::new(identity.private_key()?.to_rsa()?);

    let content = EncapsulatedContentInfo {
        econtent_type: OID_DATA,
        econtent: None,
    };
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: OID_SHA256,
        parameters: None,
    };
    let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: certificate.tbs_certificate.issuer.clone(),
        serial_number: certificate.tbs_certificate.serial_number.clone(),
    });

    let signer_info = SignerInfoBuilder::new(
        &signing_key,
        sid,
        digest_algorithm.clone(),
        &content,
        Some(digest),
    )
    .map_err(cms_error)?;

    let content_info = SignedDataBuilder::new(&content)
        .add_digest_algorithm(digest_algorithm)
        .map_err(cms_error)?
        .add_certificate(CertificateChoices::Certificate(certificate))
        .map_err(cms_error)?
        .add_signer_info::<SigningKey<Sha256>, rsa::pkcs1v15::Signature>(signer_info)
        .map_err(cms_error)?
        .build()
        .map_err(cms_error)?;

    content_info
        .to_der()
        .map_err(|e| Error::Crypto(format!("Failed to encode CMS signature: {e}")))
}

fn cms_error(err: cms::builder::Error) -> Error {
    Error::Crypto(format!("Failed to build CMS signature: {err:?}"))
}

/// Uppercase hex for the `/Contents` value.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8] = b"0123456789ABCDEF";
    let mut hex = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
        hex.push(HEX_CHARS[(byte & 0x0F) as usize] as char);
    }
    hex
}
