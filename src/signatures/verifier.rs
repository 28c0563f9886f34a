//! Embedded signature verification.
//!
//! Checks that the ByteRange spans the file, that the covered bytes hash to
//! the signed message digest, and that the RSA signature over the signed
//! attributes verifies against the embedded signer certificate. Chain
//! building and revocation are out of scope.

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::{Decode, Encode, SliceReader};
use lopdf::{Dictionary, Object};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha2::Sha256;
use signature::Verifier;

use super::byterange::ByteRangeCalculator;
use super::cms::{digest_signed_bytes, OID_MESSAGE_DIGEST, OID_SIGNED_DATA};
use super::types::{SignatureInfo, SignatureSubFilter, VerificationResult, VerificationStatus};
use crate::document;
use crate::error::{Error, Result};
use crate::identity::Certificate;

/// Verifier for embedded CMS signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier;

/// What the CMS check established.
struct CmsCheck {
    digest_matches: bool,
    signature_valid: bool,
    certificate_cn: Option<String>,
}

impl SignatureVerifier {
    /// Create a new signature verifier.
    pub fn new() -> Self {
        Self
    }

    /// Verify every `/Type /Sig` dictionary in the document.
    pub fn verify_document(&self, pdf_data: &[u8]) -> Result<Vec<VerificationResult>> {
        let doc = document::load(pdf_data)?;
        let mut results = Vec::new();
        for object in doc.objects.values() {
            if let Object::Dictionary(dict) = object {
                if is_signature(dict) {
                    results.push(self.verify(pdf_data, dict)?);
                }
            }
        }
        log::debug!("Verified {} embedded signature(s)", results.len());
        Ok(results)
    }

    /// Extract signature information from a signature dictionary.
    pub fn extract_signature_info(&self, dict: &Dictionary) -> SignatureInfo {
        let name_entry = |key: &[u8]| match dict.get(key) {
            Ok(Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        };

        SignatureInfo {
            signer_name: document::text_entry(dict, b"Name"),
            signing_time: document::text_entry(dict, b"M"),
            reason: document::text_entry(dict, b"Reason"),
            location: document::text_entry(dict, b"Location"),
            contact_info: document::text_entry(dict, b"ContactInfo"),
            sub_filter: name_entry(b"SubFilter")
                .as_deref()
                .and_then(SignatureSubFilter::from_pdf_name),
            byte_range: match dict.get(b"ByteRange") {
                Ok(Object::Array(values)) => values.iter().filter_map(|v| v.as_i64().ok()).collect(),
                _ => Vec::new(),
            },
            certificate_cn: None,
        }
    }

    /// Verify one signature dictionary against the file it came from.
    pub fn verify(&self, pdf_data: &[u8], sig_dict: &Dictionary) -> Result<VerificationResult> {
        let mut result = VerificationResult {
            signature_info: self.extract_signature_info(sig_dict),
            ..VerificationResult::default()
        };

        let byte_range: [i64; 4] = match result.signature_info.byte_range.as_slice().try_into() {
            Ok(range) => range,
            Err(_) => {
                result.status = VerificationStatus::Invalid;
                result
                    .messages
                    .push("Invalid ByteRange: expected 4 elements".to_string());
                return Ok(result);
            },
        };

        match ByteRangeCalculator::validate_byte_range(&byte_range, pdf_data.len()) {
            Ok(()) => result.covers_whole_document = true,
            Err(e) => result.messages.push(format!("ByteRange validation failed: {e}")),
        }

        let signed_bytes = match ByteRangeCalculator::extract_signed_bytes(pdf_data, &byte_range) {
            Ok(bytes) => bytes,
            Err(e) => {
                result.status = VerificationStatus::Invalid;
                result.messages.push(e.to_string());
                return Ok(result);
            },
        };
        let digest = digest_signed_bytes(&signed_bytes);

        let contents = match sig_dict.get(b"Contents") {
            Ok(Object::String(bytes, _)) => bytes.as_slice(),
            _ => {
                result.status = VerificationStatus::Invalid;
                result.messages.push("Signature has no /Contents".to_string());
                return Ok(result);
            },
        };

        match check_cms(contents, &digest) {
            Ok(check) => {
                result.digest_matches = check.digest_matches;
                result.signature_valid = check.signature_valid;
                result.signature_info.certificate_cn = check.certificate_cn;
                if !check.digest_matches {
                    result.messages.push("Document digest does not match".to_string());
                }
                if !check.signature_valid {
                    result.messages.push("Signature does not verify".to_string());
                }
            },
            Err(e) => result.messages.push(format!("Signature verification failed: {e}")),
        }

        result.status = if result.covers_whole_document
            && result.digest_matches
            && result.signature_valid
        {
            VerificationStatus::Valid
        } else {
            VerificationStatus::Invalid
        };
        Ok(result)
    }

    /// Quick check if a signature appears well formed (no cryptography).
    pub fn quick_check(&self, sig_dict: &Dictionary) -> bool {
        let info = self.extract_signature_info(sig_dict);
        info.byte_range.len() == 4 && info.sub_filter.is_some()
    }
}

fn is_signature(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Type"), Ok(Object::Name(name)) if name == b"Sig")
}

fn check_cms(contents: &[u8], digest: &[u8]) -> Result<CmsCheck> {
    // /Contents is zero padded past the end of the DER value.
    let mut reader = SliceReader::new(contents).map_err(asn1_error)?;
    let content_info = ContentInfo::decode(&mut reader).map_err(asn1_error)?;
    if content_info.content_type != OID_SIGNED_DATA {
        return Err(Error::Crypto("ContentInfo is not SignedData".to_string()));
    }
    let signed_data =
        SignedData::from_der(&content_info.content.to_der().map_err(asn1_error)?).map_err(asn1_error)?;

    let signer_info = signed_data
        .signer_infos
        .0
        .iter()
        .next()
        .ok_or_else(|| Error::Crypto("SignedData has no signers".to_string()))?;
    let signed_attrs = signer_info
        .signed_attrs
        .as_ref()
        .ok_or_else(|| Error::Crypto("Signer has no signed attributes".to_string()))?;

    let digest_matches = signed_attrs
        .iter()
        .find(|attr| attr.oid == OID_MESSAGE_DIGEST)
        .and_then(|attr| attr.values.iter().next())
        .map(|value| value.value() == digest)
        .unwrap_or(false);

    let certificate = signed_data
        .certificates
        .as_ref()
        .and_then(|set| {
            set.0.iter().find_map(|choice| match choice {
                CertificateChoices::Certificate(cert) => Some(cert),
                _ => None,
            })
        })
        .ok_or_else(|| Error::Crypto("Signer certificate not embedded".to_string()))?;

    let certificate_cn = Certificate::from_der(certificate.to_der().map_err(asn1_error)?)
        .ok()
        .and_then(|cert| cert.common_name().map(str::to_string));

    let spki_der = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(asn1_error)?;
    let public_key = RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| Error::Crypto(format!("Signer key is not RSA: {e}")))?;
    let signature = Signature::try_from(signer_info.signature.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid signature format: {e}")))?;
    let signature_valid = VerifyingKey::<Sha256>::new(public_key)
        .verify(&signed_attrs.to_der().map_err(asn1_error)?, &signature)
        .is_ok();

    Ok(CmsCheck {
        digest_matches,
        signature_valid,
        certificate_cn,
    })
}

fn asn1_error(err: der::Error) -> Error {
    Error::Crypto(format!("Malformed CMS structure: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::test_support::sample_pdf;
    use crate::identity::test_support::{fixture_identity, FIXTURE_CN};
    use crate::signatures::{DocumentSigner, SignatureMode, SigningOptions};
    use lopdf::dictionary;

    fn embedded() -> Vec<u8> {
        DocumentSigner::new()
            .sign(
                &sample_pdf(1, None),
                &fixture_identity(),
                &SigningOptions::default()
                    .with_reason("Approval")
                    .with_mode(SignatureMode::Embedded),
            )
            .unwrap()
            .signed_document
    }

    #[test]
    fn test_extract_signature_info() {
        let dict = dictionary! {
            "Type" => "Sig",
            "SubFilter" => "adbe.pkcs7.detached",
            "Reason" => Object::string_literal("Approval"),
            "ByteRange" => vec![0.into(), 10.into(), 20.into(), 30.into()],
        };
        let verifier = SignatureVerifier::new();
        let info = verifier.extract_signature_info(&dict);
        assert_eq!(info.reason.as_deref(), Some("Approval"));
        assert_eq!(info.sub_filter, Some(SignatureSubFilter::Pkcs7Detached));
        assert_eq!(info.byte_range, vec![0, 10, 20, 30]);
        assert!(verifier.quick_check(&dict));
        assert!(!verifier.quick_check(&dictionary! { "Type" => "Sig" }));
    }

    #[test]
    fn test_sub_filter_names() {
        let verifier = SignatureVerifier::new();
        let cades = verifier.extract_signature_info(&dictionary! {
            "Type" => "Sig",
            "SubFilter" => "ETSI.CAdES.detached",
        });
        assert_eq!(cades.sub_filter, Some(SignatureSubFilter::CadesDetached));

        let unknown = verifier.extract_signature_info(&dictionary! {
            "Type" => "Sig",
            "SubFilter" => "adbe.x509.rsa_sha1",
        });
        assert_eq!(unknown.sub_filter, None);
    }

    #[test]
    fn test_embedded_signature_verifies() {
        let results = SignatureVerifier::new().verify_document(&embedded()).unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.covers_whole_document, "{:?}", result.messages);
        assert!(result.digest_matches, "{:?}", result.messages);
        assert!(result.signature_valid, "{:?}", result.messages);
        assert_eq!(result.status, VerificationStatus::Valid);
        assert_eq!(result.signature_info.certificate_cn.as_deref(), Some(FIXTURE_CN));
        assert_eq!(result.signature_info.reason.as_deref(), Some("Approval"));
    }

    #[test]
    fn test_tampered_bytes_fail_digest() {
        let mut pdf = embedded();
        let title = b"Document - Certified";
        let at = pdf.windows(title.len()).position(|w| w == title).unwrap();
        pdf[at] = b'd';
        let results = SignatureVerifier::new().verify_document(&pdf).unwrap();
        assert_eq!(results[0].status, VerificationStatus::Invalid);
        assert!(!results[0].digest_matches);
    }

    #[test]
    fn test_metadata_only_has_no_signatures() {
        let signed = DocumentSigner::new()
            .sign(&sample_pdf(1, None), &fixture_identity(), &SigningOptions::default())
            .unwrap();
        assert!(SignatureVerifier::new()
            .verify_document(&signed.signed_document)
            .unwrap()
            .is_empty());
    }
}
