//! Integration tests for embedded CMS signatures.
//!
//! Signs with the fixture identity and verifies the result:
//! - ByteRange covers everything except the /Contents hex string
//! - Message digest and RSA signature check out
//! - Any modification of covered bytes is detected

mod common;

use common::{create_pdf, identity, FIXTURE_CN};
use pdf_certify::signatures::{
    ByteRangeCalculator, SignatureMode, SignatureSubFilter, VerificationStatus,
};
use pdf_certify::{extract_metadata, DocumentSigner, SignatureVerifier, SigningOptions};

fn embedded_options() -> SigningOptions {
    SigningOptions::default()
        .with_reason("Final version")
        .with_location("Amsterdam")
        .with_mode(SignatureMode::Embedded)
}

fn sign_embedded(options: &SigningOptions) -> Vec<u8> {
    DocumentSigner::new()
        .sign(&create_pdf(2, Some("Invoice")), &identity(), options)
        .unwrap()
        .signed_document
}

mod round_trip_tests {
    use super::*;

    #[test]
    fn test_invisible_embedded_signature_verifies() {
        let pdf = sign_embedded(&embedded_options());
        let results = SignatureVerifier::new().verify_document(&pdf).unwrap();
        assert_eq!(results.len(), 1);

        let result = &results[0];
        assert_eq!(result.status, VerificationStatus::Valid, "{:?}", result.messages);
        assert!(result.status.is_valid());
        assert!(result.covers_whole_document);

        let info = &result.signature_info;
        assert_eq!(info.signer_name.as_deref(), Some(FIXTURE_CN));
        assert_eq!(info.certificate_cn.as_deref(), Some(FIXTURE_CN));
        assert_eq!(info.reason.as_deref(), Some("Final version"));
        assert_eq!(info.location.as_deref(), Some("Amsterdam"));
        assert_eq!(info.sub_filter, Some(SignatureSubFilter::Pkcs7Detached));
        assert!(info.signing_time.as_deref().unwrap().starts_with("D:"));
    }

    #[test]
    fn test_visible_embedded_signature_verifies() {
        let pdf = sign_embedded(&embedded_options().with_visible_signature(Some(1)));
        let results = SignatureVerifier::new().verify_document(&pdf).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, VerificationStatus::Valid, "{:?}", results[0].messages);
    }

    #[test]
    fn test_label_still_readable() {
        let pdf = sign_embedded(&embedded_options());
        let label = extract_metadata(&pdf).unwrap().metadata.unwrap();
        assert_eq!(label.signer, FIXTURE_CN);
        assert_eq!(label.title.as_deref(), Some("Invoice - Certified"));
    }

    #[test]
    fn test_byte_range_spans_file() {
        let pdf = sign_embedded(&embedded_options());
        let results = SignatureVerifier::new().verify_document(&pdf).unwrap();
        let range: [i64; 4] = results[0].signature_info.byte_range.as_slice().try_into().unwrap();

        assert_eq!(range[0], 0);
        assert_eq!(range[2] + range[3], pdf.len() as i64);
        assert!(ByteRangeCalculator::validate_byte_range(&range, pdf.len()).is_ok());
        assert_eq!(pdf[range[1] as usize], b'<');
        assert_eq!(pdf[range[2] as usize - 1], b'>');
    }

    #[test]
    fn test_small_reservation_fails_signing() {
        let err = DocumentSigner::new()
            .with_signature_size(16)
            .sign(&create_pdf(1, None), &identity(), &embedded_options())
            .unwrap_err();
        assert!(err.to_string().starts_with("signing failed"));
    }
}

mod tamper_tests {
    use super::*;

    #[test]
    fn test_modified_content_detected() {
        let mut pdf = sign_embedded(&embedded_options());
        let needle = b"Contract page 2";
        let at = pdf.windows(needle.len()).position(|w| w == needle).unwrap();
        pdf[at + needle.len() - 1] = b'3';

        let results = SignatureVerifier::new().verify_document(&pdf).unwrap();
        assert_eq!(results[0].status, VerificationStatus::Invalid);
        assert!(!results[0].digest_matches);
        assert!(results[0].signature_valid);
    }

    #[test]
    fn test_overflowing_byte_range_is_invalid() {
        let mut doc = lopdf::Document::load_mem(&sign_embedded(&embedded_options())).unwrap();
        let sig_id = doc
            .objects
            .iter()
            .find(|(_, object)| {
                object
                    .as_dict()
                    .and_then(|dict| dict.get(b"Type"))
                    .and_then(lopdf::Object::as_name)
                    .map(|name| name == b"Sig")
                    .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .unwrap();
        doc.get_dictionary_mut(sig_id).unwrap().set(
            "ByteRange",
            vec![0.into(), 1.into(), i64::MAX.into(), i64::MAX.into()],
        );
        let mut pdf = Vec::new();
        doc.save_to(&mut pdf).unwrap();

        let results = SignatureVerifier::new().verify_document(&pdf).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, VerificationStatus::Invalid);
        assert!(!results[0].covers_whole_document);
    }

    #[test]
    fn test_appended_bytes_detected() {
        let mut pdf = sign_embedded(&embedded_options());
        pdf.extend_from_slice(b"\n% trailing comment\n");

        let results = SignatureVerifier::new().verify_document(&pdf).unwrap();
        assert_eq!(results[0].status, VerificationStatus::Invalid);
        assert!(!results[0].covers_whole_document);
        assert!(results[0].digest_matches);
    }
}
