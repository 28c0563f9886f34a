//! Reading the certification label back from a document.

use super::types::{CertificationLabel, ExtractedMetadata};
use crate::document;
use crate::error::Result;

/// Keyword whose presence marks a document as certified.
pub const CERTIFIED_KEYWORD: &str = "certified";

/// Read the certification label from a document's Info dictionary.
///
/// `signed` is true whenever the Keywords entry contains `"certified"`
/// anywhere. The label itself is only parsed when Keywords has at least the
/// four tokens `certified signed <CN...> <timestamp>`.
pub fn extract_metadata(bytes: &[u8]) -> Result<ExtractedMetadata> {
    let doc = document::load(bytes)?;
    let info = document::info(&doc);

    let Some(keywords) = document::text_entry(&info, b"Keywords") else {
        return Ok(ExtractedMetadata::default());
    };
    if !keywords.contains(CERTIFIED_KEYWORD) {
        return Ok(ExtractedMetadata::default());
    }

    let metadata = parse_keywords(&keywords).map(|(signer, signed_at)| CertificationLabel {
        signer,
        signed_at,
        reason: non_empty(document::text_entry(&info, b"CertifyReason")),
        location: non_empty(document::text_entry(&info, b"CertifyLocation")),
        contact_info: non_empty(document::text_entry(&info, b"CertifyContactInfo")),
        title: document::text_entry(&info, b"Title"),
        subject: document::text_entry(&info, b"Subject"),
    });
    if metadata.is_none() {
        log::debug!("Keywords mention certification but do not carry a label: {keywords:?}");
    }

    Ok(ExtractedMetadata {
        signed: true,
        metadata,
    })
}

/// Signer CN (tokens between the second and the last) and timestamp (last token).
fn parse_keywords(keywords: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = keywords.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }
    let signer = tokens[2..tokens.len() - 1].join(" ");
    let signed_at = tokens[tokens.len() - 1].to_string();
    Some((signer, signed_at))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
