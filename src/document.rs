//! PDF container helpers.
//!
//! Thin layer over `lopdf` for the pieces the signer and encryptor share:
//! loading with encryption detection, page lookup, the Info dictionary, and
//! PDF text string and date encoding.

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

use crate::error::{Error, Result};

const UTF16_BOM: [u8; 2] = [0xFE, 0xFF];

/// Parse a PDF buffer, rejecting empty and encrypted input.
pub fn load(bytes: &[u8]) -> Result<Document> {
    if bytes.is_empty() {
        return Err(Error::Parse("Document is empty".to_string()));
    }
    let document = Document::load_mem(bytes)
        .map_err(|e| Error::Parse(format!("Failed to parse PDF: {e}")))?;
    if is_encrypted(&document) {
        return Err(Error::Parse(
            "Document is already encrypted and cannot be processed".to_string(),
        ));
    }
    log::debug!(
        "Loaded PDF {} with {} objects and {} pages",
        document.version,
        document.objects.len(),
        document.get_pages().len()
    );
    Ok(document)
}

/// Serialize a document to a new buffer.
pub fn save(document: &mut Document) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    document.save_to(&mut buffer)?;
    Ok(buffer)
}

/// Whether the trailer references an encryption dictionary.
pub fn is_encrypted(document: &Document) -> bool {
    document.trailer.has(b"Encrypt")
}

/// Number of pages.
pub fn page_count(document: &Document) -> usize {
    document.get_pages().len()
}

/// Object id of the page at a 0-based index.
pub fn page_id(document: &Document, index: u32) -> Option<ObjectId> {
    let number = index.checked_add(1)?;
    document.get_pages().get(&number).copied()
}

/// Current document Info dictionary, cloned, or an empty one.
pub fn info(document: &Document) -> Dictionary {
    match document.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => document
            .get_dictionary(*id)
            .map(Clone::clone)
            .unwrap_or_default(),
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// Replace the document Info dictionary.
pub fn set_info(document: &mut Document, info: Dictionary) {
    match document.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => {
            let id = *id;
            document.objects.insert(id, Object::Dictionary(info));
        },
        _ => {
            let id = document.add_object(info);
            document.trailer.set("Info", Object::Reference(id));
        },
    }
}

/// Text entry from a dictionary, decoded.
pub fn text_entry(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key) {
        Ok(Object::String(bytes, _)) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

/// Encode a text string: literal for ASCII, UTF-16BE with BOM otherwise.
pub fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = UTF16_BOM.to_vec();
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8 with BOM, or single-byte).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&UTF16_BOM) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        // PDFDocEncoding agrees with Latin-1 for printable text.
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Format a timestamp as a PDF date string (`D:YYYYMMDDHHmmSSZ`).
pub fn pdf_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("D:%Y%m%d%H%M%SZ").to_string()
}
