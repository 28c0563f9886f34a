//! ByteRange calculation for embedded signatures.
//!
//! The ByteRange is `[offset1 length1 offset2 length2]`: the whole file
//! except the hex-encoded `/Contents` value, which holds the signature.
//!
//! The signer serializes the document with placeholder values, locates them
//! in the output, and patches them in place so no offsets move.

use crate::error::{Error, Result};

/// Integer written to each ByteRange slot before the real offsets are known.
pub const BYTE_RANGE_PLACEHOLDER: i64 = 9_999_999_999;

/// Calculator for PDF signature byte ranges.
#[derive(Debug)]
pub struct ByteRangeCalculator {
    /// Size of the `/Contents` value: hex digits plus the angle brackets
    placeholder_size: usize,
}

impl ByteRangeCalculator {
    /// Calculator for a DER signature of up to `estimated_signature_size` bytes.
    pub fn new(estimated_signature_size: usize) -> Self {
        Self {
            placeholder_size: estimated_signature_size * 2 + 2,
        }
    }

    /// Size of the `/Contents` value including `<` and `>`.
    pub fn placeholder_size(&self) -> usize {
        self.placeholder_size
    }

    /// Raw bytes for the `/Contents` placeholder string.
    pub fn placeholder_bytes(&self) -> Vec<u8> {
        vec![0u8; (self.placeholder_size - 2) / 2]
    }

    /// Byte range around a `/Contents` value starting at `contents_offset`.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> [i64; 4] {
        let after_sig_start = contents_offset + self.placeholder_size;
        [
            0,
            contents_offset as i64,
            after_sig_start as i64,
            file_size as i64 - after_sig_start as i64,
        ]
    }

    /// Offset of the `<` opening the zero-filled `/Contents` placeholder.
    pub fn find_contents_offset(&self, pdf_data: &[u8]) -> Option<usize> {
        let digits = self.placeholder_size - 2;
        let mut search_from = 0;
        while let Some(relative) = find(&pdf_data[search_from..], b"/Contents") {
            let mut cursor = search_from + relative + b"/Contents".len();
            while cursor < pdf_data.len() && pdf_data[cursor].is_ascii_whitespace() {
                cursor += 1;
            }
            let end = cursor + self.placeholder_size;
            if end <= pdf_data.len()
                && pdf_data[cursor] == b'<'
                && pdf_data[end - 1] == b'>'
                && pdf_data[cursor + 1..cursor + 1 + digits].iter().all(|&b| b == b'0')
            {
                return Some(cursor);
            }
            search_from = cursor;
        }
        None
    }

    /// Overwrite the placeholder ByteRange array with real offsets.
    ///
    /// The array keeps its serialized width; the values are padded with spaces.
    pub fn write_byte_range(pdf_data: &mut [u8], byte_range: &[i64; 4]) -> Result<()> {
        let placeholder = BYTE_RANGE_PLACEHOLDER.to_string();
        let mut search_from = 0;

        while let Some(relative) = find(&pdf_data[search_from..], b"/ByteRange") {
            let key_end = search_from + relative + b"/ByteRange".len();
            let open = match pdf_data[key_end..].iter().position(|&b| !b.is_ascii_whitespace()) {
                Some(skip) if pdf_data[key_end + skip] == b'[' => key_end + skip,
                _ => {
                    search_from = key_end;
                    continue;
                },
            };
            let close = match pdf_data[open..].iter().position(|&b| b == b']') {
                Some(len) => open + len,
                None => break,
            };

            let inner = &pdf_data[open + 1..close];
            if find(inner, placeholder.as_bytes()).is_none() {
                search_from = close;
                continue;
            }

            let values = byte_range
                .iter()
                .map(|value| value.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            if values.len() > inner.len() {
                return Err(Error::Parse(format!(
                    "ByteRange needs {} bytes but the placeholder has {}",
                    values.len(),
                    inner.len()
                )));
            }
            let width = inner.len();
            let padded = format!("{values:<width$}");
            pdf_data[open + 1..close].copy_from_slice(padded.as_bytes());
            return Ok(());
        }

        Err(Error::Parse("ByteRange placeholder not found".to_string()))
    }

    /// Format a ByteRange as a PDF array.
    pub fn format_byte_range(byte_range: &[i64; 4]) -> String {
        format!("[{} {} {} {}]", byte_range[0], byte_range[1], byte_range[2], byte_range[3])
    }

    /// Concatenate the two covered ranges.
    pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
        if byte_range.iter().any(|&v| v < 0) {
            return Err(Error::Parse(format!(
                "ByteRange contains negative values: {}",
                Self::format_byte_range(byte_range)
            )));
        }
        let [offset1, length1, offset2, length2] = byte_range.map(|v| usize::try_from(v).unwrap_or(usize::MAX));
        let first = covered_span(offset1, length1, pdf_data.len()).ok_or_else(|| {
            Error::Parse(format!(
                "ByteRange first range exceeds file size: {} + {} > {}",
                offset1,
                length1,
                pdf_data.len()
            ))
        })?;
        let second = covered_span(offset2, length2, pdf_data.len()).ok_or_else(|| {
            Error::Parse(format!(
                "ByteRange second range exceeds file size: {} + {} > {}",
                offset2,
                length2,
                pdf_data.len()
            ))
        })?;

        let mut signed_bytes = Vec::with_capacity(first.len() + second.len());
        signed_bytes.extend_from_slice(&pdf_data[first]);
        signed_bytes.extend_from_slice(&pdf_data[second]);
        Ok(signed_bytes)
    }

    /// Check that a ByteRange covers the whole file except one gap.
    pub fn validate_byte_range(byte_range: &[i64; 4], file_size: usize) -> Result<()> {
        let [offset1, length1, offset2, length2] = *byte_range;

        if offset1 != 0 {
            return Err(Error::Parse(format!("ByteRange must start at 0, got {offset1}")));
        }
        if offset2 < 0 || length1 < 0 || length2 < 0 {
            return Err(Error::Parse(format!(
                "ByteRange contains negative values: {}",
                Self::format_byte_range(byte_range)
            )));
        }
        let Some(actual_end) = offset2.checked_add(length2) else {
            return Err(Error::Parse(format!(
                "ByteRange second range overflows: {offset2} + {length2}"
            )));
        };
        if actual_end != file_size as i64 {
            return Err(Error::Parse(format!(
                "ByteRange must end at file size {file_size}, got {actual_end}"
            )));
        }
        if length1 > offset2 {
            return Err(Error::Parse(format!(
                "ByteRange first range ({length1}) overlaps with second range start ({offset2})"
            )));
        }
        Ok(())
    }

    /// Write a hex signature into the placeholder at `contents_offset`, zero padded.
    pub fn insert_signature(
        &self,
        pdf_data: &mut [u8],
        contents_offset: usize,
        signature_hex: &str,
    ) -> Result<()> {
        let digits = self.placeholder_size - 2;
        if signature_hex.len() > digits {
            return Err(Error::Crypto(format!(
                "Signature ({} hex digits) exceeds placeholder ({} hex digits)",
                signature_hex.len(),
                digits
            )));
        }
        if covered_span(contents_offset, self.placeholder_size, pdf_data.len()).is_none() {
            return Err(Error::Parse(
                "Signature insertion would exceed file bounds".to_string(),
            ));
        }

        let value = format!("<{signature_hex:0<digits$}>");
        pdf_data[contents_offset..contents_offset + self.placeholder_size]
            .copy_from_slice(value.as_bytes());
        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        // 8 KiB fits an RSA-4096 signature with its certificate.
        Self::new(8192)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// `offset..offset + length` when it lies inside a file of `file_size` bytes.
fn covered_span(offset: usize, length: usize, file_size: usize) -> Option<std::ops::Range<usize>> {
    let end = offset.checked_add(length)?;
    (end <= file_size).then_some(offset..end)
}
