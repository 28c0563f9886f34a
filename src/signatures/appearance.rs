//! Signature form fields and their visible appearance.
//!
//! A signature field is a merged field/widget dictionary (`/FT /Sig`,
//! `/Subtype /Widget`) referenced from the page's `/Annots` and from the
//! catalog's AcroForm `/Fields`.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::types::{SignatureAppearance, SignerMetadata};
use crate::error::{Error, Result};

/// SignaturesExist
const SIG_FLAG_SIGNATURES_EXIST: i64 = 1;
/// AppendOnly
const SIG_FLAG_APPEND_ONLY: i64 = 2;
/// Annotation flag: Print
const ANNOT_FLAG_PRINT: i64 = 4;
/// Annotation flag: Hidden | Print, for invisible signatures
const ANNOT_FLAG_INVISIBLE: i64 = 2 | 4;

const FONT_RESOURCE: &str = "Helv";

/// Text lines drawn inside the visible signature block.
pub(crate) fn appearance_lines(metadata: &SignerMetadata) -> Vec<String> {
    let mut lines = vec![
        format!("Digitally signed by {}", metadata.signer),
        format!("Date: {}", metadata.signed_at_iso()),
    ];
    if !metadata.reason.is_empty() {
        lines.push(format!("Reason: {}", metadata.reason));
    }
    if !metadata.location.is_empty() {
        lines.push(format!("Location: {}", metadata.location));
    }
    lines
}

/// Where and how the signature field is drawn.
pub(crate) enum FieldPlacement<'a> {
    /// Visible block with text
    Visible {
        /// Block geometry
        appearance: &'a SignatureAppearance,
        /// Text lines
        lines: Vec<String>,
    },
    /// Zero-size hidden widget
    Invisible,
}

/// Add a signature field to the page and register it in the AcroForm.
///
/// `signature` binds the field to a `/Type /Sig` value dictionary; it also
/// sets `/SigFlags` on the AcroForm.
pub(crate) fn add_signature_field(
    document: &mut Document,
    page_id: ObjectId,
    placement: FieldPlacement<'_>,
    signature: Option<ObjectId>,
) -> Result<ObjectId> {
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let field_name = format!("Signature{}", existing_field_count(document) + 1);
    let mut widget = dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Sig",
        "T" => Object::string_literal(field_name),
        "P" => page_id,
    };

    match placement {
        FieldPlacement::Visible { appearance, lines } => {
            let stream = appearance_stream(appearance, &lines, font_id)?;
            let stream_id = document.add_object(stream);
            widget.set("Rect", rect(appearance));
            widget.set("F", ANNOT_FLAG_PRINT);
            widget.set("AP", dictionary! { "N" => stream_id });
        },
        FieldPlacement::Invisible => {
            widget.set("Rect", vec![0.into(), 0.into(), 0.into(), 0.into()]);
            widget.set("F", ANNOT_FLAG_INVISIBLE);
        },
    }
    if let Some(signature_id) = signature {
        widget.set("V", signature_id);
    }

    let widget_id = document.add_object(widget);
    append_annotation(document, page_id, widget_id)?;
    register_field(document, widget_id, font_id, signature.is_some())?;
    Ok(widget_id)
}

fn rect(appearance: &SignatureAppearance) -> Vec<Object> {
    vec![
        appearance.x.into(),
        appearance.y.into(),
        (appearance.x + appearance.width).into(),
        (appearance.y + appearance.height).into(),
    ]
}

/// Form XObject drawing a border and the text lines.
fn appearance_stream(
    appearance: &SignatureAppearance,
    lines: &[String],
    font_id: ObjectId,
) -> Result<Stream> {
    let font_size = appearance.font_size;
    let leading = font_size * 1.25;

    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("RG", vec![0.2f32.into(), 0.2f32.into(), 0.6f32.into()]),
        Operation::new("w", vec![1.into()]),
        Operation::new(
            "re",
            vec![
                0.5f32.into(),
                0.5f32.into(),
                (appearance.width - 1.0).into(),
                (appearance.height - 1.0).into(),
            ],
        ),
        Operation::new("S", vec![]),
        Operation::new("Q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new("g", vec![0.into()]),
        Operation::new("Tf", vec![FONT_RESOURCE.into(), font_size.into()]),
        Operation::new("TL", vec![leading.into()]),
        Operation::new("Td", vec![4.into(), (appearance.height - font_size - 4.0).into()]),
    ];
    for line in lines {
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(win_ansi_bytes(line), lopdf::StringFormat::Literal)],
        ));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations }
        .encode()
        .map_err(|e| Error::Parse(format!("Failed to encode signature appearance: {e}")))?;

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), appearance.width.into(), appearance.height.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { FONT_RESOURCE => font_id },
            },
        },
        content,
    ))
}

/// Latin-1 subset of WinAnsi; anything else becomes `?`.
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
        .collect()
}

fn append_annotation(document: &mut Document, page_id: ObjectId, widget_id: ObjectId) -> Result<()> {
    let annots = document.get_dictionary(page_id)?.get(b"Annots").ok().cloned();
    match annots {
        Some(Object::Reference(array_id)) => {
            document
                .get_object_mut(array_id)?
                .as_array_mut()?
                .push(Object::Reference(widget_id));
        },
        Some(Object::Array(mut array)) => {
            array.push(Object::Reference(widget_id));
            document.get_dictionary_mut(page_id)?.set("Annots", array);
        },
        _ => {
            document
                .get_dictionary_mut(page_id)?
                .set("Annots", vec![Object::Reference(widget_id)]);
        },
    }
    Ok(())
}

fn catalog_id(document: &Document) -> Result<ObjectId> {
    Ok(document.trailer.get(b"Root")?.as_reference()?)
}

fn existing_field_count(document: &Document) -> usize {
    let Ok(root) = catalog_id(document) else {
        return 0;
    };
    let Ok(catalog) = document.get_dictionary(root) else {
        return 0;
    };
    let acroform = match catalog.get(b"AcroForm") {
        Ok(Object::Reference(id)) => document.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    acroform
        .and_then(|form| form.get(b"Fields").ok())
        .and_then(|fields| match fields {
            Object::Array(array) => Some(array.len()),
            Object::Reference(id) => document
                .get_object(*id)
                .ok()
                .and_then(|o| o.as_array().ok())
                .map(Vec::len),
            _ => None,
        })
        .unwrap_or(0)
}

/// Add the field to AcroForm `/Fields`, creating the AcroForm if needed.
fn register_field(
    document: &mut Document,
    widget_id: ObjectId,
    font_id: ObjectId,
    signed: bool,
) -> Result<()> {
    let root = catalog_id(document)?;
    let existing = document.get_dictionary(root)?.get(b"AcroForm").ok().cloned();

    let (acroform_id, mut acroform) = match existing {
        Some(Object::Reference(id)) => (Some(id), document.get_dictionary(id)?.clone()),
        Some(Object::Dictionary(dict)) => (None, dict),
        _ => (None, Dictionary::new()),
    };

    match acroform.get(b"Fields").ok().cloned() {
        Some(Object::Reference(fields_id)) => {
            document
                .get_object_mut(fields_id)?
                .as_array_mut()?
                .push(Object::Reference(widget_id));
        },
        Some(Object::Array(mut fields)) => {
            fields.push(Object::Reference(widget_id));
            acroform.set("Fields", fields);
        },
        _ => acroform.set("Fields", vec![Object::Reference(widget_id)]),
    }

    if !acroform.has(b"DA") {
        acroform.set("DA", Object::string_literal(format!("/{FONT_RESOURCE} 0 Tf 0 g")));
    }
    if !acroform.has(b"DR") {
        acroform.set(
            "DR",
            dictionary! { "Font" => dictionary! { FONT_RESOURCE => font_id } },
        );
    }
    if signed {
        acroform.set("SigFlags", SIG_FLAG_SIGNATURES_EXIST | SIG_FLAG_APPEND_ONLY);
    }

    match acroform_id {
        Some(id) => {
            document.objects.insert(id, Object::Dictionary(acroform));
        },
        None => {
            document.get_dictionary_mut(root)?.set("AcroForm", acroform);
        },
    }
    Ok(())
}
