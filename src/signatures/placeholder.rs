//! Signature placeholder insertion.
//!
//! Appends one incremental update to an unsigned PDF. The update holds a
//! signature dictionary with a `/ByteRange` placeholder and a zero-filled
//! `/Contents` slot, a signature widget, an AcroForm listing the widget, and
//! new revisions of the catalog and the first page. The original bytes are
//! kept unchanged up to the final `%%EOF`.

use super::types::SignatureSubFilter;
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::writer::ObjectSerializer;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Reason written when the caller does not supply one.
pub const DEFAULT_REASON: &str = "Confirming authenticity of the document";

/// Default capacity of the signature slot in bytes (hex doubles it).
pub const DEFAULT_SIGNATURE_LENGTH: usize = 8192;

/// Name used for each of the three unresolved ByteRange offsets. Ten
/// characters leave room for offsets below 10 GB.
pub const BYTE_RANGE_PLACEHOLDER: &str = "**********";

/// Options for the signature dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderOptions {
    /// Reason for signing
    pub reason: String,
    /// Contact information
    pub contact_info: String,
    /// Name of the signer
    pub name: String,
    /// Location where the document was signed
    pub location: String,
    /// Bytes reserved for the DER signature
    pub signature_length: usize,
    /// Signature format
    pub sub_filter: SignatureSubFilter,
    /// Value of `/M`; current time when unset
    pub signing_time: Option<DateTime<Utc>>,
}

impl Default for PlaceholderOptions {
    fn default() -> Self {
        Self {
            reason: DEFAULT_REASON.to_string(),
            contact_info: String::new(),
            name: String::new(),
            location: String::new(),
            signature_length: DEFAULT_SIGNATURE_LENGTH,
            sub_filter: SignatureSubFilter::default(),
            signing_time: None,
        }
    }
}

impl PlaceholderOptions {
    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the contact information.
    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = contact_info.into();
        self
    }

    /// Set the signer name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the slot capacity in bytes.
    pub fn with_signature_length(mut self, signature_length: usize) -> Self {
        self.signature_length = signature_length;
        self
    }

    /// Set the sub-filter.
    pub fn with_sub_filter(mut self, sub_filter: SignatureSubFilter) -> Self {
        self.sub_filter = sub_filter;
        self
    }

    /// Fix the `/M` signing date.
    pub fn with_signing_time(mut self, signing_time: DateTime<Utc>) -> Self {
        self.signing_time = Some(signing_time);
        self
    }
}

/// Drop trailing end-of-line bytes after `%%EOF`.
///
/// Fails when the document does not end with an `%%EOF` line.
pub fn remove_trailing_newline(pdf_data: &[u8]) -> Result<&[u8]> {
    let end = pdf_data
        .iter()
        .rposition(|b| !matches!(b, b'\n' | b'\r' | b' ' | b'\t' | 0x00))
        .map_or(0, |pos| pos + 1);
    let trimmed = &pdf_data[..end];
    if !trimmed.ends_with(b"%%EOF") {
        return Err(Error::MalformedDocument("document must end with an %%EOF line".to_string()));
    }
    Ok(trimmed)
}

/// Append a signing revision with a reserved signature slot.
///
/// The returned buffer contains exactly one unresolved `/ByteRange` placeholder
/// in the star form, followed in the same dictionary by a `/Contents` slot of
/// `2 * signature_length` zero hex characters.
pub fn insert_placeholder(pdf_data: &[u8], options: &PlaceholderOptions) -> Result<Vec<u8>> {
    if options.signature_length == 0 {
        return Err(Error::Config("signature length must be greater than zero".to_string()));
    }

    let base = remove_trailing_newline(pdf_data)?;
    let doc = PdfDocument::parse(base)?;
    if doc.trailer().contains_key("Encrypt") {
        return Err(Error::MalformedDocument("encrypted documents cannot be prepared".to_string()));
    }

    let catalog_ref = doc.catalog_ref()?;
    let mut catalog = doc.catalog()?;
    let (page_ref, mut page) = doc.first_page()?;

    let mut next_id = doc.next_object_number();
    let mut allocate = || {
        let obj_ref = ObjectRef::new(next_id, 0);
        next_id += 1;
        obj_ref
    };
    let sig_ref = allocate();
    let widget_ref = allocate();

    let (acroform_ref, mut acroform) = match catalog.get("AcroForm") {
        Some(Object::Reference(r)) => match doc.object(*r)? {
            Object::Dictionary(dict) => (*r, dict),
            other => {
                return Err(Error::MalformedDocument(format!(
                    "AcroForm {} is a {}",
                    r,
                    other.type_name()
                )))
            },
        },
        Some(Object::Dictionary(dict)) => (allocate(), dict.clone()),
        _ => (allocate(), HashMap::new()),
    };

    let mut fields = resolve_array(&doc, acroform.get("Fields"))?;
    let field_name = next_signature_field_name(&doc, &fields);
    fields.push(Object::Reference(widget_ref));
    acroform.insert("Fields".to_string(), Object::Array(fields));
    acroform.insert("SigFlags".to_string(), Object::Integer(3));
    catalog.insert("AcroForm".to_string(), Object::Reference(acroform_ref));

    let mut annots = resolve_array(&doc, page.get("Annots"))?;
    annots.push(Object::Reference(widget_ref));
    page.insert("Annots".to_string(), Object::Array(annots));

    let signature = signature_dictionary(options);
    let widget = ObjectSerializer::dict(vec![
        ("Type", ObjectSerializer::name("Annot")),
        ("Subtype", ObjectSerializer::name("Widget")),
        ("FT", ObjectSerializer::name("Sig")),
        ("Rect", ObjectSerializer::array(vec![Object::Integer(0); 4])),
        ("V", ObjectSerializer::reference(sig_ref)),
        ("T", ObjectSerializer::text(&field_name)),
        ("F", ObjectSerializer::integer(4)),
        ("P", ObjectSerializer::reference(page_ref)),
    ]);

    // The signature dictionary goes first so that its /Contents is the first
    // one after the placeholder.
    let objects = [
        (sig_ref, signature),
        (widget_ref, widget),
        (acroform_ref, Object::Dictionary(acroform)),
        (catalog_ref, Object::Dictionary(catalog)),
        (page_ref, Object::Dictionary(page)),
    ];

    let serializer = ObjectSerializer::compact();
    let mut out = Vec::with_capacity(base.len() + options.signature_length * 2 + 2048);
    out.extend_from_slice(base);
    out.push(b'\n');

    let mut offsets = Vec::with_capacity(objects.len());
    for (obj_ref, obj) in &objects {
        offsets.push((*obj_ref, out.len()));
        out.extend_from_slice(&serializer.serialize_indirect(*obj_ref, obj));
    }

    let xref_offset = out.len();
    write_xref_section(&mut out, &mut offsets);

    let mut trailer = HashMap::new();
    trailer.insert("Size".to_string(), Object::Integer(i64::from(next_id)));
    trailer.insert("Root".to_string(), Object::Reference(catalog_ref));
    trailer.insert("Prev".to_string(), Object::Integer(doc.startxref() as i64));
    for key in ["Info", "ID"] {
        if let Some(value) = doc.trailer().get(key) {
            trailer.insert(key.to_string(), value.clone());
        }
    }
    out.extend_from_slice(b"trailer\n");
    out.extend_from_slice(&serializer.serialize(&Object::Dictionary(trailer)));
    out.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());

    log::info!(
        "Reserved {} byte signature slot in object {} ({} field {:?})",
        options.signature_length,
        sig_ref,
        options.sub_filter.as_pdf_name(),
        field_name
    );

    Ok(out)
}

fn signature_dictionary(options: &PlaceholderOptions) -> Object {
    let signing_time = options.signing_time.unwrap_or_else(Utc::now);
    let unresolved = ObjectSerializer::name(BYTE_RANGE_PLACEHOLDER);

    ObjectSerializer::dict(vec![
        ("Type", ObjectSerializer::name("Sig")),
        ("Filter", ObjectSerializer::name("Adobe.PPKLite")),
        ("SubFilter", ObjectSerializer::name(options.sub_filter.as_pdf_name())),
        (
            "ByteRange",
            ObjectSerializer::array(vec![
                ObjectSerializer::integer(0),
                unresolved.clone(),
                unresolved.clone(),
                unresolved,
            ]),
        ),
        ("Contents", Object::String(vec![0; options.signature_length])),
        ("Reason", ObjectSerializer::text(&options.reason)),
        ("ContactInfo", ObjectSerializer::text(&options.contact_info)),
        ("Name", ObjectSerializer::text(&options.name)),
        ("Location", ObjectSerializer::text(&options.location)),
        ("M", ObjectSerializer::text(&pdf_date(&signing_time))),
    ])
}

/// Format a PDF date string, `D:YYYYMMDDHHmmSSZ`.
fn pdf_date(time: &DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%SZ").to_string()
}

fn resolve_array(doc: &PdfDocument<'_>, value: Option<&Object>) -> Result<Vec<Object>> {
    match value {
        None => Ok(Vec::new()),
        Some(value) => match doc.resolve(value)? {
            Object::Array(items) => Ok(items),
            other => Err(Error::MalformedDocument(format!(
                "expected an array, found {}",
                other.type_name()
            ))),
        },
    }
}

/// `SignatureN`, one past the number of existing signature fields and not
/// clashing with any existing field name.
fn next_signature_field_name(doc: &PdfDocument<'_>, fields: &[Object]) -> String {
    let resolved: Vec<Object> = fields.iter().filter_map(|f| doc.resolve(f).ok()).collect();

    let existing_signatures = resolved
        .iter()
        .filter(|f| f.as_dict().and_then(|d| d.get("FT")).and_then(Object::as_name) == Some("Sig"))
        .count();
    let taken: HashSet<String> = resolved
        .iter()
        .filter_map(|f| f.as_dict()?.get("T")?.as_text())
        .collect();

    let mut number = existing_signatures + 1;
    while taken.contains(&format!("Signature{}", number)) {
        number += 1;
    }
    format!("Signature{}", number)
}

/// Write a classic xref section, one subsection per run of consecutive ids.
fn write_xref_section(out: &mut Vec<u8>, offsets: &mut [(ObjectRef, usize)]) {
    offsets.sort_by_key(|(obj_ref, _)| obj_ref.id);
    out.extend_from_slice(b"xref\n");

    let mut start = 0;
    while start < offsets.len() {
        let mut end = start + 1;
        while end < offsets.len() && offsets[end].0.id == offsets[end - 1].0.id + 1 {
            end += 1;
        }
        out.extend_from_slice(format!("{} {}\n", offsets[start].0.id, end - start).as_bytes());
        for (obj_ref, offset) in &offsets[start..end] {
            out.extend_from_slice(format!("{:010} {:05} n \n", offset, obj_ref.gen).as_bytes());
        }
        start = end;
    }
}
