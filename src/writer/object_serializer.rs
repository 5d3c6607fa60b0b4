//! PDF object serialization.
//!
//! Serializes objects to their byte representation. Dictionary keys are
//! written in sorted order, so the layout of every written object is
//! deterministic; the placeholder locator depends on `/ByteRange` preceding
//! `/Contents` inside the signature dictionary.

use crate::object::{Object, ObjectRef};
use std::collections::HashMap;

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Minimal whitespace between dictionary entries
    compact: bool,
}

impl ObjectSerializer {
    /// Create a serializer that puts each dictionary entry on its own line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging and tests).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, obj_ref: ObjectRef, obj: &Object) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", obj_ref.id, obj_ref.gen).into_bytes();
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(b"\nendobj\n");
        buf
    }

    fn write_object(&self, w: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => w.extend_from_slice(b"null"),
            Object::Boolean(b) => w.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => w.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => write_real(w, *r),
            Object::String(s) => write_string(w, s),
            Object::Name(n) => write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr),
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => self.write_stream(w, dict, data),
            Object::Reference(r) => w.extend_from_slice(r.to_string().as_bytes()),
        }
    }

    fn write_array(&self, w: &mut Vec<u8>, arr: &[Object]) {
        w.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                w.push(b' ');
            }
            self.write_object(w, obj);
        }
        w.push(b']');
    }

    fn write_dictionary(&self, w: &mut Vec<u8>, dict: &HashMap<String, Object>) {
        w.extend_from_slice(b"<<");

        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            if !self.compact {
                w.extend_from_slice(b"\n  ");
            }
            write_name(w, key);
            w.push(b' ');
            self.write_object(w, &dict[key]);
        }

        if !self.compact && !dict.is_empty() {
            w.push(b'\n');
        }
        w.extend_from_slice(b">>");
    }

    fn write_stream(&self, w: &mut Vec<u8>, dict: &HashMap<String, Object>, data: &[u8]) {
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(w, &dict_with_length);
        w.extend_from_slice(b"\nstream\n");
        w.extend_from_slice(data);
        w.extend_from_slice(b"\nendstream");
    }
}

fn write_real(w: &mut Vec<u8>, value: f64) {
    if value.fract() == 0.0 {
        w.extend_from_slice((value as i64).to_string().as_bytes());
    } else {
        let formatted = format!("{:.5}", value);
        w.extend_from_slice(formatted.trim_end_matches('0').trim_end_matches('.').as_bytes());
    }
}

/// Literal `(...)` syntax for printable ASCII, uppercase hex `<...>` otherwise.
fn write_string(w: &mut Vec<u8>, data: &[u8]) {
    let printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    if printable {
        w.push(b'(');
        for &byte in data {
            match byte {
                b'(' => w.extend_from_slice(b"\\("),
                b')' => w.extend_from_slice(b"\\)"),
                b'\\' => w.extend_from_slice(b"\\\\"),
                b'\n' => w.extend_from_slice(b"\\n"),
                b'\r' => w.extend_from_slice(b"\\r"),
                b'\t' => w.extend_from_slice(b"\\t"),
                _ => w.push(byte),
            }
        }
        w.push(b')');
    } else {
        w.push(b'<');
        w.extend_from_slice(hex::encode_upper(data).as_bytes());
        w.push(b'>');
    }
}

/// Names escape whitespace, delimiters, `#` and non-printable bytes with `#xx`.
fn write_name(w: &mut Vec<u8>, name: &str) {
    w.push(b'/');
    for byte in name.bytes() {
        match byte {
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#' => {
                w.extend_from_slice(format!("#{:02X}", byte).as_bytes())
            },
            b'!'..=b'~' => w.push(byte),
            _ => w.extend_from_slice(format!("#{:02X}", byte).as_bytes()),
        }
    }
}

/// Helper functions for building PDF objects.
impl ObjectSerializer {
    /// Create a Name object.
    pub fn name(s: &str) -> Object {
        Object::Name(s.to_string())
    }

    /// Create a text string.
    ///
    /// Printable ASCII without `/` is stored as is; anything else is stored as
    /// UTF-16BE with a byte order mark, which always serializes as hex. A text
    /// value can therefore never contain a literal `/Contents` key.
    pub fn text(s: &str) -> Object {
        let plain = s.bytes().all(|b| (0x20..=0x7E).contains(&b) && b != b'/');
        if plain {
            return Object::String(s.as_bytes().to_vec());
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in s.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes)
    }

    /// Create an Integer object.
    pub fn integer(i: i64) -> Object {
        Object::Integer(i)
    }

    /// Create an Array object.
    pub fn array(items: Vec<Object>) -> Object {
        Object::Array(items)
    }

    /// Create a Dictionary object.
    pub fn dict(entries: Vec<(&str, Object)>) -> Object {
        let map: HashMap<String, Object> = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Object::Dictionary(map)
    }

    /// Create a Reference object.
    pub fn reference(obj_ref: ObjectRef) -> Object {
        Object::Reference(obj_ref)
    }
}
