//! Low-level lopdf helpers shared by the engine modules

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

use crate::error::{Error, Result};
use crate::geometry::Rectangle;

/// Limit on reference chains and tree depth, guards against cycles
pub(crate) const MAX_DEPTH: usize = 64;

/// Follows references until a direct object is reached
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// `dict[key]`, dereferenced
pub(crate) fn get<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    resolve(doc, dict.get(key).ok()?)
}

pub(crate) fn get_dict<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    match get(doc, dict, key)? {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

pub(crate) fn get_array<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Vec<Object>> {
    match get(doc, dict, key)? {
        Object::Array(items) => Some(items),
        _ => None,
    }
}

pub(crate) fn get_name<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    match get(doc, dict, key)? {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

pub(crate) fn reference(dict: &Dictionary, key: &[u8]) -> Option<ObjectId> {
    match dict.get(key).ok()? {
        Object::Reference(id) => Some(*id),
        _ => None,
    }
}

pub(crate) fn number(doc: &Document, object: &Object) -> Option<f32> {
    match resolve(doc, object)? {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

pub(crate) fn real(value: f32) -> Object {
    if value.fract() == 0.0 && value.abs() < i32::MAX as f32 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value.into())
    }
}

pub(crate) fn rectangle(doc: &Document, object: &Object) -> Option<Rectangle> {
    let Object::Array(items) = resolve(doc, object)? else {
        return None;
    };
    if items.len() != 4 {
        return None;
    }
    let values: Vec<f32> = items.iter().filter_map(|item| number(doc, item)).collect();
    match values.as_slice() {
        &[left, bottom, right, top] => Some(Rectangle::new(left, bottom, right, top)),
        _ => None,
    }
}

pub(crate) fn rectangle_object(rect: Rectangle) -> Object {
    Object::Array(rect.to_array().into_iter().map(real).collect())
}

/// Text string: UTF-16BE with a byte order mark, UTF-8, or Latin-1
pub(crate) fn decode_text(object: &Object) -> Option<String> {
    let Object::String(bytes, _) = object else {
        return None;
    };
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.to_string()),
        Err(_) => Some(bytes.iter().map(|&b| b as char).collect()),
    }
}

pub(crate) fn encode_text(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

pub(crate) fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

/// Object id of the document catalog
pub(crate) fn catalog_id(doc: &Document) -> Result<ObjectId> {
    match doc.trailer.get(b"Root") {
        Ok(Object::Reference(id)) => Ok(*id),
        Ok(_) => Err(Error::General("Root is not a reference".to_string())),
        Err(_) => Err(Error::General("No Root in trailer".to_string())),
    }
}

pub(crate) fn catalog(doc: &Document) -> Result<&Dictionary> {
    Ok(doc.get_dictionary(catalog_id(doc)?)?)
}

/// Looks `key` up on `dict` and then its `/Parent` chain
pub(crate) fn inherited<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = dict;
    for _ in 0..MAX_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = reference(current, b"Parent")?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Appends `item` to the array at `dict[key]`, creating it when missing
pub(crate) fn push_to_array(dict: &mut Dictionary, key: &[u8], item: Object) {
    match dict.get_mut(key) {
        Ok(Object::Array(items)) => items.push(item),
        _ => dict.set(key.to_vec(), Object::Array(vec![item])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trip_non_ascii() {
        let encoded = encode_text("Résumé");
        assert_eq!(decode_text(&encoded).as_deref(), Some("Résumé"));
        assert_eq!(decode_text(&encode_text("Plain")).as_deref(), Some("Plain"));
    }

    #[test]
    fn test_latin1_fallback() {
        let object = Object::String(vec![0x43, 0x61, 0x66, 0xE9], StringFormat::Literal);
        assert_eq!(decode_text(&object).as_deref(), Some("Café"));
    }

    #[test]
    fn test_rectangle_from_mixed_numbers() {
        let doc = Document::with_version("1.5");
        let array = Object::Array(vec![
            Object::Integer(0),
            Object::Real(10.5_f32.into()),
            Object::Integer(612),
            Object::Integer(792),
        ]);
        assert_eq!(rectangle(&doc, &array), Some(Rectangle::new(0.0, 10.5, 612.0, 792.0)));
        assert_eq!(rectangle(&doc, &Object::Array(vec![Object::Integer(1)])), None);
    }

    #[test]
    fn test_inherited_lookup() {
        let mut doc = Document::with_version("1.5");
        let parent = doc.add_object(Dictionary::from_iter(vec![("Rotate", Object::Integer(90))]));
        let child = Dictionary::from_iter(vec![("Parent", Object::Reference(parent))]);
        assert_eq!(inherited(&doc, &child, b"Rotate"), Some(&Object::Integer(90)));
        assert_eq!(inherited(&doc, &child, b"MediaBox"), None);
    }
}
