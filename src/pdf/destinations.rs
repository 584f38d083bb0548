//! Explicit and named destinations

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::geometry::Rectangle;
use crate::model::View;
use crate::pdf::objects::{self, get, get_dict, get_name, number, real, resolve, MAX_DEPTH};

/// Target page object and view of a destination value
///
/// Accepts explicit arrays, `<< /D [...] >>` dictionaries and names resolved
/// through the catalog `/Dests` dictionary or the `/Names /Dests` tree.
pub(crate) fn target(doc: &Document, value: &Object) -> Option<(ObjectId, View)> {
    target_at_depth(doc, value, 0)
}

fn target_at_depth(doc: &Document, value: &Object, depth: usize) -> Option<(ObjectId, View)> {
    if depth > MAX_DEPTH {
        return None;
    }
    match resolve(doc, value)? {
        Object::Array(items) => explicit(doc, items),
        Object::Dictionary(dict) => target_at_depth(doc, dict.get(b"D").ok()?, depth + 1),
        Object::Name(name) => target_at_depth(doc, named(doc, name)?, depth + 1),
        Object::String(name, _) => target_at_depth(doc, named(doc, name)?, depth + 1),
        _ => None,
    }
}

/// Target of a link or outline item: `/Dest`, else a `/GoTo` action
pub(crate) fn item_target(doc: &Document, dict: &Dictionary) -> Option<(ObjectId, View)> {
    if let Ok(dest) = dict.get(b"Dest") {
        return target(doc, dest);
    }
    let action = get_dict(doc, dict, b"A")?;
    if get_name(doc, action, b"S") != Some(b"GoTo".as_slice()) {
        return None;
    }
    target(doc, action.get(b"D").ok()?)
}

/// True when the item points inside the document
pub(crate) fn has_internal_target(doc: &Document, dict: &Dictionary) -> bool {
    dict.has(b"Dest")
        || get_dict(doc, dict, b"A")
            .and_then(|action| get_name(doc, action, b"S"))
            .map(|s| s == b"GoTo")
            .unwrap_or(false)
}

fn explicit(doc: &Document, items: &[Object]) -> Option<(ObjectId, View)> {
    let page = match items.first()? {
        Object::Reference(id) => *id,
        // remote or page-index destinations have no page object here
        _ => return None,
    };
    let kind = match items.get(1).and_then(|k| resolve(doc, k)) {
        Some(Object::Name(kind)) => kind.as_slice(),
        _ => b"Fit".as_slice(),
    };
    let param = |index: usize| items.get(index).and_then(|value| number(doc, value));

    let view = match kind {
        b"XYZ" => View::Xyz {
            left: param(2),
            top: param(3),
            zoom: param(4).filter(|z| *z != 0.0),
        },
        b"FitH" => View::FitH(param(2)),
        b"FitV" => View::FitV(param(2)),
        b"FitB" => View::FitB,
        b"FitBH" => View::FitBH(param(2)),
        b"FitBV" => View::FitBV(param(2)),
        b"FitR" => match (param(2), param(3), param(4), param(5)) {
            (Some(l), Some(b), Some(r), Some(t)) => View::FitR(Rectangle::new(l, b, r, t)),
            _ => View::Fit,
        },
        _ => View::Fit,
    };
    Some((page, view))
}

/// Explicit destination array for `page`
pub(crate) fn destination_array(page: ObjectId, view: &View) -> Object {
    let optional = |value: Option<f32>| value.map(real).unwrap_or(Object::Null);
    let mut items = vec![Object::Reference(page)];
    match view {
        View::Xyz { left, top, zoom } => {
            items.push(objects::name("XYZ"));
            items.extend([optional(*left), optional(*top), optional(*zoom)]);
        }
        View::Fit => items.push(objects::name("Fit")),
        View::FitH(top) => items.extend([objects::name("FitH"), optional(*top)]),
        View::FitV(left) => items.extend([objects::name("FitV"), optional(*left)]),
        View::FitR(rect) => {
            items.push(objects::name("FitR"));
            items.extend(rect.to_array().into_iter().map(real));
        }
        View::FitB => items.push(objects::name("FitB")),
        View::FitBH(top) => items.extend([objects::name("FitBH"), optional(*top)]),
        View::FitBV(left) => items.extend([objects::name("FitBV"), optional(*left)]),
    }
    Object::Array(items)
}

fn named<'a>(doc: &'a Document, name: &[u8]) -> Option<&'a Object> {
    let catalog = objects::catalog(doc).ok()?;
    if let Some(dests) = get_dict(doc, catalog, b"Dests") {
        if let Ok(value) = dests.get(name) {
            return Some(value);
        }
    }
    let names = get_dict(doc, catalog, b"Names")?;
    let tree = get_dict(doc, names, b"Dests")?;
    search_name_tree(doc, tree, name, 0)
}

fn search_name_tree<'a>(doc: &'a Document, node: &'a Dictionary, name: &[u8], depth: usize) -> Option<&'a Object> {
    if depth > MAX_DEPTH {
        return None;
    }
    if let Some(Object::Array(pairs)) = get(doc, node, b"Names") {
        for pair in pairs.chunks_exact(2) {
            if let Some(Object::String(key, _)) = resolve(doc, &pair[0]) {
                if key.as_slice() == name {
                    return Some(&pair[1]);
                }
            }
        }
    }
    if let Some(Object::Array(kids)) = get(doc, node, b"Kids") {
        for kid in kids {
            if let Some(Object::Dictionary(kid)) = resolve(doc, kid) {
                if let Some(found) = search_name_tree(doc, kid, name, depth + 1) {
                    return Some(found);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::StringFormat;

    fn document_with_page() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let page = doc.add_object(Dictionary::from_iter(vec![("Type", objects::name("Page"))]));
        (doc, page)
    }

    #[test]
    fn test_explicit_xyz() {
        let (doc, page) = document_with_page();
        let dest = Object::Array(vec![
            Object::Reference(page),
            objects::name("XYZ"),
            Object::Integer(10),
            Object::Null,
            Object::Integer(0),
        ]);
        let (target_page, view) = target(&doc, &dest).unwrap();
        assert_eq!(target_page, page);
        assert_eq!(view, View::Xyz { left: Some(10.0), top: None, zoom: None });
    }

    #[test]
    fn test_named_destination_through_name_tree() {
        let (mut doc, page) = document_with_page();
        let explicit = Object::Array(vec![Object::Reference(page), objects::name("Fit")]);
        let leaf = doc.add_object(Dictionary::from_iter(vec![(
            "Names",
            Object::Array(vec![
                Object::String(b"chapter1".to_vec(), StringFormat::Literal),
                Object::Dictionary(Dictionary::from_iter(vec![("D", explicit)])),
            ]),
        )]));
        let tree = Dictionary::from_iter(vec![("Kids", Object::Array(vec![Object::Reference(leaf)]))]);
        let names = Dictionary::from_iter(vec![("Dests", Object::Dictionary(tree))]);
        let catalog = doc.add_object(Dictionary::from_iter(vec![
            ("Type", objects::name("Catalog")),
            ("Names", Object::Dictionary(names)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog));

        let dest = Object::String(b"chapter1".to_vec(), StringFormat::Literal);
        assert_eq!(target(&doc, &dest), Some((page, View::Fit)));
        let missing = Object::String(b"chapter2".to_vec(), StringFormat::Literal);
        assert_eq!(target(&doc, &missing), None);
    }

    #[test]
    fn test_goto_action_target() {
        let (doc, page) = document_with_page();
        let action = Dictionary::from_iter(vec![
            ("S", objects::name("GoTo")),
            ("D", Object::Array(vec![Object::Reference(page), objects::name("FitH"), Object::Integer(700)])),
        ]);
        let link = Dictionary::from_iter(vec![("A", Object::Dictionary(action))]);
        assert_eq!(item_target(&doc, &link), Some((page, View::FitH(Some(700.0)))));
        assert!(has_internal_target(&doc, &link));
    }

    #[test]
    fn test_destination_array_layout() {
        let array = destination_array((7, 0), &View::FitH(None));
        let Object::Array(items) = array else { panic!("not an array") };
        assert_eq!(items, vec![Object::Reference((7, 0)), objects::name("FitH"), Object::Null]);
    }
}
