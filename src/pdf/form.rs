//! AcroForm reading and writing

use std::collections::HashSet;

use log::debug;
use lopdf::{Document, Object, ObjectId};

use crate::error::{Error, Result};
use crate::model::{AcroForm, AnnotationId, DocumentId, FieldId, FieldKind, FormField};
use crate::pdf::engine::PdfDocument;
use crate::pdf::objects::{self, decode_text, get, get_array, get_dict, get_name, MAX_DEPTH};

/// Entries that belong to the field side of a merged field/widget dictionary
const FIELD_KEYS: [&[u8]; 15] = [
    b"T", b"TU", b"TM", b"FT", b"Ff", b"V", b"DV", b"Kids", b"Opt", b"TI", b"I", b"MaxLen", b"Lock", b"SV", b"RV",
];

/// Entries that belong to the widget side of a merged field/widget dictionary
const WIDGET_KEYS: [&[u8]; 14] = [
    b"Type", b"Subtype", b"Rect", b"P", b"AP", b"AS", b"MK", b"F", b"Border", b"BS", b"H", b"NM", b"M", b"StructParent",
];

/// Field tree of the document, `None` when it has no form
pub(crate) fn read(document: &PdfDocument) -> Result<Option<AcroForm>> {
    let doc = &document.inner;
    let catalog = objects::catalog(doc)?;
    let Some(acro_form) = get_dict(doc, catalog, b"AcroForm") else {
        return Ok(None);
    };
    let fields = get_array(doc, acro_form, b"Fields")
        .ok_or_else(|| Error::StructuralMerge("AcroForm without a Fields array".to_string()))?;

    let mut reader = FieldReader {
        doc,
        document: document.id,
        visited: HashSet::new(),
    };
    let mut roots = Vec::new();
    for field in fields {
        let Object::Reference(id) = field else {
            debug!("Ignoring direct field dictionary");
            continue;
        };
        if let Some(field) = reader.field(*id, None, 0)? {
            roots.push(field);
        }
    }

    let mut form = AcroForm::new(roots);
    form.need_appearances = matches!(get(doc, acro_form, b"NeedAppearances"), Some(Object::Boolean(true)));
    Ok(Some(form))
}

struct FieldReader<'a> {
    doc: &'a Document,
    document: DocumentId,
    visited: HashSet<ObjectId>,
}

impl FieldReader<'_> {
    fn field(&mut self, id: ObjectId, inherited_kind: Option<FieldKind>, depth: usize) -> Result<Option<FormField>> {
        if depth > MAX_DEPTH {
            return Err(Error::StructuralMerge("form field tree too deep".to_string()));
        }
        if !self.visited.insert(id) {
            return Err(Error::StructuralMerge(format!("field {:?} appears twice in the form", id)));
        }
        let doc = self.doc;
        let Ok(dict) = doc.get_dictionary(id) else {
            debug!("Ignoring unreadable field {:?}", id);
            return Ok(None);
        };

        let partial_name = get(doc, dict, b"T").and_then(decode_text);
        let kind = get_name(doc, dict, b"FT")
            .map(FieldKind::from_name)
            .or(inherited_kind)
            .unwrap_or(FieldKind::Unknown);

        let mut field = FormField::new(FieldId::new(self.document, id), partial_name.as_deref(), kind);
        field.signed = kind == FieldKind::Signature
            && matches!(get(doc, dict, b"V"), Some(value) if !matches!(value, Object::Null));
        if get_name(doc, dict, b"Subtype") == Some(b"Widget".as_slice()) {
            // merged field and widget
            field.widgets.push(AnnotationId::new(self.document, id));
        }

        let kid_kind = (kind != FieldKind::Unknown).then_some(kind);
        if let Some(kids) = get_array(doc, dict, b"Kids") {
            for kid in kids {
                let Object::Reference(kid_id) = kid else {
                    continue;
                };
                let Ok(kid_dict) = doc.get_dictionary(*kid_id) else {
                    continue;
                };
                if kid_dict.has(b"T") || kid_dict.has(b"Kids") {
                    if let Some(child) = self.field(*kid_id, kid_kind, depth + 1)? {
                        field.children.push(child);
                    }
                } else {
                    field.widgets.push(AnnotationId::new(self.document, *kid_id));
                }
            }
        }
        Ok(Some(field))
    }
}

/// Installs `form` as the form of `destination`
///
/// Field dictionaries are the source ones inside the destination clone, their
/// widgets the attached annotation copies. Entries of the source AcroForm
/// dictionary (default appearance, resources, quadding) are kept.
pub(crate) fn write(destination: &mut PdfDocument, form: &AcroForm) -> Result<()> {
    let origin = destination.origin()?;
    let mut written = HashSet::new();
    let mut roots = Vec::new();
    for field in &form.fields {
        roots.push(Object::Reference(write_field(destination, origin, field, None, &mut written)?));
    }

    let mut acro_form = destination
        .source_catalog
        .and_then(|catalog| destination.inner.get_dictionary(catalog).ok())
        .and_then(|catalog| get_dict(&destination.inner, catalog, b"AcroForm"))
        .cloned()
        .unwrap_or_default();
    acro_form.remove(b"XFA");
    acro_form.set("Fields", Object::Array(roots));
    if let Some(order) = get_array(&destination.inner, &acro_form, b"CO").cloned() {
        let kept: Vec<Object> = order
            .into_iter()
            .filter(|field| matches!(field, Object::Reference(id) if written.contains(id)))
            .collect();
        acro_form.set("CO", Object::Array(kept));
    }
    if form.need_appearances {
        acro_form.set("NeedAppearances", Object::Boolean(true));
    } else {
        acro_form.remove(b"NeedAppearances");
    }
    if !form.has_signed_fields() {
        acro_form.remove(b"SigFlags");
    }

    let acro_form_id = destination.inner.add_object(acro_form);
    destination.catalog_mut()?.set("AcroForm", Object::Reference(acro_form_id));
    debug!("Wrote AcroForm with {} field(s)", written.len());
    Ok(())
}

fn write_field(
    destination: &mut PdfDocument,
    origin: DocumentId,
    field: &FormField,
    parent: Option<ObjectId>,
    written: &mut HashSet<ObjectId>,
) -> Result<ObjectId> {
    if field.id.document != origin {
        return Err(Error::StructuralMerge(format!(
            "field {:?} does not come from the source of {}",
            field.id.key, destination.name
        )));
    }
    let field_id: ObjectId = field.id.key.into();
    written.insert(field_id);

    let mut kids = Vec::new();
    for child in &field.children {
        kids.push(Object::Reference(write_field(destination, origin, child, Some(field_id), written)?));
    }
    for widget in &field.widgets {
        if widget.document != destination.id {
            return Err(Error::StructuralMerge(format!(
                "widget {:?} is not attached to {}",
                widget.key, destination.name
            )));
        }
        let widget_id: ObjectId = widget.key.into();
        let copy = destination.inner.get_dictionary_mut(widget_id)?;
        // copies of a merged dictionary carry field entries too
        for key in FIELD_KEYS {
            copy.remove(key);
        }
        copy.set("Parent", Object::Reference(field_id));
        kids.push(Object::Reference(widget_id));
    }

    let dict = destination.inner.get_dictionary_mut(field_id)?;
    if matches!(dict.get(b"Subtype"), Ok(Object::Name(subtype)) if subtype == b"Widget") {
        for key in WIDGET_KEYS {
            dict.remove(key);
        }
    }
    match parent {
        Some(parent) => dict.set("Parent", Object::Reference(parent)),
        None => {
            dict.remove(b"Parent");
        }
    }
    dict.set("Kids", Object::Array(kids));
    if field.kind == FieldKind::Signature && !field.signed {
        dict.remove(b"V");
    }
    Ok(field_id)
}
