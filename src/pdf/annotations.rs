//! Reading and attaching page annotations

use log::debug;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};
use crate::geometry::Rectangle;
use crate::model::{Annotation, AnnotationId, Destination, PageId, SignatureState};
use crate::pdf::destinations::{destination_array, has_internal_target, item_target};
use crate::pdf::engine::PdfDocument;
use crate::pdf::objects::{get_array, get_name, inherited, push_to_array, rectangle, resolve};

/// Every annotation referenced from a page, in page order
///
/// Popups are left out: they belong to their parent annotation and are not
/// carried to the output.
pub(crate) fn read(document: &PdfDocument) -> Result<Vec<Annotation>> {
    let doc = &document.inner;
    let pages = document.page_set();
    let mut annotations = Vec::new();

    for page_id in document.page_objects() {
        let page = doc.get_dictionary(page_id)?;
        let Some(annots) = get_array(doc, page, b"Annots") else {
            continue;
        };
        for entry in annots {
            let Object::Reference(annotation_id) = entry else {
                debug!("Ignoring direct annotation dictionary on page {:?}", page_id);
                continue;
            };
            let Ok(dict) = doc.get_dictionary(*annotation_id) else {
                debug!("Ignoring unreadable annotation {:?}", annotation_id);
                continue;
            };
            let subtype = get_name(doc, dict, b"Subtype")
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .unwrap_or_default();
            if subtype == "Popup" {
                continue;
            }

            let link = if subtype == "Link" {
                item_target(doc, dict)
                    .filter(|(target, _)| pages.contains(target))
                    .map(|(target, view)| Destination {
                        page: PageId::new(document.id, target),
                        view,
                    })
            } else {
                None
            };

            annotations.push(Annotation {
                id: AnnotationId::new(document.id, *annotation_id),
                page: PageId::new(document.id, page_id),
                rect: dict
                    .get(b"Rect")
                    .ok()
                    .and_then(|rect| rectangle(doc, rect))
                    .unwrap_or(Rectangle::new(0.0, 0.0, 0.0, 0.0)),
                signature: signature_state(doc, dict, &subtype),
                subtype,
                link,
            });
        }
    }
    Ok(annotations)
}

fn signature_state(doc: &Document, dict: &Dictionary, subtype: &str) -> Option<SignatureState> {
    if subtype != "Widget" {
        return None;
    }
    let field_type = inherited(doc, dict, b"FT").and_then(|ft| resolve(doc, ft));
    if !matches!(field_type, Some(Object::Name(name)) if name == b"Sig") {
        return None;
    }
    let signed = inherited(doc, dict, b"V")
        .and_then(|v| resolve(doc, v))
        .map(|v| !matches!(v, Object::Null))
        .unwrap_or(false);
    Some(SignatureState { signed })
}

/// Copies a source annotation onto `annotation.page` of the destination
pub(crate) fn attach(destination: &mut PdfDocument, annotation: &Annotation) -> Result<AnnotationId> {
    if annotation.id.document != destination.origin()? {
        return Err(Error::StructuralMerge(format!(
            "annotation {:?} does not come from the source of {}",
            annotation.id.key, destination.name
        )));
    }
    let page = destination.page_object(annotation.page)?;
    let link = match &annotation.link {
        Some(link) => Some((destination.page_object(link.page)?, link.view)),
        None => None,
    };

    let source_key: ObjectId = annotation.id.key.into();
    let mut copy = destination.inner.get_dictionary(source_key)?.clone();
    copy.set("P", Object::Reference(page));
    // the form merge sets a new parent; popups and replies are not carried
    copy.remove(b"Parent");
    copy.remove(b"Popup");
    copy.remove(b"IRT");

    if annotation.is_link() {
        let internal = has_internal_target(&destination.inner, &copy);
        match link {
            Some((target, view)) => {
                copy.remove(b"A");
                copy.set("Dest", destination_array(target, &view));
            }
            None if internal => {
                debug!("Link {:?} loses its target, the page is not in the output", annotation.id.key);
                copy.remove(b"Dest");
                copy.remove(b"A");
            }
            None => {}
        }
    }

    if matches!(annotation.signature, Some(SignatureState { signed: false })) {
        copy.remove(b"V");
    }

    let attached = destination.inner.add_object(copy);
    let page_dict = destination.inner.get_dictionary_mut(page)?;
    push_to_array(page_dict, b"Annots", Object::Reference(attached));
    Ok(AnnotationId::new(destination.id, attached))
}
