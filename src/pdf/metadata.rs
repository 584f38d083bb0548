//! Document summary used by the `info` command

use lopdf::Object;

use crate::engine::{DocumentEngine, DocumentHandle, Source};
use crate::error::{Error, Result};
use crate::geometry::PageGeometry;
use crate::pdf::engine::{LopdfEngine, PdfDocument};
use crate::pdf::objects::{self, decode_text, get, get_dict};

/// What a source contains, as far as cropping is concerned
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub name: String,
    /// PDF header version
    pub version: String,
    /// Page count declared by the page tree root
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Geometry of the first page
    pub first_page: Option<PageGeometry>,
    pub annotations: usize,
    /// Form fields, nested ones included
    pub form_fields: usize,
    /// Outline items, nested ones included
    pub outline_items: usize,
}

/// Page count from the `Count` entry of the page tree root
fn declared_page_count(document: &PdfDocument) -> Result<usize> {
    let doc = &document.inner;
    let catalog = objects::catalog(doc)?;
    let pages = get_dict(doc, catalog, b"Pages")
        .ok_or_else(|| Error::General("No Pages in catalog".to_string()))?;
    match get(doc, pages, b"Count") {
        Some(Object::Integer(count)) if *count >= 0 => Ok(*count as usize),
        _ => Err(Error::General("Count is not a valid integer".to_string())),
    }
}

fn info_entry(document: &PdfDocument, key: &[u8]) -> Option<String> {
    let doc = &document.inner;
    let info = get_dict(doc, &doc.trailer, b"Info")?;
    get(doc, info, key).and_then(decode_text).filter(|s| !s.is_empty())
}

/// Opens `source` and summarises it
pub fn inspect(engine: &LopdfEngine, source: &Source) -> Result<DocumentInfo> {
    let handle = DocumentHandle::open(engine, source)?;
    let document = handle.get()?;

    let first_page = match engine.pages(document)?.first() {
        Some(page) => Some(engine.page_geometry(document, *page)?),
        None => None,
    };
    let form_fields = match engine.acro_form(document)? {
        Some(form) => form.field_count(),
        None => 0,
    };

    Ok(DocumentInfo {
        name: source.name().to_string(),
        version: document.inner.version.clone(),
        page_count: declared_page_count(document)?,
        title: info_entry(document, b"Title"),
        author: info_entry(document, b"Author"),
        first_page,
        annotations: engine.annotations(document)?.len(),
        form_fields,
        outline_items: engine.outline(document)?.iter().map(|node| node.subtree_len()).sum(),
    })
}
