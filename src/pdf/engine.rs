//! lopdf backed [`DocumentEngine`]
//!
//! A destination starts as a clone of its source with a fresh, empty page tree
//! and catalog. Imported pages, annotation copies, fields and outline items
//! are new objects in that clone that reference the shared resources by their
//! original object numbers; whatever stays unreachable is pruned on save.

use std::collections::HashSet;
use std::path::Path;

use log::debug;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::engine::{DocumentEngine, Source, SourceKind};
use crate::error::{Error, Result};
use crate::geometry::{PageGeometry, Rectangle, Rotation};
use crate::model::{AcroForm, Annotation, AnnotationId, DocumentId, OutlineNode, PageId};
use crate::pdf::objects::{self, inherited, push_to_array, rectangle, rectangle_object};
use crate::pdf::{annotations, form, outline};

/// Page attributes a page may inherit from its ancestors
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Catalog entries carried over to a destination
const CATALOG_SETTINGS: [&[u8]; 4] = [b"ViewerPreferences", b"PageLayout", b"PageMode", b"Lang"];

/// A document opened or created by the [`LopdfEngine`]
#[derive(Debug)]
pub struct PdfDocument {
    pub(crate) id: DocumentId,
    pub(crate) name: String,
    pub(crate) inner: Document,
    /// Source a destination was created from
    pub(crate) origin: Option<DocumentId>,
    /// Page tree root of a destination
    pub(crate) pages_root: Option<ObjectId>,
    /// Catalog of the source inside a destination's clone
    pub(crate) source_catalog: Option<ObjectId>,
}

impl PdfDocument {
    fn new(name: impl Into<String>, inner: Document) -> Self {
        Self {
            id: DocumentId::next(),
            name: name.into(),
            inner,
            origin: None,
            pages_root: None,
            source_catalog: None,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying lopdf document
    pub fn document(&self) -> &Document {
        &self.inner
    }

    /// Object ids of the pages, in page order
    pub(crate) fn page_objects(&self) -> Vec<ObjectId> {
        self.inner.get_pages().into_values().collect()
    }

    pub(crate) fn page_set(&self) -> HashSet<ObjectId> {
        self.inner.get_pages().into_values().collect()
    }

    /// Object id of `page`, which must belong to this document
    pub(crate) fn page_object(&self, page: PageId) -> Result<ObjectId> {
        if page.document != self.id {
            return Err(Error::StructuralMerge(format!(
                "page {:?} does not belong to {}",
                page.key, self.name
            )));
        }
        Ok(page.key.into())
    }

    /// Identity of the source a destination derives from
    pub(crate) fn origin(&self) -> Result<DocumentId> {
        self.origin
            .ok_or_else(|| Error::StructuralMerge(format!("{} is not a destination", self.name)))
    }

    pub(crate) fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        let id = objects::catalog_id(&self.inner)?;
        Ok(self.inner.get_dictionary_mut(id)?)
    }
}

/// Document engine built on lopdf
#[derive(Debug, Default, Clone)]
pub struct LopdfEngine {
    compress: bool,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compress streams of saved documents
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }
}

impl DocumentEngine for LopdfEngine {
    type Document = PdfDocument;

    fn open(&self, source: &Source) -> Result<PdfDocument> {
        let inner = match source.kind() {
            SourceKind::File(path) => {
                if !path.exists() {
                    return Err(Error::FileNotFound(path.clone()));
                }
                Document::load(path)?
            }
            SourceKind::Bytes(bytes) => Document::load_mem(bytes)?,
        };
        debug!("Loaded {} ({} objects)", source.name(), inner.objects.len());
        Ok(PdfDocument::new(source.name(), inner))
    }

    fn create_destination(&self, source: &PdfDocument) -> Result<PdfDocument> {
        let mut inner = source.inner.clone();
        let source_catalog = objects::catalog_id(&inner)?;

        let pages_root = inner.add_object(Dictionary::from_iter(vec![
            ("Type", objects::name("Pages")),
            ("Kids", Object::Array(Vec::new())),
            ("Count", Object::Integer(0)),
        ]));

        let mut catalog = Dictionary::from_iter(vec![
            ("Type", objects::name("Catalog")),
            ("Pages", Object::Reference(pages_root)),
        ]);
        let settings = inner.get_dictionary(source_catalog)?;
        for key in CATALOG_SETTINGS {
            if let Ok(value) = settings.get(key) {
                catalog.set(key.to_vec(), value.clone());
            }
        }
        let catalog_id = inner.add_object(catalog);
        inner.trailer.set("Root", Object::Reference(catalog_id));
        inner.trailer.remove(b"Prev");
        inner.trailer.remove(b"XRefStm");

        let mut destination = PdfDocument::new(source.name.clone(), inner);
        destination.origin = Some(source.id);
        destination.pages_root = Some(pages_root);
        destination.source_catalog = Some(source_catalog);
        Ok(destination)
    }

    fn document_id(&self, document: &PdfDocument) -> DocumentId {
        document.id
    }

    fn is_encrypted(&self, document: &PdfDocument) -> bool {
        document.inner.is_encrypted()
    }

    fn pages(&self, document: &PdfDocument) -> Result<Vec<PageId>> {
        Ok(document
            .page_objects()
            .into_iter()
            .map(|id| PageId::new(document.id, id))
            .collect())
    }

    fn page_geometry(&self, document: &PdfDocument, page: PageId) -> Result<PageGeometry> {
        let doc = &document.inner;
        let dict = doc.get_dictionary(document.page_object(page)?)?;

        let media_box = inherited(doc, dict, b"MediaBox")
            .and_then(|value| rectangle(doc, value))
            .unwrap_or_else(Rectangle::letter);
        let crop_box = inherited(doc, dict, b"CropBox")
            .and_then(|value| rectangle(doc, value))
            .unwrap_or(media_box);
        let trim_box = dict.get(b"TrimBox").ok().and_then(|value| rectangle(doc, value));
        let rotation = inherited(doc, dict, b"Rotate")
            .and_then(|value| objects::number(doc, value))
            .and_then(|degrees| Rotation::from_degrees(degrees as i64))
            .unwrap_or_default();

        Ok(PageGeometry {
            media_box,
            crop_box,
            trim_box,
            rotation,
        })
    }

    fn import_page(&self, destination: &mut PdfDocument, source: &PdfDocument, page: PageId) -> Result<PageId> {
        let page_id = source.page_object(page)?;
        if destination.origin()? != source.id {
            return Err(Error::StructuralMerge(format!(
                "{} was not created from {}",
                destination.name, source.name
            )));
        }
        let pages_root = destination
            .pages_root
            .ok_or_else(|| Error::StructuralMerge(format!("{} has no page tree", destination.name)))?;

        let original = source.inner.get_dictionary(page_id)?;
        let mut copy = original.clone();
        for key in INHERITABLE {
            if !copy.has(key) {
                if let Some(value) = inherited(&source.inner, original, key) {
                    copy.set(key.to_vec(), value.clone());
                }
            }
        }
        copy.set("Parent", Object::Reference(pages_root));
        // annotations are attached later, article beads and structure do not follow
        copy.remove(b"Annots");
        copy.remove(b"B");
        copy.remove(b"StructParents");

        let imported = destination.inner.add_object(copy);
        let root = destination.inner.get_dictionary_mut(pages_root)?;
        push_to_array(root, b"Kids", Object::Reference(imported));
        let count = root.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        root.set("Count", Object::Integer(count + 1));

        Ok(PageId::new(destination.id, imported))
    }

    fn set_crop_box(&self, document: &mut PdfDocument, page: PageId, crop_box: Rectangle) -> Result<()> {
        let id = document.page_object(page)?;
        document
            .inner
            .get_dictionary_mut(id)?
            .set("CropBox", rectangle_object(crop_box));
        Ok(())
    }

    fn set_rotation(&self, document: &mut PdfDocument, page: PageId, rotation: Rotation) -> Result<()> {
        let id = document.page_object(page)?;
        document
            .inner
            .get_dictionary_mut(id)?
            .set("Rotate", Object::Integer(rotation.degrees()));
        Ok(())
    }

    fn annotations(&self, document: &PdfDocument) -> Result<Vec<Annotation>> {
        annotations::read(document)
    }

    fn add_annotation(&self, destination: &mut PdfDocument, annotation: &Annotation) -> Result<AnnotationId> {
        annotations::attach(destination, annotation)
    }

    fn acro_form(&self, document: &PdfDocument) -> Result<Option<AcroForm>> {
        form::read(document)
    }

    fn set_acro_form(&self, destination: &mut PdfDocument, acro_form: &AcroForm) -> Result<()> {
        form::write(destination, acro_form)
    }

    fn outline(&self, document: &PdfDocument) -> Result<Vec<OutlineNode>> {
        outline::read(document)
    }

    fn set_outline(&self, destination: &mut PdfDocument, nodes: &[OutlineNode]) -> Result<()> {
        outline::write(destination, nodes)
    }

    fn save(&self, document: &mut PdfDocument, target: &Path) -> Result<()> {
        let pruned = document.inner.prune_objects();
        debug!("Pruned {} unreachable objects from {}", pruned.len(), document.name);
        if self.compress {
            document.inner.compress();
        }
        document.inner.save(target)?;
        Ok(())
    }
}
