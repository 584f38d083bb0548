//! In-memory document engine
//!
//! Documents are described with [`MemorySource`] builders and registered by
//! name; opening a [`Source`] with that name materialises a fresh document.
//! Saved destinations are kept for inspection. Page numbers in builders are
//! 1-based, annotations are referred to by the order they were added.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::engine::{DocumentEngine, Source};
use crate::error::{Error, Result};
use crate::geometry::{PageGeometry, Rectangle, Rotation};
use crate::model::{
    AcroForm, Annotation, AnnotationId, Destination, DocumentId, FieldId, FieldKind, FormField,
    ObjectKey, OutlineNode, PageId, SignatureState,
};

const ANNOTATION_KEY_BASE: u32 = 1000;
const FIELD_KEY_BASE: u32 = 2000;
const DESTINATION_KEY_BASE: u32 = 10_000;

#[derive(Debug, Clone)]
struct MemoryAnnotation {
    page: usize,
    subtype: String,
    link: Option<usize>,
    signature: Option<bool>,
}

/// Outline entry of a [`MemorySource`]
#[derive(Debug, Clone)]
pub struct MemoryOutline {
    title: String,
    page: Option<usize>,
    children: Vec<MemoryOutline>,
}

impl MemoryOutline {
    pub fn new(title: impl Into<String>, page: Option<usize>) -> Self {
        Self {
            title: title.into(),
            page,
            children: Vec::new(),
        }
    }

    pub fn child(mut self, child: MemoryOutline) -> Self {
        self.children.push(child);
        self
    }
}

/// Form field of a [`MemorySource`]; widgets are annotation indexes
#[derive(Debug, Clone)]
pub struct MemoryField {
    name: Option<String>,
    kind: FieldKind,
    signed: bool,
    widgets: Vec<usize>,
    children: Vec<MemoryField>,
}

impl MemoryField {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: Some(name.to_string()),
            kind,
            signed: false,
            widgets: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn widget(mut self, annotation: usize) -> Self {
        self.widgets.push(annotation);
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn child(mut self, child: MemoryField) -> Self {
        self.children.push(child);
        self
    }
}

/// Blueprint of a source document
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    pages: Vec<PageGeometry>,
    annotations: Vec<MemoryAnnotation>,
    outline: Vec<MemoryOutline>,
    fields: Option<Vec<MemoryField>>,
    encrypted: bool,
    fail_open: bool,
    fail_save: bool,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pages: Vec::new(),
            annotations: Vec::new(),
            outline: Vec::new(),
            fields: None,
            encrypted: false,
            fail_open: false,
            fail_save: false,
        }
    }

    /// Appends `count` US Letter pages
    pub fn pages(mut self, count: usize) -> Self {
        self.pages
            .extend(std::iter::repeat(PageGeometry::new(Rectangle::letter())).take(count));
        self
    }

    pub fn page(mut self, geometry: PageGeometry) -> Self {
        self.pages.push(geometry);
        self
    }

    pub fn annotation(mut self, page: usize, subtype: &str) -> Self {
        self.annotations.push(MemoryAnnotation {
            page,
            subtype: subtype.to_string(),
            link: None,
            signature: None,
        });
        self
    }

    pub fn link(mut self, page: usize, target: usize) -> Self {
        self.annotations.push(MemoryAnnotation {
            page,
            subtype: "Link".to_string(),
            link: Some(target),
            signature: None,
        });
        self
    }

    pub fn signature_widget(mut self, page: usize, signed: bool) -> Self {
        self.annotations.push(MemoryAnnotation {
            page,
            subtype: "Widget".to_string(),
            link: None,
            signature: Some(signed),
        });
        self
    }

    pub fn outline(mut self, entry: MemoryOutline) -> Self {
        self.outline.push(entry);
        self
    }

    pub fn field(mut self, field: MemoryField) -> Self {
        self.fields.get_or_insert_with(Vec::new).push(field);
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    fn materialise(&self) -> Result<MemoryDocument> {
        let id = DocumentId::next();
        let pages: Vec<PageId> = (1..=self.pages.len())
            .map(|n| PageId::new(id, (n as u32, 0)))
            .collect();
        let page_at = |number: usize| -> Result<PageId> {
            number
                .checked_sub(1)
                .and_then(|index| pages.get(index).copied())
                .ok_or_else(|| Error::General(format!("{} has no page {}", self.name, number)))
        };

        let mut annotations = Vec::new();
        for (index, blueprint) in self.annotations.iter().enumerate() {
            let page = page_at(blueprint.page)?;
            let link = match blueprint.link {
                Some(target) => Some(Destination::fit(page_at(target)?)),
                None => None,
            };
            annotations.push(Annotation {
                id: AnnotationId::new(id, (ANNOTATION_KEY_BASE + index as u32, 0)),
                page,
                subtype: blueprint.subtype.clone(),
                rect: Rectangle::new(10.0, 10.0, 110.0, 40.0),
                link,
                signature: blueprint.signature.map(|signed| SignatureState { signed }),
            });
        }

        let mut outline = Vec::new();
        for entry in &self.outline {
            outline.push(materialise_outline(entry, &page_at)?);
        }

        let form = match &self.fields {
            Some(fields) => {
                let mut next_key = FIELD_KEY_BASE;
                let mut materialised = Vec::new();
                for field in fields {
                    materialised.push(materialise_field(field, id, &mut next_key));
                }
                Some(AcroForm::new(materialised))
            }
            None => None,
        };

        Ok(MemoryDocument {
            id,
            name: self.name.clone(),
            origin: None,
            geometry: pages.iter().copied().zip(self.pages.iter().copied()).collect(),
            pages,
            annotations,
            outline,
            form,
            encrypted: self.encrypted,
            fail_save: self.fail_save,
            next_key: DESTINATION_KEY_BASE,
        })
    }
}

fn materialise_outline(
    entry: &MemoryOutline,
    page_at: &impl Fn(usize) -> Result<PageId>,
) -> Result<OutlineNode> {
    let destination = match entry.page {
        Some(number) => Some(Destination::fit(page_at(number)?)),
        None => None,
    };
    let mut children = Vec::new();
    for child in &entry.children {
        children.push(materialise_outline(child, page_at)?);
    }
    Ok(OutlineNode::new(entry.title.clone(), destination).with_children(children))
}

fn materialise_field(field: &MemoryField, document: DocumentId, next_key: &mut u32) -> FormField {
    let id = FieldId::new(document, (*next_key, 0));
    *next_key += 1;
    let mut materialised = FormField::new(id, field.name.as_deref(), field.kind);
    materialised.signed = field.signed;
    materialised.widgets = field
        .widgets
        .iter()
        .map(|index| AnnotationId::new(document, (ANNOTATION_KEY_BASE + *index as u32, 0)))
        .collect();
    materialised.children = field
        .children
        .iter()
        .map(|child| materialise_field(child, document, next_key))
        .collect();
    materialised
}

/// Document held by the [`MemoryEngine`]
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    id: DocumentId,
    name: String,
    origin: Option<DocumentId>,
    pages: Vec<PageId>,
    geometry: HashMap<PageId, PageGeometry>,
    annotations: Vec<Annotation>,
    outline: Vec<OutlineNode>,
    form: Option<AcroForm>,
    encrypted: bool,
    fail_save: bool,
    next_key: u32,
}

impl MemoryDocument {
    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pages(&self) -> &[PageId] {
        &self.pages
    }

    /// 1-based position of `page` in this document
    pub fn page_number(&self, page: PageId) -> Option<usize> {
        self.pages.iter().position(|p| *p == page).map(|i| i + 1)
    }

    pub fn geometry(&self, page: PageId) -> Option<&PageGeometry> {
        self.geometry.get(&page)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn outline(&self) -> &[OutlineNode] {
        &self.outline
    }

    pub fn form(&self) -> Option<&AcroForm> {
        self.form.as_ref()
    }

    fn allocate(&mut self) -> ObjectKey {
        let key = ObjectKey::new(self.next_key, 0);
        self.next_key += 1;
        key
    }

    fn owns(&self, page: PageId) -> Result<()> {
        if page.document != self.id || !self.geometry.contains_key(&page) {
            return Err(Error::StructuralMerge(format!(
                "page {:?} does not belong to {}",
                page.key, self.name
            )));
        }
        Ok(())
    }
}

/// Engine backed by [`MemorySource`] blueprints
#[derive(Debug, Default)]
pub struct MemoryEngine {
    sources: Mutex<HashMap<String, MemorySource>>,
    saved: Mutex<Vec<MemoryDocument>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: MemorySource) {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        sources.insert(source.name.clone(), source);
    }

    /// Destinations saved so far, in save order
    pub fn saved(&self) -> Vec<MemoryDocument> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DocumentEngine for MemoryEngine {
    type Document = MemoryDocument;

    fn open(&self, source: &Source) -> Result<MemoryDocument> {
        let sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        let blueprint = sources
            .get(source.name())
            .ok_or_else(|| Error::General(format!("no such source: {}", source.name())))?;
        if blueprint.fail_open {
            return Err(Error::General(format!("cannot read {}", source.name())));
        }
        let document = blueprint.materialise()?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(document)
    }

    fn create_destination(&self, source: &MemoryDocument) -> Result<MemoryDocument> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryDocument {
            id: DocumentId::next(),
            name: source.name.clone(),
            origin: Some(source.id),
            pages: Vec::new(),
            geometry: HashMap::new(),
            annotations: Vec::new(),
            outline: Vec::new(),
            form: None,
            encrypted: false,
            fail_save: source.fail_save,
            next_key: DESTINATION_KEY_BASE,
        })
    }

    fn document_id(&self, document: &MemoryDocument) -> DocumentId {
        document.id
    }

    fn is_encrypted(&self, document: &MemoryDocument) -> bool {
        document.encrypted
    }

    fn pages(&self, document: &MemoryDocument) -> Result<Vec<PageId>> {
        Ok(document.pages.clone())
    }

    fn page_geometry(&self, document: &MemoryDocument, page: PageId) -> Result<PageGeometry> {
        document.owns(page)?;
        Ok(document.geometry[&page])
    }

    fn import_page(
        &self,
        destination: &mut MemoryDocument,
        source: &MemoryDocument,
        page: PageId,
    ) -> Result<PageId> {
        source.owns(page)?;
        if destination.origin != Some(source.id) {
            return Err(Error::StructuralMerge(format!(
                "{} was not created from {}",
                destination.name, source.name
            )));
        }
        let geometry = source.geometry[&page];
        let imported = PageId::new(destination.id, destination.allocate());
        destination.pages.push(imported);
        destination.geometry.insert(imported, geometry);
        Ok(imported)
    }

    fn set_crop_box(&self, document: &mut MemoryDocument, page: PageId, crop_box: Rectangle) -> Result<()> {
        document.owns(page)?;
        if let Some(geometry) = document.geometry.get_mut(&page) {
            geometry.crop_box = crop_box;
        }
        Ok(())
    }

    fn set_rotation(&self, document: &mut MemoryDocument, page: PageId, rotation: Rotation) -> Result<()> {
        document.owns(page)?;
        if let Some(geometry) = document.geometry.get_mut(&page) {
            geometry.rotation = rotation;
        }
        Ok(())
    }

    fn annotations(&self, document: &MemoryDocument) -> Result<Vec<Annotation>> {
        Ok(document.annotations.clone())
    }

    fn add_annotation(&self, destination: &mut MemoryDocument, annotation: &Annotation) -> Result<AnnotationId> {
        destination.owns(annotation.page)?;
        if let Some(link) = &annotation.link {
            destination.owns(link.page)?;
        }
        let id = AnnotationId::new(destination.id, destination.allocate());
        let mut copy = annotation.clone();
        copy.id = id;
        destination.annotations.push(copy);
        Ok(id)
    }

    fn acro_form(&self, document: &MemoryDocument) -> Result<Option<AcroForm>> {
        Ok(document.form.clone())
    }

    fn set_acro_form(&self, destination: &mut MemoryDocument, form: &AcroForm) -> Result<()> {
        let mut foreign = None;
        for field in &form.fields {
            field.walk(&mut |f| {
                if let Some(widget) = f.widgets.iter().find(|w| w.document != destination.id) {
                    foreign = Some(*widget);
                }
            });
        }
        if let Some(widget) = foreign {
            return Err(Error::StructuralMerge(format!(
                "widget {:?} is not part of {}",
                widget.key, destination.name
            )));
        }
        destination.form = Some(form.clone());
        Ok(())
    }

    fn outline(&self, document: &MemoryDocument) -> Result<Vec<OutlineNode>> {
        Ok(document.outline.clone())
    }

    fn set_outline(&self, destination: &mut MemoryDocument, outline: &[OutlineNode]) -> Result<()> {
        fn check(document: &MemoryDocument, nodes: &[OutlineNode]) -> Result<()> {
            for node in nodes {
                if let Some(destination) = &node.destination {
                    document.owns(destination.page)?;
                }
                check(document, &node.children)?;
            }
            Ok(())
        }
        check(destination, outline)?;
        destination.outline = outline.to_vec();
        Ok(())
    }

    fn save(&self, document: &mut MemoryDocument, target: &Path) -> Result<()> {
        if document.fail_save {
            return Err(Error::General(format!("cannot write {}", document.name)));
        }
        let summary = format!(
            "%memory {}\npages {}\nannotations {}\noutline {}\n",
            document.name,
            document.pages.len(),
            document.annotations.len(),
            document.outline.len()
        );
        std::fs::write(target, summary)?;
        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(document.clone());
        Ok(())
    }

    fn close(&self, document: MemoryDocument) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        drop(document);
    }
}
