//! Document engine capability interface
//!
//! The transformation pipeline only talks to documents through
//! [`DocumentEngine`], so it runs unchanged against the lopdf backed engine in
//! [`crate::pdf`] and the in-memory engine in [`memory`].

pub mod memory;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::geometry::{PageGeometry, Rectangle, Rotation};
use crate::model::{AcroForm, Annotation, AnnotationId, DocumentId, OutlineNode, PageId};

/// Where the bytes of a source come from
#[derive(Debug, Clone)]
pub enum SourceKind {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// An input document and the name used to derive its output names
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    kind: SourceKind,
}

impl Source {
    /// Source read from a file; the file name is the source name
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            kind: SourceKind::File(path),
        }
    }

    /// Source held in memory
    pub fn bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Bytes(bytes),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SourceKind::File(path) => write!(f, "{}", path.display()),
            SourceKind::Bytes(bytes) => write!(f, "{} ({} bytes)", self.name, bytes.len()),
        }
    }
}

/// Operations the pipeline needs from a document engine
///
/// Destination documents are created from the source they derive from, so an
/// engine may resolve shared resources (fonts, images, annotation and field
/// dictionaries) through the source identities it is handed.
pub trait DocumentEngine {
    type Document;

    fn open(&self, source: &Source) -> Result<Self::Document>;

    /// New, page-less document initialised from `source` (viewer settings, info)
    fn create_destination(&self, source: &Self::Document) -> Result<Self::Document>;

    fn document_id(&self, document: &Self::Document) -> DocumentId;

    fn is_encrypted(&self, document: &Self::Document) -> bool;

    fn pages(&self, document: &Self::Document) -> Result<Vec<PageId>>;

    fn page_geometry(&self, document: &Self::Document, page: PageId) -> Result<PageGeometry>;

    /// Copies `page` of `source` at the end of `destination`
    fn import_page(
        &self,
        destination: &mut Self::Document,
        source: &Self::Document,
        page: PageId,
    ) -> Result<PageId>;

    fn set_crop_box(&self, document: &mut Self::Document, page: PageId, crop_box: Rectangle)
        -> Result<()>;

    fn set_rotation(&self, document: &mut Self::Document, page: PageId, rotation: Rotation)
        -> Result<()>;

    /// Every annotation of every page, in page order
    fn annotations(&self, document: &Self::Document) -> Result<Vec<Annotation>>;

    /// Attaches a copy of a source annotation to `annotation.page`
    fn add_annotation(
        &self,
        destination: &mut Self::Document,
        annotation: &Annotation,
    ) -> Result<AnnotationId>;

    fn acro_form(&self, document: &Self::Document) -> Result<Option<AcroForm>>;

    fn set_acro_form(&self, destination: &mut Self::Document, form: &AcroForm) -> Result<()>;

    fn outline(&self, document: &Self::Document) -> Result<Vec<OutlineNode>>;

    fn set_outline(&self, destination: &mut Self::Document, outline: &[OutlineNode]) -> Result<()>;

    fn save(&self, document: &mut Self::Document, target: &Path) -> Result<()>;

    /// Releases the document. Called at most once per document.
    fn close(&self, document: Self::Document) {
        drop(document);
    }
}

/// Owns an engine document and closes it exactly once
pub struct DocumentHandle<'e, E: DocumentEngine> {
    engine: &'e E,
    label: String,
    document: Option<E::Document>,
}

impl<'e, E: DocumentEngine> DocumentHandle<'e, E> {
    pub fn new(engine: &'e E, label: impl Into<String>, document: E::Document) -> Self {
        Self {
            engine,
            label: label.into(),
            document: Some(document),
        }
    }

    /// Opens `source`, rejecting encrypted documents
    pub fn open(engine: &'e E, source: &Source) -> Result<Self> {
        log::debug!("Opening {}", source);
        let document = engine.open(source)?;
        let handle = Self::new(engine, source.name(), document);
        if engine.is_encrypted(handle.get()?) {
            return Err(Error::Encrypted(source.name().to_string()));
        }
        Ok(handle)
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    pub fn get(&self) -> Result<&E::Document> {
        self.document
            .as_ref()
            .ok_or_else(|| Error::InvalidState(format!("{} is closed", self.label)))
    }

    pub fn get_mut(&mut self) -> Result<&mut E::Document> {
        let label = &self.label;
        self.document
            .as_mut()
            .ok_or_else(|| Error::InvalidState(format!("{} is closed", label)))
    }

    /// Closes the document; closing again is a no-op
    pub fn close(&mut self) {
        if let Some(document) = self.document.take() {
            log::debug!("Closing {}", self.label);
            self.engine.close(document);
        }
    }
}

impl<E: DocumentEngine> Drop for DocumentHandle<'_, E> {
    fn drop(&mut self) {
        self.close();
    }
}
