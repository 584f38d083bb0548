//! Engine-agnostic document model
//!
//! Identities are scoped to one opened document instance: two pages from
//! different documents never compare equal, even when the underlying engine
//! uses the same object number for both.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::geometry::Rectangle;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one opened or created document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Allocates an identity never handed out before in this process
    pub fn next() -> Self {
        DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Engine-level object key (object number, generation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub number: u32,
    pub generation: u16,
}

impl ObjectKey {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl From<(u32, u16)> for ObjectKey {
    fn from((number, generation): (u32, u16)) -> Self {
        Self { number, generation }
    }
}

impl From<ObjectKey> for (u32, u16) {
    fn from(key: ObjectKey) -> Self {
        (key.number, key.generation)
    }
}

macro_rules! document_scoped_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            pub document: DocumentId,
            pub key: ObjectKey,
        }

        impl $name {
            pub fn new(document: DocumentId, key: impl Into<ObjectKey>) -> Self {
                Self { document, key: key.into() }
            }
        }
    };
}

document_scoped_id!(
    /// A page within a specific document instance
    PageId
);
document_scoped_id!(
    /// An annotation within a specific document instance
    AnnotationId
);
document_scoped_id!(
    /// A form field within a specific document instance
    FieldId
);

/// How a destination presents its target page
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum View {
    Xyz {
        left: Option<f32>,
        top: Option<f32>,
        zoom: Option<f32>,
    },
    Fit,
    FitH(Option<f32>),
    FitV(Option<f32>),
    FitR(Rectangle),
    FitB,
    FitBH(Option<f32>),
    FitBV(Option<f32>),
}

/// A target inside the document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Destination {
    pub page: PageId,
    pub view: View,
}

impl Destination {
    pub fn fit(page: PageId) -> Self {
        Self { page, view: View::Fit }
    }

    pub fn retarget(&self, page: PageId) -> Self {
        Self { page, view: self.view }
    }
}

/// Cryptographic state of a signature widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureState {
    /// Signature value present
    pub signed: bool,
}

/// Annotation anchored to a page
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub page: PageId,
    pub subtype: String,
    pub rect: Rectangle,
    /// In-document target of a link annotation
    pub link: Option<Destination>,
    /// Present on signature widgets only
    pub signature: Option<SignatureState>,
}

impl Annotation {
    pub fn is_widget(&self) -> bool {
        self.subtype == "Widget"
    }

    pub fn is_link(&self) -> bool {
        self.subtype == "Link"
    }

    pub fn is_signed(&self) -> bool {
        self.signature.map(|s| s.signed).unwrap_or(false)
    }

    /// Clears the signature value; the widget itself is kept
    pub fn invalidate_signature(&mut self) {
        if let Some(signature) = self.signature.as_mut() {
            signature.signed = false;
        }
    }
}

/// Bookmark tree node
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineNode {
    pub title: String,
    pub destination: Option<Destination>,
    pub open: bool,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(title: impl Into<String>, destination: Option<Destination>) -> Self {
        Self {
            title: title.into(),
            destination,
            open: false,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<OutlineNode>) -> Self {
        self.children = children;
        self
    }

    /// Number of nodes in this subtree, this one included
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(OutlineNode::subtree_len).sum::<usize>()
    }
}

/// Field type (`/FT`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Button,
    Text,
    Choice,
    Signature,
    /// Non-terminal field without a type of its own
    Unknown,
}

impl FieldKind {
    pub fn from_name(name: &[u8]) -> Self {
        match name {
            b"Btn" => FieldKind::Button,
            b"Tx" => FieldKind::Text,
            b"Ch" => FieldKind::Choice,
            b"Sig" => FieldKind::Signature,
            _ => FieldKind::Unknown,
        }
    }
}

/// Form field with its widgets and child fields
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub id: FieldId,
    pub partial_name: Option<String>,
    pub kind: FieldKind,
    /// Signature fields only: a value is present
    pub signed: bool,
    pub widgets: Vec<AnnotationId>,
    pub children: Vec<FormField>,
}

impl FormField {
    pub fn new(id: FieldId, partial_name: Option<&str>, kind: FieldKind) -> Self {
        Self {
            id,
            partial_name: partial_name.map(str::to_string),
            kind,
            signed: false,
            widgets: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first visit of this field and its descendants
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a FormField)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Document-wide interactive form
#[derive(Debug, Clone, PartialEq)]
pub struct AcroForm {
    pub fields: Vec<FormField>,
    pub need_appearances: bool,
}

impl AcroForm {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self {
            fields,
            need_appearances: false,
        }
    }

    /// Total number of fields, nested ones included
    pub fn field_count(&self) -> usize {
        let mut count = 0;
        for field in &self.fields {
            field.walk(&mut |_| count += 1);
        }
        count
    }

    pub fn has_signed_fields(&self) -> bool {
        let mut signed = false;
        for field in &self.fields {
            field.walk(&mut |f| signed |= f.kind == FieldKind::Signature && f.signed);
        }
        signed
    }
}
