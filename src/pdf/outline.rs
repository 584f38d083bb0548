//! Outline (bookmark) tree reading and writing

use std::collections::HashSet;

use log::debug;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};
use crate::model::{Destination, OutlineNode, PageId};
use crate::pdf::destinations::{destination_array, item_target};
use crate::pdf::engine::PdfDocument;
use crate::pdf::objects::{self, decode_text, get, get_dict, reference, MAX_DEPTH};

/// Top-level outline items with their subtrees
///
/// Targets outside the document's pages are read as no target.
pub(crate) fn read(document: &PdfDocument) -> Result<Vec<OutlineNode>> {
    let doc = &document.inner;
    let catalog = objects::catalog(doc)?;
    let Some(root) = get_dict(doc, catalog, b"Outlines") else {
        return Ok(Vec::new());
    };
    let Some(first) = reference(root, b"First") else {
        return Ok(Vec::new());
    };

    let reader = OutlineReader {
        document,
        pages: document.page_set(),
    };
    let mut visited = HashSet::new();
    Ok(reader.siblings(first, 0, &mut visited))
}

struct OutlineReader<'a> {
    document: &'a PdfDocument,
    pages: HashSet<ObjectId>,
}

impl OutlineReader<'_> {
    fn siblings(&self, first: ObjectId, depth: usize, visited: &mut HashSet<ObjectId>) -> Vec<OutlineNode> {
        let doc = &self.document.inner;
        let mut nodes = Vec::new();
        if depth >= MAX_DEPTH {
            debug!("Outline deeper than {} levels, ignoring the rest", MAX_DEPTH);
            return nodes;
        }

        let mut current = Some(first);
        while let Some(item_id) = current {
            if !visited.insert(item_id) {
                debug!("Outline item {:?} visited twice, stopping", item_id);
                break;
            }
            let Ok(item) = doc.get_dictionary(item_id) else {
                break;
            };
            nodes.push(self.node(doc, item, depth, visited));
            current = reference(item, b"Next");
        }
        nodes
    }

    fn node(&self, doc: &Document, item: &Dictionary, depth: usize, visited: &mut HashSet<ObjectId>) -> OutlineNode {
        let title = get(doc, item, b"Title").and_then(decode_text).unwrap_or_default();
        let destination = item_target(doc, item)
            .filter(|(page, _)| self.pages.contains(page))
            .map(|(page, view)| Destination {
                page: PageId::new(self.document.id, page),
                view,
            });
        let open = matches!(get(doc, item, b"Count"), Some(Object::Integer(count)) if *count > 0);
        let children = match reference(item, b"First") {
            Some(first) => self.siblings(first, depth + 1, visited),
            None => Vec::new(),
        };

        OutlineNode {
            title,
            destination,
            open,
            children,
        }
    }
}

/// Replaces the outline of `destination`
pub(crate) fn write(destination: &mut PdfDocument, nodes: &[OutlineNode]) -> Result<()> {
    if nodes.is_empty() {
        destination.catalog_mut()?.remove(b"Outlines");
        return Ok(());
    }

    let root = destination.inner.new_object_id();
    let (first, last) = write_siblings(destination, nodes, root)?;
    let visible: usize = nodes.iter().map(|node| 1 + visible_descendants(node)).sum();
    let outlines = Dictionary::from_iter(vec![
        ("Type", objects::name("Outlines")),
        ("First", Object::Reference(first)),
        ("Last", Object::Reference(last)),
        ("Count", Object::Integer(visible as i64)),
    ]);
    destination.inner.objects.insert(root, Object::Dictionary(outlines));
    destination.catalog_mut()?.set("Outlines", Object::Reference(root));
    Ok(())
}

/// Writes one sibling list, returning its first and last item
fn write_siblings(destination: &mut PdfDocument, nodes: &[OutlineNode], parent: ObjectId) -> Result<(ObjectId, ObjectId)> {
    let ids: Vec<ObjectId> = nodes.iter().map(|_| destination.inner.new_object_id()).collect();

    for (index, node) in nodes.iter().enumerate() {
        let mut item = Dictionary::new();
        item.set("Title", objects::encode_text(&node.title));
        item.set("Parent", Object::Reference(parent));
        if index > 0 {
            item.set("Prev", Object::Reference(ids[index - 1]));
        }
        if let Some(next) = ids.get(index + 1) {
            item.set("Next", Object::Reference(*next));
        }
        if let Some(target) = &node.destination {
            let page = destination.page_object(target.page)?;
            item.set("Dest", destination_array(page, &target.view));
        }
        if !node.children.is_empty() {
            let (first, last) = write_siblings(destination, &node.children, ids[index])?;
            let count = visible_descendants(node) as i64;
            item.set("First", Object::Reference(first));
            item.set("Last", Object::Reference(last));
            item.set("Count", Object::Integer(if node.open { count } else { -count }));
        }
        destination.inner.objects.insert(ids[index], Object::Dictionary(item));
    }

    match (ids.first(), ids.last()) {
        (Some(first), Some(last)) => Ok((*first, *last)),
        _ => Err(Error::StructuralMerge("empty outline level".to_string())),
    }
}

/// Descendants shown when `node` is expanded
fn visible_descendants(node: &OutlineNode) -> usize {
    node.children
        .iter()
        .map(|child| 1 + if child.open { visible_descendants(child) } else { 0 })
        .sum()
}
