//! Outline (bookmark) distillation

use log::debug;

use crate::correspondence::PageCorrespondence;
use crate::distill::StructureDistiller;
use crate::model::OutlineNode;

/// Rebuilds the bookmark tree against the destination pages
///
/// - a node targeting a dropped page disappears, its retained children take
///   its place among its siblings
/// - a node targeting a replicated page is repeated once per replica; the
///   children are attached to the first repetition only
/// - a node without a target is kept when it still has children
#[derive(Debug, Default, Clone, Copy)]
pub struct OutlineDistiller;

impl StructureDistiller for OutlineDistiller {
    type Structure = OutlineNode;

    fn distill(&self, nodes: &[OutlineNode], pages: &PageCorrespondence) -> Vec<OutlineNode> {
        let mut retained = Vec::new();
        for node in nodes {
            distill_node(node, pages, &mut retained);
        }
        retained
    }
}

fn distill_node(node: &OutlineNode, pages: &PageCorrespondence, into: &mut Vec<OutlineNode>) {
    let mut children = Vec::new();
    for child in &node.children {
        distill_node(child, pages, &mut children);
    }

    let Some(destination) = node.destination else {
        if !children.is_empty() {
            into.push(OutlineNode {
                title: node.title.clone(),
                destination: None,
                open: node.open,
                children,
            });
        } else {
            debug!("Dropping empty outline node '{}'", node.title);
        }
        return;
    };

    let replicas = pages.entries_for(&destination.page);
    if replicas.is_empty() {
        debug!("Dropping outline node '{}', its page is not in the output", node.title);
        into.extend(children);
        return;
    }

    let mut children = Some(children);
    for replica in replicas {
        into.push(OutlineNode {
            title: node.title.clone(),
            destination: Some(destination.retarget(*replica)),
            open: node.open,
            children: children.take().unwrap_or_default(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Destination, DocumentId, PageId, View};

    /// `{page1: [d1, d2], page2: []}`
    fn correspondence() -> (PageCorrespondence, [PageId; 2], [PageId; 2]) {
        let source = DocumentId::next();
        let destination = DocumentId::next();
        let pages = [PageId::new(source, (1, 0)), PageId::new(source, (2, 0))];
        let replicas = [PageId::new(destination, (10, 0)), PageId::new(destination, (11, 0))];

        let mut table = PageCorrespondence::new();
        table.add_entry(pages[0], replicas[0]);
        table.add_entry(pages[0], replicas[1]);
        table.register(pages[1]);
        (table, pages, replicas)
    }

    #[test]
    fn test_node_on_dropped_page_yields_nothing() {
        let (table, pages, _) = correspondence();
        let outline = vec![OutlineNode::new("Two", Some(Destination::fit(pages[1])))];
        assert!(OutlineDistiller.distill(&outline, &table).is_empty());
    }

    #[test]
    fn test_node_on_replicated_page_is_duplicated() {
        let (table, pages, replicas) = correspondence();
        let view = View::Xyz {
            left: Some(0.0),
            top: Some(700.0),
            zoom: None,
        };
        let outline = vec![OutlineNode::new("One", Some(Destination { page: pages[0], view }))];

        let distilled = OutlineDistiller.distill(&outline, &table);
        assert_eq!(distilled.len(), 2);
        assert_eq!(distilled[0].destination, Some(Destination { page: replicas[0], view }));
        assert_eq!(distilled[1].destination, Some(Destination { page: replicas[1], view }));
        assert!(distilled.iter().all(|n| n.title == "One"));
    }

    #[test]
    fn test_children_of_dropped_node_are_promoted() {
        let (table, pages, replicas) = correspondence();
        let outline = vec![
            OutlineNode::new("Two", Some(Destination::fit(pages[1]))).with_children(vec![
                OutlineNode::new("Back to one", Some(Destination::fit(pages[0]))),
                OutlineNode::new("Still two", Some(Destination::fit(pages[1]))),
            ]),
        ];

        let distilled = OutlineDistiller.distill(&outline, &table);
        assert_eq!(distilled.len(), 2);
        assert!(distilled.iter().all(|n| n.title == "Back to one"));
        assert_eq!(distilled[1].destination.map(|d| d.page), Some(replicas[1]));
    }

    #[test]
    fn test_children_follow_first_replica() {
        let (table, pages, _) = correspondence();
        let outline = vec![OutlineNode::new("One", Some(Destination::fit(pages[0])))
            .with_children(vec![OutlineNode::new("Section", Some(Destination::fit(pages[0])))])];

        let distilled = OutlineDistiller.distill(&outline, &table);
        assert_eq!(distilled.len(), 2);
        assert_eq!(distilled[0].children.len(), 2);
        assert!(distilled[1].children.is_empty());
    }

    #[test]
    fn test_container_nodes() {
        let (table, pages, _) = correspondence();
        let outline = vec![
            OutlineNode::new("Empty part", None)
                .with_children(vec![OutlineNode::new("Two", Some(Destination::fit(pages[1])))]),
            OutlineNode::new("Part", None)
                .with_children(vec![OutlineNode::new("One", Some(Destination::fit(pages[0])))]),
        ];

        let distilled = OutlineDistiller.distill(&outline, &table);
        assert_eq!(distilled.len(), 1);
        assert_eq!(distilled[0].title, "Part");
        assert_eq!(distilled[0].children.len(), 2);
    }
}
