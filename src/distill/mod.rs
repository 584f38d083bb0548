//! Distillation of page-dependent structures through a page correspondence
//!
//! Every structure anchored to a source page ends up in one of three states:
//! dropped (page excluded), retargeted (one replica) or duplicated once per
//! replica, each duplicate pointing at its own destination page.

mod annotations;
mod outline;

pub use annotations::{clip_signatures, AnnotationsDistiller};
pub use outline::OutlineDistiller;

use crate::correspondence::PageCorrespondence;

/// Produces the destination copies of a document-wide structure
pub trait StructureDistiller {
    type Structure;

    fn distill(
        &self,
        structures: &[Self::Structure],
        pages: &PageCorrespondence,
    ) -> Vec<Self::Structure>;
}
