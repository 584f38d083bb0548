//! Annotation distillation and signature clipping

use std::collections::HashMap;

use log::debug;

use crate::correspondence::PageCorrespondence;
use crate::distill::StructureDistiller;
use crate::model::{Annotation, AnnotationId};

/// Copies annotations onto every replica of their page
///
/// Copies keep the source annotation id so they can be matched to their form
/// field; only `page` (and the link target) refer to the destination.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnnotationsDistiller;

impl StructureDistiller for AnnotationsDistiller {
    type Structure = Annotation;

    fn distill(&self, annotations: &[Annotation], pages: &PageCorrespondence) -> Vec<Annotation> {
        let mut retained = Vec::new();
        for annotation in annotations {
            let replicas = pages.entries_for(&annotation.page);
            if replicas.is_empty() {
                debug!(
                    "Dropping {} annotation {:?}, its page is not in the output",
                    annotation.subtype, annotation.id.key
                );
                continue;
            }
            for replica in replicas {
                let mut copy = annotation.clone();
                copy.page = *replica;
                // a link has a single target: the first replica
                copy.link = annotation
                    .link
                    .and_then(|link| pages.first_for(&link.page).map(|page| link.retarget(page)));
                retained.push(copy);
            }
        }
        retained
    }
}

/// Clears the signature value of distilled signature widgets whose signed
/// bytes are not reproduced by the output.
///
/// A signature survives only when it was copied once and the output consists
/// of a single page. Returns the number of signatures invalidated.
pub fn clip_signatures(annotations: &mut [Annotation], pages: &PageCorrespondence) -> usize {
    let mut copies: HashMap<AnnotationId, usize> = HashMap::new();
    for annotation in annotations.iter() {
        *copies.entry(annotation.id).or_default() += 1;
    }

    let single_page_output = pages.destination_count() == 1;
    let mut clipped = 0;
    for annotation in annotations.iter_mut().filter(|a| a.is_signed()) {
        if single_page_output && copies.get(&annotation.id) == Some(&1) {
            continue;
        }
        debug!("Invalidating signature {:?}", annotation.id.key);
        annotation.invalidate_signature();
        clipped += 1;
    }
    clipped
}
