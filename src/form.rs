//! AcroForm merging
//!
//! Rebuilds the source form so that every widget points at the annotation
//! copies attached to the destination.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::correspondence::Correspondence;
use crate::error::{Error, Result};
use crate::model::{AcroForm, AnnotationId, FieldKind, FormField};

/// What to do with the source form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcroFormPolicy {
    /// Carry the fields whose widgets survive
    #[default]
    Merge,
    /// Produce no form
    Discard,
}

/// Annotation copies attached to a destination
#[derive(Debug, Default, Clone)]
pub struct AttachedAnnotations {
    /// Source annotation id to the ids of its destination copies
    pub lookup: Correspondence<AnnotationId>,
    /// Source annotations whose signature value was cleared
    pub invalidated: HashSet<AnnotationId>,
}

impl AttachedAnnotations {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Merges a source form into a destination through the attached annotations
#[derive(Debug, Default, Clone, Copy)]
pub struct FormMerger {
    policy: AcroFormPolicy,
}

impl FormMerger {
    pub fn new(policy: AcroFormPolicy) -> Self {
        Self { policy }
    }

    /// Destination form, or `None` when no field survives
    ///
    /// Fields keep their source identities; their widgets are destination
    /// annotation ids. Fails with [`Error::StructuralMerge`] when a widget is
    /// claimed by more than one field or sibling fields share a name with
    /// different types.
    pub fn merge(&self, form: &AcroForm, annotations: &AttachedAnnotations) -> Result<Option<AcroForm>> {
        if self.policy == AcroFormPolicy::Discard {
            debug!("Discarding AcroForm");
            return Ok(None);
        }

        validate(form)?;

        let fields: Vec<FormField> = form
            .fields
            .iter()
            .filter_map(|field| retarget(field, annotations))
            .collect();
        if fields.is_empty() {
            debug!("No form field left in the output");
            return Ok(None);
        }
        Ok(Some(AcroForm {
            fields,
            need_appearances: form.need_appearances,
        }))
    }
}

fn validate(form: &AcroForm) -> Result<()> {
    let mut owners: HashMap<AnnotationId, &FormField> = HashMap::new();
    let mut conflict = None;
    for field in &form.fields {
        field.walk(&mut |f| {
            for widget in &f.widgets {
                if let Some(owner) = owners.insert(*widget, f) {
                    conflict.get_or_insert_with(|| {
                        format!(
                            "widget {:?} belongs to both '{}' and '{}'",
                            widget.key,
                            name_of(owner),
                            name_of(f)
                        )
                    });
                }
            }
        });
    }
    if let Some(message) = conflict {
        return Err(Error::StructuralMerge(message));
    }
    check_siblings(&form.fields)
}

fn check_siblings(fields: &[FormField]) -> Result<()> {
    let mut kinds: HashMap<&str, FieldKind> = HashMap::new();
    for field in fields {
        if let Some(name) = field.partial_name.as_deref() {
            if let Some(kind) = kinds.insert(name, field.kind) {
                if kind != field.kind {
                    return Err(Error::StructuralMerge(format!(
                        "fields named '{}' have different types",
                        name
                    )));
                }
            }
        }
        check_siblings(&field.children)?;
    }
    Ok(())
}

fn name_of(field: &FormField) -> &str {
    field.partial_name.as_deref().unwrap_or("<unnamed>")
}

fn retarget(field: &FormField, annotations: &AttachedAnnotations) -> Option<FormField> {
    let children: Vec<FormField> = field
        .children
        .iter()
        .filter_map(|child| retarget(child, annotations))
        .collect();

    let mut widgets = Vec::new();
    let mut invalidated = false;
    for widget in &field.widgets {
        widgets.extend_from_slice(annotations.lookup.entries_for(widget));
        invalidated |= annotations.invalidated.contains(widget);
    }

    if widgets.is_empty() && children.is_empty() {
        debug!("Dropping field '{}', none of its widgets is in the output", name_of(field));
        return None;
    }

    Some(FormField {
        id: field.id,
        partial_name: field.partial_name.clone(),
        kind: field.kind,
        signed: field.signed && !invalidated,
        widgets,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentId, FieldId};

    struct Fixture {
        source: DocumentId,
        destination: DocumentId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                source: DocumentId::next(),
                destination: DocumentId::next(),
            }
        }

        fn widget(&self, key: u32) -> AnnotationId {
            AnnotationId::new(self.source, (key, 0))
        }

        fn copy(&self, key: u32) -> AnnotationId {
            AnnotationId::new(self.destination, (key, 0))
        }

        fn field(&self, key: u32, name: &str, kind: FieldKind, widgets: &[u32]) -> FormField {
            let mut field = FormField::new(FieldId::new(self.source, (key, 0)), Some(name), kind);
            field.widgets = widgets.iter().map(|w| self.widget(*w)).collect();
            field
        }
    }

    #[test]
    fn test_widgets_follow_their_copies() {
        let f = Fixture::new();
        let form = AcroForm::new(vec![f.field(1, "name", FieldKind::Text, &[100])]);

        let mut attached = AttachedAnnotations::new();
        attached.lookup.add_entry(f.widget(100), f.copy(500));
        attached.lookup.add_entry(f.widget(100), f.copy(501));

        let merged = FormMerger::default().merge(&form, &attached).unwrap().unwrap();
        assert_eq!(merged.fields.len(), 1);
        assert_eq!(merged.fields[0].widgets, vec![f.copy(500), f.copy(501)]);
        assert_eq!(merged.fields[0].id, form.fields[0].id);
    }

    #[test]
    fn test_fields_without_widgets_are_dropped() {
        let f = Fixture::new();
        let mut parent = f.field(1, "address", FieldKind::Unknown, &[]);
        parent.children.push(f.field(2, "street", FieldKind::Text, &[100]));
        parent.children.push(f.field(3, "city", FieldKind::Text, &[101]));
        let form = AcroForm::new(vec![parent, f.field(4, "gone", FieldKind::Text, &[102])]);

        let mut attached = AttachedAnnotations::new();
        attached.lookup.add_entry(f.widget(101), f.copy(500));

        let merged = FormMerger::default().merge(&form, &attached).unwrap().unwrap();
        assert_eq!(merged.field_count(), 2);
        assert_eq!(merged.fields[0].children[0].partial_name.as_deref(), Some("city"));
    }

    #[test]
    fn test_no_surviving_field_means_no_form() {
        let f = Fixture::new();
        let form = AcroForm::new(vec![f.field(1, "name", FieldKind::Text, &[100])]);
        let merged = FormMerger::default().merge(&form, &AttachedAnnotations::new()).unwrap();
        assert!(merged.is_none());
    }

    #[test]
    fn test_discard_policy() {
        let f = Fixture::new();
        let form = AcroForm::new(vec![f.field(1, "name", FieldKind::Text, &[100])]);
        let mut attached = AttachedAnnotations::new();
        attached.lookup.add_entry(f.widget(100), f.copy(500));

        let merged = FormMerger::new(AcroFormPolicy::Discard).merge(&form, &attached).unwrap();
        assert!(merged.is_none());
    }

    #[test]
    fn test_invalidated_signature_clears_field_value() {
        let f = Fixture::new();
        let mut sig = f.field(1, "approval", FieldKind::Signature, &[100]);
        sig.signed = true;
        let form = AcroForm::new(vec![sig]);

        let mut attached = AttachedAnnotations::new();
        attached.lookup.add_entry(f.widget(100), f.copy(500));
        attached.invalidated.insert(f.widget(100));

        let merged = FormMerger::default().merge(&form, &attached).unwrap().unwrap();
        assert!(!merged.fields[0].signed);
        assert!(!merged.has_signed_fields());
    }

    #[test]
    fn test_shared_widget_is_malformed() {
        let f = Fixture::new();
        let form = AcroForm::new(vec![
            f.field(1, "a", FieldKind::Text, &[100]),
            f.field(2, "b", FieldKind::Text, &[100]),
        ]);
        let result = FormMerger::default().merge(&form, &AttachedAnnotations::new());
        assert!(matches!(result, Err(Error::StructuralMerge(_))));
    }

    #[test]
    fn test_conflicting_sibling_names_are_malformed() {
        let f = Fixture::new();
        let form = AcroForm::new(vec![
            f.field(1, "a", FieldKind::Text, &[100]),
            f.field(2, "a", FieldKind::Button, &[101]),
        ]);
        let result = FormMerger::default().merge(&form, &AttachedAnnotations::new());
        assert!(matches!(result, Err(Error::StructuralMerge(_))));
    }
}
