//! Transformation task: the per-source pipeline and its lifecycle
//!
//! `before` acquires the temporary workspace, `execute` runs every source
//! through open → page operation → structure distillation → form merge →
//! save → register, and `after` releases whatever is left. [`TransformationTask::run`]
//! chains the three and always runs `after`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use tempfile::TempDir;

use crate::context::{ExecutionContext, Warning};
use crate::correspondence::PageCorrespondence;
use crate::distill::{clip_signatures, AnnotationsDistiller, OutlineDistiller, StructureDistiller};
use crate::engine::{DocumentEngine, DocumentHandle, Source};
use crate::error::{Error, Result};
use crate::form::{AcroFormPolicy, AttachedAnnotations, FormMerger};
use crate::model::AnnotationId;
use crate::naming::{NameGenerator, PrefixNameGenerator};
use crate::output::{ExistingOutputPolicy, OutputAggregator, OutputArtifact, OutputTarget};
use crate::transform::PageTransform;

/// Everything a run needs besides the engine and the context
pub struct TaskParameters {
    pub sources: Vec<Source>,
    pub output: OutputTarget,
    pub existing_output_policy: ExistingOutputPolicy,
    pub naming: Box<dyn NameGenerator>,
    pub acro_form_policy: AcroFormPolicy,
    pub transform: Box<dyn PageTransform>,
}

impl TaskParameters {
    pub fn new(sources: Vec<Source>, output: OutputTarget, transform: impl PageTransform + 'static) -> Self {
        Self {
            sources,
            output,
            existing_output_policy: ExistingOutputPolicy::default(),
            naming: Box::new(PrefixNameGenerator::default()),
            acro_form_policy: AcroFormPolicy::default(),
            transform: Box::new(transform),
        }
    }

    pub fn existing_output_policy(mut self, policy: ExistingOutputPolicy) -> Self {
        self.existing_output_policy = policy;
        self
    }

    pub fn naming(mut self, naming: impl NameGenerator + 'static) -> Self {
        self.naming = Box::new(naming);
        self
    }

    pub fn acro_form_policy(mut self, policy: AcroFormPolicy) -> Self {
        self.acro_form_policy = policy;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::InvalidParameters("no input documents".to_string()));
        }
        if matches!(self.output, OutputTarget::File(_)) && self.sources.len() > 1 {
            return Err(Error::InvalidParameters(format!(
                "{} inputs cannot be written to a single output file",
                self.sources.len()
            )));
        }
        Ok(())
    }
}

/// Lifecycle of a [`TransformationTask`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Before,
    Executing,
    Completed,
    Failed,
    After,
}

/// What the caller gets back from [`TransformationTask::run`]
#[derive(Debug)]
pub struct TaskOutcome {
    /// Written artifacts, or the error that ended the run
    pub result: Result<Vec<OutputArtifact>>,
    /// On failure, artifacts completed before it; they are not written out
    pub committed: Vec<OutputArtifact>,
    pub warnings: Vec<Warning>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs a page transform over a list of sources
pub struct TransformationTask<E: DocumentEngine> {
    engine: E,
    state: TaskState,
    context: Option<Arc<ExecutionContext>>,
    workspace: Option<TempDir>,
    aggregator: OutputAggregator,
}

impl<E: DocumentEngine> TransformationTask<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: TaskState::Idle,
            context: None,
            workspace: None,
            aggregator: OutputAggregator::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// `before`, `execute` and `after`, in order; `after` runs whatever happens
    pub fn run(&mut self, parameters: &TaskParameters, context: Arc<ExecutionContext>) -> TaskOutcome {
        let result = self
            .before(parameters, Arc::clone(&context))
            .and_then(|_| self.execute(parameters));
        if result.is_err() {
            self.state = TaskState::Failed;
        }
        let committed = match &result {
            Ok(_) => Vec::new(),
            Err(_) => self.aggregator.artifacts(),
        };
        self.after();
        TaskOutcome {
            result,
            committed,
            warnings: context.warnings(),
        }
    }

    /// Validates the parameters and acquires the temporary workspace
    pub fn before(&mut self, parameters: &TaskParameters, context: Arc<ExecutionContext>) -> Result<()> {
        if !matches!(self.state, TaskState::Idle | TaskState::After) {
            return Err(Error::InvalidState(format!("cannot start a task in state {:?}", self.state)));
        }
        self.state = TaskState::Before;
        parameters.validate()?;

        let workspace = tempfile::Builder::new()
            .prefix("pdf-crop-")
            .tempdir()
            .map_err(|cause| Error::ResourceAcquisition {
                resource: "temporary workspace".to_string(),
                cause,
            })?;
        debug!("Created temporary workspace {}", workspace.path().display());

        self.workspace = Some(workspace);
        self.context = Some(context);
        Ok(())
    }

    /// Processes every source and disposes of the results
    pub fn execute(&mut self, parameters: &TaskParameters) -> Result<Vec<OutputArtifact>> {
        if self.state != TaskState::Before {
            return Err(Error::InvalidState(format!("cannot execute a task in state {:?}", self.state)));
        }
        self.state = TaskState::Executing;

        let result = self.execute_sources(parameters);
        self.state = match result {
            Ok(_) => TaskState::Completed,
            Err(_) => TaskState::Failed,
        };
        result
    }

    /// Releases the workspace and pending artifacts; safe to call repeatedly
    pub fn after(&mut self) {
        let pending = self.aggregator.discard();
        if !pending.is_empty() {
            debug!("Discarding {} pending output(s)", pending.len());
        }
        if let Some(workspace) = self.workspace.take() {
            debug!("Removing temporary workspace {}", workspace.path().display());
            if let Err(e) = workspace.close() {
                debug!("Unable to remove temporary workspace: {}", e);
            }
        }
        self.context = None;
        self.state = TaskState::After;
    }

    fn execute_sources(&self, parameters: &TaskParameters) -> Result<Vec<OutputArtifact>> {
        let context = self
            .context
            .as_deref()
            .ok_or_else(|| Error::InvalidState("no execution context".to_string()))?;
        let workspace = self
            .workspace
            .as_ref()
            .map(|w| w.path().to_path_buf())
            .ok_or_else(|| Error::InvalidState("no temporary workspace".to_string()))?;

        let total = parameters.sources.len();
        for (index, source) in parameters.sources.iter().enumerate() {
            context.assert_not_cancelled()?;
            let number = index + 1;
            context.report_source(number, total, source.name());

            match self.process_source(source, number, &workspace, parameters, context) {
                Ok(Some(artifact)) => self.aggregator.add_artifact(artifact),
                Ok(None) => {}
                Err(e) => {
                    let e = context.assert_lenient(e)?;
                    context.report_warning(format!("Skipping {}", source.name()), Some(&e));
                }
            }
        }

        self.aggregator
            .finalize(&parameters.output, parameters.existing_output_policy, context)
    }

    fn process_source(
        &self,
        source: &Source,
        number: usize,
        workspace: &Path,
        parameters: &TaskParameters,
        context: &ExecutionContext,
    ) -> Result<Option<OutputArtifact>> {
        let mut iteration = SourceIteration::open(&self.engine, source)?;

        let pages = iteration.apply(parameters.transform.as_ref(), context)?;
        if pages == 0 {
            context.report_warning(format!("Skipping {}, no page left in the output", source.name()), None);
            return Ok(None);
        }

        let attached = match iteration.attach_annotations() {
            Ok(attached) => attached,
            Err(e) => {
                let e = context.assert_lenient(e)?;
                context.report_warning("Failed to handle annotations", Some(&e));
                AttachedAnnotations::new()
            }
        };

        if let Err(e) = iteration.merge_form(&attached, parameters.acro_form_policy) {
            let e = context.assert_lenient(e)?;
            context.report_warning("Failed to handle AcroForms", Some(&e));
        }

        if let Err(e) = iteration.distill_outline() {
            let e = context.assert_lenient(e)?;
            context.report_warning("Failed to handle the outline", Some(&e));
        }

        context.assert_not_cancelled()?;
        let buffer = workspace.join(format!("buffer-{:04}.pdf", number));
        iteration.persist(&buffer)?;
        iteration.close();

        let name = parameters.naming.generate(source.name(), number);
        info!("{} cropped into {} page(s) as {}", source.name(), pages, name);
        Ok(Some(OutputArtifact {
            name,
            path: buffer,
            source_name: source.name().to_string(),
            sequence: number,
        }))
    }
}

/// Downgrades engine failures while handling document structures
fn structural(error: Error) -> Error {
    match error {
        Error::StructuralMerge(_) | Error::Cancelled => error,
        other => Error::StructuralMerge(other.to_string()),
    }
}

/// One source on its way through the pipeline
///
/// Owns the source and destination handles and the page correspondence
/// between them; everything is released when the iteration is dropped.
struct SourceIteration<'e, E: DocumentEngine> {
    engine: &'e E,
    name: String,
    source: DocumentHandle<'e, E>,
    destination: DocumentHandle<'e, E>,
    pages: PageCorrespondence,
}

impl<'e, E: DocumentEngine> SourceIteration<'e, E> {
    fn open(engine: &'e E, source: &Source) -> Result<Self> {
        let name = source.name().to_string();
        let document = DocumentHandle::open(engine, source).map_err(|e| Error::engine_io(name.as_str(), e))?;
        let destination = engine
            .create_destination(document.get()?)
            .map_err(|e| Error::engine_io(name.as_str(), e))?;
        let destination = DocumentHandle::new(engine, format!("output of {}", name), destination);

        Ok(Self {
            engine,
            name,
            source: document,
            destination,
            pages: PageCorrespondence::new(),
        })
    }

    /// Imports the planned pages, returning the number of destination pages
    fn apply(&mut self, transform: &dyn PageTransform, context: &ExecutionContext) -> Result<usize> {
        let engine = self.engine;
        let name = self.name.as_str();
        let source = self.source.get()?;

        let pages = engine.pages(source).map_err(|e| Error::engine_io(name, e))?;
        let page_count = pages.len();
        let mut plans = Vec::with_capacity(page_count);
        for (index, page) in pages.iter().enumerate() {
            let geometry = engine
                .page_geometry(source, *page)
                .map_err(|e| Error::engine_io(name, e))?;
            plans.push((*page, transform.plan(index + 1, page_count, &geometry)?));
        }

        let total: usize = plans.iter().map(|(_, edits)| edits.len()).sum();
        let destination = self.destination.get_mut()?;
        let mut completed = 0;
        for (page, edits) in plans {
            self.pages.register(page);
            for edit in edits {
                context.assert_not_cancelled()?;
                let imported = engine
                    .import_page(destination, source, page)
                    .map_err(|e| Error::engine_io(name, e))?;
                if let Some(crop_box) = edit.crop_box {
                    engine
                        .set_crop_box(destination, imported, crop_box)
                        .map_err(|e| Error::engine_io(name, e))?;
                }
                if let Some(rotation) = edit.rotation {
                    engine
                        .set_rotation(destination, imported, rotation)
                        .map_err(|e| Error::engine_io(name, e))?;
                }
                self.pages.add_entry(page, imported);
                completed += 1;
                context.report_step(completed, total);
            }
        }

        debug!("{}: {} source page(s) became {} page(s)", name, page_count, completed);
        Ok(completed)
    }

    /// Copies the annotations of every surviving page onto its replicas
    fn attach_annotations(&mut self) -> Result<AttachedAnnotations> {
        let engine = self.engine;
        let annotations = engine.annotations(self.source.get()?).map_err(structural)?;
        let signed: HashSet<AnnotationId> = annotations
            .iter()
            .filter(|a| a.is_signed())
            .map(|a| a.id)
            .collect();

        let mut distilled = AnnotationsDistiller.distill(&annotations, &self.pages);
        let clipped = clip_signatures(&mut distilled, &self.pages);
        if clipped > 0 {
            info!("{}: {} signature(s) invalidated", self.name, clipped);
        }

        let destination = self.destination.get_mut()?;
        let mut attached = AttachedAnnotations::new();
        for copy in &distilled {
            if signed.contains(&copy.id) && !copy.is_signed() {
                attached.invalidated.insert(copy.id);
            }
            let id = engine.add_annotation(destination, copy).map_err(structural)?;
            attached.lookup.add_entry(copy.id, id);
        }
        debug!("{}: attached {} annotation(s)", self.name, distilled.len());
        Ok(attached)
    }

    fn merge_form(&mut self, attached: &AttachedAnnotations, policy: AcroFormPolicy) -> Result<()> {
        let engine = self.engine;
        let Some(form) = engine.acro_form(self.source.get()?).map_err(structural)? else {
            return Ok(());
        };
        if let Some(merged) = FormMerger::new(policy).merge(&form, attached)? {
            engine
                .set_acro_form(self.destination.get_mut()?, &merged)
                .map_err(structural)?;
            debug!("{}: merged {} form field(s)", self.name, merged.field_count());
        }
        Ok(())
    }

    fn distill_outline(&mut self) -> Result<()> {
        let engine = self.engine;
        let outline = engine.outline(self.source.get()?).map_err(structural)?;
        if outline.is_empty() {
            return Ok(());
        }
        let distilled = OutlineDistiller.distill(&outline, &self.pages);
        if !distilled.is_empty() {
            engine
                .set_outline(self.destination.get_mut()?, &distilled)
                .map_err(structural)?;
        }
        Ok(())
    }

    fn persist(&mut self, target: &Path) -> Result<()> {
        let engine = self.engine;
        let name = self.name.as_str();
        engine
            .save(self.destination.get_mut()?, target)
            .map_err(|e| Error::engine_io(name, e))
    }

    /// Releases the destination, then the source
    fn close(mut self) {
        self.pages.clear();
        self.destination.close();
        self.source.close();
    }
}
