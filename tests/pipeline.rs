//! Pipeline tests against the in-memory engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pdf_crop::engine::memory::{MemoryEngine, MemoryField, MemoryOutline, MemorySource};
use pdf_crop::geometry::PageGeometry;
use pdf_crop::model::FieldKind;
use pdf_crop::transform::PageEdit;
use pdf_crop::{
    CancelHandle, CropTransform, Error, ExcludedPages, ExecutionContext, OutputTarget, PageSelection,
    PageTransform, ProgressListener, Rectangle, Result, Source, TaskOutcome, TaskParameters,
    TransformationTask,
};
use tempfile::TempDir;

fn halves() -> CropTransform {
    CropTransform::new(vec![
        Rectangle::new(0.0, 0.0, 306.0, 792.0),
        Rectangle::new(306.0, 0.0, 612.0, 792.0),
    ])
    .expect("valid areas")
}

fn sources(names: &[&str]) -> Vec<Source> {
    names.iter().map(|name| Source::bytes(*name, Vec::new())).collect()
}

fn run_task(
    engine: MemoryEngine,
    parameters: &TaskParameters,
    context: ExecutionContext,
) -> (TaskOutcome, TransformationTask<MemoryEngine>) {
    let mut task = TransformationTask::new(engine);
    let outcome = task.run(parameters, Arc::new(context));
    (outcome, task)
}

/// Splits the first page in two and drops every other page
struct SplitFirstPage;

impl PageTransform for SplitFirstPage {
    fn plan(&self, page_number: usize, _page_count: usize, geometry: &PageGeometry) -> Result<Vec<PageEdit>> {
        if page_number != 1 {
            return Ok(Vec::new());
        }
        let half = geometry.media_box.width() / 2.0;
        Ok(vec![
            PageEdit::crop(Rectangle::new(0.0, 0.0, half, geometry.media_box.height())),
            PageEdit::crop(Rectangle::new(half, 0.0, geometry.media_box.width(), geometry.media_box.height())),
        ])
    }
}

#[test]
fn test_split_first_page_drops_structures_of_second() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let engine = MemoryEngine::new();
    engine.register(
        MemorySource::new("a.pdf")
            .pages(2)
            .link(1, 2)
            .outline(MemoryOutline::new("Part", Some(1)).child(MemoryOutline::new("Section", Some(2)))),
    );
    let parameters = TaskParameters::new(
        sources(&["a.pdf"]),
        OutputTarget::Directory(temp_dir.path().to_path_buf()),
        SplitFirstPage,
    );

    let (outcome, task) = run_task(engine, &parameters, ExecutionContext::new());
    assert_eq!(outcome.result.expect("run succeeds").len(), 1);

    let saved = task.engine().saved();
    let output = &saved[0];
    assert_eq!(output.pages().len(), 2);

    // one bookmark copy per half, the child pointing at the dropped page is gone
    let outline = output.outline();
    assert_eq!(outline.len(), 2);
    assert!(outline.iter().all(|node| node.title == "Part" && node.children.is_empty()));
    assert_eq!(outline[0].destination.map(|d| d.page), Some(output.pages()[0]));
    assert_eq!(outline[1].destination.map(|d| d.page), Some(output.pages()[1]));

    // the link is on both halves, its target page is not in the output
    let links = output.annotations();
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|link| link.link.is_none()));
}

#[test]
fn test_signatures_follow_replication() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let signed = |name: &str| {
        MemorySource::new(name)
            .pages(1)
            .signature_widget(1, true)
            .field(MemoryField::new("approval", FieldKind::Signature).widget(0).signed())
    };

    let split = TaskParameters::new(
        sources(&["split.pdf"]),
        OutputTarget::Directory(temp_dir.path().join("split")),
        halves(),
    );
    let single = TaskParameters::new(
        sources(&["single.pdf"]),
        OutputTarget::Directory(temp_dir.path().join("single")),
        CropTransform::new(vec![Rectangle::new(0.0, 0.0, 612.0, 396.0)]).expect("valid area"),
    );

    let engine = MemoryEngine::new();
    engine.register(signed("split.pdf"));
    let (outcome, split_task) = run_task(engine, &split, ExecutionContext::new());
    outcome.result.expect("split run succeeds");

    let engine = MemoryEngine::new();
    engine.register(signed("single.pdf"));
    let (outcome, single_task) = run_task(engine, &single, ExecutionContext::new());
    outcome.result.expect("single run succeeds");

    let saved = split_task.engine().saved();
    let split_output = &saved[0];
    assert_eq!(split_output.annotations().len(), 2);
    assert!(split_output.annotations().iter().all(|a| !a.is_signed()));
    let form = split_output.form().expect("form kept");
    assert_eq!(form.fields[0].widgets.len(), 2);
    assert!(!form.has_signed_fields());

    let saved = single_task.engine().saved();
    let single_output = &saved[0];
    assert!(single_output.annotations()[0].is_signed());
    assert!(single_output.form().expect("form kept").has_signed_fields());
}

/// Cancels on the first page of the given source
struct CancelDuringSource {
    handle: CancelHandle,
    source: usize,
    current: AtomicUsize,
}

impl ProgressListener for CancelDuringSource {
    fn source_started(&self, number: usize, _total: usize, _name: &str) {
        self.current.store(number, Ordering::SeqCst);
    }

    fn step_completed(&self, _completed: usize, _total: usize) {
        if self.current.load(Ordering::SeqCst) == self.source {
            self.handle.cancel();
        }
    }
}

#[test]
fn test_cancellation_mid_source() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let engine = MemoryEngine::new();
    engine.register(MemorySource::new("a.pdf").pages(2));
    engine.register(MemorySource::new("b.pdf").pages(3));
    engine.register(MemorySource::new("c.pdf").pages(1));

    let context = ExecutionContext::new().lenient(true);
    let listener = CancelDuringSource {
        handle: context.cancel_handle(),
        source: 2,
        current: AtomicUsize::new(0),
    };
    let context = context.with_listener(Arc::new(listener));
    let parameters = TaskParameters::new(
        sources(&["a.pdf", "b.pdf", "c.pdf"]),
        OutputTarget::Directory(temp_dir.path().to_path_buf()),
        halves(),
    );

    let (outcome, task) = run_task(engine, &parameters, context);
    let engine = task.engine();
    assert!(matches!(outcome.result, Err(Error::Cancelled)), "cancellation is never lenient");
    assert_eq!(outcome.committed.len(), 1);
    assert_eq!(outcome.committed[0].source_name, "a.pdf");
    assert_eq!(engine.saved().len(), 1);
    // every document opened was closed
    assert_eq!(engine.open_count(), engine.close_count());
    assert!(!temp_dir.path().join("a.pdf").exists());
}

#[test]
fn test_artifacts_match_successful_sources() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let engine = MemoryEngine::new();
    engine.register(MemorySource::new("ok-1.pdf").pages(1));
    engine.register(MemorySource::new("broken.pdf").pages(1).failing_open());
    engine.register(MemorySource::new("ok-2.pdf").pages(2));
    engine.register(MemorySource::new("unsaveable.pdf").pages(1).failing_save());
    engine.register(MemorySource::new("locked.pdf").pages(1).encrypted());

    let parameters = TaskParameters::new(
        sources(&["ok-1.pdf", "broken.pdf", "ok-2.pdf", "unsaveable.pdf", "locked.pdf"]),
        OutputTarget::Directory(temp_dir.path().to_path_buf()),
        halves(),
    );

    let (outcome, task) = run_task(engine, &parameters, ExecutionContext::new().lenient(true));
    let engine = task.engine();
    let written = outcome.result.expect("lenient run succeeds");
    let names: Vec<&str> = written.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["ok-1.pdf", "ok-2.pdf"]);
    assert_eq!(outcome.warnings.len(), 3);
    assert_eq!(engine.open_count(), engine.close_count());

    let strict = MemoryEngine::new();
    strict.register(MemorySource::new("ok-1.pdf").pages(1));
    strict.register(MemorySource::new("broken.pdf").pages(1).failing_open());
    let parameters = TaskParameters::new(
        sources(&["ok-1.pdf", "broken.pdf"]),
        OutputTarget::Directory(temp_dir.path().join("strict")),
        halves(),
    );
    let (outcome, _) = run_task(strict, &parameters, ExecutionContext::new());
    assert!(matches!(outcome.result, Err(Error::EngineIo { .. })));
}

#[test]
fn test_malformed_form_with_and_without_leniency() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let malformed = || {
        MemorySource::new("form.pdf")
            .pages(1)
            .annotation(1, "Widget")
            .field(MemoryField::new("first", FieldKind::Text).widget(0))
            .field(MemoryField::new("second", FieldKind::Text).widget(0))
    };
    let parameters = TaskParameters::new(
        sources(&["form.pdf"]),
        OutputTarget::Directory(temp_dir.path().to_path_buf()),
        halves(),
    );

    let engine = MemoryEngine::new();
    engine.register(malformed());
    let (outcome, _) = run_task(engine, &parameters, ExecutionContext::new());
    assert!(matches!(outcome.result, Err(Error::StructuralMerge(_))));

    let engine = MemoryEngine::new();
    engine.register(malformed());
    let (outcome, task) = run_task(engine, &parameters, ExecutionContext::new().lenient(true));
    assert_eq!(outcome.result.expect("lenient run succeeds").len(), 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].message.contains("AcroForm"));

    // the document is saved with its annotations but no form
    let saved = task.engine().saved();
    assert_eq!(saved[0].annotations().len(), 2);
    assert!(saved[0].form().is_none());
}

#[derive(Default)]
struct Recorder {
    sources: Mutex<Vec<(usize, usize, String)>>,
    steps: Mutex<Vec<(usize, usize)>>,
}

impl ProgressListener for Recorder {
    fn source_started(&self, number: usize, total: usize, name: &str) {
        self.sources.lock().unwrap().push((number, total, name.to_string()));
    }

    fn step_completed(&self, completed: usize, total: usize) {
        self.steps.lock().unwrap().push((completed, total));
    }
}

#[test]
fn test_progress_is_reported_per_source() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let engine = MemoryEngine::new();
    engine.register(MemorySource::new("a.pdf").pages(2));
    engine.register(MemorySource::new("b.pdf").pages(1));

    let recorder = Arc::new(Recorder::default());
    let context = ExecutionContext::new().with_listener(recorder.clone());
    let parameters = TaskParameters::new(
        sources(&["a.pdf", "b.pdf"]),
        OutputTarget::Directory(temp_dir.path().to_path_buf()),
        halves(),
    );

    let (outcome, _) = run_task(engine, &parameters, context);
    outcome.result.expect("run succeeds");

    assert_eq!(
        *recorder.sources.lock().unwrap(),
        vec![(1, 2, "a.pdf".to_string()), (2, 2, "b.pdf".to_string())]
    );
    assert_eq!(
        *recorder.steps.lock().unwrap(),
        vec![(1, 4), (2, 4), (3, 4), (4, 4), (1, 2), (2, 2)]
    );
}

#[test]
fn test_skipped_single_source_into_file_target() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let file = temp_dir.path().join("out.pdf");
    let parameters = TaskParameters::new(sources(&["broken.pdf"]), OutputTarget::File(file.clone()), halves());

    let engine = MemoryEngine::new();
    engine.register(MemorySource::new("broken.pdf").pages(1).failing_open());
    let (outcome, _) = run_task(engine, &parameters, ExecutionContext::new().lenient(true));
    assert!(outcome.result.expect("lenient run succeeds").is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(!file.exists());

    // every page excluded is not an error either
    let excluded = TaskParameters::new(
        sources(&["cover.pdf"]),
        OutputTarget::File(file.clone()),
        halves().excluding(PageSelection::all(), ExcludedPages::Drop),
    );
    let engine = MemoryEngine::new();
    engine.register(MemorySource::new("cover.pdf").pages(1));
    let (outcome, _) = run_task(engine, &excluded, ExecutionContext::new());
    assert!(outcome.result.expect("run succeeds").is_empty());
    assert!(!file.exists());
}
