//! PDF Crop Library
//!
//! Batch page transformation for PDF documents. Each source page can become
//! zero, one or several output pages (one per crop area), and everything
//! anchored to pages follows:
//! - Annotations are copied onto every replica of their page
//! - Outline items are rebuilt against the output pages
//! - Form fields are merged with the surviving widgets
//! - Signatures whose signed content changed are invalidated
//!
//! Results are written to a directory or a single file, with a policy for
//! outputs that already exist.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pdf_crop::{
//!     CropTransform, ExecutionContext, LopdfEngine, OutputTarget, Rectangle, Source,
//!     TaskParameters, TransformationTask,
//! };
//!
//! let halves = CropTransform::new(vec![
//!     Rectangle::new(0.0, 0.0, 306.0, 792.0),
//!     Rectangle::new(306.0, 0.0, 612.0, 792.0),
//! ])
//! .expect("valid areas");
//! let parameters = TaskParameters::new(
//!     vec![Source::file("scan.pdf")],
//!     OutputTarget::Directory("out".into()),
//!     halves,
//! );
//!
//! let mut task = TransformationTask::new(LopdfEngine::new());
//! let outcome = task.run(&parameters, Arc::new(ExecutionContext::new()));
//! outcome.result.expect("Failed to crop");
//! ```

pub mod context;
pub mod correspondence;
pub mod distill;
pub mod engine;
pub mod error;
pub mod form;
pub mod geometry;
pub mod model;
pub mod naming;
pub mod output;
pub mod pdf;
pub mod task;
pub mod transform;

// Re-export commonly used items
pub use context::{CancelHandle, ExecutionContext, LogListener, ProgressListener, Warning};
pub use correspondence::{Correspondence, PageCorrespondence};
pub use engine::{DocumentEngine, DocumentHandle, Source};
pub use error::{Error, Result};
pub use form::AcroFormPolicy;
pub use geometry::{PageGeometry, Rectangle, Rotation};
pub use naming::{NameGenerator, PrefixNameGenerator};
pub use output::{ExistingOutputPolicy, OutputArtifact, OutputTarget};
pub use pdf::LopdfEngine;
pub use task::{TaskOutcome, TaskParameters, TaskState, TransformationTask};
pub use transform::{CropTransform, ExcludedPages, PageSelection, PageTransform, RotateTransform};
