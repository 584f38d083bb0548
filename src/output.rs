//! Output aggregation and disposition
//!
//! Finished destinations are saved to temporary files and registered here;
//! once every source is processed they are moved to the output target,
//! resolving name collisions with an [`ExistingOutputPolicy`].

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use log::{debug, info};

use crate::context::ExecutionContext;
use crate::error::{Error, Result};

/// What to do when an output file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingOutputPolicy {
    Overwrite,
    #[default]
    Fail,
    Skip,
    Rename,
}

impl FromStr for ExistingOutputPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(ExistingOutputPolicy::Overwrite),
            "fail" => Ok(ExistingOutputPolicy::Fail),
            "skip" => Ok(ExistingOutputPolicy::Skip),
            "rename" => Ok(ExistingOutputPolicy::Rename),
            other => Err(Error::InvalidParameters(format!(
                "unknown existing output policy '{}'",
                other
            ))),
        }
    }
}

/// Where the artifacts end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// One file per artifact, named after the artifact
    Directory(PathBuf),
    /// Exactly one artifact, written to this path
    File(PathBuf),
}

/// A finished destination document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Logical output name
    pub name: String,
    /// Current location: a temporary buffer until finalized
    pub path: PathBuf,
    pub source_name: String,
    /// 1-based position of the source in the run
    pub sequence: usize,
}

/// Collects artifacts from the task and disposes of them at the end
#[derive(Debug, Default)]
pub struct OutputAggregator {
    artifacts: Mutex<Vec<OutputArtifact>>,
}

impl OutputAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a finished artifact; concurrent callers are serialized
    pub fn add_artifact(&self, artifact: OutputArtifact) {
        debug!("Adding output {} from {}", artifact.name, artifact.path.display());
        self.lock().push(artifact);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the registered artifacts
    pub fn artifacts(&self) -> Vec<OutputArtifact> {
        self.lock().clone()
    }

    /// Forgets every registered artifact, returning them
    pub fn discard(&self) -> Vec<OutputArtifact> {
        std::mem::take(&mut *self.lock())
    }

    /// Moves every artifact to `target`
    ///
    /// Artifacts are disposed in registration order. A `Fail` collision stops
    /// the disposition; artifacts moved before it stay where they are.
    /// Returns the artifacts with their final paths, skipped ones excluded.
    pub fn finalize(
        &self,
        target: &OutputTarget,
        policy: ExistingOutputPolicy,
        context: &ExecutionContext,
    ) -> Result<Vec<OutputArtifact>> {
        let artifacts = self.discard();
        let mut written = Vec::with_capacity(artifacts.len());

        match target {
            OutputTarget::Directory(dir) => {
                fs::create_dir_all(dir)?;
                for artifact in artifacts {
                    let destination = dir.join(&artifact.name);
                    if let Some(path) = dispose(&artifact, &destination, policy, context)? {
                        written.push(OutputArtifact { path, ..artifact });
                    }
                }
            }
            OutputTarget::File(file) => {
                // zero results when every source was skipped
                if artifacts.len() > 1 {
                    return Err(Error::InvalidParameters(format!(
                        "a single output file takes at most one result, got {}",
                        artifacts.len()
                    )));
                }
                if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                for artifact in artifacts {
                    if let Some(path) = dispose(&artifact, file, policy, context)? {
                        written.push(OutputArtifact { path, ..artifact });
                    }
                }
            }
        }

        info!("Wrote {} output file(s)", written.len());
        Ok(written)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OutputArtifact>> {
        self.artifacts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn dispose(
    artifact: &OutputArtifact,
    destination: &Path,
    policy: ExistingOutputPolicy,
    context: &ExecutionContext,
) -> Result<Option<PathBuf>> {
    if policy == ExistingOutputPolicy::Overwrite {
        if destination.exists() {
            debug!("Overwriting {}", destination.display());
        }
        move_file(&artifact.path, destination)?;
        debug!("Moved {} to {}", artifact.path.display(), destination.display());
        return Ok(Some(destination.to_path_buf()));
    }

    let mut candidate = destination.to_path_buf();
    let mut counter = 0;
    loop {
        match claim(&candidate) {
            Ok(()) => break,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match policy {
                ExistingOutputPolicy::Skip => {
                    context.report_warning(
                        format!("Skipping {}, the file already exists", destination.display()),
                        None,
                    );
                    return Ok(None);
                }
                ExistingOutputPolicy::Rename => {
                    counter += 1;
                    candidate = numbered(destination, counter);
                }
                ExistingOutputPolicy::Fail | ExistingOutputPolicy::Overwrite => {
                    return Err(Error::OutputExists(destination.to_path_buf()));
                }
            },
            Err(e) => return Err(e.into()),
        }
    }

    // replaces the empty placeholder claimed above
    if let Err(e) = move_file(&artifact.path, &candidate) {
        let _ = fs::remove_file(&candidate);
        return Err(e);
    }
    debug!("Moved {} to {}", artifact.path.display(), candidate.display());
    Ok(Some(candidate))
}

/// Creates an empty `path`, failing with `AlreadyExists` if anything is there
fn claim(path: &Path) -> io::Result<()> {
    OpenOptions::new().write(true).create_new(true).open(path).map(|_| ())
}

/// `name(n).pdf` for `name.pdf`
fn numbered(path: &Path, counter: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{}({}){}", stem, counter, extension))
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // rename fails across file systems
    fs::copy(from, to)?;
    if let Err(e) = fs::remove_file(from) {
        debug!("Unable to remove temporary {}: {}", from.display(), e);
    }
    Ok(())
}
