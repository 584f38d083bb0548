//! Execution context shared by every stage of a task run
//!
//! Holds the cooperative cancellation flag, the leniency policy and the
//! progress listener. Warnings emitted during the run are collected here so
//! the caller receives them alongside the final result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// Receives progress notifications. Implementations must not block.
pub trait ProgressListener: Send + Sync {
    /// A source is about to be processed (`number` is 1-based)
    fn source_started(&self, _number: usize, _total: usize, _name: &str) {}

    /// `completed` units of work out of `total` done for the current source
    fn step_completed(&self, completed: usize, total: usize);

    /// A recoverable failure was downgraded to a warning
    fn warning(&self, _warning: &Warning) {}
}

/// Listener that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl ProgressListener for LogListener {
    fn source_started(&self, number: usize, total: usize, name: &str) {
        log::info!("Processing source {} of {}: {}", number, total, name);
    }

    fn step_completed(&self, completed: usize, total: usize) {
        log::debug!("Completed {} of {} steps", completed, total);
    }
}

/// A non-fatal event collected during the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub cause: Option<String>,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Cloneable handle used to request cancellation from another thread
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run-wide state consulted by every component
pub struct ExecutionContext {
    cancelled: Arc<AtomicBool>,
    lenient: bool,
    listener: Arc<dyn ProgressListener>,
    warnings: Mutex<Vec<Warning>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cancelled", &self.is_cancelled())
            .field("lenient", &self.lenient)
            .finish()
    }
}

impl ExecutionContext {
    /// Strict context that logs progress
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            lenient: false,
            listener: Arc::new(LogListener),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`Error::Cancelled`] if cancellation was requested
    pub fn assert_not_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    /// Hands the error back unless the run is lenient and the error recoverable
    pub fn assert_lenient(&self, error: Error) -> Result<Error> {
        if self.lenient && error.is_recoverable() {
            Ok(error)
        } else {
            Err(error)
        }
    }

    pub fn report_step(&self, completed: usize, total: usize) {
        self.listener.step_completed(completed, total);
    }

    pub fn report_source(&self, number: usize, total: usize, name: &str) {
        self.listener.source_started(number, total, name);
    }

    pub fn report_warning(&self, message: impl Into<String>, cause: Option<&Error>) {
        let warning = Warning {
            message: message.into(),
            cause: cause.map(|e| e.to_string()),
        };
        log::warn!("{}", warning);
        self.listener.warning(&warning);
        // a poisoned lock only means another thread panicked while pushing
        let mut warnings = self.warnings.lock().unwrap_or_else(|e| e.into_inner());
        warnings.push(warning);
    }

    /// Warnings collected so far, in emission order
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        steps: AtomicUsize,
        warnings: AtomicUsize,
    }

    impl ProgressListener for Counting {
        fn step_completed(&self, _completed: usize, _total: usize) {
            self.steps.fetch_add(1, Ordering::SeqCst);
        }

        fn warning(&self, _warning: &Warning) {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let ctx = ExecutionContext::new();
        let handle = ctx.cancel_handle();
        assert!(ctx.assert_not_cancelled().is_ok());

        handle.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.assert_not_cancelled(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_assert_lenient() {
        let strict = ExecutionContext::new();
        assert!(strict
            .assert_lenient(Error::StructuralMerge("x".into()))
            .is_err());

        let lenient = ExecutionContext::new().lenient(true);
        assert!(lenient
            .assert_lenient(Error::StructuralMerge("x".into()))
            .is_ok());
        // cancellation is never downgraded
        assert!(lenient.assert_lenient(Error::Cancelled).is_err());
    }

    #[test]
    fn test_warnings_are_collected_and_forwarded() {
        let listener = Arc::new(Counting::default());
        let ctx = ExecutionContext::new().with_listener(listener.clone());

        ctx.report_step(1, 2);
        ctx.report_warning("Failed to handle AcroForms", Some(&Error::General("boom".into())));
        ctx.report_warning("Skipped", None);

        assert_eq!(listener.steps.load(Ordering::SeqCst), 1);
        assert_eq!(listener.warnings.load(Ordering::SeqCst), 2);

        let warnings = ctx.warnings();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].to_string(), "Failed to handle AcroForms: boom");
        assert_eq!(warnings[1].cause, None);
    }
}
