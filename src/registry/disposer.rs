//! Typed disposers.
//!
//! A [`Disposer`] is consumed when it runs, so the type system guarantees a
//! resource's cleanup executes at most once.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;

/// Failure reported by a disposer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisposeError {
    /// The disposer returned an error.
    #[error("disposer failed: {0}")]
    Failed(String),

    /// The disposer panicked; the panic was caught.
    #[error("disposer panicked: {0}")]
    Panicked(String),
}

impl DisposeError {
    /// Builds a `Failed` error from anything displayable.
    pub fn failed(cause: impl fmt::Display) -> Self {
        Self::Failed(cause.to_string())
    }
}

/// Capability for values that know how to release themselves.
///
/// Implement this for resource types and register them with
/// [`Disposer::from_dispose`].
pub trait Dispose: Send {
    /// Releases the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the release fails. The registry logs it and still
    /// forgets the resource.
    fn dispose(self) -> Result<(), DisposeError>;
}

type DisposeFn = Box<dyn FnOnce() -> Result<(), DisposeError> + Send>;

/// Zero-argument, run-once cleanup callback.
pub struct Disposer(DisposeFn);

impl Disposer {
    /// Wraps a fallible cleanup closure.
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() -> Result<(), DisposeError> + Send + 'static,
    {
        Self(Box::new(cleanup))
    }

    /// Wraps a cleanup closure that cannot report failure.
    pub fn infallible<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || {
            cleanup();
            Ok(())
        })
    }

    /// A disposer that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| Ok(()))
    }

    /// Adapts a [`Dispose`] value into a disposer.
    pub fn from_dispose<T>(resource: T) -> Self
    where
        T: Dispose + 'static,
    {
        Self::new(move || resource.dispose())
    }

    /// Runs the cleanup, converting a panic into [`DisposeError::Panicked`].
    pub(crate) fn run(self) -> Result<(), DisposeError> {
        let cleanup = self.0;
        catch_unwind(AssertUnwindSafe(cleanup))
            .unwrap_or_else(|payload| Err(DisposeError::Panicked(panic_message(&*payload))))
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Disposer(..)")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}
