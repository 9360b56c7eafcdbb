//! Scoped execution: values resolvable for the duration of one call.
//!
//! [`run`] installs a frame of [`Bindings`] for exactly as long as the given
//! future runs; [`resolve`] looks a value up by type from anywhere inside it,
//! innermost frame first. Frames are task-local, so concurrent requests never
//! see each other's bindings, and tokio restores the previous frame on every
//! exit path, including errors, panics, and cancellation.
//!
//! ```text
//! scope::run(bindings![Request], async {
//!     scope::run(bindings![CookieQueue], async {
//!         scope::resolve::<CookieQueue>()   ← inner frame
//!         scope::resolve::<Request>()       ← falls through to the outer frame
//!     }).await
//! })                                        ← both frames gone here
//! ```

use std::future::Future;
use std::sync::Arc;

use http::Extensions;

tokio::task_local! {
    static FRAME: Arc<Frame>;
}

struct Frame {
    values: Extensions,
    parent: Option<Arc<Frame>>,
}

/// A set of values to bind for one scope, keyed by type.
#[derive(Default)]
pub struct Bindings(Extensions);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value`, replacing any earlier value of the same type.
    pub fn with<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.0.insert(value);
        self
    }
}

/// Runs `fut` with `bindings` resolvable through [`resolve`].
pub async fn run<F: Future>(bindings: Bindings, fut: F) -> F::Output {
    let frame = Arc::new(Frame {
        values: bindings.0,
        parent: FRAME.try_with(Arc::clone).ok(),
    });
    FRAME.scope(frame, fut).await
}

/// Returns the innermost bound value of type `T`, if any.
pub fn resolve<T: Clone + Send + Sync + 'static>() -> Option<T> {
    FRAME
        .try_with(|frame| {
            let mut current = Some(frame);
            while let Some(frame) = current {
                if let Some(value) = frame.values.get::<T>() {
                    return Some(value.clone());
                }
                current = frame.parent.as_ref();
            }
            None
        })
        .ok()
        .flatten()
}

/// Whether a value of type `T` is currently bound.
pub fn has<T: Clone + Send + Sync + 'static>() -> bool {
    resolve::<T>().is_some()
}
