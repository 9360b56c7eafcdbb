//! Incidental output capture.
//!
//! Handlers may print through [`echo`] instead of building a body. Printed text
//! lands in the innermost open buffer level; [`start`] opens a level and
//! [`end_clean`] closes one and returns its contents. The buffer stack is
//! task-local, so one request can never observe another's output.
//!
//! When the pipeline invokes a plain-function target it records the current
//! depth, opens one level, and after the call drains every level above the
//! recorded depth (including levels the handler opened and never closed),
//! bottom to top, so the text comes back in the order it was written. The
//! drain happens in a drop guard: an error, panic, or cancelled future still
//! leaves the stack exactly as deep as it was before the call.

use std::cell::RefCell;
use std::future::Future;
use std::io::Write;

tokio::task_local! {
    static BUFFERS: RefCell<Vec<String>>;
}

/// Runs `fut` with an empty buffer stack of its own.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    BUFFERS.scope(RefCell::new(Vec::new()), fut).await
}

/// Writes to the innermost buffer level, or to stdout when none is open.
pub fn echo(text: impl AsRef<str>) {
    let text = text.as_ref();
    let buffered = BUFFERS
        .try_with(|buffers| match buffers.borrow_mut().last_mut() {
            Some(top) => {
                top.push_str(text);
                true
            }
            None => false,
        })
        .unwrap_or(false);

    if !buffered {
        let _ = std::io::stdout().write_all(text.as_bytes());
    }
}

/// Opens a buffer level. Returns `false` outside a capture scope.
pub fn start() -> bool {
    BUFFERS
        .try_with(|buffers| buffers.borrow_mut().push(String::new()))
        .is_ok()
}

/// Number of open buffer levels.
pub fn level() -> usize {
    BUFFERS.try_with(|buffers| buffers.borrow().len()).unwrap_or(0)
}

/// Closes the innermost level and returns what was written to it.
pub fn end_clean() -> Option<String> {
    BUFFERS
        .try_with(|buffers| buffers.borrow_mut().pop())
        .ok()
        .flatten()
}

/// Runs `fut` inside a fresh buffer level and returns its output alongside
/// everything written while it ran.
pub(crate) async fn capture<F: Future>(fut: F) -> (F::Output, String) {
    if BUFFERS.try_with(|_| ()).is_ok() {
        capture_level(fut).await
    } else {
        scope(capture_level(fut)).await
    }
}

async fn capture_level<F: Future>(fut: F) -> (F::Output, String) {
    let level = Level::open();
    let output = fut.await;
    (output, level.drain())
}

/// One capture level; restores the entry depth when dropped.
struct Level {
    depth: usize,
}

impl Level {
    fn open() -> Self {
        let depth = level();
        start();
        Self { depth }
    }

    fn drain(self) -> String {
        BUFFERS
            .try_with(|buffers| {
                let mut buffers = buffers.borrow_mut();
                let start = self.depth.min(buffers.len());
                buffers.drain(start..).collect::<String>()
            })
            .unwrap_or_default()
    }
}

impl Drop for Level {
    fn drop(&mut self) {
        let _ = BUFFERS.try_with(|buffers| {
            let mut buffers = buffers.borrow_mut();
            buffers.truncate(self.depth);
            // The handler closed levels it did not own; pad back to depth.
            buffers.resize_with(self.depth, String::new);
        });
    }
}
