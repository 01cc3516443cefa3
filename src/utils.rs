//! Small shared helpers.

/// Executes a callback when dropped.
///
/// Used to clear bookkeeping (like an in-flight revalidation entry) even if
/// the owning task unwinds. The callback must not panic.
pub(crate) struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CallOnDrop {
    pub(crate) fn new<F: FnOnce() + Send + 'static>(f: F) -> CallOnDrop {
        CallOnDrop {
            f: Some(Box::new(f)),
        }
    }
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}
