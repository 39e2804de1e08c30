//! Progress-callback trait for processing-queue events.
//!
//! Pass an [`Arc<dyn QueueProgressCallback>`] to
//! [`crate::queue::ProcessingQueue::with_progress`] to observe items as the
//! worker picks them up and as exports finish. The CLI drives its progress
//! bar from these events.
//!
//! # Example
//!
//! ```rust
//! use pdf2po::QueueProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl QueueProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, _id: &str, file_name: &str, confidence: f64) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{file_name}: {:.0}%", confidence * 100.0);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the processing queue as items move through their lifecycle.
///
/// All methods default to no-ops. They run on the queue's worker task or
/// on the caller of `export_all`, so implementations must be cheap and must
/// not call back into the queue.
pub trait QueueProgressCallback: Send + Sync {
    /// An item was appended with status `pending`.
    fn on_item_queued(&self, id: &str, file_name: &str) {
        let _ = (id, file_name);
    }

    /// The worker moved an item to `processing`.
    fn on_item_start(&self, id: &str, file_name: &str) {
        let _ = (id, file_name);
    }

    /// Extraction succeeded.
    fn on_item_complete(&self, id: &str, file_name: &str, confidence: f64) {
        let _ = (id, file_name, confidence);
    }

    /// Extraction failed; `error` is the message stored on the item.
    fn on_item_error(&self, id: &str, file_name: &str, error: &str) {
        let _ = (id, file_name, error);
    }

    /// `export_all` attempted every completed item.
    fn on_export_complete(&self, succeeded: usize, failed: usize) {
        let _ = (succeeded, failed);
    }
}

/// Default when no callback is configured.
pub struct NoopProgressCallback;

impl QueueProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn QueueProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl QueueProgressCallback for TrackingCallback {
        fn on_item_start(&self, _id: &str, _file_name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _id: &str, _file_name: &str, _confidence: f64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _id: &str, _file_name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_item_queued("a", "a.pdf");
        cb.on_item_start("a", "a.pdf");
        cb.on_item_complete("a", "a.pdf", 0.9);
        cb.on_item_error("b", "b.pdf", "boom");
        cb.on_export_complete(1, 0);
    }

    #[test]
    fn arc_dyn_callback_receives_events() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();
        cb.on_item_start("a", "a.pdf");
        cb.on_item_complete("a", "a.pdf", 0.9);
        cb.on_item_start("b", "b.pdf");
        cb.on_item_error("b", "b.pdf", "corrupt");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
