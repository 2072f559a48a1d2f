//! Progress-callback trait for snapshot and file-processing events.
//!
//! Inject an [`Arc<dyn SnapshotProgressCallback>`] via
//! [`crate::config::SnapshotConfigBuilder::progress_callback`] to follow a run
//! as it moves through its states, downloads assets and describes images.
//!
//! # Example
//!
//! ```rust
//! use snap2md::{SnapshotConfig, SnapshotProgressCallback, SnapshotState};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StateCounter {
//!     seen: AtomicUsize,
//! }
//!
//! impl SnapshotProgressCallback for StateCounter {
//!     fn on_state(&self, state: SnapshotState) {
//!         self.seen.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("→ {state}");
//!     }
//! }
//!
//! let config = SnapshotConfig::builder()
//!     .progress_callback(Arc::new(StateCounter { seen: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::FileOutcome;
use crate::pipeline::fetch::FetchResult;
use crate::snapshot::SnapshotState;
use std::sync::Arc;

/// Receives events from a snapshot run or a file-processing batch.
///
/// Implementations must be `Send + Sync`; all methods default to no-ops so
/// callers only override what they care about.
pub trait SnapshotProgressCallback: Send + Sync {
    /// The run entered `state`. `Failed` is reported before the error is
    /// returned.
    fn on_state(&self, state: SnapshotState) {
        let _ = state;
    }

    /// One asset URL finished downloading, in URL order.
    fn on_asset(&self, url: &str, result: &FetchResult) {
        let _ = (url, result);
    }

    /// One image description attempt finished.
    ///
    /// # Arguments
    /// * `name`: image file name
    /// * `error`: `None` on success, otherwise the reason it was skipped
    fn on_image_described(&self, name: &str, error: Option<&str>) {
        let _ = (name, error);
    }

    /// One input of [`crate::files::process_files`] was handled.
    fn on_file_processed(&self, outcome: &FileOutcome) {
        let _ = outcome;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SnapshotProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SnapshotConfig`].
pub type ProgressCallback = Arc<dyn SnapshotProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<SnapshotState>>,
        failed_images: Mutex<Vec<String>>,
    }

    impl SnapshotProgressCallback for Recorder {
        fn on_state(&self, state: SnapshotState) {
            self.states.lock().unwrap().push(state);
        }

        fn on_image_described(&self, name: &str, error: Option<&str>) {
            if error.is_some() {
                self.failed_images.lock().unwrap().push(name.to_string());
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_state(SnapshotState::Loading);
        cb.on_asset("http://x/a.png", &FetchResult::Failed("HTTP 404".into()));
        cb.on_image_described("a.png", None);
        cb.on_file_processed(&FileOutcome::Skipped {
            input: PathBuf::from("x"),
            reason: "missing".into(),
        });
    }

    #[test]
    fn recorder_receives_events() {
        let rec = Recorder::default();
        rec.on_state(SnapshotState::Loading);
        rec.on_state(SnapshotState::Ready);
        rec.on_image_described("a.png", Some("timeout"));
        rec.on_image_described("b.png", None);

        assert_eq!(
            *rec.states.lock().unwrap(),
            vec![SnapshotState::Loading, SnapshotState::Ready]
        );
        assert_eq!(*rec.failed_images.lock().unwrap(), vec!["a.png"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_state(SnapshotState::Done);
    }
}
