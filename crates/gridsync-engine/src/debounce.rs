//! Debounced text channel for search input.
//!
//! Raw input updates immediately so the search box stays responsive. The
//! settled value follows after a quiet period with no further input, and only
//! the latest value is ever emitted.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Callback invoked with each newly settled value.
///
/// Runs on the timer task while the channel is locked, so it must not call
/// back into the channel. Forwarding into a queue is the intended use.
pub type SettledCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct Shared {
    raw: String,
    settled: String,
    /// Bumped on every input, cancel and overwrite. A timer only emits if the
    /// epoch it captured is still current.
    epoch: u64,
    callback: Option<SettledCallback>,
}

/// Search input with a trailing-edge quiet period.
///
/// Timers run on the ambient tokio runtime; `update` must be called from
/// within one.
pub struct DebouncedText {
    quiet: Duration,
    shared: Arc<Mutex<Shared>>,
    timer: Option<JoinHandle<()>>,
}

impl DebouncedText {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            shared: Arc::new(Mutex::new(Shared {
                raw: String::new(),
                settled: String::new(),
                epoch: 0,
                callback: None,
            })),
            timer: None,
        }
    }

    /// Register the settled-value callback, replacing any previous one.
    pub fn on_settled<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.lock().callback = Some(Arc::new(callback));
    }

    /// Latest input, updated immediately.
    pub fn raw(&self) -> String {
        self.shared.lock().raw.clone()
    }

    /// Last value that survived a quiet period.
    pub fn settled(&self) -> String {
        self.shared.lock().settled.clone()
    }

    /// Whether a quiet period is running.
    pub fn is_pending(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Record new input and restart the quiet period.
    pub fn update(&mut self, raw: impl Into<String>) {
        let epoch = {
            let mut shared = self.shared.lock();
            shared.raw = raw.into();
            shared.epoch += 1;
            shared.epoch
        };

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let shared = Arc::clone(&self.shared);
        let quiet = self.quiet;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;

            let mut shared = shared.lock();
            if shared.epoch != epoch || shared.raw == shared.settled {
                return;
            }
            shared.settled = shared.raw.clone();
            tracing::trace!(value = %shared.settled, "search input settled");

            if let Some(callback) = shared.callback.clone() {
                let value = shared.settled.clone();
                callback(&value);
            }
        }));
    }

    /// Drop the running quiet period without emitting. Values are kept.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.shared.lock().epoch += 1;
    }

    /// Empty both values and cancel any pending emission.
    pub fn clear(&mut self) {
        self.set_silently("");
    }

    /// Overwrite both values without emitting, cancelling any pending
    /// emission.
    pub fn set_silently(&mut self, value: impl Into<String>) {
        self.cancel();
        let value = value.into();
        let mut shared = self.shared.lock();
        shared.raw = value.clone();
        shared.settled = value;
    }
}

impl Drop for DebouncedText {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
