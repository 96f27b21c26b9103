//! UI-agnostic progress reporting surface.
//!
//! The engine never renders a progress bar itself; it only calls through
//! this trait. A concrete terminal renderer lives in the CLI crate.

use std::time::Duration;

/// Bar identity handed back by [`ProgressSink::add_bar`] and threaded
/// through subsequent calls.
pub type BarId = u64;

pub trait ProgressSink: Send + Sync {
    /// Registers a new bar named `name` with a total of `total` units.
    fn add_bar(&self, name: &str, total: u64) -> BarId;

    /// Sets a bar's current value directly (used once at resume-time to
    /// seed already-completed progress).
    fn set_current(&self, bar: BarId, current: u64);

    /// Advances a bar by `delta` units; `elapsed` is the wall-clock time
    /// since the previous advance, for speed-estimation decorators.
    fn advance(&self, bar: BarId, delta: u64, elapsed: Duration);

    /// Marks a bar as finished successfully.
    fn complete(&self, bar: BarId);

    /// Marks a bar as aborted (error or cancellation).
    fn abort(&self, bar: BarId);
}

/// A sink that discards everything; used when no UI is attached (e.g. a
/// non-interactive invocation, or a playlist's per-segment jobs, which the
/// spec says never get their own bar).
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn add_bar(&self, _name: &str, _total: u64) -> BarId {
        0
    }

    fn set_current(&self, _bar: BarId, _current: u64) {}

    fn advance(&self, _bar: BarId, _delta: u64, _elapsed: Duration) {}

    fn complete(&self, _bar: BarId) {}

    fn abort(&self, _bar: BarId) {}
}
