//! Terminal progress bar renderer: the concrete [`ProgressSink`] the engine
//! only ever sees through its trait. One [`indicatif::MultiProgress`] holds
//! every bar the process opens (the top-level job plus, recursively, each
//! download job a playlist pipeline fans out).

use hls_dl_core::progress_sink::{BarId, ProgressSink};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .unwrap()
        .progress_chars("#>-")
}

pub struct IndicatifSink {
    multi: MultiProgress,
    bars: Mutex<Vec<ProgressBar>>,
    next_id: AtomicU64,
}

impl IndicatifSink {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn bar(&self, id: BarId) -> ProgressBar {
        self.bars.lock().unwrap()[id as usize].clone()
    }
}

impl Default for IndicatifSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for IndicatifSink {
    fn add_bar(&self, name: &str, total: u64) -> BarId {
        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(bar_style());
        bar.set_message(name.to_string());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.bars.lock().unwrap().push(bar);
        id
    }

    fn set_current(&self, bar: BarId, current: u64) {
        self.bar(bar).set_position(current);
    }

    fn advance(&self, bar: BarId, delta: u64, _elapsed: Duration) {
        self.bar(bar).inc(delta);
    }

    fn complete(&self, bar: BarId) {
        self.bar(bar).finish_with_message("done");
    }

    fn abort(&self, bar: BarId) {
        self.bar(bar).abandon_with_message("aborted");
    }
}
