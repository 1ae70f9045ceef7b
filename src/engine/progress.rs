//! Progress bar utilities for displaying batch status

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

use crate::engine::pool::ProgressFn;

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: &'static str,
    pub animation: Animation,
}

impl ProgressBarConfig {
    /// Create a new progress bar configuration
    pub fn new(total: usize, desc: &'static str, animation: Animation) -> Self {
        Self {
            total,
            desc,
            animation,
        }
    }
}

/// Create a progress bar with the given configuration
pub fn create_progress_bar(config: ProgressBarConfig) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation,
        unit = " files"
    )))
}

/// Move the bar to `completed`.
/// Uses try_lock so the pool's aggregation loop never blocks on the terminal.
pub fn set_bar_position(pb: &ProgressBar, completed: usize) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.update_to(completed);
    }
}

/// Pool progress hook that drives `bar`.
pub fn progress_callback(bar: &ProgressBar) -> ProgressFn {
    let bar = Arc::clone(bar);
    Box::new(move |completed: usize, _total: usize| set_bar_position(&bar, completed))
}

/// Final refresh and newline so log output after the bar starts on a clean line.
pub fn finish_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.refresh();
    }
    eprintln!();
}
