#![allow(dead_code)]

use convx::converter::{ConvertError, Converter, LoudnessNormalizer, LoudnessTarget};
use convx::{Job, Options};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Shared counters a test keeps after handing the converter to a registry.
#[derive(Clone, Default)]
pub struct Probe {
    pub calls: Arc<AtomicUsize>,
    pub active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    pub options: Arc<Mutex<Vec<Options>>>,
    /// While set, outputs with `fail_ext` fail.
    pub broken: Arc<AtomicBool>,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().iter().map(|(i, _)| i.clone()).collect()
    }

    pub fn last_options(&self) -> Option<Options> {
        self.options.lock().unwrap().last().cloned()
    }
}

/// Copies input to output. Can fail its first N calls, or always for one output extension.
pub struct MockConverter {
    pub probe: Probe,
    pub fail_first: usize,
    pub fail_ext: Option<&'static str>,
    pub delay: Duration,
}

impl MockConverter {
    pub fn new(probe: &Probe) -> Self {
        Self {
            probe: probe.clone(),
            fail_first: 0,
            fail_ext: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn failing_on(mut self, ext: &'static str) -> Self {
        self.fail_ext = Some(ext);
        self.probe.broken.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports(&self, _from: &str, _to: &str) -> bool {
        true
    }

    fn convert(&self, input: &Path, output: &Path, options: &Options) -> Result<(), ConvertError> {
        let n = self.probe.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak.fetch_max(now, Ordering::SeqCst);
        self.probe
            .seen
            .lock()
            .unwrap()
            .push((input.to_path_buf(), output.to_path_buf()));
        self.probe.options.lock().unwrap().push(options.clone());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let ext_fails = self.probe.broken.load(Ordering::SeqCst)
            && self
                .fail_ext
                .is_some_and(|ext| output.extension().is_some_and(|e| e == ext));
        let result = if n <= self.fail_first || ext_fails {
            Err(ConvertError::failed(format!("mock failure on call {n}")))
        } else {
            fs::copy(input, output)
                .map(|_| ())
                .map_err(|e| ConvertError::failed(e.to_string()))
        };
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Copies input to output and counts calls.
pub struct MockNormalizer {
    pub calls: Arc<AtomicUsize>,
    pub targets: Arc<Mutex<Vec<LoudnessTarget>>>,
}

impl MockNormalizer {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            targets: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl LoudnessNormalizer for MockNormalizer {
    fn name(&self) -> &str {
        "mock-loudnorm"
    }

    fn normalize(
        &self,
        input: &Path,
        output: &Path,
        target: &LoudnessTarget,
        _options: &Options,
    ) -> Result<(), ConvertError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(*target);
        fs::copy(input, output)
            .map(|_| ())
            .map_err(|e| ConvertError::failed(e.to_string()))
    }
}

/// Create `dir/name` with `contents`, making parent directories.
pub fn touch(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

pub fn job(input: &Path, output: &Path) -> Job {
    Job {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        from: convx::engine::detect_format(input),
        to: convx::engine::detect_format(output),
        options: Options::default(),
        skip_reason: None,
    }
}
