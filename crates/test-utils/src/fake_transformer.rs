use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use transmirror::errors::{MirrorError, Result};
use transmirror::transform::{TransformOptions, Transformed, Transformer};

/// Prefix the fake puts in front of every transformed file.
pub const TRANSFORMED_PREFIX: &str = "// transformed\n";

/// A fake transformer that:
/// - records which files it was asked to transform
/// - returns the contents with [`TRANSFORMED_PREFIX`] in front
/// - fails for files whose name contains one of the `fail_on` markers
/// - optionally returns a source map and sleeps to simulate work
#[derive(Debug, Clone, Default)]
pub struct FakeTransformer {
    calls: Arc<Mutex<Vec<PathBuf>>>,
    fail_on: Arc<Mutex<Vec<String>>>,
    with_map: bool,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(mut self) -> Self {
        self.with_map = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every file whose name contains `marker`.
    pub fn fail_on(&self, marker: &str) {
        self.fail_on.lock().unwrap().push(marker.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_on.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.file_name().and_then(|n| n.to_str()) == Some(name))
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Highest number of transforms that ran at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.fail_on
            .lock()
            .unwrap()
            .iter()
            .any(|marker| name.contains(marker.as_str()))
    }
}

impl Transformer for FakeTransformer {
    fn transform<'a>(
        &'a self,
        path: &'a Path,
        contents: Vec<u8>,
        _options: &'a TransformOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Transformed>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(path.to_path_buf());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.should_fail(path) {
                return Err(MirrorError::transform(path, "fake failure"));
            }

            let mut code = TRANSFORMED_PREFIX.as_bytes().to_vec();
            code.extend_from_slice(&contents);
            let mut out = Transformed::code(code);
            if self.with_map {
                out = out.with_map(format!("{{\"file\":{:?}}}", path.display().to_string()));
            }
            Ok(out)
        })
    }
}
