//! Explicit converter registry, built once at startup and passed by reference.

use std::path::Path;
use std::sync::Arc;

use crate::engine::tools::normalize_format;

use super::{ConvertError, Converter, FfmpegConverter, FfmpegNormalizer, LoudnessNormalizer};

/// Ordered set of converters. Lookup returns the first registered converter that
/// supports the pair, so registration order is the tie-break.
#[derive(Default, Clone)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn Converter>>,
    normalizer: Option<Arc<dyn LoudnessNormalizer>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the ffmpeg-backed converter and normalizer.
    pub fn with_ffmpeg(binary: &Path) -> Self {
        let mut registry = Self::new();
        registry.register(FfmpegConverter::new(binary));
        registry.set_normalizer(FfmpegNormalizer::new(binary));
        registry
    }

    pub fn register<C: Converter + 'static>(&mut self, converter: C) -> &mut Self {
        self.register_shared(Arc::new(converter))
    }

    pub fn register_shared(&mut self, converter: Arc<dyn Converter>) -> &mut Self {
        log::debug!("registered converter {}", converter.name());
        self.converters.push(converter);
        self
    }

    pub fn set_normalizer<N: LoudnessNormalizer + 'static>(&mut self, normalizer: N) -> &mut Self {
        self.normalizer = Some(Arc::new(normalizer));
        self
    }

    /// First converter (in registration order) that supports `from -> to`.
    pub fn find(&self, from: &str, to: &str) -> Result<&dyn Converter, ConvertError> {
        let from = normalize_format(from);
        let to = normalize_format(to);
        self.converters
            .iter()
            .find(|c| c.supports(&from, &to))
            .map(|c| c.as_ref())
            .ok_or(ConvertError::NoConverter { from, to })
    }

    pub fn normalizer(&self) -> Result<&dyn LoudnessNormalizer, ConvertError> {
        self.normalizer.as_deref().ok_or(ConvertError::NoNormalizer)
    }

    pub fn names(&self) -> Vec<&str> {
        self.converters.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}
