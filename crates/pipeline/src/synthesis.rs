//! Image synthesis with a single fallback.

use std::sync::Arc;

use taleforge_core::package::ImageSize;
use taleforge_providers::image::{GeneratedImage, ImageBackend, ImageError};

/// Both backends failed for the same prompt.
#[derive(Debug, thiserror::Error)]
#[error("Image synthesis failed (primary: {primary}; secondary: {secondary})")]
pub struct SynthesisError {
    pub primary: ImageError,
    pub secondary: ImageError,
}

/// Primary image backend with exactly one retry on the secondary.
#[derive(Clone)]
pub struct ImageSynthesizer {
    primary: Arc<dyn ImageBackend>,
    secondary: Arc<dyn ImageBackend>,
}

impl ImageSynthesizer {
    pub fn new(primary: Arc<dyn ImageBackend>, secondary: Arc<dyn ImageBackend>) -> Self {
        Self { primary, secondary }
    }

    pub async fn synthesize(
        &self,
        prompt: &str,
        size: ImageSize,
    ) -> Result<GeneratedImage, SynthesisError> {
        let primary = match self.primary.generate(prompt, size).await {
            Ok(image) => return Ok(image),
            Err(e) => e,
        };
        tracing::warn!(
            backend = self.primary.name(),
            fallback = self.secondary.name(),
            error = %primary,
            "Primary image backend failed, retrying on secondary"
        );

        match self.secondary.generate(prompt, size).await {
            Ok(image) => Ok(image),
            Err(secondary) => Err(SynthesisError { primary, secondary }),
        }
    }
}
