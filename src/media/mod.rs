pub mod loader;

use crate::core::error::QllamaError;
use async_trait::async_trait;

pub use loader::LocalMediaLoader;

pub type DecodedImage = image::DynamicImage;

/// Frames kept from a video attachment.
pub const MAX_VIDEO_FRAMES: usize = 8;

/// Turns locators (paths or URLs) into decoded pixels.
#[async_trait]
pub trait MediaLoader: Send + Sync {
    async fn load_image(&self, locator: &str) -> Result<DecodedImage, QllamaError>;

    /// At most `max_frames` frames, evenly spaced across the source.
    async fn load_video(
        &self,
        locator: &str,
        max_frames: usize,
    ) -> Result<Vec<DecodedImage>, QllamaError>;
}

pub fn is_url(locator: &str) -> bool {
    match reqwest::Url::parse(locator) {
        Ok(url) => url.has_host() && !url.scheme().is_empty(),
        Err(_) => false,
    }
}

/// Integer linspace over `[0, total - 1]` with `min(max_frames, total)` points.
pub fn frame_indices(total: usize, max_frames: usize) -> Vec<usize> {
    let count = max_frames.min(total);
    match count {
        0 => Vec::new(),
        1 => vec![0],
        _ => (0..count).map(|i| i * (total - 1) / (count - 1)).collect(),
    }
}
