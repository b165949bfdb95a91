use crate::core::error::QllamaError;
use crate::media::{DecodedImage, MediaLoader, frame_indices, is_url};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::process::Command;

/// Decodes images with the `image` crate and videos through `ffprobe`/`ffmpeg`.
/// URL locators are downloaded to a temporary file first.
pub struct LocalMediaLoader {
    client: Client,
    ffmpeg: String,
    ffprobe: String,
    /// Where URL downloads land; the system temp dir when `None`.
    download_dir: Option<PathBuf>,
}

impl LocalMediaLoader {
    pub fn new() -> Result<Self, QllamaError> {
        Self::with_tools("ffmpeg", "ffprobe")
    }

    pub fn with_tools(ffmpeg: &str, ffprobe: &str) -> Result<Self, QllamaError> {
        let client = Client::builder()
            .build()
            .map_err(|e| QllamaError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            ffmpeg: ffmpeg.to_string(),
            ffprobe: ffprobe.to_string(),
            download_dir: None,
        })
    }

    #[cfg(test)]
    fn with_download_dir(mut self, dir: &Path) -> Self {
        self.download_dir = Some(dir.to_path_buf());
        self
    }

    async fn fetch(&self, url: &str) -> Result<NamedTempFile, QllamaError> {
        tracing::debug!("downloading media from {}", url);
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(QllamaError::MediaNotFound(url.to_string()));
        }
        let response = response.error_for_status()?;

        let suffix = url_suffix(url);
        let mut builder = tempfile::Builder::new();
        builder.prefix("qllama-").suffix(&suffix);
        let mut tmp = match &self.download_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            tmp.write_all(&chunk?)?;
        }
        tmp.flush()?;
        Ok(tmp)
    }

    /// Local path for `locator`, plus the download guard when it was a URL.
    /// The temporary file is removed when the guard drops.
    async fn localize(
        &self,
        locator: &str,
    ) -> Result<(PathBuf, Option<NamedTempFile>), QllamaError> {
        if is_url(locator) {
            let download = self.fetch(locator).await?;
            Ok((download.path().to_path_buf(), Some(download)))
        } else {
            let path = PathBuf::from(locator);
            if !path.is_file() {
                return Err(QllamaError::MediaNotFound(locator.to_string()));
            }
            Ok((path, None))
        }
    }

    async fn count_frames(&self, path: &Path) -> Result<usize, QllamaError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0", "-count_packets"])
            .args(["-show_entries", "stream=nb_read_packets", "-of", "csv=p=0"])
            .arg(path)
            .output()
            .await
            .map_err(|e| tool_error(&self.ffprobe, e))?;

        if !output.status.success() {
            return Err(QllamaError::Decode(format!(
                "ffprobe could not read {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let field = stdout.trim().split(',').next().unwrap_or("").trim();
        if field.is_empty() {
            return Ok(0);
        }
        field.parse::<usize>().map_err(|_| {
            QllamaError::Decode(format!(
                "unexpected frame count '{}' for {}",
                field,
                path.display()
            ))
        })
    }

    async fn extract_frame(&self, path: &Path, index: usize) -> Result<DecodedImage, QllamaError> {
        let filter = format!("select=eq(n\\,{})", index);
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-vf", &filter, "-vsync", "0", "-frames:v", "1"])
            .args(["-f", "image2pipe", "-vcodec", "png", "-"])
            .output()
            .await
            .map_err(|e| tool_error(&self.ffmpeg, e))?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(QllamaError::Decode(format!(
                "ffmpeg could not extract frame {} from {}: {}",
                index,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(image::load_from_memory_with_format(
            &output.stdout,
            image::ImageFormat::Png,
        )?)
    }

    async fn decode_video(
        &self,
        path: &Path,
        locator: &str,
        max_frames: usize,
    ) -> Result<Vec<DecodedImage>, QllamaError> {
        let total = self.count_frames(path).await?;
        if total == 0 {
            return Err(QllamaError::EmptyMedia(format!(
                "No frames found in video: {}",
                locator
            )));
        }

        let indices = frame_indices(total, max_frames);
        tracing::debug!(total, ?indices, "extracting video frames from {}", locator);

        let mut frames = Vec::with_capacity(indices.len());
        for index in indices {
            match self.extract_frame(path, index).await {
                Ok(frame) => frames.push(frame),
                Err(e) => tracing::warn!("skipping frame {} of {}: {}", index, locator, e),
            }
        }

        if frames.is_empty() {
            return Err(QllamaError::EmptyMedia(format!(
                "Failed to extract frames from video: {}",
                locator
            )));
        }
        Ok(frames)
    }
}

fn decode_image(path: &Path) -> Result<DecodedImage, QllamaError> {
    let reader = image::ImageReader::open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => QllamaError::MediaNotFound(path.display().to_string()),
            _ => QllamaError::Io { source: e },
        })?
        .with_guessed_format()?;
    reader
        .decode()
        .map_err(|e| QllamaError::Decode(format!("{}: {}", path.display(), e)))
}

fn tool_error(tool: &str, err: io::Error) -> QllamaError {
    if err.kind() == io::ErrorKind::NotFound {
        QllamaError::Decode(format!(
            "{} is required to decode video but was not found on PATH",
            tool
        ))
    } else {
        QllamaError::Io { source: err }
    }
}

/// File suffix for a downloaded URL, taken from its path's extension.
fn url_suffix(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| format!(".{}", ext.to_lowercase()))
        })
        .unwrap_or_else(|| ".bin".to_string())
}

#[async_trait]
impl MediaLoader for LocalMediaLoader {
    async fn load_image(&self, locator: &str) -> Result<DecodedImage, QllamaError> {
        let (path, download) = self.localize(locator).await?;
        let result = decode_image(&path);
        drop(download);
        result.inspect_err(|e| tracing::error!("Error loading image from {}: {}", locator, e))
    }

    async fn load_video(
        &self,
        locator: &str,
        max_frames: usize,
    ) -> Result<Vec<DecodedImage>, QllamaError> {
        let (path, download) = self.localize(locator).await?;
        let result = self.decode_video(&path, locator, max_frames).await;
        drop(download);
        result.inspect_err(|e| tracing::error!("Error loading video from {}: {}", locator, e))
    }
}
