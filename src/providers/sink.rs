use std::path::PathBuf;

use async_trait::async_trait;
use log::info;

use crate::composition::ComposedVideo;
use crate::errors::AppError;
use crate::file_utils::FileManager;
use crate::providers::ResultSink;

/// Delivers composed videos as `<output_dir>/<sanitized name>.mp4`
#[derive(Debug, Clone)]
pub struct DirectorySink {
    output_dir: PathBuf,
    force_overwrite: bool,
}

impl DirectorySink {
    pub fn new(output_dir: impl Into<PathBuf>, force_overwrite: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            force_overwrite,
        }
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }
}

#[async_trait]
impl ResultSink for DirectorySink {
    async fn deliver(&self, video: ComposedVideo, output_name: &str) -> Result<PathBuf, AppError> {
        let destination = FileManager::output_path_for(&self.output_dir, output_name)
            .map_err(|e| AppError::File(e.to_string()))?;

        if destination.exists() && !self.force_overwrite {
            // `video` is dropped here and its staged file removed
            return Err(AppError::File(format!(
                "Output file already exists: {} (use --force-overwrite to replace it)",
                destination.display()
            )));
        }

        FileManager::ensure_dir(&self.output_dir).map_err(|e| AppError::File(e.to_string()))?;

        let duration = video.duration_seconds();
        let destination_for_task = destination.clone();
        tokio::task::spawn_blocking(move || video.persist(&destination_for_task))
            .await
            .map_err(|e| AppError::Unknown(format!("Delivery task failed: {}", e)))??;

        info!("Delivered {:.2}s video to {}", duration, destination.display());
        Ok(destination)
    }
}
