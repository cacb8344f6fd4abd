//! Clip concatenation through the ffmpeg concat demuxer.

use adreel_error::{AdreelResult, ServiceError, ServiceErrorKind};
use adreel_interface::MediaMerger;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument};

/// Concatenates clips with `-c copy`, so no re-encode happens.
#[derive(Debug, Clone)]
pub struct FfmpegMerger {
    binary: PathBuf,
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegMerger {
    /// Use a specific ffmpeg binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Render a concat-demuxer list, one `file '...'` line per input.
///
/// Single quotes inside paths are closed, escaped and reopened.
///
/// # Examples
///
/// ```
/// use adreel_models::concat_list;
/// use std::path::PathBuf;
///
/// let list = concat_list(&[PathBuf::from("/runs/a/it's.mp4")]);
/// assert_eq!(list, "file '/runs/a/it'\\''s.mp4'\n");
/// ```
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

#[async_trait::async_trait]
impl MediaMerger for FfmpegMerger {
    #[instrument(skip(self, inputs), fields(clips = inputs.len(), output = %output.display()))]
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> AdreelResult<()> {
        if inputs.is_empty() {
            return Err(ServiceError::new(ServiceErrorKind::Tool(
                "no clips to merge".to_string(),
            ))
            .into());
        }

        let absolute: Vec<PathBuf> = inputs
            .iter()
            .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.clone()))
            .collect();

        let list_path = output.with_file_name("concat_list.txt");
        tokio::fs::write(&list_path, concat_list(&absolute))
            .await
            .map_err(|e| {
                ServiceError::new(ServiceErrorKind::Tool(format!(
                    "failed to write {}: {}",
                    list_path.display(),
                    e
                )))
            })?;
        debug!(list = %list_path.display(), "Wrote concat list");

        let result = tokio::process::Command::new(&self.binary)
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_path)
            .arg("-c")
            .arg("copy")
            .arg("-y")
            .arg(output)
            .output()
            .await
            .map_err(|e| {
                ServiceError::new(ServiceErrorKind::Tool(format!(
                    "failed to launch {}: {}",
                    self.binary.display(),
                    e
                )))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            error!(status = %result.status, stderr = %tail, "ffmpeg failed");
            return Err(ServiceError::new(ServiceErrorKind::Tool(format!(
                "ffmpeg exited with {}: {}",
                result.status, tail
            )))
            .into());
        }

        info!(output = %output.display(), clips = inputs.len(), "Merged clips");
        Ok(())
    }
}
