use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::SpotdlConfig;
use crate::service::Track;

const DEFAULT_OUTPUT_DIR: &str = "spotdl";

/// Result of downloading one track
#[derive(Debug)]
pub struct DownloadResult {
    pub query: String,
    pub error: Option<String>,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Downloads tracks the library has no better version of, using spotdl
#[derive(Debug, Clone)]
pub struct SpotdlDownloader {
    command: String,
    output_dir: PathBuf,
}

impl SpotdlDownloader {
    pub fn new(config: &SpotdlConfig) -> Self {
        let output_dir = config
            .output_dir
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_OUTPUT_DIR);

        Self {
            command: config.command.clone(),
            output_dir: PathBuf::from(output_dir),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolved executable, `None` if spotdl is not installed
    pub fn executable(&self) -> Option<PathBuf> {
        which::which(&self.command).ok()
    }

    pub fn is_available(&self) -> bool {
        self.executable().is_some()
    }

    /// spotdl search query for a track
    pub fn query_for(track: &Track) -> String {
        format!("{} - {}", track.artist, track.title)
    }

    /// Download tracks one at a time; a failed track doesn't stop the rest
    pub async fn download(&self, tracks: &[Track]) -> Result<Vec<DownloadResult>> {
        let executable = self
            .executable()
            .ok_or_else(|| anyhow!("{} not found in PATH", self.command))?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        let mut results = Vec::with_capacity(tracks.len());
        for track in tracks {
            let query = Self::query_for(track);
            tracing::info!("Downloading \"{}\"", query);

            let error = match self.run(&executable, &query).await {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!("Download of \"{}\" failed: {}", query, e);
                    Some(e.to_string())
                }
            };
            results.push(DownloadResult { query, error });
        }

        Ok(results)
    }

    async fn run(&self, executable: &Path, query: &str) -> Result<()> {
        let output = Command::new(executable)
            .arg("download")
            .arg(query)
            .current_dir(&self.output_dir)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("spotdl failed: {}", stderr.trim()));
        }
        Ok(())
    }
}
