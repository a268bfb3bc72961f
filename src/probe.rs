use std::path::Path;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait DurationProber: Send + Sync {
    /// Whole seconds of audio in `path`.
    async fn probe(&self, path: &Path) -> anyhow::Result<u64>;
}

/// Runs `ffprobe` and reads the container duration.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    bin: String,
}

impl FfprobeProber {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl DurationProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> anyhow::Result<u64> {
        let output = Command::new(&self.bin)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .with_context(|| format!("run {} (is it installed?)", self.bin))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} failed ({}): {}", self.bin, output.status, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_duration_secs(&stdout)
            .with_context(|| format!("parse {} output for {}", self.bin, path.display()))
    }
}

/// Parses ffprobe's bare `format=duration` output, truncating to whole seconds.
pub fn parse_duration_secs(output: &str) -> anyhow::Result<u64> {
    let trimmed = output.trim();
    let secs: f64 = trimmed
        .parse()
        .with_context(|| format!("not a number: {trimmed:?}"))?;
    if !secs.is_finite() || secs < 0.0 {
        anyhow::bail!("duration out of range: {secs}");
    }
    Ok(secs as u64)
}
