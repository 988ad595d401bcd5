use chrono::Utc;
use std::path::{Path, PathBuf};

/// Write-only store for failure artifacts such as browser screenshots.
///
/// Saving is best effort: errors are logged and swallowed.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    dir: PathBuf,
}

impl DiagnosticSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `bytes` as `<label>_<timestamp>.<ext>`.
    pub async fn save(&self, label: &str, ext: &str, bytes: &[u8]) -> Option<PathBuf> {
        let safe: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let name = format!("{safe}_{}.{ext}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"));
        let path = self.dir.join(name);

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::warn!(dir = %self.dir.display(), error = %e, "diagnostics.mkdir_failed");
            return None;
        }
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), bytes = bytes.len(), "diagnostics.saved");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "diagnostics.write_failed");
                None
            }
        }
    }
}
