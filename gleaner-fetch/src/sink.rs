//! Durable output for extracted records.

use async_trait::async_trait;
use gleaner_common::{ExtractedRecord, SinkError};
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const MAX_SLUG_CHARS: usize = 60;
const MAX_SUFFIX: u32 = 10_000;

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist `record`, returning where it landed.
    async fn persist(&self, record: &ExtractedRecord) -> Result<PathBuf, SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkFormat {
    #[default]
    Markdown,
    Json,
}

impl SinkFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SinkFormat::Markdown => "md",
            SinkFormat::Json => "json",
        }
    }
}

/// One file per record under a directory, never overwriting.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    format: SinkFormat,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, format: SinkFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn render(&self, record: &ExtractedRecord) -> Result<String, SinkError> {
        match self.format {
            SinkFormat::Markdown => Ok(render_markdown(record)),
            SinkFormat::Json => render_json(record),
        }
    }
}

#[async_trait]
impl ResultSink for FileSink {
    async fn persist(&self, record: &ExtractedRecord) -> Result<PathBuf, SinkError> {
        let body = self.render(record)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::WriteFailed {
                path: self.dir.clone(),
                source,
            })?;

        let stem = file_stem(record);
        let ext = self.format.extension();
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}-{suffix}.{ext}")
            };
            let path = self.dir.join(name);
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            let mut file = match opened {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists && suffix < MAX_SUFFIX => {
                    suffix += 1;
                    continue;
                }
                Err(source) => return Err(SinkError::WriteFailed { path, source }),
            };
            let written = async {
                file.write_all(body.as_bytes()).await?;
                file.flush().await
            }
            .await;
            if let Err(source) = written {
                return Err(SinkError::WriteFailed { path, source });
            }
            tracing::info!(
                path = %path.display(),
                target_id = %record.origin_target,
                bytes = body.len(),
                "sink.persisted"
            );
            return Ok(path);
        }
    }
}

/// `<slug>-<hash8>_<timestamp>` for the record's target and capture time.
pub fn file_stem(record: &ExtractedRecord) -> String {
    let id = record.origin_target.as_str();
    let hash = blake3::hash(id.as_bytes()).to_hex();
    format!(
        "{}-{}_{}",
        slugify(id),
        &hash.as_str()[..8],
        record.captured_at.format("%Y%m%dT%H%M%S%3fZ")
    )
}

/// Lowercase, dash-separated form of a target identifier.
///
/// ```
/// use gleaner_fetch::sink::slugify;
///
/// assert_eq!(slugify("https://www.example.com/search/Top-10?x=1"), "www-example-com-search-top-10-x-1");
/// ```
pub fn slugify(id: &str) -> String {
    let without_scheme = match id.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphabetic()) => rest,
        _ => id,
    };
    let mut slug = String::with_capacity(without_scheme.len());
    let mut pending_dash = false;
    for c in without_scheme.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    let truncated: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    let trimmed = truncated.trim_end_matches('-');
    if trimmed.is_empty() {
        "target".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn render_markdown(record: &ExtractedRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", record.title);
    let _ = writeln!(out, "**Target:** {}", record.origin_target);
    let _ = writeln!(out, "**Captured:** {}\n", record.captured_at.to_rfc3339());
    out.push_str("## Key Content\n\n");
    if let Some(content) = &record.main_content {
        let _ = writeln!(out, "{content}\n");
    }
    if !record.sources.is_empty() {
        out.push_str("## Sources\n\n");
        for source in &record.sources {
            let _ = writeln!(out, "- [{}]({})", escape_link_text(&source.text), source.url);
        }
        out.push('\n');
    }
    if !record.related.is_empty() {
        out.push_str("## Related\n\n");
        for item in &record.related {
            let _ = writeln!(out, "- {item}");
        }
        out.push('\n');
    }
    out
}

pub fn render_json(record: &ExtractedRecord) -> Result<String, SinkError> {
    let mut body = serde_json::to_string_pretty(record)?;
    body.push('\n');
    Ok(body)
}

fn escape_link_text(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gleaner_common::{ExtractionTarget, SourceLink};

    fn record(target: &str) -> ExtractedRecord {
        ExtractedRecord {
            title: "T".into(),
            main_content: Some("C".into()),
            sources: vec![SourceLink::new("S1", "http://x")],
            related: vec!["R1".into()],
            captured_at: Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap(),
            origin_target: ExtractionTarget::new(target),
        }
    }

    #[test]
    fn markdown_has_every_section() {
        let md = render_markdown(&record("ok-target"));
        assert!(md.lines().any(|l| l.starts_with('#') && l.contains('T')));
        assert!(md.lines().any(|l| l.contains('C')));
        assert!(md.contains("- [S1](http://x)"));
        assert!(md.contains("- R1"));
        assert!(md.contains("## Key Content"));
        assert!(md.find("## Sources") < md.find("## Related"));
    }

    #[test]
    fn empty_lists_omit_sections() {
        let mut rec = record("ok-target");
        rec.sources.clear();
        rec.related.clear();
        let md = render_markdown(&rec);
        assert!(!md.contains("## Sources"));
        assert!(!md.contains("## Related"));
    }

    #[test]
    fn link_text_brackets_are_escaped() {
        let mut rec = record("ok-target");
        rec.sources = vec![SourceLink::new("[1] paper", "https://p.test")];
        assert!(render_markdown(&rec).contains("- [\\[1\\] paper](https://p.test)"));
    }

    #[test]
    fn slug_rules() {
        assert_eq!(slugify("ok-target"), "ok-target");
        assert_eq!(slugify("Top 10 Cars in India"), "top-10-cars-in-india");
        assert_eq!(slugify("???"), "target");
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).chars().count(), 60);
        assert!(!slugify(&format!("{}-b", "a".repeat(59))).ends_with('-'));
    }

    #[test]
    fn equal_slugs_get_different_hashes() {
        let a = file_stem(&record("https://x.test/a?b"));
        let b = file_stem(&record("http://x.test/a/b"));
        assert_eq!(slugify("https://x.test/a?b"), slugify("http://x.test/a/b"));
        assert_ne!(a, b);
        assert!(a.ends_with("_20261019T083000000Z"));
    }

    #[test]
    fn json_is_pretty_and_round_trips() {
        let rec = record("ok-target");
        let body = render_json(&rec).unwrap();
        assert!(body.contains("\n  \"title\": \"T\""));
        let back: ExtractedRecord = serde_json::from_str(&body).unwrap();
        assert_eq!(back, rec);
    }
}
