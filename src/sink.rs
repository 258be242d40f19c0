//! Destinations for finished exports.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::info;

/// File name used for the rich clipboard payload of a [`DirectorySink`].
pub const CLIPBOARD_HTML_FILE: &str = "grimoire-clipboard.html";
/// File name used for the plain-text clipboard payload of a [`DirectorySink`].
pub const CLIPBOARD_TEXT_FILE: &str = "grimoire-clipboard.txt";

/// Errors raised while handing an artifact to its destination.
#[derive(Debug)]
pub enum SinkError {
    Io { path: PathBuf, source: io::Error },
    /// The destination cannot accept this kind of payload.
    Unsupported(&'static str),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Failed to write {}: {}", path.display(), source)
            }
            Self::Unsupported(what) => write!(f, "Destination does not support {}", what),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Unsupported(_) => None,
        }
    }
}

/// Receives finished documents.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn save_document(&self, bytes: &[u8], filename: &str) -> Result<(), SinkError>;
}

/// Receives clipboard payloads.
#[async_trait]
pub trait ClipboardSink: Send + Sync {
    /// Writes an HTML payload together with its plain-text alternative.
    async fn write_clipboard(&self, html: &str, plain_text: &str) -> Result<(), SinkError>;

    /// Writes plain text only.
    async fn write_plain_text(&self, plain_text: &str) -> Result<(), SinkError>;
}

/// Writes every artifact as a file inside one directory.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn write(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, SinkError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| SinkError::Io {
                path: self.directory.clone(),
                source,
            })?;
        let path = self.directory.join(filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn save_document(&self, bytes: &[u8], filename: &str) -> Result<(), SinkError> {
        let path = self.write(filename, bytes).await?;
        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

#[async_trait]
impl ClipboardSink for DirectorySink {
    async fn write_clipboard(&self, html: &str, plain_text: &str) -> Result<(), SinkError> {
        self.write(CLIPBOARD_HTML_FILE, html.as_bytes()).await?;
        self.write_plain_text(plain_text).await
    }

    async fn write_plain_text(&self, plain_text: &str) -> Result<(), SinkError> {
        let path = self.write(CLIPBOARD_TEXT_FILE, plain_text.as_bytes()).await?;
        info!("Copied report text to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("herb_grimoire_sink_{}_{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn directory_sink_writes_documents() {
        let dir = scratch_dir("document");
        let sink = DirectorySink::new(&dir);

        sink.save_document(b"%PDF-1.3", "Sage.pdf").await.expect("save");

        let written = tokio::fs::read(dir.join("Sage.pdf")).await.expect("read back");
        assert_eq!(written, b"%PDF-1.3");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn directory_sink_writes_both_clipboard_flavors() {
        let dir = scratch_dir("clipboard");
        let sink = DirectorySink::new(&dir);

        sink.write_clipboard("<h1>Sage</h1>", "Sage").await.expect("copy");

        let html = tokio::fs::read_to_string(dir.join(CLIPBOARD_HTML_FILE)).await.expect("html");
        let text = tokio::fs::read_to_string(dir.join(CLIPBOARD_TEXT_FILE)).await.expect("text");
        assert_eq!(html, "<h1>Sage</h1>");
        assert_eq!(text, "Sage");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
