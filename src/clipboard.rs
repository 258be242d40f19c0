//! Single-pass clipboard report: an HTML snippet with a plain-text fallback.

use std::fmt;
use std::fmt::Write as _;

use log::warn;

use crate::model::FavoriteRecord;
use crate::sink::{ClipboardSink, SinkError};

const SEPARATOR: &str = "---";

/// Both clipboard writes failed.
#[derive(Debug)]
pub struct ClipboardError {
    pub rich: SinkError,
    pub plain: SinkError,
}

impl fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not copy report to clipboard: {}", self.plain)
    }
}

impl std::error::Error for ClipboardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.plain)
    }
}

/// Which flavor ended up on the clipboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyOutcome {
    Rich,
    PlainTextOnly,
}

/// The favorites summarized as rich and plain text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipboardReport {
    html: String,
    plain_text: String,
}

impl ClipboardReport {
    /// Summarizes `favorites` in the given order; `None` when there is nothing to copy.
    pub fn build(title: &str, favorites: &[FavoriteRecord]) -> Option<Self> {
        if favorites.is_empty() {
            return None;
        }
        Some(Self {
            html: html_report(title, favorites),
            plain_text: plain_report(title, favorites),
        })
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn plain_text(&self) -> &str {
        &self.plain_text
    }
}

fn plain_report(title: &str, favorites: &[FavoriteRecord]) -> String {
    let mut out = format!("{}\n\n{}\n\n", title, SEPARATOR);
    for favorite in favorites {
        let herb = &favorite.herb;
        let _ = writeln!(out, "## {}", herb.name);
        let _ = writeln!(out, "*{}*\n", herb.scientific_name);
        let _ = writeln!(out, "Magical Properties: {}", herb.magical_properties.join(", "));
        let _ = writeln!(out, "Elemental Association: {}", herb.elemental_association);
        let _ = writeln!(out, "Planetary Association: {}", herb.planetary_association);
        if let Some(deities) = herb.deities() {
            let _ = writeln!(out, "Deity Association: {}", deities.join(", "));
        }
        let _ = writeln!(out, "\nLore:\n{}", herb.lore);
        let _ = writeln!(out, "\nRitual Usage:\n{}\n", herb.usage);
        let _ = writeln!(out, "{}\n", SEPARATOR);
    }
    out
}

fn html_report(title: &str, favorites: &[FavoriteRecord]) -> String {
    let mut out = String::from(
        "<div style=\"font-family: sans-serif; line-height: 1.6; color: #333;\">",
    );
    let _ = write!(
        out,
        "<h1 style=\"color: #4a0e6c; border-bottom: 2px solid #eee; padding-bottom: 10px;\">{}</h1>",
        escape_html(title)
    );
    for favorite in favorites {
        let herb = &favorite.herb;
        out.push_str(
            "<div style=\"margin-top: 2em; padding-bottom: 1em; border-bottom: 1px solid #eee;\">",
        );
        let _ = write!(
            out,
            "<h2 style=\"font-size: 1.5em; color: #2d6a4f; margin-bottom: 0;\">{}</h2>",
            escape_html(&herb.name)
        );
        let _ = write!(
            out,
            "<p style=\"margin-top: 0; font-style: italic; color: #666;\">{}</p>",
            escape_html(&herb.scientific_name)
        );
        let _ = write!(
            out,
            "<p><strong>Magical Properties:</strong> {}</p>",
            escape_html(&herb.magical_properties.join(", "))
        );
        let _ = write!(
            out,
            "<p><strong>Associations:</strong> Element of {}, Planet of {}</p>",
            escape_html(&herb.elemental_association),
            escape_html(&herb.planetary_association)
        );
        if let Some(deities) = herb.deities() {
            let _ = write!(
                out,
                "<p><strong>Deities:</strong> {}</p>",
                escape_html(&deities.join(", "))
            );
        }
        let _ = write!(out, "<h3>Arcane Lore</h3><p>{}</p>", multiline_html(&herb.lore));
        let _ = write!(out, "<h3>Ritual Usage</h3><p>{}</p>", multiline_html(&herb.usage));
        out.push_str("</div>");
    }
    out.push_str("</div>");
    out
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn multiline_html(text: &str) -> String {
    escape_html(text).replace('\n', "<br>")
}

/// Copies the report for `favorites`, falling back to plain text when the rich write fails.
///
/// Returns `Ok(None)` without touching the clipboard when there are no favorites.
pub async fn copy_report(
    title: &str,
    favorites: &[FavoriteRecord],
    sink: &dyn ClipboardSink,
) -> Result<Option<CopyOutcome>, ClipboardError> {
    let Some(report) = ClipboardReport::build(title, favorites) else {
        return Ok(None);
    };

    let rich = match sink.write_clipboard(report.html(), report.plain_text()).await {
        Ok(()) => return Ok(Some(CopyOutcome::Rich)),
        Err(err) => err,
    };
    warn!("Failed to copy rich text, falling back to plain text: {}", rich);

    match sink.write_plain_text(report.plain_text()).await {
        Ok(()) => Ok(Some(CopyOutcome::PlainTextOnly)),
        Err(plain) => Err(ClipboardError { rich, plain }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::model::fixtures::favorite;

    #[derive(Default)]
    struct RecordingClipboard {
        reject_rich: bool,
        reject_plain: bool,
        writes: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl ClipboardSink for RecordingClipboard {
        async fn write_clipboard(&self, _html: &str, _plain: &str) -> Result<(), SinkError> {
            self.writes.lock().expect("lock").push("rich");
            if self.reject_rich {
                return Err(SinkError::Unsupported("rich text"));
            }
            Ok(())
        }

        async fn write_plain_text(&self, _plain: &str) -> Result<(), SinkError> {
            self.writes.lock().expect("lock").push("plain");
            if self.reject_plain {
                return Err(SinkError::Unsupported("plain text"));
            }
            Ok(())
        }
    }

    #[test]
    fn empty_collection_has_no_report() {
        assert!(ClipboardReport::build("Grimoire", &[]).is_none());
    }

    #[test]
    fn report_escapes_html_and_keeps_line_breaks() {
        let mut sage = favorite("Sage", None);
        sage.herb.lore = "Burn <slowly>\n& often".to_string();
        sage.herb.deity_association = Some(vec!["Zeus".to_string()]);

        let report = ClipboardReport::build("Grimoire", &[sage]).expect("report");

        assert!(report.html().contains("Burn &lt;slowly&gt;<br>&amp; often"));
        assert!(report.html().contains("<strong>Deities:</strong> Zeus"));
        assert!(report
            .plain_text()
            .starts_with("Grimoire\n\n---\n\n## Sage\n*Sage officinalis*\n\n"));
        assert!(report.plain_text().contains("Deity Association: Zeus\n"));
        assert!(report.plain_text().contains("\nLore:\nBurn <slowly>\n& often\n"));
    }

    #[test]
    fn deities_line_is_omitted_when_absent() {
        let report = ClipboardReport::build("Grimoire", &[favorite("Sage", None)]).expect("report");
        assert!(!report.html().contains("Deities"));
        assert!(!report.plain_text().contains("Deity Association"));
    }

    #[tokio::test]
    async fn rich_copy_is_preferred() {
        let clipboard = RecordingClipboard::default();
        let outcome = copy_report("Grimoire", &[favorite("Sage", None)], &clipboard)
            .await
            .expect("copy");
        assert_eq!(outcome, Some(CopyOutcome::Rich));
        assert_eq!(*clipboard.writes.lock().expect("lock"), vec!["rich"]);
    }

    #[tokio::test]
    async fn falls_back_to_plain_text() {
        let clipboard = RecordingClipboard {
            reject_rich: true,
            ..RecordingClipboard::default()
        };
        let outcome = copy_report("Grimoire", &[favorite("Sage", None)], &clipboard)
            .await
            .expect("copy");
        assert_eq!(outcome, Some(CopyOutcome::PlainTextOnly));
        assert_eq!(*clipboard.writes.lock().expect("lock"), vec!["rich", "plain"]);
    }

    #[tokio::test]
    async fn fails_only_when_both_writes_fail() {
        let clipboard = RecordingClipboard {
            reject_rich: true,
            reject_plain: true,
            ..RecordingClipboard::default()
        };
        let err = copy_report("Grimoire", &[favorite("Sage", None)], &clipboard)
            .await
            .unwrap_err();
        assert!(matches!(err.plain, SinkError::Unsupported("plain text")));
    }

    #[tokio::test]
    async fn nothing_is_copied_for_an_empty_collection() {
        let clipboard = RecordingClipboard::default();
        let outcome = copy_report("Grimoire", &[], &clipboard).await.expect("copy");
        assert_eq!(outcome, None);
        assert!(clipboard.writes.lock().expect("lock").is_empty());
    }
}
