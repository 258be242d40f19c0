//! Glyph measurement and word wrapping for styled spans.

use rusttype::{point, Font, Scale};

use crate::fonts::GlyphFonts;
use crate::richtext::{color_to_rgb, Span, INK};

/// A run of text sharing one face and color, positioned within a line.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Fragment {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub color: [u8; 3],
    pub width: f32,
}

impl Fragment {
    fn same_style(&self, other: &Fragment) -> bool {
        self.bold == other.bold && self.italic == other.italic && self.color == other.color
    }
}

/// One wrapped line of a paragraph.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Line {
    pub fragments: Vec<Fragment>,
    pub width: f32,
}

impl Line {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }

    fn push(&mut self, fonts: &GlyphFonts, scale: Scale, fragment: Fragment) {
        if let Some(last) = self.fragments.last_mut() {
            if last.same_style(&fragment) {
                last.text.push_str(&fragment.text);
                last.width = text_width(fonts.face(last.bold, last.italic), scale, &last.text);
                self.recompute_width();
                return;
            }
        }
        self.width += fragment.width;
        self.fragments.push(fragment);
    }

    fn trim_end(&mut self, fonts: &GlyphFonts, scale: Scale) {
        while let Some(last) = self.fragments.last_mut() {
            let trimmed_len = last.text.trim_end().len();
            if trimmed_len == last.text.len() {
                break;
            }
            last.text.truncate(trimmed_len);
            if last.text.is_empty() {
                self.fragments.pop();
            } else {
                last.width = text_width(fonts.face(last.bold, last.italic), scale, &last.text);
                break;
            }
        }
        self.recompute_width();
    }

    fn recompute_width(&mut self) {
        self.width = self.fragments.iter().map(|f| f.width).sum();
    }
}

/// Horizontal extent of `text`, kerning included.
pub(crate) fn text_width(font: &Font<'_>, scale: Scale, text: &str) -> f32 {
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|glyph| glyph.position().x + glyph.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Distance from the top of a line to its baseline, and the full line advance.
pub(crate) fn line_metrics(fonts: &GlyphFonts, scale: Scale) -> (f32, f32) {
    let metrics = fonts.face(false, false).v_metrics(scale);
    (
        metrics.ascent,
        metrics.ascent - metrics.descent + metrics.line_gap,
    )
}

/// Breaks `spans` into lines no wider than `max_width` pixels.
///
/// Lines break between words; `\n` always starts a new line, and a word wider than a whole line
/// is split between characters.
pub(crate) fn wrap(fonts: &GlyphFonts, spans: &[Span], scale: Scale, max_width: f32) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current = Line::default();

    for span in spans {
        let (bold, italic) = (span.is_bold(), span.is_italic());
        let font = fonts.face(bold, italic);
        let color = color_to_rgb(span.color().unwrap_or(INK));
        let fragment = |text: &str| Fragment {
            text: text.to_string(),
            bold,
            italic,
            color,
            width: text_width(font, scale, text),
        };

        for (index, segment) in span.text().split('\n').enumerate() {
            if index > 0 {
                finish_line(&mut lines, &mut current, fonts, scale);
            }

            for word in segment.split_inclusive(' ') {
                let mut word = if current.is_empty() { word.trim_start() } else { word };
                if word.is_empty() {
                    continue;
                }

                let visible = text_width(font, scale, word.trim_end());
                if !current.is_empty() && current.width + visible > max_width {
                    finish_line(&mut lines, &mut current, fonts, scale);
                    word = word.trim_start();
                }

                if visible <= max_width {
                    current.push(fonts, scale, fragment(word));
                    continue;
                }

                let mut chunk = String::new();
                for ch in word.chars() {
                    chunk.push(ch);
                    if chunk.chars().count() > 1
                        && current.width + text_width(font, scale, &chunk) > max_width
                    {
                        chunk.pop();
                        current.push(fonts, scale, fragment(&chunk));
                        finish_line(&mut lines, &mut current, fonts, scale);
                        chunk = ch.to_string();
                    }
                }
                if !chunk.is_empty() {
                    current.push(fonts, scale, fragment(&chunk));
                }
            }
        }
    }

    if !current.is_empty() {
        finish_line(&mut lines, &mut current, fonts, scale);
    }
    lines
}

fn finish_line(lines: &mut Vec<Line>, current: &mut Line, fonts: &GlyphFonts, scale: Scale) {
    let mut line = std::mem::take(current);
    line.trim_end(fonts, scale);
    lines.push(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{default_fonts_available, FontSet};

    fn fonts() -> Option<GlyphFonts> {
        if !default_fonts_available() {
            eprintln!("Skipping text layout test because bundled fonts are missing");
            return None;
        }
        Some(
            FontSet::load_default()
                .and_then(|set| set.glyph_fonts())
                .expect("load glyph fonts"),
        )
    }

    #[test]
    fn wraps_at_word_boundaries() {
        let Some(fonts) = fonts() else { return };
        let scale = Scale::uniform(20.0);
        let spans = vec![Span::new("burn the dried leaves at dusk")];
        let max = text_width(fonts.face(false, false), scale, "burn the dried") + 1.0;

        let lines = wrap(&fonts, &spans, scale, max);

        assert!(lines.len() > 1);
        assert_eq!(lines[0].text(), "burn the dried");
        for line in &lines {
            assert!(line.width <= max + 0.5, "{:?} exceeds {}", line.text(), max);
            assert!(!line.text().ends_with(' '));
        }
    }

    #[test]
    fn newlines_force_breaks_and_keep_blank_lines() {
        let Some(fonts) = fonts() else { return };
        let spans = vec![Span::new("first\n\nthird")];
        let lines = wrap(&fonts, &spans, Scale::uniform(20.0), 10_000.0);
        let texts: Vec<_> = lines.iter().map(Line::text).collect();
        assert_eq!(texts, vec!["first", "", "third"]);
    }

    #[test]
    fn long_words_are_split_between_characters() {
        let Some(fonts) = fonts() else { return };
        let scale = Scale::uniform(20.0);
        let url = "https://example.org/a/very/long/path/without/any/spaces/at/all";
        let max = text_width(fonts.face(false, false), scale, "https://example");

        let lines = wrap(&fonts, &[Span::new(url)], scale, max);

        assert!(lines.len() > 2);
        let joined: String = lines.iter().map(Line::text).collect();
        assert_eq!(joined, url);
    }

    #[test]
    fn styled_spans_share_a_line() {
        let Some(fonts) = fonts() else { return };
        let spans = vec![Span::new("Element: ").bold(), Span::new("Fire")];
        let lines = wrap(&fonts, &spans, Scale::uniform(20.0), 10_000.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].fragments.len(), 2);
        assert!(lines[0].fragments[0].bold);
        assert_eq!(lines[0].text(), "Element: Fire");
    }
}
