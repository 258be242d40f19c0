//! Styled text runs shared by page layouts, the rasterizer and the document assembler.
//!
//! Colors are [`genpdf`][genpdf] colors so notice pages can be printed as text directly; the
//! rasterizer converts them to RGB with [`color_to_rgb`].
//!
//! [genpdf]: https://docs.rs/genpdf/

use genpdf::style::{Color, Style, StyledString};

/// Ink used for body text.
pub const INK: Color = Color::Rgb(0x33, 0x33, 0x33);
/// Green used for herb names.
pub const HERB_GREEN: Color = Color::Rgb(0x2d, 0x6a, 0x4f);
/// Purple used for section headings and chapter titles.
pub const ARCANE_PURPLE: Color = Color::Rgb(0x4a, 0x0e, 0x6c);
/// Grey used for secondary text such as scientific names and footers.
pub const MUTED: Color = Color::Rgb(0x66, 0x66, 0x66);
pub const ALERT_RED: Color = Color::Rgb(0xc0, 0x1c, 0x1c);

/// A run of text drawn with a single face and color.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    text: String,
    bold: bool,
    italic: bool,
    color: Option<Color>,
}

impl Span {
    /// An unstyled run; the renderer falls back to [`INK`] when no color is set.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_bold(&self) -> bool {
        self.bold
    }

    pub fn is_italic(&self) -> bool {
        self.italic
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn colored(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

impl From<Span> for StyledString {
    fn from(span: Span) -> Self {
        let mut style = Style::new();
        if let Some(color) = span.color {
            style.set_color(color);
        }
        if span.bold {
            style.set_bold();
        }
        if span.italic {
            style.set_italic();
        }
        StyledString::new(span.text, style)
    }
}

/// Maps a `genpdf` color onto 8-bit RGB channels for bitmap output.
pub fn color_to_rgb(color: Color) -> [u8; 3] {
    match color {
        Color::Rgb(r, g, b) => [r, g, b],
        Color::Greyscale(value) => [value, value, value],
        Color::Cmyk(c, m, y, k) => {
            let key = 1.0 - f32::from(k) / 255.0;
            let channel =
                |value: u8| (255.0 * (1.0 - f32::from(value) / 255.0) * key).round() as u8;
            [channel(c), channel(m), channel(y)]
        }
    }
}

/// The unstyled text of a run sequence.
pub fn plain_text<'a, I>(spans: I) -> String
where
    I: IntoIterator<Item = &'a Span>,
{
    spans.into_iter().map(Span::text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styled_string_keeps_emphasis_and_color() {
        let styled = StyledString::from(Span::new("Sage").bold().italic().colored(HERB_GREEN));
        assert_eq!(styled.s, "Sage");
        assert!(styled.style.is_bold());
        assert!(styled.style.is_italic());
        assert_eq!(styled.style.color(), Some(HERB_GREEN));
    }

    #[test]
    fn colors_map_to_rgb_channels() {
        assert_eq!(color_to_rgb(ARCANE_PURPLE), [0x4a, 0x0e, 0x6c]);
        assert_eq!(color_to_rgb(Color::Greyscale(200)), [200, 200, 200]);
        assert_eq!(color_to_rgb(Color::Cmyk(0, 0, 0, 0)), [255, 255, 255]);
        assert_eq!(color_to_rgb(Color::Cmyk(0, 0, 0, 255)), [0, 0, 0]);
    }

    #[test]
    fn plain_text_drops_styling() {
        let spans = vec![Span::new("Element: ").bold().colored(MUTED), Span::new("Fire")];
        assert_eq!(plain_text(&spans), "Element: Fire");
    }
}
