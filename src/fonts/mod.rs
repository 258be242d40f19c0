//! Font discovery and loading for both the rasterizer and the document assembler.
//!
//! The bundled Roboto faces are looked up in `GRIMOIRE_FONTS_DIR`, then next to the running
//! binary under `assets/fonts`, then under the crate's `assets/fonts`.  The raw bytes are kept in
//! a [`FontSet`] so the same files can feed `rusttype` (glyph rasterization) and `genpdf`
//! (document assembly).

use std::env;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use genpdf::fonts::{FontData, FontFamily};
use log::debug;
use rusttype::Font;

/// Name of the bundled font family.
pub const DEFAULT_FONT_FAMILY_NAME: &str = "Roboto";

/// Environment variable pointing at a directory with the bundled font files.
pub const FONTS_DIR_ENV: &str = "GRIMOIRE_FONTS_DIR";

const FONT_FILES: [&str; 4] = [
    "Roboto-Regular.ttf",
    "Roboto-Bold.ttf",
    "Roboto-Italic.ttf",
    "Roboto-BoldItalic.ttf",
];

/// Errors raised while locating or parsing font files.
#[derive(Debug)]
pub enum FontError {
    /// No candidate directory contained every required file.
    NotFound { attempts: Vec<String> },
    /// A font file could not be read.
    Io { path: PathBuf, source: io::Error },
    /// A font file could not be parsed.
    Invalid { face: &'static str },
    /// `genpdf` rejected the font data.
    Document(genpdf::error::Error),
}

impl fmt::Display for FontError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { attempts } => {
                let summary = if attempts.is_empty() {
                    "no search paths were available".to_owned()
                } else {
                    attempts.join(", ")
                };
                write!(
                    f,
                    "Unable to locate the {} font files. Checked: {}. Set {}.",
                    DEFAULT_FONT_FAMILY_NAME, summary, FONTS_DIR_ENV
                )
            }
            Self::Io { path, source } => {
                write!(f, "Failed to read font file {}: {}", path.display(), source)
            }
            Self::Invalid { face } => write!(f, "The {} font face could not be parsed", face),
            Self::Document(err) => write!(f, "Failed to register fonts with genpdf: {}", err),
        }
    }
}

impl std::error::Error for FontError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Document(err) => Some(err),
            Self::NotFound { .. } | Self::Invalid { .. } => None,
        }
    }
}

impl From<genpdf::error::Error> for FontError {
    fn from(err: genpdf::error::Error) -> Self {
        Self::Document(err)
    }
}

fn font_directory_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = env::var_os(FONTS_DIR_ENV) {
        if !path.is_empty() {
            candidates.push(PathBuf::from(path));
        }
    }

    if let Ok(current_exe) = env::current_exe() {
        if let Some(bin_dir) = current_exe.parent() {
            let candidate = bin_dir.join("assets/fonts");
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }

    let manifest_candidate = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts");
    if !candidates.contains(&manifest_candidate) {
        candidates.push(manifest_candidate);
    }

    candidates
}

fn missing_font_files(path: &Path) -> Vec<&'static str> {
    FONT_FILES
        .iter()
        .copied()
        .filter(|name| !path.join(name).is_file())
        .collect()
}

/// Returns the first candidate directory holding every required font file.
pub fn resolve_font_directory() -> Result<PathBuf, FontError> {
    let mut attempts = Vec::new();

    for candidate in font_directory_candidates() {
        if !candidate.is_dir() {
            attempts.push(format!("{} (directory missing)", candidate.display()));
            continue;
        }
        let missing = missing_font_files(&candidate);
        if missing.is_empty() {
            return Ok(candidate);
        }
        attempts.push(format!(
            "{} (missing files [{}])",
            candidate.display(),
            missing.join(", ")
        ));
    }

    Err(FontError::NotFound { attempts })
}

/// Indicates whether the bundled fonts can be found.
pub fn default_fonts_available() -> bool {
    resolve_font_directory().is_ok()
}

/// The four faces of a font family as raw bytes.
#[derive(Clone, Debug)]
pub struct FontSet {
    regular: Vec<u8>,
    bold: Vec<u8>,
    italic: Vec<u8>,
    bold_italic: Vec<u8>,
}

impl FontSet {
    /// Builds a set from in-memory font files.
    pub fn from_bytes(
        regular: Vec<u8>,
        bold: Vec<u8>,
        italic: Vec<u8>,
        bold_italic: Vec<u8>,
    ) -> Self {
        Self {
            regular,
            bold,
            italic,
            bold_italic,
        }
    }

    /// Loads the bundled family, blocking on file reads.
    pub fn load_default() -> Result<Self, FontError> {
        let directory = resolve_font_directory()?;
        let read = |name: &str| {
            let path = directory.join(name);
            std::fs::read(&path).map_err(|source| FontError::Io { path, source })
        };
        debug!("Loading {} fonts from {}", DEFAULT_FONT_FAMILY_NAME, directory.display());
        Ok(Self::from_bytes(
            read(FONT_FILES[0])?,
            read(FONT_FILES[1])?,
            read(FONT_FILES[2])?,
            read(FONT_FILES[3])?,
        ))
    }

    /// Loads the bundled family without blocking the runtime.
    pub async fn load_default_async() -> Result<Self, FontError> {
        let directory = resolve_font_directory()?;
        let read = |name: &str| {
            let path = directory.join(name);
            async move {
                tokio::fs::read(&path)
                    .await
                    .map_err(|source| FontError::Io { path, source })
            }
        };
        let family = Self::from_bytes(
            read(FONT_FILES[0]).await?,
            read(FONT_FILES[1]).await?,
            read(FONT_FILES[2]).await?,
            read(FONT_FILES[3]).await?,
        );
        debug!("Loaded {} fonts from {}", DEFAULT_FONT_FAMILY_NAME, directory.display());
        Ok(family)
    }

    /// Converts the set into a `genpdf` font family for document assembly.
    pub fn document_family(&self) -> Result<FontFamily<FontData>, FontError> {
        Ok(FontFamily {
            regular: FontData::new(self.regular.clone(), None)?,
            bold: FontData::new(self.bold.clone(), None)?,
            italic: FontData::new(self.italic.clone(), None)?,
            bold_italic: FontData::new(self.bold_italic.clone(), None)?,
        })
    }

    /// Parses the set into glyph fonts for rasterization.
    pub fn glyph_fonts(&self) -> Result<GlyphFonts, FontError> {
        let parse = |bytes: &[u8], face: &'static str| {
            Font::try_from_vec(bytes.to_vec()).ok_or(FontError::Invalid { face })
        };
        Ok(GlyphFonts {
            regular: parse(&self.regular, "regular")?,
            bold: parse(&self.bold, "bold")?,
            italic: parse(&self.italic, "italic")?,
            bold_italic: parse(&self.bold_italic, "bold italic")?,
        })
    }
}

/// Parsed faces used when drawing text onto page bitmaps.
pub struct GlyphFonts {
    regular: Font<'static>,
    bold: Font<'static>,
    italic: Font<'static>,
    bold_italic: Font<'static>,
}

impl GlyphFonts {
    /// Selects the face matching the requested emphasis.
    pub fn face(&self, bold: bool, italic: bool) -> &Font<'static> {
        match (bold, italic) {
            (false, false) => &self.regular,
            (true, false) => &self.bold,
            (false, true) => &self.italic,
            (true, true) => &self.bold_italic,
        }
    }
}

impl fmt::Debug for GlyphFonts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlyphFonts")
            .field("family", &DEFAULT_FONT_FAMILY_NAME)
            .finish()
    }
}
