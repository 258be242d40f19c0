//! Page rasterization: turns a [`PageLayout`] into a fixed-resolution bitmap.
//!
//! Every page is captured the same way: wait for its images on a [`ReadyBarrier`], acquire an
//! off-screen surface sized to the page at the configured resolution, draw the header, blocks
//! and footer, then release the surface.  Content that does not fit the page height is clipped
//! and the page is flagged as overflowed.  Leader grids are the exception: they shrink their text
//! until every row fits.

mod surface;
mod text;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use log::{debug, warn};
use rusttype::{Font, Scale};
use tokio::sync::OnceCell;

use crate::assets::{AssetSource, ReadyBarrier, SettledAssets};
use crate::config::ReportConfig;
use crate::fonts::{FontError, FontSet, GlyphFonts};
use crate::layout::{
    heading_color, Block, HorizontalAlignment, ImageBlock, LeaderGrid, LeaderLine, PageLayout,
    VerticalAlignment, HEADING_SIZE_PT, MARGINAL_SIZE_PT,
};
use crate::richtext::{color_to_rgb, Span, INK, MUTED};

use surface::Surface;
use text::{line_metrics, text_width, wrap, Line};

const MM_PER_INCH: f32 = 25.4;
const PT_PER_INCH: f32 = 72.0;
const PARAGRAPH_GAP_MM: f32 = 1.5;
const HEADING_RULE_GAP_MM: f32 = 1.0;
const HEADING_RULE_MM: f32 = 0.3;
const HEADING_RULE_COLOR: [u8; 3] = [0xd8, 0xc8, 0xe0];
const LEADER_PITCH: f32 = 1.4;
const LEADER_GUTTER_MM: f64 = 6.0;

/// Errors raised while capturing a page.
#[derive(Debug)]
pub enum RasterError {
    /// The glyph fonts could not be loaded.
    Fonts(FontError),
    /// The page geometry maps to a zero-sized bitmap.
    EmptyPage { width: u32, height: u32 },
    /// The capture itself failed.
    Capture(String),
}

impl fmt::Display for RasterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fonts(err) => write!(f, "Failed to load page fonts: {}", err),
            Self::EmptyPage { width, height } => {
                write!(f, "Page maps to an empty {}x{} bitmap", width, height)
            }
            Self::Capture(reason) => write!(f, "Failed to capture page: {}", reason),
        }
    }
}

impl std::error::Error for RasterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fonts(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FontError> for RasterError {
    fn from(err: FontError) -> Self {
        Self::Fonts(err)
    }
}

/// A captured page bitmap.
#[derive(Clone, Debug)]
pub struct RasterPage {
    pixels: RgbImage,
    dpi: u32,
    overflowed: bool,
}

impl RasterPage {
    pub fn new(pixels: RgbImage, dpi: u32) -> Self {
        Self {
            pixels,
            dpi,
            overflowed: false,
        }
    }

    pub fn with_overflowed(mut self, overflowed: bool) -> Self {
        self.overflowed = overflowed;
        self
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn width_px(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height_px(&self) -> u32 {
        self.pixels.height()
    }

    /// Whether content had to be clipped at the bottom of the page.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }
}

/// Captures a page layout as an image.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, page: &PageLayout) -> Result<RasterPage, RasterError>;
}

/// Draws pages with `rusttype` glyphs onto RGB bitmaps.
///
/// Fonts are loaded on first use and shared by every later capture.
pub struct BitmapRasterizer {
    assets: Arc<dyn AssetSource>,
    fonts: OnceCell<Arc<GlyphFonts>>,
    dpi: u32,
    image_timeout: Duration,
}

impl BitmapRasterizer {
    pub fn new(assets: Arc<dyn AssetSource>, config: &ReportConfig) -> Self {
        Self {
            assets,
            fonts: OnceCell::new(),
            dpi: config.dpi(),
            image_timeout: config.image_timeout(),
        }
    }

    /// Uses an already loaded font set instead of the bundled fonts.
    pub fn with_fonts(mut self, fonts: &FontSet) -> Result<Self, RasterError> {
        self.fonts = OnceCell::from(Arc::new(fonts.glyph_fonts()?));
        Ok(self)
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    async fn glyph_fonts(&self) -> Result<Arc<GlyphFonts>, RasterError> {
        let fonts = self
            .fonts
            .get_or_try_init(|| async {
                let set = FontSet::load_default_async().await?;
                Ok::<_, RasterError>(Arc::new(set.glyph_fonts()?))
            })
            .await?;
        Ok(Arc::clone(fonts))
    }
}

impl fmt::Debug for BitmapRasterizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapRasterizer")
            .field("dpi", &self.dpi)
            .field("image_timeout", &self.image_timeout)
            .field("fonts_loaded", &self.fonts.initialized())
            .finish()
    }
}

#[async_trait]
impl PageRasterizer for BitmapRasterizer {
    async fn rasterize(&self, page: &PageLayout) -> Result<RasterPage, RasterError> {
        let settled = ReadyBarrier::new(self.assets.as_ref(), self.image_timeout)
            .settle(&page.image_references())
            .await;
        let fonts = self.glyph_fonts().await?;
        let layout = page.clone();
        let dpi = self.dpi;

        tokio::task::spawn_blocking(move || paint(&layout, &fonts, &settled, dpi))
            .await
            .map_err(|err| RasterError::Capture(err.to_string()))?
    }
}

/// Draws a page whose images have already settled.
fn paint(
    page: &PageLayout,
    fonts: &GlyphFonts,
    assets: &SettledAssets,
    dpi: u32,
) -> Result<RasterPage, RasterError> {
    let geometry = page.geometry();
    let px_per_mm = dpi as f32 / MM_PER_INCH;
    let width = (geometry.page_width_mm as f32 * px_per_mm).round() as u32;
    let height = (geometry.page_height_mm as f32 * px_per_mm).round() as u32;

    let surface = Surface::acquire(width, height)?;
    let margin = geometry.margin_mm as f32 * px_per_mm;
    let mut painter = Painter {
        surface,
        fonts,
        assets,
        dpi,
        left: margin,
        content_width: geometry.content_width_mm() as f32 * px_per_mm,
        top: margin,
        bottom: height as f32 - margin,
        cursor: margin,
        overflowed: false,
    };

    painter.marginals(page.header(), page.footer());

    let prepared: Vec<Prepared<'_>> = page
        .blocks()
        .iter()
        .map(|block| painter.prepare(block))
        .collect();
    if page.vertical_alignment() == VerticalAlignment::Center {
        let total: f32 = prepared.iter().map(|item| item.height).sum();
        let available = painter.bottom - painter.top;
        painter.cursor += ((available - total) / 2.0).max(0.0);
    }
    for item in &prepared {
        painter.draw(item);
    }

    if painter.overflowed {
        warn!(
            "{:?} page content is taller than the page; the overflow was clipped",
            page.kind()
        );
    }
    debug!("Captured {:?} page at {}x{} px", page.kind(), width, height);

    let overflowed = painter.overflowed;
    Ok(RasterPage::new(painter.surface.finish(), dpi).with_overflowed(overflowed))
}

/// A block with its text already wrapped and its height known.
struct Prepared<'b> {
    block: &'b Block,
    lines: Vec<Line>,
    scale: Scale,
    height: f32,
}

struct Painter<'a> {
    surface: Surface,
    fonts: &'a GlyphFonts,
    assets: &'a SettledAssets,
    dpi: u32,
    left: f32,
    content_width: f32,
    top: f32,
    bottom: f32,
    cursor: f32,
    overflowed: bool,
}

impl<'a> Painter<'a> {
    fn mm(&self, mm: f64) -> f32 {
        mm as f32 * self.dpi as f32 / MM_PER_INCH
    }

    fn scale(&self, size_pt: f64) -> Scale {
        Scale::uniform(size_pt as f32 * self.dpi as f32 / PT_PER_INCH)
    }

    fn line_height(&self, scale: Scale) -> f32 {
        line_metrics(self.fonts, scale).1
    }

    fn prepare<'b>(&self, block: &'b Block) -> Prepared<'b> {
        let (lines, scale, height) = match block {
            Block::Paragraph(paragraph) => {
                let scale = self.scale(paragraph.size_pt());
                let lines = wrap(self.fonts, paragraph.spans(), scale, self.content_width);
                let height = lines.len() as f32 * self.line_height(scale)
                    + self.mm(f64::from(PARAGRAPH_GAP_MM));
                (lines, scale, height)
            }
            Block::Heading(title) => {
                let scale = self.scale(HEADING_SIZE_PT);
                let spans = [Span::new(title.clone()).bold().colored(heading_color())];
                let lines = wrap(self.fonts, &spans, scale, self.content_width);
                let height = lines.len() as f32 * self.line_height(scale)
                    + self.mm(f64::from(HEADING_RULE_GAP_MM + HEADING_RULE_MM + PARAGRAPH_GAP_MM));
                (lines, scale, height)
            }
            Block::Image(image) => (
                Vec::new(),
                Scale::uniform(0.0),
                self.mm(image.height_mm()) + self.mm(f64::from(PARAGRAPH_GAP_MM)),
            ),
            Block::Leaders(grid) => {
                let scale = self.scale(grid.size_pt());
                let rows = grid.rows_per_column() as f32;
                (Vec::new(), scale, rows * self.line_height(scale) * LEADER_PITCH)
            }
            Block::Spacer(mm) => (Vec::new(), Scale::uniform(0.0), self.mm(*mm)),
        };
        Prepared {
            block,
            lines,
            scale,
            height,
        }
    }

    /// Reserves `height` pixels below the cursor, or marks the page overflowed.
    fn fits(&mut self, height: f32) -> bool {
        if self.overflowed {
            return false;
        }
        if self.cursor + height > self.bottom + 0.5 {
            self.overflowed = true;
            return false;
        }
        true
    }

    fn draw(&mut self, item: &Prepared<'_>) {
        match item.block {
            Block::Paragraph(paragraph) => {
                self.draw_lines(&item.lines, item.scale, paragraph.alignment());
                self.cursor += self.mm(f64::from(PARAGRAPH_GAP_MM));
            }
            Block::Heading(_) => {
                self.draw_lines(&item.lines, item.scale, HorizontalAlignment::Left);
                let gap = self.mm(f64::from(HEADING_RULE_GAP_MM));
                let rule = self.mm(f64::from(HEADING_RULE_MM)).max(1.0);
                if self.fits(gap + rule) {
                    self.surface.fill_rect(
                        self.left,
                        self.cursor + gap,
                        self.content_width,
                        rule,
                        HEADING_RULE_COLOR,
                    );
                }
                self.cursor += gap + rule + self.mm(f64::from(PARAGRAPH_GAP_MM));
            }
            Block::Image(image) => self.draw_image(image),
            Block::Leaders(grid) => self.draw_leaders(grid, item.scale),
            Block::Spacer(_) => self.cursor += item.height,
        }
    }

    fn draw_lines(&mut self, lines: &[Line], scale: Scale, alignment: HorizontalAlignment) {
        let (ascent, line_height) = line_metrics(self.fonts, scale);
        for line in lines {
            if !self.fits(line_height) {
                return;
            }
            let mut x = self.align(line.width, alignment);
            let baseline = self.cursor + ascent;
            for fragment in &line.fragments {
                let font = self.fonts.face(fragment.bold, fragment.italic);
                self.surface
                    .draw_text(font, scale, x, baseline, &fragment.text, fragment.color);
                x += fragment.width;
            }
            self.cursor += line_height;
        }
    }

    fn draw_image(&mut self, image: &ImageBlock) {
        let width = self.mm(image.width_mm()).min(self.content_width);
        let height = self.mm(image.height_mm());
        if self.fits(height) {
            let x = self.align(width, image.alignment());
            match self.assets.image(image.reference()) {
                Some(decoded) => self.surface.draw_image(decoded, x, self.cursor, width, height),
                None => self.surface.draw_placeholder(x, self.cursor, width, height),
            }
        }
        self.cursor += height + self.mm(f64::from(PARAGRAPH_GAP_MM));
    }

    /// Draws the grid at its own size, or smaller when the rows would pass the bottom margin.
    fn draw_leaders(&mut self, grid: &LeaderGrid, base: Scale) {
        let rows = grid.rows_per_column();
        if rows == 0 {
            return;
        }
        let base_pitch = self.line_height(base) * LEADER_PITCH;
        let available = (self.bottom - self.cursor).max(0.0);
        let shrink = (available / (rows as f32 * base_pitch)).min(1.0);
        if shrink <= 0.0 {
            self.overflowed = true;
            return;
        }
        if shrink < 1.0 {
            debug!(
                "Shrinking {} leader rows to {:.0}% to fit the page",
                grid.lines().len(),
                shrink * 100.0
            );
        }
        let scale = Scale::uniform(base.x * shrink);
        let pitch = base_pitch * shrink;
        if !self.fits(rows as f32 * pitch) {
            return;
        }

        let columns = grid.columns() as f32;
        let gutter = self.mm(LEADER_GUTTER_MM);
        let column_width = ((self.content_width - gutter * (columns - 1.0)) / columns).max(0.0);
        let (ascent, _) = line_metrics(self.fonts, scale);
        let top = self.cursor;

        for (index, line) in grid.lines().iter().enumerate() {
            let x = self.left + (index / rows) as f32 * (column_width + gutter);
            let baseline = top + (index % rows) as f32 * pitch + ascent;
            self.draw_leader(line, scale, x, column_width, baseline);
        }
        self.cursor = top + rows as f32 * pitch;
    }

    fn draw_leader(&mut self, line: &LeaderLine, scale: Scale, x: f32, width: f32, baseline: f32) {
        let font = self.fonts.face(false, false);
        let ink = color_to_rgb(INK);
        let spacing = scale.x / 3.0;

        let value_width = text_width(font, scale, line.value());
        let value_x = x + width - value_width;
        self.surface
            .draw_text(font, scale, value_x, baseline, line.value(), ink);

        let label = ellipsize(font, scale, line.label(), width - value_width - 2.0 * spacing);
        let label_end = x + self.surface.draw_text(font, scale, x, baseline, &label, ink);

        self.surface.draw_dots(
            label_end + spacing,
            value_x - spacing,
            baseline,
            spacing,
            color_to_rgb(MUTED),
        );
    }

    fn align(&self, width: f32, alignment: HorizontalAlignment) -> f32 {
        match alignment {
            HorizontalAlignment::Left => self.left,
            HorizontalAlignment::Center => self.left + (self.content_width - width).max(0.0) / 2.0,
            HorizontalAlignment::Right => self.left + (self.content_width - width).max(0.0),
        }
    }

    /// Header centered in the top margin, footer centered in the bottom margin.
    fn marginals(&mut self, header: Option<&str>, footer: Option<&str>) {
        let scale = self.scale(MARGINAL_SIZE_PT);
        let font = self.fonts.face(false, true);
        let muted = color_to_rgb(MUTED);
        let page_height = self.surface.height() as f32;

        if let Some(header) = header {
            let x = self.align(text_width(font, scale, header), HorizontalAlignment::Center);
            self.surface
                .draw_text(font, scale, x, self.top * 0.65, header, muted);
        }
        if let Some(footer) = footer {
            let x = self.align(text_width(font, scale, footer), HorizontalAlignment::Center);
            let baseline = self.bottom + (page_height - self.bottom) * 0.55;
            self.surface
                .draw_text(font, scale, x, baseline, footer, muted);
        }
    }
}

/// Cuts `text` down to `max_width`, ending it with an ellipsis when anything was removed.
fn ellipsize(font: &Font<'_>, scale: Scale, text: &str, max_width: f32) -> String {
    if text_width(font, scale, text) <= max_width {
        return text.to_string();
    }
    let mut kept = text.to_string();
    while kept.pop().is_some() {
        let candidate = format!("{}\u{2026}", kept.trim_end());
        if text_width(font, scale, &candidate) <= max_width {
            return candidate;
        }
    }
    String::new()
}
