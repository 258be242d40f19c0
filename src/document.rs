//! The multi-page report document: an ordered list of captured pages.
//!
//! Pages are addressed by their 1-based physical number.  A page slot can be reserved with
//! [`ReportDocument::append_placeholder`] and filled in later, which is how the table of contents
//! ends up at page 2 even though its content is only known once every chapter has been placed.

use std::fmt;

use genpdf::elements::{Image, PageBreak, Paragraph};
use genpdf::{Element as _, Margins, Scale};
use image::DynamicImage;
use log::{debug, info};

use crate::builder::{mm_from_f64, DocumentBuilder};
use crate::config::PageGeometry;
use crate::fonts::{FontError, FontSet};
use crate::raster::RasterPage;
use crate::richtext::{Span, ALERT_RED};

/// DPI `genpdf` assumes for images without explicit scaling.
const GENPDF_IMAGE_DPI: f64 = 300.0;
/// Keeps a full-page bitmap a hair inside the page so it never spills onto a new one.
const FULL_PAGE_FIT: f64 = 0.998;

/// Errors raised while editing or rendering a report document.
#[derive(Debug)]
pub enum DocumentError {
    /// The page number does not address an existing page.
    PageOutOfRange { page: usize, count: usize },
    /// A reserved page was never filled in.
    UnresolvedPlaceholder { page: usize },
    /// The document has no pages to render.
    Empty,
    /// The document fonts could not be loaded.
    Fonts(FontError),
    /// `genpdf` failed to lay out or write the document.
    Pdf(genpdf::error::Error),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageOutOfRange { page, count } => {
                write!(f, "Page {} is out of range for a {}-page document", page, count)
            }
            Self::UnresolvedPlaceholder { page } => {
                write!(f, "Page {} was reserved but never filled in", page)
            }
            Self::Empty => write!(f, "The document has no pages"),
            Self::Fonts(err) => write!(f, "Failed to load document fonts: {}", err),
            Self::Pdf(err) => write!(f, "Failed to render PDF: {}", err),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fonts(err) => Some(err),
            Self::Pdf(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FontError> for DocumentError {
    fn from(err: FontError) -> Self {
        Self::Fonts(err)
    }
}

impl From<genpdf::error::Error> for DocumentError {
    fn from(err: genpdf::error::Error) -> Self {
        Self::Pdf(err)
    }
}

/// Content of one physical page.
#[derive(Clone, Debug)]
pub enum PageSlot {
    /// Reserved, to be replaced before rendering.
    Placeholder,
    /// A captured page bitmap.
    Raster(RasterPage),
    /// A text page reporting that an item could not be rendered.
    Notice(String),
}

impl PageSlot {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }

    pub fn as_raster(&self) -> Option<&RasterPage> {
        match self {
            Self::Raster(page) => Some(page),
            _ => None,
        }
    }
}

impl From<RasterPage> for PageSlot {
    fn from(page: RasterPage) -> Self {
        Self::Raster(page)
    }
}

/// An ordered, editable list of report pages.
#[derive(Clone, Debug)]
pub struct ReportDocument {
    title: String,
    geometry: PageGeometry,
    slots: Vec<PageSlot>,
}

impl ReportDocument {
    pub fn new(title: impl Into<String>, geometry: PageGeometry) -> Self {
        Self {
            title: title.into(),
            geometry,
            slots: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub fn page_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The page at 1-based position `page`.
    pub fn page(&self, page: usize) -> Option<&PageSlot> {
        page.checked_sub(1).and_then(|index| self.slots.get(index))
    }

    pub fn slots(&self) -> &[PageSlot] {
        &self.slots
    }

    /// Appends a captured page and returns its physical page number.
    pub fn append(&mut self, page: RasterPage) -> usize {
        self.push(PageSlot::Raster(page))
    }

    /// Reserves the next page and returns its physical page number.
    pub fn append_placeholder(&mut self) -> usize {
        self.push(PageSlot::Placeholder)
    }

    /// Appends a page stating that some content could not be rendered.
    pub fn append_notice(&mut self, message: impl Into<String>) -> usize {
        self.push(PageSlot::Notice(message.into()))
    }

    fn push(&mut self, slot: PageSlot) -> usize {
        self.slots.push(slot);
        self.slots.len()
    }

    fn index(&self, page: usize) -> Result<usize, DocumentError> {
        match page.checked_sub(1) {
            Some(index) if index < self.slots.len() => Ok(index),
            _ => Err(DocumentError::PageOutOfRange {
                page,
                count: self.slots.len(),
            }),
        }
    }

    /// Replaces the content of page `page`, keeping every other page in place.
    pub fn replace(
        &mut self,
        page: usize,
        content: impl Into<PageSlot>,
    ) -> Result<(), DocumentError> {
        let index = self.index(page)?;
        self.slots[index] = content.into();
        Ok(())
    }

    /// Removes page `page`; later pages shift down by one.
    pub fn remove(&mut self, page: usize) -> Result<PageSlot, DocumentError> {
        let index = self.index(page)?;
        Ok(self.slots.remove(index))
    }

    /// Lays the pages out one per PDF page and returns the encoded document.
    pub fn render_pdf(&self, fonts: &FontSet) -> Result<Vec<u8>, DocumentError> {
        if self.slots.is_empty() {
            return Err(DocumentError::Empty);
        }
        if let Some(index) = self.slots.iter().position(PageSlot::is_placeholder) {
            return Err(DocumentError::UnresolvedPlaceholder { page: index + 1 });
        }

        let mut document = DocumentBuilder::new()
            .with_geometry(self.geometry)
            .with_title(self.title.clone())
            .build(fonts)?;

        for (index, slot) in self.slots.iter().enumerate() {
            if index > 0 {
                document.push(PageBreak::new());
            }
            match slot {
                PageSlot::Raster(page) => {
                    let factor = GENPDF_IMAGE_DPI / f64::from(page.dpi()) * FULL_PAGE_FIT;
                    let image = Image::from_dynamic_image(DynamicImage::ImageRgb8(
                        page.pixels().clone(),
                    ))?
                    .with_scale(Scale::new(factor, factor));
                    document.push(image);
                }
                PageSlot::Notice(message) => {
                    let text = Span::new(message.clone()).bold().colored(ALERT_RED);
                    document.push(
                        Paragraph::new(text).padded(Margins::all(mm_from_f64(
                            self.geometry.margin_mm,
                        ))),
                    );
                }
                PageSlot::Placeholder => {}
            }
        }

        let mut buffer = Vec::new();
        document.render(&mut buffer)?;
        debug!("Rendered {} page(s) into {} bytes", self.slots.len(), buffer.len());
        info!("Assembled \"{}\" with {} page(s)", self.title, self.slots.len());
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;

    fn blank(dpi: u32) -> RasterPage {
        RasterPage::new(RgbImage::new(4, 4), dpi)
    }

    #[test]
    fn append_returns_physical_page_numbers() {
        let mut document = ReportDocument::new("Grimoire", PageGeometry::A4);
        assert_eq!(document.append(blank(72)), 1);
        assert_eq!(document.append_placeholder(), 2);
        assert_eq!(document.append_notice("failed"), 3);
        assert_eq!(document.page_count(), 3);
        assert!(document.page(2).is_some_and(PageSlot::is_placeholder));
        assert!(document.page(0).is_none());
    }

    #[test]
    fn replace_fills_reserved_page_in_place() {
        let mut document = ReportDocument::new("Grimoire", PageGeometry::A4);
        document.append(blank(72));
        document.append_placeholder();
        document.append(blank(96));

        document.replace(2, blank(150)).expect("replace");

        assert_eq!(document.page(2).and_then(PageSlot::as_raster).map(RasterPage::dpi), Some(150));
        assert_eq!(document.page(3).and_then(PageSlot::as_raster).map(RasterPage::dpi), Some(96));
    }

    #[test]
    fn remove_shifts_later_pages() {
        let mut document = ReportDocument::new("Grimoire", PageGeometry::A4);
        document.append(blank(72));
        document.append_placeholder();
        document.append(blank(96));

        assert!(document.remove(2).expect("remove").is_placeholder());
        assert_eq!(document.page_count(), 2);
        assert_eq!(document.page(2).and_then(PageSlot::as_raster).map(RasterPage::dpi), Some(96));
    }

    #[test]
    fn render_requires_resolved_pages() {
        let fonts = FontSet::from_bytes(Vec::new(), Vec::new(), Vec::new(), Vec::new());
        let mut document = ReportDocument::new("Grimoire", PageGeometry::A4);
        assert!(matches!(document.render_pdf(&fonts), Err(DocumentError::Empty)));

        document.append(blank(72));
        document.append_placeholder();
        assert!(matches!(
            document.render_pdf(&fonts),
            Err(DocumentError::UnresolvedPlaceholder { page: 2 })
        ));
    }

    #[test]
    fn out_of_range_edits_are_rejected() {
        let mut document = ReportDocument::new("Grimoire", PageGeometry::A4);
        document.append(blank(72));
        assert!(matches!(
            document.replace(0, blank(72)),
            Err(DocumentError::PageOutOfRange { page: 0, count: 1 })
        ));
        assert!(matches!(
            document.remove(2),
            Err(DocumentError::PageOutOfRange { page: 2, count: 1 })
        ));
    }
}
