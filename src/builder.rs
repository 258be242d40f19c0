//! `genpdf` document construction for assembled reports.

use genpdf::error::Error;
use genpdf::style;
use genpdf::{self, Mm, PageDecorator, Size};
use log::trace;

use crate::config::PageGeometry;
use crate::fonts::{FontError, FontSet};

/// Converts millimetres expressed as `f64` into a `genpdf` length.
pub(crate) fn mm_from_f64(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

/// Builder for `genpdf::Document` instances sized to the report pages.
#[derive(Default)]
pub struct DocumentBuilder {
    paper_size: Option<Size>,
    title: Option<String>,
}

impl DocumentBuilder {
    /// Creates a new builder instance with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the paper size used for newly created documents.
    pub fn with_paper_size(mut self, paper_size: impl Into<Size>) -> Self {
        self.paper_size = Some(paper_size.into());
        self
    }

    /// Uses the page dimensions of `geometry`.
    ///
    /// Documents carry no margins of their own: captured pages already include theirs.
    pub fn with_geometry(self, geometry: PageGeometry) -> Self {
        self.with_paper_size(Size::new(
            mm_from_f64(geometry.page_width_mm),
            mm_from_f64(geometry.page_height_mm),
        ))
    }

    /// Sets the document title stored in the PDF metadata.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builds a fully configured `genpdf::Document` instance.
    pub fn build(self, fonts: &FontSet) -> Result<genpdf::Document, FontError> {
        let mut document = genpdf::Document::new(fonts.document_family()?);

        if let Some(paper_size) = self.paper_size {
            document.set_paper_size(paper_size);
        }
        if let Some(title) = self.title {
            document.set_title(title);
        }
        document.set_page_decorator(ReportPageDecorator::default());

        Ok(document)
    }
}

/// Keeps track of the physical page being laid out.
#[derive(Default)]
struct ReportPageDecorator {
    page: usize,
}

impl PageDecorator for ReportPageDecorator {
    fn decorate_page<'a>(
        &mut self,
        _context: &genpdf::Context,
        area: genpdf::render::Area<'a>,
        _style: style::Style,
    ) -> Result<genpdf::render::Area<'a>, Error> {
        self.page += 1;
        trace!("Laying out PDF page {}", self.page);
        Ok(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_conversion_preserves_value() {
        let mm: printpdf::Mm = mm_from_f64(12.5).into();
        assert!((mm.0 - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn geometry_sets_paper_size() {
        let builder = DocumentBuilder::new().with_geometry(PageGeometry::A4);
        let size = builder.paper_size.expect("paper size");
        assert_eq!(size, Size::new(mm_from_f64(210.0), mm_from_f64(297.0)));
    }
}
