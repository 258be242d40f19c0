//! The report engine: grouping, two-pass page numbering and export.
//!
//! A full report is laid out as
//!
//! 1. the title page (physical page 1),
//! 2. a reserved table of contents slot (physical page 2),
//! 3. for every non-empty chapter, a divider page followed by one detail page per herb,
//! 4. the table of contents, written into the reserved slot once every chapter's page is known.
//!
//! The table of contents lists *physical* page numbers, while detail page footers count from the
//! first page after the table of contents.  The first herb of the first chapter therefore sits
//! on physical page 4 and prints "Page 2" (its chapter divider being content page 1).
//!
//! Pages are captured strictly in document order: the running page counter depends on the size
//! of every preceding chapter.

use std::fmt;

use log::{debug, info, warn};

use crate::config::{single_page_filename, ReportConfig};
use crate::document::{DocumentError, PageSlot, ReportDocument};
use crate::fonts::FontSet;
use crate::layout::{DetailMode, PageLayout, PageTemplates, TocEntry};
use crate::model::{non_empty_chapters, CategoryList, FavoriteRecord, Spell};
use crate::raster::{PageRasterizer, RasterError};
use crate::sink::{ArtifactSink, SinkError};

#[cfg(feature = "bookmarks")]
use crate::bookmarks::{apply_chapter_bookmarks, BookmarkError};

/// Physical position of the table of contents.
pub const TOC_PAGE: usize = 2;

/// Errors surfaced by an export.
#[derive(Debug)]
pub enum ExportError {
    /// A page of a single-item export could not be captured.
    Render { item: String, source: RasterError },
    /// Editing or encoding the document failed.
    Document(DocumentError),
    /// The finished document could not be delivered.
    Sink(SinkError),
    /// The chapter outline could not be embedded.
    #[cfg(feature = "bookmarks")]
    Bookmarks(BookmarkError),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render { item, source } => write!(f, "Failed to render {}: {}", item, source),
            Self::Document(err) => write!(f, "Failed to assemble the report: {}", err),
            Self::Sink(err) => write!(f, "Failed to save the report: {}", err),
            #[cfg(feature = "bookmarks")]
            Self::Bookmarks(err) => write!(f, "Failed to add chapter bookmarks: {}", err),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Render { source, .. } => Some(source),
            Self::Document(err) => Some(err),
            Self::Sink(err) => Some(err),
            #[cfg(feature = "bookmarks")]
            Self::Bookmarks(err) => Some(err),
        }
    }
}

impl From<DocumentError> for ExportError {
    fn from(err: DocumentError) -> Self {
        Self::Document(err)
    }
}

impl From<SinkError> for ExportError {
    fn from(err: SinkError) -> Self {
        Self::Sink(err)
    }
}

#[cfg(feature = "bookmarks")]
impl From<BookmarkError> for ExportError {
    fn from(err: BookmarkError) -> Self {
        Self::Bookmarks(err)
    }
}

/// Where a herb's detail page landed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagePlacement {
    pub herb: String,
    /// Index of the page in the document, starting at 1.
    pub physical_page: usize,
    /// Number printed in the page footer.
    pub footer_page: usize,
}

/// A page that could not be captured and was replaced by a notice page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderFailure {
    pub item: String,
    pub physical_page: usize,
    pub reason: String,
}

/// A captured page whose content ran past the bottom margin and was cut off.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClippedPage {
    pub item: String,
    pub physical_page: usize,
}

/// The assembled report together with its bookkeeping.
#[derive(Debug)]
pub struct ReportOutcome {
    pub document: ReportDocument,
    /// Chapter entries as printed in the table of contents.
    pub toc: Vec<TocEntry>,
    pub placements: Vec<PagePlacement>,
    pub failures: Vec<RenderFailure>,
    /// Pages that were kept but lost content at the bottom.
    pub clipped: Vec<ClippedPage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Title,
    ReserveToc,
    Content,
    TableOfContents,
    Done,
}

/// Mutable state of one report build.
struct ReportPass<'e, R> {
    rasterizer: &'e R,
    document: ReportDocument,
    current_page: usize,
    entries: Vec<TocEntry>,
    placements: Vec<PagePlacement>,
    failures: Vec<RenderFailure>,
    clipped: Vec<ClippedPage>,
}

impl<'e, R: PageRasterizer> ReportPass<'e, R> {
    /// Captures `layout` and appends it, or appends a notice page when the capture fails.
    async fn place(&mut self, item: &str, layout: &PageLayout) -> usize {
        match self.rasterizer.rasterize(layout).await {
            Ok(page) => {
                let overflowed = page.overflowed();
                let number = self.document.append(page);
                if overflowed {
                    self.record_clipped(item, number);
                }
                debug!("Placed {} on page {}", item, number);
                number
            }
            Err(err) => {
                warn!("Failed to render {}: {}; inserting a notice page", item, err);
                let number = self
                    .document
                    .append_notice(format!("Could not render {}.\n{}", item, err));
                self.failures.push(RenderFailure {
                    item: item.to_string(),
                    physical_page: number,
                    reason: err.to_string(),
                });
                number
            }
        }
    }

    fn record_clipped(&mut self, item: &str, physical_page: usize) {
        warn!("{} on page {} did not fit and was clipped", item, physical_page);
        self.clipped.push(ClippedPage {
            item: item.to_string(),
            physical_page,
        });
    }

    fn advance(&mut self) -> usize {
        self.current_page += 1;
        self.current_page
    }
}

/// Builds and exports reports with a given rasterizer.
pub struct ReportEngine<R> {
    rasterizer: R,
    config: ReportConfig,
    templates: PageTemplates,
}

impl<R: PageRasterizer> ReportEngine<R> {
    pub fn new(rasterizer: R, config: ReportConfig) -> Self {
        let templates = PageTemplates::new(config.title(), config.geometry());
        Self {
            rasterizer,
            config,
            templates,
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    pub fn templates(&self) -> &PageTemplates {
        &self.templates
    }

    /// Lays out and captures the full report.
    ///
    /// A page that fails to capture is replaced by a notice page and recorded in
    /// [`ReportOutcome::failures`]; the rest of the report is still produced.
    pub async fn build_report(
        &self,
        favorites: &[FavoriteRecord],
        categories: &CategoryList,
        spells: &[Spell],
    ) -> Result<ReportOutcome, ExportError> {
        let chapters = non_empty_chapters(favorites, categories, self.config.category_order());
        info!(
            "Building report for {} favorite(s) in {} chapter(s)",
            favorites.len(),
            chapters.len()
        );

        let mut pass = ReportPass {
            rasterizer: &self.rasterizer,
            document: ReportDocument::new(self.config.title(), self.config.geometry()),
            current_page: 0,
            entries: Vec::new(),
            placements: Vec::new(),
            failures: Vec::new(),
            clipped: Vec::new(),
        };

        let mut stage = Stage::Title;
        while stage != Stage::Done {
            stage = match stage {
                Stage::Title => {
                    pass.place("title page", &self.templates.title_page()).await;
                    Stage::ReserveToc
                }
                Stage::ReserveToc => {
                    let reserved = pass.document.append_placeholder();
                    debug_assert_eq!(reserved, TOC_PAGE);
                    pass.current_page = TOC_PAGE;
                    Stage::Content
                }
                Stage::Content => {
                    for chapter in &chapters {
                        let chapter_page = pass.advance();
                        let layout = self.templates.chapter_page(chapter.title());
                        let placed = pass
                            .place(&format!("chapter \"{}\"", chapter.title()), &layout)
                            .await;
                        debug_assert_eq!(placed, chapter_page);
                        pass.entries.push(TocEntry::new(chapter.title(), chapter_page));

                        for favorite in chapter.records() {
                            let physical_page = pass.advance();
                            let footer_page = physical_page - TOC_PAGE;
                            let layout = self.templates.detail_page(
                                favorite,
                                spells,
                                DetailMode::Report {
                                    page_number: footer_page,
                                },
                            );
                            let placed = pass
                                .place(&format!("\"{}\"", favorite.name()), &layout)
                                .await;
                            debug_assert_eq!(placed, physical_page);
                            pass.placements.push(PagePlacement {
                                herb: favorite.name().to_string(),
                                physical_page,
                                footer_page,
                            });
                        }
                    }
                    Stage::TableOfContents
                }
                Stage::TableOfContents => {
                    if pass.entries.is_empty() {
                        pass.document.remove(TOC_PAGE)?;
                        debug!("No chapters; dropped the table of contents");
                    } else {
                        let layout = self.templates.toc_page(&pass.entries);
                        match self.rasterizer.rasterize(&layout).await {
                            Ok(page) => {
                                let overflowed = page.overflowed();
                                pass.document.replace(TOC_PAGE, page)?;
                                if overflowed {
                                    pass.record_clipped("table of contents", TOC_PAGE);
                                }
                            }
                            Err(err) => {
                                warn!("Failed to render the table of contents: {}", err);
                                pass.document.replace(
                                    TOC_PAGE,
                                    PageSlot::Notice(format!(
                                        "Could not render the table of contents.\n{}",
                                        err
                                    )),
                                )?;
                                pass.failures.push(RenderFailure {
                                    item: "table of contents".to_string(),
                                    physical_page: TOC_PAGE,
                                    reason: err.to_string(),
                                });
                            }
                        }
                    }
                    Stage::Done
                }
                Stage::Done => Stage::Done,
            };
        }

        info!(
            "Report laid out on {} page(s), {} failure(s), {} clipped",
            pass.document.page_count(),
            pass.failures.len(),
            pass.clipped.len()
        );
        Ok(ReportOutcome {
            document: pass.document,
            toc: pass.entries,
            placements: pass.placements,
            failures: pass.failures,
            clipped: pass.clipped,
        })
    }

    /// Builds the full report, encodes it and hands it to `sink` under the configured file name.
    pub async fn export_report(
        &self,
        favorites: &[FavoriteRecord],
        categories: &CategoryList,
        spells: &[Spell],
        fonts: &FontSet,
        sink: &dyn ArtifactSink,
    ) -> Result<ReportOutcome, ExportError> {
        let outcome = self.build_report(favorites, categories, spells).await?;
        let bytes = outcome.document.render_pdf(fonts)?;
        #[cfg(feature = "bookmarks")]
        let bytes = apply_chapter_bookmarks(&bytes, &outcome.toc)?;

        sink.save_document(&bytes, self.config.filename()).await?;
        info!("Exported {}", self.config.filename());
        Ok(outcome)
    }

    /// Captures one standalone detail page.  Any capture failure is returned to the caller.
    pub async fn build_single(
        &self,
        favorite: &FavoriteRecord,
        spells: &[Spell],
    ) -> Result<ReportDocument, ExportError> {
        let layout = self
            .templates
            .detail_page(favorite, spells, DetailMode::Standalone);
        let page = self
            .rasterizer
            .rasterize(&layout)
            .await
            .map_err(|source| ExportError::Render {
                item: favorite.name().to_string(),
                source,
            })?;
        if page.overflowed() {
            warn!("\"{}\" did not fit on its page and was clipped", favorite.name());
        }

        let mut document = ReportDocument::new(favorite.name(), self.config.geometry());
        document.append(page);
        Ok(document)
    }

    /// Exports one herb on its own page and returns the file name it was saved under.
    pub async fn export_single(
        &self,
        favorite: &FavoriteRecord,
        spells: &[Spell],
        fonts: &FontSet,
        sink: &dyn ArtifactSink,
    ) -> Result<String, ExportError> {
        let document = self.build_single(favorite, spells).await?;
        let bytes = document.render_pdf(fonts)?;
        let filename = single_page_filename(favorite.name());
        sink.save_document(&bytes, &filename).await?;
        info!("Exported {}", filename);
        Ok(filename)
    }
}
