//! Page templates: self-contained descriptions of one page's content.
//!
//! A [`PageLayout`] is the hand-off between the templates and the rasterizer.  It carries the
//! page geometry, an optional running header and footer, and a list of [`Block`]s expressed in
//! physical units (points for text, millimetres for images and spacing).  Layouts never refer to
//! any rendering backend, so they can be inspected in tests without fonts.

use genpdf::style::Color;

use crate::config::PageGeometry;
use crate::model::{spells_for, FavoriteRecord, Spell};
use crate::richtext::{self, Span, ARCANE_PURPLE, HERB_GREEN, INK, MUTED};

const TITLE_SIZE_PT: f64 = 28.0;
const CHAPTER_SIZE_PT: f64 = 32.0;
const TOC_TITLE_SIZE_PT: f64 = 22.0;
const TOC_ENTRY_SIZE_PT: f64 = 13.0;
const TOC_ROWS_PER_COLUMN: usize = 26;
const TOC_MAX_COLUMNS: usize = 4;
const HERB_NAME_SIZE_PT: f64 = 24.0;
const SCIENTIFIC_NAME_SIZE_PT: f64 = 12.0;
const BODY_SIZE_PT: f64 = 10.0;
const SPELL_NAME_SIZE_PT: f64 = 11.0;

/// Point size of section headings.
pub const HEADING_SIZE_PT: f64 = 11.0;
/// Point size of the running header and footer.
pub const MARGINAL_SIZE_PT: f64 = 8.0;

const HERB_IMAGE_MM: f64 = 55.0;
const SECTION_GAP_MM: f64 = 3.0;

/// Horizontal placement of a block within the content width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HorizontalAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical placement of the block stack within the content height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerticalAlignment {
    #[default]
    Top,
    Center,
}

/// The four page kinds a report is made of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKind {
    Title,
    TableOfContents,
    Chapter,
    Detail,
}

/// A wrapped paragraph of styled spans.  Embedded `\n` characters force line breaks.
#[derive(Clone, Debug, PartialEq)]
pub struct RichParagraph {
    spans: Vec<Span>,
    alignment: HorizontalAlignment,
    size_pt: f64,
}

impl RichParagraph {
    /// Creates a left aligned body-size paragraph from the provided spans.
    pub fn new(spans: impl Into<Vec<Span>>) -> Self {
        Self {
            spans: spans.into(),
            alignment: HorizontalAlignment::Left,
            size_pt: BODY_SIZE_PT,
        }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn alignment(&self) -> HorizontalAlignment {
        self.alignment
    }

    pub fn size_pt(&self) -> f64 {
        self.size_pt
    }

    pub fn with_alignment(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_size(mut self, size_pt: f64) -> Self {
        self.size_pt = size_pt;
        self
    }
}

/// An image drawn into a fixed box, cropped to fill it.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBlock {
    reference: String,
    width_mm: f64,
    height_mm: f64,
    alignment: HorizontalAlignment,
}

impl ImageBlock {
    pub fn new(reference: impl Into<String>, width_mm: f64, height_mm: f64) -> Self {
        Self {
            reference: reference.into(),
            width_mm,
            height_mm,
            alignment: HorizontalAlignment::Center,
        }
    }

    /// Opaque reference resolved by an [`AssetSource`](crate::assets::AssetSource).
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn width_mm(&self) -> f64 {
        self.width_mm
    }

    pub fn height_mm(&self) -> f64 {
        self.height_mm
    }

    pub fn alignment(&self) -> HorizontalAlignment {
        self.alignment
    }

    pub fn with_alignment(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment = alignment;
        self
    }
}

/// A table of contents row: label on the left, value on the right, joined by dots.
#[derive(Clone, Debug, PartialEq)]
pub struct LeaderLine {
    label: String,
    value: String,
}

impl LeaderLine {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Leader rows filled top to bottom, then left to right across columns.
///
/// The rasterizer shrinks the text when the rows still do not fit the remaining page height, so
/// every row is always drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct LeaderGrid {
    lines: Vec<LeaderLine>,
    columns: usize,
    size_pt: f64,
}

impl LeaderGrid {
    pub fn new(lines: Vec<LeaderLine>, columns: usize) -> Self {
        Self {
            lines,
            columns: columns.max(1),
            size_pt: TOC_ENTRY_SIZE_PT,
        }
    }

    pub fn lines(&self) -> &[LeaderLine] {
        &self.lines
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Largest size the rows are drawn at.
    pub fn size_pt(&self) -> f64 {
        self.size_pt
    }

    pub fn rows_per_column(&self) -> usize {
        self.lines.len().div_ceil(self.columns)
    }

    pub fn with_size(mut self, size_pt: f64) -> Self {
        self.size_pt = size_pt;
        self
    }
}

/// Individual content blocks, stacked top to bottom.
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Paragraph(RichParagraph),
    /// Section heading followed by a thin rule.
    Heading(String),
    Image(ImageBlock),
    Leaders(LeaderGrid),
    /// Vertical gap in millimetres.
    Spacer(f64),
}

impl Block {
    /// Convenience helper for building a paragraph block.
    pub fn paragraph(spans: impl Into<Vec<Span>>) -> Self {
        Self::Paragraph(RichParagraph::new(spans))
    }

    /// Plain text of the block, used for diagnostics and tests.
    pub fn text(&self) -> String {
        match self {
            Self::Paragraph(paragraph) => richtext::plain_text(paragraph.spans()),
            Self::Heading(title) => title.clone(),
            Self::Image(image) => format!("[image {}]", image.reference()),
            Self::Leaders(grid) => grid
                .lines()
                .iter()
                .map(|line| format!("{} .... {}", line.label(), line.value()))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Spacer(_) => String::new(),
        }
    }
}

/// One page's complete content, ready for rasterization.
#[derive(Clone, Debug, PartialEq)]
pub struct PageLayout {
    kind: PageKind,
    geometry: PageGeometry,
    header: Option<String>,
    footer: Option<String>,
    vertical: VerticalAlignment,
    blocks: Vec<Block>,
}

impl PageLayout {
    pub fn new(kind: PageKind, geometry: PageGeometry) -> Self {
        Self {
            kind,
            geometry,
            header: None,
            footer: None,
            vertical: VerticalAlignment::Top,
            blocks: Vec::new(),
        }
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    pub fn footer(&self) -> Option<&str> {
        self.footer.as_deref()
    }

    pub fn vertical_alignment(&self) -> VerticalAlignment {
        self.vertical
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn with_header(mut self, header: impl Into<Option<String>>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_footer(mut self, footer: impl Into<Option<String>>) -> Self {
        self.footer = footer.into();
        self
    }

    pub fn with_vertical_alignment(mut self, vertical: VerticalAlignment) -> Self {
        self.vertical = vertical;
        self
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn with_blocks<I>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = Block>,
    {
        self.blocks.extend(blocks);
        self
    }

    /// Every image reference the page needs before it can be captured.
    pub fn image_references(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Image(image) => Some(image.reference()),
                _ => None,
            })
            .collect()
    }

    /// Section headings in order of appearance.
    pub fn headings(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Heading(title) => Some(title.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All text on the page, one block per line.
    pub fn text(&self) -> String {
        let mut lines = Vec::new();
        lines.extend(self.header.clone());
        lines.extend(self.blocks.iter().map(Block::text).filter(|t| !t.is_empty()));
        lines.extend(self.footer.clone());
        lines.join("\n")
    }
}

/// A table of contents entry: a chapter and the physical page it starts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    pub category: String,
    pub page: usize,
}

impl TocEntry {
    pub fn new(category: impl Into<String>, page: usize) -> Self {
        Self {
            category: category.into(),
            page,
        }
    }
}

/// Whether a detail page stands alone or sits inside a full report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailMode {
    /// Exported on its own: no running header and no page footer.
    Standalone,
    /// Part of a report: header with the report title and a numbered footer.
    Report { page_number: usize },
}

/// Builds the layouts of every page kind for one report.
#[derive(Clone, Debug)]
pub struct PageTemplates {
    title: String,
    geometry: PageGeometry,
}

impl PageTemplates {
    pub fn new(title: impl Into<String>, geometry: PageGeometry) -> Self {
        Self {
            title: title.into(),
            geometry,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// The report title, centered on an otherwise empty page.
    pub fn title_page(&self) -> PageLayout {
        PageLayout::new(PageKind::Title, self.geometry)
            .with_vertical_alignment(VerticalAlignment::Center)
            .with_block(centered(
                Span::new(self.title.clone()).bold().colored(ARCANE_PURPLE),
                TITLE_SIZE_PT,
            ))
    }

    /// A chapter divider showing the category name in capitals.
    pub fn chapter_page(&self, category: &str) -> PageLayout {
        PageLayout::new(PageKind::Chapter, self.geometry)
            .with_vertical_alignment(VerticalAlignment::Center)
            .with_block(centered(
                Span::new(category.to_uppercase())
                    .bold()
                    .colored(ARCANE_PURPLE),
                CHAPTER_SIZE_PT,
            ))
    }

    /// The table of contents; an empty entry list yields just the heading.
    ///
    /// Long lists spread over up to four columns with smaller text, so the whole table stays on
    /// its single reserved page.
    pub fn toc_page(&self, entries: &[TocEntry]) -> PageLayout {
        let page = PageLayout::new(PageKind::TableOfContents, self.geometry)
            .with_block(centered(
                Span::new("Table of Contents").bold().colored(ARCANE_PURPLE),
                TOC_TITLE_SIZE_PT,
            ))
            .with_block(Block::Spacer(8.0));
        if entries.is_empty() {
            return page;
        }

        let columns = entries
            .len()
            .div_ceil(TOC_ROWS_PER_COLUMN)
            .clamp(1, TOC_MAX_COLUMNS);
        let lines = entries
            .iter()
            .map(|entry| LeaderLine::new(&entry.category, entry.page.to_string()))
            .collect();
        let size_pt = TOC_ENTRY_SIZE_PT - 2.0 * (columns - 1) as f64;
        page.with_block(Block::Leaders(
            LeaderGrid::new(lines, columns).with_size(size_pt),
        ))
    }

    /// One herb's full record.
    ///
    /// Optional parts of the record (deities, oil, essences, resources, spells) produce no
    /// heading at all when absent.
    pub fn detail_page(
        &self,
        favorite: &FavoriteRecord,
        spells: &[Spell],
        mode: DetailMode,
    ) -> PageLayout {
        let herb = &favorite.herb;
        let mut page = PageLayout::new(PageKind::Detail, self.geometry);

        if let DetailMode::Report { page_number } = mode {
            page = page
                .with_header(Some(self.title.clone()))
                .with_footer(Some(format!("Page {}", page_number)));
        }

        page = page
            .with_block(Block::Paragraph(
                RichParagraph::new(vec![Span::new(herb.name.clone())
                    .bold()
                    .colored(HERB_GREEN)])
                .with_size(HERB_NAME_SIZE_PT),
            ))
            .with_block(Block::Paragraph(
                RichParagraph::new(vec![Span::new(herb.scientific_name.clone())
                    .italic()
                    .colored(MUTED)])
                .with_size(SCIENTIFIC_NAME_SIZE_PT),
            ))
            .with_block(Block::Spacer(SECTION_GAP_MM))
            .with_block(Block::Image(ImageBlock::new(
                favorite.image.clone(),
                HERB_IMAGE_MM,
                HERB_IMAGE_MM,
            )));

        page = section(page, "Magical Properties");
        page = page.with_block(body(herb.magical_properties.join(", ")));

        page = section(page, "Associations");
        page = page.with_block(Block::paragraph(vec![
            label("Element: "),
            Span::new(herb.elemental_association.clone()).colored(INK),
            Span::new("  |  ").colored(MUTED),
            label("Planet: "),
            Span::new(herb.planetary_association.clone()).colored(INK),
        ]));
        if let Some(deities) = herb.deities() {
            page = page.with_block(Block::paragraph(vec![
                label("Deities: "),
                Span::new(deities.join(", ")).colored(INK),
            ]));
        }

        page = section(page, "Arcane Lore");
        page = page.with_block(body(herb.lore.clone()));

        page = section(page, "Ritual Usage");
        page = page.with_block(body(herb.usage.clone()));

        if let Some(oil) = herb.oil() {
            page = section(page, "Herbal Oil");
            if !oil.lore.trim().is_empty() {
                page = page.with_block(labelled("Lore: ", &oil.lore));
            }
            if !oil.usage.trim().is_empty() {
                page = page.with_block(labelled("Usage: ", &oil.usage));
            }
        }

        if let Some(essences) = herb.essences() {
            page = section(page, "Complementary Essences");
            page = page.with_blocks(essences.iter().map(|essence| {
                labelled(&format!("\u{2022} {}: ", essence.name), &essence.purpose)
            }));
        }

        if let Some(resources) = herb.resources() {
            page = section(page, "External Resources");
            page = page.with_blocks(
                resources
                    .iter()
                    .map(|resource| labelled(&format!("{}: ", resource.source), &resource.url)),
            );
        }

        let related = spells_for(spells, &herb.name);
        if !related.is_empty() {
            page = section(page, "Associated Spells");
            for spell in related {
                page = page
                    .with_block(Block::Paragraph(
                        RichParagraph::new(vec![Span::new(spell.name.clone())
                            .bold()
                            .colored(ARCANE_PURPLE)])
                        .with_size(SPELL_NAME_SIZE_PT),
                    ))
                    .with_block(labelled("Ingredients: ", &spell.ingredients.join(", ")))
                    .with_block(body(spell.instructions.clone()));
            }
        }

        page
    }
}

fn centered(span: Span, size_pt: f64) -> Block {
    Block::Paragraph(
        RichParagraph::new(vec![span])
            .with_alignment(HorizontalAlignment::Center)
            .with_size(size_pt),
    )
}

fn section(page: PageLayout, title: &str) -> PageLayout {
    page.with_block(Block::Spacer(SECTION_GAP_MM))
        .with_block(Block::Heading(title.to_string()))
}

fn label(text: &str) -> Span {
    Span::new(text).bold().colored(MUTED)
}

fn body(text: String) -> Block {
    Block::paragraph(vec![Span::new(text).colored(INK)])
}

fn labelled(label_text: &str, value: &str) -> Block {
    Block::paragraph(vec![label(label_text), Span::new(value).colored(INK)])
}

/// Color used for headings, exposed for renderers that draw the rule underneath.
pub fn heading_color() -> Color {
    ARCANE_PURPLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::favorite;
    use crate::model::{ComplementaryEssence, HerbalOil};

    fn templates() -> PageTemplates {
        PageTemplates::new("My Esoteric Herb Grimoire", PageGeometry::A4)
    }

    #[test]
    fn chapter_page_uppercases_category() {
        let page = templates().chapter_page("Healing Herbs");
        assert_eq!(page.kind(), PageKind::Chapter);
        assert_eq!(page.text(), "HEALING HERBS");
        assert_eq!(page.vertical_alignment(), VerticalAlignment::Center);
    }

    fn leader_grid(page: &PageLayout) -> &LeaderGrid {
        page.blocks()
            .iter()
            .find_map(|block| match block {
                Block::Leaders(grid) => Some(grid),
                _ => None,
            })
            .expect("leader grid")
    }

    #[test]
    fn toc_page_lists_entries_in_order() {
        let entries = [TocEntry::new("Uncategorized", 3), TocEntry::new("Healing", 5)];
        let page = templates().toc_page(&entries);
        let grid = leader_grid(&page);
        let rows: Vec<_> = grid
            .lines()
            .iter()
            .map(|line| (line.label().to_string(), line.value().to_string()))
            .collect();
        assert_eq!(grid.columns(), 1);
        assert_eq!(
            rows,
            vec![
                ("Uncategorized".to_string(), "3".to_string()),
                ("Healing".to_string(), "5".to_string())
            ]
        );
    }

    #[test]
    fn long_toc_spreads_over_columns_with_smaller_text() {
        let entries: Vec<TocEntry> = (0..60)
            .map(|index| TocEntry::new(format!("Category {}", index), 3 + 2 * index))
            .collect();

        let page = templates().toc_page(&entries);
        let grid = leader_grid(&page);

        assert_eq!(grid.lines().len(), 60);
        assert_eq!(grid.columns(), 3);
        assert_eq!(grid.rows_per_column(), 20);
        assert!(grid.size_pt() < TOC_ENTRY_SIZE_PT);
        assert!(page.text().contains("Category 59 .... 121"));
    }

    #[test]
    fn very_long_toc_caps_the_column_count() {
        let entries: Vec<TocEntry> = (0..300)
            .map(|index| TocEntry::new(format!("C{}", index), 3 + index))
            .collect();

        let grid = leader_grid(&templates().toc_page(&entries)).clone();

        assert_eq!(grid.columns(), TOC_MAX_COLUMNS);
        assert_eq!(grid.rows_per_column(), 75);
    }

    #[test]
    fn toc_page_renders_without_entries() {
        let page = templates().toc_page(&[]);
        assert_eq!(page.text(), "Table of Contents");
    }

    #[test]
    fn detail_page_omits_absent_optional_sections() {
        let herb = favorite("Sage", None);
        let page = templates().detail_page(&herb, &[], DetailMode::Standalone);
        assert_eq!(
            page.headings(),
            vec!["Magical Properties", "Associations", "Arcane Lore", "Ritual Usage"]
        );
        assert!(!page.text().contains("Deities"));
        assert!(page.header().is_none());
        assert!(page.footer().is_none());
        assert_eq!(page.image_references(), vec![herb.image.as_str()]);
    }

    #[test]
    fn detail_page_includes_present_optional_sections() {
        let mut herb = favorite("Rosemary", None);
        herb.herb.deity_association = Some(vec!["Aphrodite".into()]);
        herb.herb.herbal_oil = Some(HerbalOil {
            lore: "Oil of remembrance".into(),
            usage: String::new(),
        });
        herb.herb.complementary_essences = Some(vec![ComplementaryEssence {
            name: "Lavender".into(),
            purpose: "Calm".into(),
        }]);
        let spells = vec![Spell {
            id: "s1".into(),
            name: "Memory Charm".into(),
            ingredients: vec!["ROSEMARY".into()],
            instructions: "Whisper\nthrice".into(),
        }];

        let page = templates().detail_page(&herb, &spells, DetailMode::Report { page_number: 4 });

        assert_eq!(
            page.headings(),
            vec![
                "Magical Properties",
                "Associations",
                "Arcane Lore",
                "Ritual Usage",
                "Herbal Oil",
                "Complementary Essences",
                "Associated Spells"
            ]
        );
        let text = page.text();
        assert!(text.contains("Deities: Aphrodite"));
        assert!(text.contains("Lore: Oil of remembrance"));
        assert!(!text.contains("Usage: \n"));
        assert!(text.contains("Whisper\nthrice"));
        assert_eq!(page.header(), Some("My Esoteric Herb Grimoire"));
        assert_eq!(page.footer(), Some("Page 4"));
    }

    #[test]
    fn empty_optional_lists_count_as_absent() {
        let mut herb = favorite("Yarrow", None);
        herb.herb.deity_association = Some(Vec::new());
        herb.herb.external_resources = Some(Vec::new());
        let page = templates().detail_page(&herb, &[], DetailMode::Standalone);
        assert!(!page.headings().contains(&"External Resources"));
        assert!(!page.text().contains("Deities"));
    }
}
