use std::sync::Mutex;

use async_trait::async_trait;
use herb_grimoire::config::ReportConfig;
use herb_grimoire::document::PageSlot;
use herb_grimoire::fonts::FontSet;
use herb_grimoire::layout::{PageKind, PageLayout, TocEntry};
use herb_grimoire::model::{CategoryList, FavoriteRecord, HerbRecord, Spell};
use herb_grimoire::pagination::{ClippedPage, ExportError, ReportEngine, TOC_PAGE};
use herb_grimoire::raster::{PageRasterizer, RasterError, RasterPage};
use herb_grimoire::sink::DirectorySink;
use image::RgbImage;

#[derive(Clone, Debug)]
struct Captured {
    kind: PageKind,
    footer: Option<String>,
    text: String,
}

/// Records every layout it is asked to capture, in call order.
#[derive(Default)]
struct RecordingRasterizer {
    fail_kind: Option<PageKind>,
    fail_text: Option<&'static str>,
    clip_text: Option<&'static str>,
    captured: Mutex<Vec<Captured>>,
}

impl RecordingRasterizer {
    fn failing_on_kind(kind: PageKind) -> Self {
        Self {
            fail_kind: Some(kind),
            ..Self::default()
        }
    }

    fn failing_on_text(text: &'static str) -> Self {
        Self {
            fail_text: Some(text),
            ..Self::default()
        }
    }

    fn clipping_on_text(text: &'static str) -> Self {
        Self {
            clip_text: Some(text),
            ..Self::default()
        }
    }

    fn captured(&self) -> Vec<Captured> {
        self.captured.lock().expect("lock").clone()
    }
}

#[async_trait]
impl PageRasterizer for RecordingRasterizer {
    async fn rasterize(&self, page: &PageLayout) -> Result<RasterPage, RasterError> {
        let text = page.text();
        self.captured.lock().expect("lock").push(Captured {
            kind: page.kind(),
            footer: page.footer().map(str::to_string),
            text: text.clone(),
        });

        let kind_fails = self.fail_kind == Some(page.kind());
        let text_fails = self.fail_text.is_some_and(|needle| text.contains(needle));
        if kind_fails || text_fails {
            return Err(RasterError::Capture("surface lost".to_string()));
        }
        let clipped = self.clip_text.is_some_and(|needle| text.contains(needle));
        Ok(RasterPage::new(RgbImage::new(2, 3), 72).with_overflowed(clipped))
    }
}

fn herb(name: &str) -> HerbRecord {
    HerbRecord {
        name: name.to_string(),
        scientific_name: format!("{} vulgaris", name),
        magical_properties: vec!["Protection".to_string()],
        elemental_association: "Earth".to_string(),
        planetary_association: "Saturn".to_string(),
        deity_association: None,
        lore: format!("Old tales about {}.", name),
        usage: format!("Scatter {} at the threshold.", name),
        herbal_oil: None,
        complementary_essences: None,
        external_resources: None,
    }
}

fn favorite(name: &str, category: Option<&str>) -> FavoriteRecord {
    FavoriteRecord::new(herb(name), format!("{}.png", name))
        .with_category(category.map(str::to_string))
}

fn engine(rasterizer: RecordingRasterizer) -> ReportEngine<RecordingRasterizer> {
    ReportEngine::new(rasterizer, ReportConfig::default())
}

fn footer_of(captured: &[Captured], herb_name: &str) -> Option<String> {
    captured
        .iter()
        .find(|page| page.kind == PageKind::Detail && page.text.contains(herb_name))
        .and_then(|page| page.footer.clone())
}

#[tokio::test]
async fn groups_uncategorized_first_and_numbers_pages() {
    let engine = engine(RecordingRasterizer::default());
    let categories = CategoryList::from_names(["Healing"]);
    let favorites = vec![
        favorite("Chamomile", Some("Healing")),
        favorite("Basil", None),
        favorite("Angelica", Some("Healing")),
    ];

    let outcome = engine
        .build_report(&favorites, &categories, &[])
        .await
        .expect("report");

    assert_eq!(
        outcome.toc,
        vec![TocEntry::new("Uncategorized", 3), TocEntry::new("Healing", 5)]
    );
    assert_eq!(outcome.document.page_count(), 7);
    assert!(outcome.failures.is_empty());

    let order: Vec<(String, usize, usize)> = outcome
        .placements
        .iter()
        .map(|p| (p.herb.clone(), p.physical_page, p.footer_page))
        .collect();
    assert_eq!(
        order,
        vec![
            ("Basil".to_string(), 4, 2),
            ("Angelica".to_string(), 6, 4),
            ("Chamomile".to_string(), 7, 5),
        ]
    );

    let captured = engine.rasterizer().captured();
    assert_eq!(captured[0].kind, PageKind::Title);
    assert_eq!(captured.last().map(|page| page.kind), Some(PageKind::TableOfContents));
    assert_eq!(footer_of(&captured, "Basil").as_deref(), Some("Page 2"));
}

#[tokio::test]
async fn footer_counts_every_preceding_content_page() {
    let engine = engine(RecordingRasterizer::default());
    let categories = CategoryList::from_names(["Healing", "Love", "Protection"]);
    let favorites = vec![
        favorite("Arnica", Some("Healing")),
        favorite("Borage", Some("Healing")),
        favorite("Calendula", Some("Healing")),
        favorite("Damiana", Some("Love")),
        favorite("Elder", Some("Love")),
        favorite("Fennel", Some("Protection")),
    ];

    let outcome = engine
        .build_report(&favorites, &categories, &[])
        .await
        .expect("report");

    // Healing divider + 3 herbs + Love divider + 2 herbs + Protection divider.
    let preceding_content_pages = 8;
    let fennel = outcome
        .placements
        .iter()
        .find(|p| p.herb == "Fennel")
        .expect("fennel placed");
    assert_eq!(fennel.footer_page, preceding_content_pages + 1);
    assert_eq!(fennel.footer_page, fennel.physical_page - TOC_PAGE);
    assert_eq!(
        footer_of(&engine.rasterizer().captured(), "Fennel").as_deref(),
        Some("Page 9")
    );
}

#[tokio::test]
async fn toc_pages_match_where_chapters_were_placed() {
    let shapes: &[&[usize]] = &[&[1], &[0, 2], &[3, 0, 1], &[2, 2, 2, 1], &[0, 0, 4]];

    for shape in shapes {
        let names: Vec<String> = (0..shape.len()).map(|i| format!("Category {}", i)).collect();
        let categories = CategoryList::from_names(names.iter().map(String::as_str));
        let favorites: Vec<FavoriteRecord> = shape
            .iter()
            .enumerate()
            .flat_map(|(chapter, &count)| {
                let category = format!("Category {}", chapter);
                (0..count).map(move |index| {
                    favorite(&format!("Herb {}-{}", chapter, index), Some(category.as_str()))
                })
            })
            .collect();

        let engine = engine(RecordingRasterizer::default());
        let outcome = engine
            .build_report(&favorites, &categories, &[])
            .await
            .expect("report");
        let captured = engine.rasterizer().captured();

        assert_eq!(outcome.toc.len(), shape.iter().filter(|&&count| count > 0).count());
        for entry in &outcome.toc {
            // Capture order equals physical order, except the table of contents comes last.
            let page = &captured[entry.page - TOC_PAGE];
            assert_eq!(page.kind, PageKind::Chapter, "shape {:?}", shape);
            assert_eq!(page.text, entry.category.to_uppercase());
        }
        let placed: usize = outcome.placements.len();
        assert_eq!(placed, favorites.len());
        assert_eq!(outcome.document.page_count(), 2 + outcome.toc.len() + placed);
    }
}

#[tokio::test]
async fn empty_collection_yields_title_page_only() {
    let engine = engine(RecordingRasterizer::default());
    let categories = CategoryList::from_names(["Healing"]);

    let outcome = engine
        .build_report(&[], &categories, &[])
        .await
        .expect("report");

    assert_eq!(outcome.document.page_count(), 1);
    assert!(outcome.toc.is_empty());
    let kinds: Vec<PageKind> = engine.rasterizer().captured().iter().map(|p| p.kind).collect();
    assert_eq!(kinds, vec![PageKind::Title]);
}

#[tokio::test]
async fn unknown_categories_fall_into_uncategorized() {
    let engine = engine(RecordingRasterizer::default());
    let categories = CategoryList::from_names(["Healing"]);
    let favorites = vec![favorite("Sage", Some("Deleted")), favorite("Rue", Some("healing"))];

    let outcome = engine
        .build_report(&favorites, &categories, &[])
        .await
        .expect("report");

    assert_eq!(
        outcome.toc,
        vec![TocEntry::new("Uncategorized", 3), TocEntry::new("Healing", 5)]
    );
}

#[tokio::test]
async fn failed_detail_page_becomes_a_notice() {
    let engine = engine(RecordingRasterizer::failing_on_text("Old tales about Basil"));
    let favorites = vec![
        favorite("Angelica", None),
        favorite("Basil", None),
        favorite("Clove", None),
    ];

    let outcome = engine
        .build_report(&favorites, &CategoryList::new(), &[])
        .await
        .expect("report");

    assert_eq!(outcome.document.page_count(), 6);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].physical_page, 5);
    match outcome.document.page(5) {
        Some(PageSlot::Notice(message)) => assert!(message.contains("\"Basil\"")),
        other => panic!("expected a notice page, got {:?}", other),
    }
    assert!(outcome.document.page(6).and_then(PageSlot::as_raster).is_some());
    let clove = outcome.placements.iter().find(|p| p.herb == "Clove").expect("clove");
    assert_eq!((clove.physical_page, clove.footer_page), (6, 4));
}

#[tokio::test]
async fn failed_toc_keeps_page_numbers_stable() {
    let engine = engine(RecordingRasterizer::failing_on_kind(PageKind::TableOfContents));
    let favorites = vec![favorite("Angelica", None)];

    let outcome = engine
        .build_report(&favorites, &CategoryList::new(), &[])
        .await
        .expect("report");

    assert_eq!(outcome.document.page_count(), 4);
    assert!(matches!(outcome.document.page(TOC_PAGE), Some(PageSlot::Notice(_))));
    assert_eq!(outcome.failures[0].item, "table of contents");
    assert_eq!(outcome.toc, vec![TocEntry::new("Uncategorized", 3)]);
}

#[tokio::test]
async fn clipped_detail_pages_are_reported() {
    let engine = engine(RecordingRasterizer::clipping_on_text("Old tales about Basil"));
    let favorites = vec![favorite("Angelica", None), favorite("Basil", None)];

    let outcome = engine
        .build_report(&favorites, &CategoryList::new(), &[])
        .await
        .expect("report");

    assert!(outcome.failures.is_empty());
    assert_eq!(
        outcome.clipped,
        vec![ClippedPage {
            item: "\"Basil\"".to_string(),
            physical_page: 5,
        }]
    );
    assert!(outcome.document.page(5).and_then(PageSlot::as_raster).is_some());
}

#[tokio::test]
async fn every_chapter_reaches_the_table_of_contents() {
    let engine = engine(RecordingRasterizer::default());
    let names: Vec<String> = (0..60).map(|i| format!("Category {:02}", i)).collect();
    let categories = CategoryList::from_names(names.iter().map(String::as_str));
    let favorites: Vec<FavoriteRecord> = names
        .iter()
        .map(|name| favorite(&format!("Herb of {}", name), Some(name.as_str())))
        .collect();

    let outcome = engine
        .build_report(&favorites, &categories, &[])
        .await
        .expect("report");

    assert_eq!(outcome.toc.len(), 60);
    assert_eq!(outcome.document.page_count(), 122);
    let captured = engine.rasterizer().captured();
    let toc = captured
        .iter()
        .find(|page| page.kind == PageKind::TableOfContents)
        .expect("toc captured");
    for entry in &outcome.toc {
        let row = format!("{} .... {}", entry.category, entry.page);
        assert!(toc.text.contains(&row), "missing {}", row);
    }
}

#[tokio::test]
async fn spells_appear_on_their_herbs_pages() {
    let engine = engine(RecordingRasterizer::default());
    let spells = vec![Spell {
        id: "spell-1".to_string(),
        name: "Hearth Ward".to_string(),
        ingredients: vec!["SAGE".to_string()],
        instructions: "Burn at dusk.".to_string(),
    }];
    let favorites = vec![favorite("Sage", None), favorite("Rue", None)];

    engine
        .build_report(&favorites, &CategoryList::new(), &spells)
        .await
        .expect("report");

    let captured = engine.rasterizer().captured();
    let sage = captured.iter().find(|p| p.text.contains("Old tales about Sage")).expect("sage");
    let rue = captured.iter().find(|p| p.text.contains("Old tales about Rue")).expect("rue");
    assert!(sage.text.contains("Hearth Ward"));
    assert!(!rue.text.contains("Hearth Ward"));
}

#[tokio::test]
async fn single_export_rethrows_capture_failures() {
    let engine = engine(RecordingRasterizer::failing_on_kind(PageKind::Detail));
    let dir = std::env::temp_dir().join(format!("herb_grimoire_single_{}", std::process::id()));
    let sink = DirectorySink::new(&dir);
    let fonts = FontSet::from_bytes(Vec::new(), Vec::new(), Vec::new(), Vec::new());

    let err = engine
        .export_single(&favorite("Sage", None), &[], &fonts, &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Render { ref item, .. } if item == "Sage"));
    assert!(!dir.join("Sage.pdf").exists());
}

#[tokio::test]
async fn single_page_has_no_header_or_footer() {
    let engine = engine(RecordingRasterizer::default());

    let document = engine
        .build_single(&favorite("Sage", Some("Healing")), &[])
        .await
        .expect("single page");

    assert_eq!(document.page_count(), 1);
    let captured = engine.rasterizer().captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].footer, None);
}
