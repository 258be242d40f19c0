//! Chapter outline for rendered reports, written with `lopdf`.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use lopdf::{dictionary, Document, Object, ObjectId};

use crate::layout::TocEntry;

#[derive(Debug)]
pub enum BookmarkError {
    /// `lopdf` could not read the rendered bytes.
    Parse(lopdf::Error),
    /// Writing the updated document failed.
    Write(io::Error),
    /// The trailer has no usable `/Root` catalog.
    MissingCatalog,
    /// A chapter starts on a page the document does not have.
    MissingPage { chapter: String, page_number: usize },
}

impl fmt::Display for BookmarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "Failed to read the rendered PDF: {}", err),
            Self::Write(err) => write!(f, "Failed to write the bookmarked PDF: {}", err),
            Self::MissingCatalog => write!(f, "The PDF has no document catalog"),
            Self::MissingPage {
                chapter,
                page_number,
            } => write!(f, "Chapter \"{}\" starts on missing page {}", chapter, page_number),
        }
    }
}

impl std::error::Error for BookmarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Write(err) => Some(err),
            Self::MissingCatalog | Self::MissingPage { .. } => None,
        }
    }
}

impl From<lopdf::Error> for BookmarkError {
    fn from(err: lopdf::Error) -> Self {
        Self::Parse(err)
    }
}

/// Adds one outline item per chapter, opening the chapter's divider page, and asks viewers to
/// show the outline on open.
///
/// `chapters` carry the physical page numbers recorded for the table of contents.  The bytes are
/// returned unchanged when there are no chapters.
pub fn apply_chapter_bookmarks(
    pdf_bytes: &[u8],
    chapters: &[TocEntry],
) -> Result<Vec<u8>, BookmarkError> {
    if chapters.is_empty() {
        return Ok(pdf_bytes.to_vec());
    }

    let mut document = Document::load_mem(pdf_bytes)?;
    let pages = document.get_pages();
    let targets = chapters
        .iter()
        .map(|chapter| page_of(&pages, chapter))
        .collect::<Result<Vec<_>, _>>()?;

    let root_id = document.new_object_id();
    let item_ids: Vec<ObjectId> = chapters.iter().map(|_| document.new_object_id()).collect();

    for (index, (chapter, page_id)) in chapters.iter().zip(targets).enumerate() {
        let mut item = dictionary! {
            "Title" => Object::string_literal(chapter.category.as_str()),
            "Parent" => root_id,
            "Dest" => vec![Object::Reference(page_id), Object::Name(b"Fit".to_vec())],
        };
        if let Some(previous) = index.checked_sub(1).map(|i| item_ids[i]) {
            item.set("Prev", previous);
        }
        if let Some(&next) = item_ids.get(index + 1) {
            item.set("Next", next);
        }
        document.objects.insert(item_ids[index], Object::Dictionary(item));
    }

    let mut root = dictionary! {
        "Type" => "Outlines",
        "Count" => item_ids.len() as i64,
    };
    if let (Some(&first), Some(&last)) = (item_ids.first(), item_ids.last()) {
        root.set("First", first);
        root.set("Last", last);
    }
    document.objects.insert(root_id, Object::Dictionary(root));

    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| BookmarkError::MissingCatalog)?;
    let catalog = document
        .objects
        .get_mut(&catalog_id)
        .and_then(|object| object.as_dict_mut().ok())
        .ok_or(BookmarkError::MissingCatalog)?;
    catalog.set("Outlines", root_id);
    catalog.set("PageMode", "UseOutlines");

    let mut buffer = Vec::new();
    document.save_to(&mut buffer).map_err(BookmarkError::Write)?;
    Ok(buffer)
}

fn page_of(pages: &BTreeMap<u32, ObjectId>, chapter: &TocEntry) -> Result<ObjectId, BookmarkError> {
    u32::try_from(chapter.page)
        .ok()
        .and_then(|number| pages.get(&number).copied())
        .ok_or_else(|| BookmarkError::MissingPage {
            chapter: chapter.category.clone(),
            page_number: chapter.page,
        })
}
