//! Core entry point for the herb_grimoire crate.
//!
//! The crate keeps a collection of favorite herbs, categories and spells, and turns that
//! collection into a paginated PDF report: every page is laid out, rasterized to a fixed
//! resolution bitmap and placed into a document whose table of contents is patched in after the
//! content pages have been numbered.

pub mod assets;
pub mod builder;
pub mod clipboard;
pub mod config;
pub mod document;
pub mod fonts;
pub mod layout;
pub mod model;
pub mod oracle;
pub mod pagination;
pub mod raster;
pub mod richtext;
pub mod sink;
pub mod state;
pub mod store;

#[cfg(feature = "bookmarks")]
pub mod bookmarks;
