//! Report configuration: page geometry, raster resolution and asset wait bounds.

use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::model::CategoryOrder;

/// Title printed on the title page and in detail page headers.
pub const DEFAULT_TITLE: &str = "My Esoteric Herb Grimoire";
/// File name of the full report artifact.
pub const DEFAULT_FILENAME: &str = "Esoteric-Herb-Grimoire.pdf";

const DEFAULT_DPI: u32 = 150;
/// An A4 page at 600 dpi is already a 100 MB bitmap.
const DPI_RANGE: RangeInclusive<u32> = 36..=600;
const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(5);

const ENV_DPI: &str = "GRIMOIRE_REPORT_DPI";
const ENV_IMAGE_TIMEOUT_MS: &str = "GRIMOIRE_IMAGE_TIMEOUT_MS";
const ENV_TITLE: &str = "GRIMOIRE_REPORT_TITLE";

/// Physical page size and margins in millimetres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub margin_mm: f64,
}

impl PageGeometry {
    /// Portrait A4 with margins of roughly 40pt.
    pub const A4: PageGeometry = PageGeometry {
        page_width_mm: 210.0,
        page_height_mm: 297.0,
        margin_mm: 14.0,
    };

    /// Width available to page content.
    pub fn content_width_mm(&self) -> f64 {
        (self.page_width_mm - 2.0 * self.margin_mm).max(0.0)
    }

    /// Height available to page content.
    pub fn content_height_mm(&self) -> f64 {
        (self.page_height_mm - 2.0 * self.margin_mm).max(0.0)
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::A4
    }
}

/// Settings shared by every export.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportConfig {
    title: String,
    filename: String,
    geometry: PageGeometry,
    dpi: u32,
    image_timeout: Duration,
    category_order: CategoryOrder,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            filename: DEFAULT_FILENAME.to_string(),
            geometry: PageGeometry::default(),
            dpi: DEFAULT_DPI,
            image_timeout: DEFAULT_IMAGE_TIMEOUT,
            category_order: CategoryOrder::default(),
        }
    }
}

impl ReportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `GRIMOIRE_REPORT_DPI`, `GRIMOIRE_IMAGE_TIMEOUT_MS` and
    /// `GRIMOIRE_REPORT_TITLE`.  Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dpi) = env_number::<u32>(ENV_DPI) {
            config = config.with_dpi(dpi);
        }
        if let Some(millis) = env_number(ENV_IMAGE_TIMEOUT_MS) {
            config = config.with_image_timeout(Duration::from_millis(millis));
        }
        if let Ok(title) = env::var(ENV_TITLE) {
            if !title.trim().is_empty() {
                config = config.with_title(title.trim());
            }
        }

        config
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Upper bound on the wait for a single image before it is treated as failed.
    pub fn image_timeout(&self) -> Duration {
        self.image_timeout
    }

    pub fn category_order(&self) -> CategoryOrder {
        self.category_order
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Sets the raster resolution; zero is replaced by the default and other values are clamped
    /// to 36..=600.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = if dpi == 0 {
            DEFAULT_DPI
        } else {
            let clamped = dpi.clamp(*DPI_RANGE.start(), *DPI_RANGE.end());
            if clamped != dpi {
                warn!("Resolution {} dpi is out of range; using {} dpi", dpi, clamped);
            }
            clamped
        };
        self
    }

    pub fn with_image_timeout(mut self, timeout: Duration) -> Self {
        self.image_timeout = timeout;
        self
    }

    pub fn with_category_order(mut self, order: CategoryOrder) -> Self {
        self.category_order = order;
        self
    }
}

fn env_number<T>(var: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let value = env::var(var).ok()?;
    match value.trim().parse::<T>() {
        Ok(number) => Some(number),
        Err(err) => {
            warn!("Ignoring {}={:?}: {}", var, value, err);
            None
        }
    }
}

/// File name for a standalone detail page export.
pub fn single_page_filename(herb_name: &str) -> String {
    let stem: String = herb_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect();
    if stem.is_empty() {
        "herb.pdf".to_string()
    } else {
        format!("{}.pdf", stem)
    }
}
