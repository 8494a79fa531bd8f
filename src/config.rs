use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Everything about the site being scraped: where it lives and how its
/// table of contents is marked up.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    /// Selector for the outermost `ul` of the table of contents.
    pub listing_selector: String,
    /// Class carried by the `li` that wraps a chapter's sub-chapters.
    pub container_class: String,
    /// Glyph the site puts in a title while the chapter is still being written.
    pub unfinished_marker: String,
    pub user_agent: String,
    /// Pause between chapter downloads (the site's robots.txt Crawl-Delay).
    pub crawl_delay_secs: f64,
    /// File name the table of contents page is stored under in the package.
    pub contents_file: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://meaningness.com".to_string(),
            listing_selector: "ul.book-toc".to_string(),
            container_class: "book_toc_container".to_string(),
            unfinished_marker: "\u{2692}".to_string(),
            user_agent: concat!("meaningness-epub v", env!("CARGO_PKG_VERSION")).to_string(),
            crawl_delay_secs: 10.0,
            contents_file: "meaningness.html".to_string(),
        }
    }
}

impl SiteConfig {
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).with_context(|| format!("Invalid base URL '{}'", self.base_url))
    }

    /// Negative delays count as none; delays too large for a `Duration`
    /// are an error.
    pub fn crawl_delay(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.crawl_delay_secs.max(0.0))
            .with_context(|| format!("Invalid crawl delay of {} seconds", self.crawl_delay_secs))
    }
}

/// Descriptive metadata written into the package manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BookMetadata {
    pub title: String,
    pub language: String,
    pub identifier: String,
    pub description: String,
    pub author: String,
    pub copyright_holder: String,
    pub copyright_start_year: i32,
}

impl Default for BookMetadata {
    fn default() -> Self {
        Self {
            title: "Meaningness".to_string(),
            language: "en".to_string(),
            identifier: "https://meaningness.com".to_string(),
            description: "Better ways of thinking, feeling, and acting\u{2014}around problems of \
                          meaning and meaninglessness; self and society; ethics, purpose, and value."
                .to_string(),
            author: "David Chapman".to_string(),
            copyright_holder: "David Chapman".to_string(),
            copyright_start_year: 2010,
        }
    }
}

impl BookMetadata {
    /// Copyright line running from the start year through `current_year`.
    pub fn rights(&self, current_year: i32) -> String {
        format!(
            "Copyright \u{a9}{}\u{2013}{} {}.",
            self.copyright_start_year, current_year, self.copyright_holder
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub book: BookMetadata,
}

impl AppConfig {
    /// Load overrides from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&data).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.site.crawl_delay()?;
        Ok(config)
    }
}
