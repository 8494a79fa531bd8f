use anyhow::{anyhow, Context, Result};
use colored::*;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::chapter::{Chapter, ChapterTree};
use crate::config::SiteConfig;
use crate::error::EmitError;
use crate::xhtml::xhtml_page;

/// Where a chapter's content lives inside the package directory.
pub fn chapter_file(dir: &Path, chapter: &Chapter) -> PathBuf {
    dir.join(chapter.local_path())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
}

pub struct Downloader {
    client: Client,
    base_url: Url,
    crawl_delay: Duration,
}

impl Downloader {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&site.user_agent)
                .map_err(|e| anyhow!("Invalid user agent '{}': {}", site.user_agent, e))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: site.base_url()?,
            crawl_delay: site.crawl_delay()?,
        })
    }

    /// Download the table of contents page (the site root).
    pub async fn fetch_listing(&self) -> Result<String> {
        info!("Downloading table of contents from \"{}\"", self.base_url.to_string().green());

        let body = self
            .client
            .get(self.base_url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| anyhow!("Failed to fetch {}: {}", self.base_url, e))?
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read table of contents: {}", e))?;

        debug!("Table of contents is {} bytes", body.len());
        Ok(body)
    }

    /// Fetch every chapter in reading order. Files already on disk are kept
    /// unless `force` is set.
    pub async fn download_all(&self, tree: &ChapterTree, dir: &Path, force: bool) -> Result<DownloadSummary> {
        let mut summary = DownloadSummary::default();

        for chapter in tree {
            let path = chapter_file(dir, chapter);

            let exists = fs::try_exists(&path)
                .await
                .with_context(|| format!("Failed to check for {}", path.display()))?;
            if exists {
                if !force {
                    debug!("Skipping \"{}\", already at {}", chapter.title(), path.display());
                    summary.skipped += 1;
                    continue;
                }
                fs::remove_file(&path)
                    .await
                    .with_context(|| format!("Failed to remove stale {}", path.display()))?;
            }

            if summary.downloaded > 0 && !self.crawl_delay.is_zero() {
                debug!("Waiting {:?} before the next request", self.crawl_delay);
                tokio::time::sleep(self.crawl_delay).await;
            }

            self.download_chapter(chapter, &path).await?;
            summary.downloaded += 1;
        }

        info!(
            "Downloaded {} chapters, {} already present",
            summary.downloaded, summary.skipped
        );
        Ok(summary)
    }

    fn chapter_url(&self, chapter: &Chapter) -> Result<Url> {
        self.base_url
            .join(chapter.url())
            .map_err(|e| anyhow!("Failed to join URL {}: {}", chapter.url(), e))
    }

    async fn download_chapter(&self, chapter: &Chapter, path: &Path) -> Result<()> {
        let url = self.chapter_url(chapter)?;
        info!(
            "Downloading \"{}\" into \"{}\"",
            url.to_string().green(),
            path.display().to_string().blue()
        );
        if chapter.is_unfinished() {
            debug!("\"{}\" is marked unfinished", chapter.title());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow!("Failed to create directory: {}", e))?;
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| anyhow!("Failed to fetch {}: {}", url, e))?;

        // Stream into a side file so an interrupted download never looks complete.
        let partial = path.with_extension("part");
        let mut file = fs::File::create(&partial)
            .await
            .map_err(|e| anyhow!("Failed to create {}: {}", partial.display(), e))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| anyhow!("Failed while reading {}: {}", url, e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        fs::rename(&partial, path)
            .await
            .map_err(|e| anyhow!("Failed to move {} into place: {}", partial.display(), e))?;

        Ok(())
    }
}

/// Reduce a downloaded chapter page to an XHTML page holding its heading and
/// article, without the share/comment navigation bar. Returns `None` for
/// pages with no article.
///
/// Cleaning already-cleaned output gives the same output back.
pub fn clean_chapter_html(html: &str) -> Result<Option<String>, EmitError> {
    let document = Html::parse_document(html);

    let article_selector = Selector::parse("article").unwrap();
    let heading_selector = Selector::parse("h1").unwrap();
    let nav_selector = Selector::parse("nav.clearfix").unwrap();

    let Some(article) = document.select(&article_selector).next() else {
        return Ok(None);
    };
    let heading = document.select(&heading_selector).next();

    let title = heading
        .map(|h| h.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    let outside = heading.filter(|h| !h.ancestors().any(|a| a.id() == article.id()));
    let fragments: Vec<_> = outside.into_iter().chain([article]).collect();

    xhtml_page(&title, &fragments, Some(&nav_selector)).map(Some)
}

/// Clean one chapter file in place. Returns false when the page had nothing
/// to keep and was left untouched.
pub async fn clean_chapter_file(path: &Path) -> Result<bool> {
    let html = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read chapter {}: {}", path.display(), e))?;

    let cleaned = clean_chapter_html(&html)
        .with_context(|| format!("Failed to rewrite chapter {}", path.display()))?;
    let Some(cleaned) = cleaned else {
        warn!("No article found in {}, leaving it as is", path.display());
        return Ok(false);
    };

    let tmp = path.with_extension("html.tmp");
    fs::write(&tmp, cleaned)
        .await
        .map_err(|e| anyhow!("Failed to write {}: {}", tmp.display(), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| anyhow!("Failed to replace {}: {}", path.display(), e))?;

    Ok(true)
}

/// Clean every chapter of the tree. All chapter files must exist.
pub async fn clean_all(tree: &ChapterTree, dir: &Path) -> Result<()> {
    let mut cleaned = 0;
    for chapter in tree {
        let path = chapter_file(dir, chapter);
        let exists = fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check for {}", path.display()))?;
        if !exists {
            return Err(anyhow!(
                "Chapter \"{}\" has not been downloaded to {}",
                chapter.title(),
                path.display()
            ));
        }
        if clean_chapter_file(&path).await? {
            cleaned += 1;
        }
    }
    info!("Cleaned {} of {} chapter files", cleaned, tree.len());
    Ok(())
}
