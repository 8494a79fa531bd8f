use anyhow::{anyhow, Context, Result};
use colored::*;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::archive::EpubArchive;
use crate::chapter::ChapterTree;
use crate::config::AppConfig;
use crate::downloader::{clean_all, Downloader};
use crate::listing::parse_listing;
use crate::package::PackageEmitter;
use crate::xhtml::contents_page;

pub const EPUB_EXTENSION: &str = ".epub";

/// Accepts only output paths ending in `.epub`.
pub fn parse_epub_path(s: &str) -> Result<PathBuf, String> {
    if !s.ends_with(EPUB_EXTENSION) || s.len() == EPUB_EXTENSION.len() {
        return Err(format!("Output file must end in {}", EPUB_EXTENSION));
    }
    Ok(PathBuf::from(s))
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Previously saved table of contents; fetched from the site when absent.
    pub listing: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub output: PathBuf,
    pub force_download: bool,
    /// Never touch the network; every chapter must already be in `out_dir`.
    pub offline: bool,
}

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, options: &BuildOptions) -> Result<ChapterTree> {
        remove_stale(&options.output).await?;

        let downloader = if options.offline {
            None
        } else {
            Some(Downloader::new(&self.config.site)?)
        };

        let listing = match (&options.listing, &downloader) {
            (Some(path), _) => {
                info!("Reading table of contents from {}", path.display().to_string().blue());
                fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read table of contents {}", path.display()))?
            }
            (None, Some(downloader)) => downloader.fetch_listing().await?,
            (None, None) => return Err(anyhow!("A table of contents file is required when working offline")),
        };

        // Nothing is written to the package directory until the listing parses.
        let tree = parse_listing(&listing, &self.config.site)?;
        info!(
            "Found {} chapters, nested {} deep",
            tree.len().to_string().green(),
            tree.max_depth()
        );

        fs::create_dir_all(&options.out_dir)
            .await
            .map_err(|e| anyhow!("Failed to create {}: {}", options.out_dir.display(), e))?;

        // The stored page keeps the listing markup, so it can be passed back
        // in as the table of contents file on a later run.
        let contents = contents_page(&listing, &self.config.site)
            .context("Failed to write table of contents page")?
            .ok_or_else(|| anyhow!("No table of contents found in the listing"))?;
        let contents_path = options.out_dir.join(&self.config.site.contents_file);
        fs::write(&contents_path, contents)
            .await
            .map_err(|e| anyhow!("Failed to write {}: {}", contents_path.display(), e))?;

        if let Some(downloader) = &downloader {
            downloader
                .download_all(&tree, &options.out_dir, options.force_download)
                .await?;
        }

        clean_all(&tree, &options.out_dir).await?;

        self.write_package_files(&tree, &options.out_dir).await?;

        EpubArchive::for_package(&options.out_dir, &tree, &self.config.site.contents_file)
            .save(&options.output)
            .await?;

        info!("EPUB saved to: {}", options.output.display().to_string().green());
        Ok(tree)
    }

    async fn write_package_files(&self, tree: &ChapterTree, dir: &Path) -> Result<()> {
        let year = time::OffsetDateTime::now_utc().year();
        let emitter = PackageEmitter::new(tree, &self.config.book, &self.config.site.contents_file, year);

        for (name, data) in emitter.files()? {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| anyhow!("Failed to create directory: {}", e))?;
            }
            remove_stale(&path).await?;
            fs::write(&path, data)
                .await
                .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
            debug!("Wrote {}", path.display());
        }

        Ok(())
    }
}

async fn remove_stale(path: &Path) -> Result<()> {
    let exists = fs::try_exists(path)
        .await
        .with_context(|| format!("Failed to check for {}", path.display()))?;
    if exists {
        debug!("Removing stale {}", path.display());
        fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
