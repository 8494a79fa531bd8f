use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::chapter::ChapterTree;
use crate::downloader::chapter_file;
use crate::package::{CONTAINER_FILE, MIMETYPE_FILE, NCX_FILE, OPF_FILE};

/// Collects package files and writes them out as an EPUB (zip) archive.
pub struct EpubArchive {
    entries: Vec<(String, PathBuf)>,
}

impl EpubArchive {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Every file of the package in `dir`: metadata first, then the contents
    /// page, then chapters in reading order.
    pub fn for_package(dir: &Path, tree: &ChapterTree, contents_file: &str) -> Self {
        let mut archive = Self::new();
        for name in [MIMETYPE_FILE, CONTAINER_FILE, OPF_FILE, NCX_FILE, contents_file] {
            archive.add_file(name, dir.join(name));
        }
        for chapter in tree {
            archive.add_file(chapter.local_path(), chapter_file(dir, chapter));
        }
        archive
    }

    pub fn add_file(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.push((name.into(), path.into()));
    }

    pub fn entries(&self) -> &[(String, PathBuf)] {
        &self.entries
    }

    pub async fn save(&self, output_path: &Path) -> Result<()> {
        if self.entries.is_empty() {
            return Err(anyhow!("No files added to archive"));
        }

        for (name, path) in &self.entries {
            let exists = fs::try_exists(path)
                .await
                .with_context(|| format!("Failed to check for package file {}", path.display()))?;
            if !exists {
                return Err(anyhow!("Missing package file {} ({})", name, path.display()));
            }
        }

        // Reading applications expect the mimetype entry first. The sort is
        // stable on a bool key, so every other entry keeps the order it was
        // added in.
        let mut entries = self.entries.clone();
        entries.sort_by_key(|(name, _)| name != MIMETYPE_FILE);

        let output = output_path.to_path_buf();
        let count = entries.len();
        tokio::task::spawn_blocking(move || write_zip(&entries, &output))
            .await
            .map_err(|e| anyhow!("Archive task failed: {}", e))??;

        info!("Packed {} files into {}", count, output_path.display());
        Ok(())
    }
}

impl Default for EpubArchive {
    fn default() -> Self {
        Self::new()
    }
}

fn write_zip(entries: &[(String, PathBuf)], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .map_err(|e| anyhow!("Failed to create {}: {}", output_path.display(), e))?;
    let mut zip = ZipWriter::new(file);

    for (name, path) in entries {
        let method = if name == MIMETYPE_FILE {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        let options = SimpleFileOptions::default().compression_method(method);

        let data = std::fs::read(path)
            .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

        debug!("Adding {} ({} bytes)", name, data.len());
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&data)?;
    }

    zip.finish()?;
    Ok(())
}
