//! # meaningness-epub
//!
//! A CLI utility to turn a web book's nested table of contents into an EPUB.
//!
//! The listing page is parsed into a [`ChapterTree`], every chapter is
//! downloaded and trimmed to its article, and the tree is written out as the
//! EPUB 2 navigation map (`toc.ncx`), package manifest (`content.opf`) and
//! container pointer before everything is zipped up.
//!
//! ## Usage
//!
//! ```bash
//! meaningness-epub build -d chapters -o meaningness.epub
//! meaningness-epub package -c chapters/meaningness.html -d chapters -o meaningness.epub
//! ```

mod archive;
mod chapter;
mod config;
mod downloader;
mod error;
mod listing;
mod package;
mod pipeline;
mod xhtml;

pub use archive::EpubArchive;
pub use chapter::{is_site_path, max_depth, Chapter, ChapterTree, ChapterVisitor, PreOrder};
pub use config::{AppConfig, BookMetadata, SiteConfig};
pub use downloader::{chapter_file, clean_chapter_file, clean_chapter_html, DownloadSummary, Downloader};
pub use error::{EmitError, ListingError};
pub use listing::{build_chapters, parse_listing, ListingNode};
pub use package::{container_document, part_id, PackageEmitter, CONTAINER_FILE, MIMETYPE, MIMETYPE_FILE, NCX_FILE, OPF_FILE};
pub use pipeline::{parse_epub_path, BuildOptions, Pipeline};
pub use xhtml::{contents_page, xhtml_page, XHTML_NAMESPACE};
