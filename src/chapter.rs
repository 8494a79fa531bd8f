use std::collections::HashSet;
use tracing::debug;

use crate::error::ListingError;

/// Suffix appended to a chapter's url to name its local file.
pub const CHAPTER_FILE_SUFFIX: &str = ".html";

/// One entry in the book's table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    title: String,
    url: String,
    unfinished: bool,
    children: Vec<Chapter>,
}

impl Chapter {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            unfinished: false,
            children: Vec::new(),
        }
    }

    /// Build a chapter from raw anchor text, stripping `marker` out of the
    /// title and recording whether it was there.
    pub fn from_anchor(raw_text: &str, url: impl Into<String>, marker: &str) -> Self {
        let unfinished = !marker.is_empty() && raw_text.contains(marker);
        let title = if unfinished {
            raw_text.replace(marker, "")
        } else {
            raw_text.to_string()
        };

        Self {
            title: title.trim().to_string(),
            url: url.into(),
            unfinished,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Chapter>) -> Self {
        self.children = children;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_unfinished(&self) -> bool {
        self.unfinished
    }

    pub fn children(&self) -> &[Chapter] {
        &self.children
    }

    pub(crate) fn set_children(&mut self, children: Vec<Chapter>) {
        self.children = children;
    }

    /// Package-relative path of the chapter's content file.
    pub fn local_path(&self) -> String {
        let stem = self.url.trim().trim_start_matches('/');
        let stem = if stem.is_empty() { "index" } else { stem };
        format!("{}{}", stem, CHAPTER_FILE_SUFFIX)
    }

    /// Number of levels in this chapter's subtree, counting itself.
    pub fn depth(&self) -> usize {
        1 + max_depth(&self.children)
    }
}

/// Whether `url` is a plain site path that can double as a file name inside
/// the package. Absolute and protocol-relative links, queries, fragments and
/// parent segments are refused.
pub fn is_site_path(url: &str) -> bool {
    let url = url.trim();
    if url.starts_with("//") || url::Url::parse(url).is_ok() {
        return false;
    }
    if url.contains(['?', '#', '\\']) {
        return false;
    }
    !url.split('/').any(|segment| segment == ".." || segment == ".")
}

/// 0 for no chapters, otherwise 1 + the deepest child level.
pub fn max_depth(chapters: &[Chapter]) -> usize {
    chapters.iter().map(Chapter::depth).max().unwrap_or(0)
}

/// Callbacks for a pre-order walk. `enter` runs before a chapter's children
/// are visited and `exit` after all of its descendants.
pub trait ChapterVisitor {
    type Error;

    fn enter(&mut self, chapter: &Chapter) -> Result<(), Self::Error>;

    fn exit(&mut self, _chapter: &Chapter) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// The validated, read-only chapter tree for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterTree {
    chapters: Vec<Chapter>,
}

impl ChapterTree {
    /// Check the invariants the emitter relies on: every chapter has a
    /// title and a site-relative target, and no two chapters share a local
    /// file.
    pub fn new(chapters: Vec<Chapter>) -> Result<Self, ListingError> {
        let tree = Self { chapters };
        let mut seen = HashSet::new();

        for chapter in tree.iter() {
            if chapter.url.trim().is_empty() {
                return Err(ListingError::MissingTarget {
                    title: chapter.title.clone(),
                });
            }
            if !is_site_path(&chapter.url) {
                return Err(ListingError::UnsafeTarget {
                    url: chapter.url.clone(),
                });
            }
            if chapter.title.trim().is_empty() {
                return Err(ListingError::EmptyTitle {
                    url: chapter.url.clone(),
                });
            }
            let path = chapter.local_path();
            if !seen.insert(path.clone()) {
                return Err(ListingError::DuplicatePath { path });
            }
        }

        debug!(
            "Chapter tree holds {} chapters, {} levels deep",
            tree.len(),
            tree.max_depth()
        );
        Ok(tree)
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Total number of chapters at every level.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn max_depth(&self) -> usize {
        max_depth(&self.chapters)
    }

    /// Chapters in pre-order: parent first, children in listing order.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            stack: vec![self.chapters.iter()],
        }
    }

    pub fn walk<V: ChapterVisitor>(&self, visitor: &mut V) -> Result<(), V::Error> {
        walk_level(&self.chapters, visitor)
    }
}

fn walk_level<V: ChapterVisitor>(chapters: &[Chapter], visitor: &mut V) -> Result<(), V::Error> {
    for chapter in chapters {
        visitor.enter(chapter)?;
        walk_level(&chapter.children, visitor)?;
        visitor.exit(chapter)?;
    }
    Ok(())
}

pub struct PreOrder<'a> {
    stack: Vec<std::slice::Iter<'a, Chapter>>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Chapter;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let level = self.stack.last_mut()?;
            match level.next() {
                Some(chapter) => {
                    self.stack.push(chapter.children.iter());
                    return Some(chapter);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl<'a> IntoIterator for &'a ChapterTree {
    type Item = &'a Chapter;
    type IntoIter = PreOrder<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
