//! Reconstructs the chapter tree from a nested table of contents.
//!
//! The listing is a `ul` of `li` entries. A plain `li` holds an anchor and
//! introduces a chapter; an `li` carrying the container class holds a nested
//! `ul` with the sub-chapters of the chapter right before it:
//!
//! ```html
//! <ul class="book-toc">
//!   <li><a href="/a">A</a></li>
//!   <li class="book_toc_container"><ul><li><a href="/b">B</a></li></ul></li>
//! </ul>
//! ```

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::chapter::{is_site_path, Chapter, ChapterTree};
use crate::config::SiteConfig;
use crate::error::ListingError;

/// The few operations the tree builder needs from a parsed markup element.
pub trait ListingNode: Sized {
    fn element_name(&self) -> &str;

    fn attribute(&self, name: &str) -> Option<&str>;

    /// Child elements in document order, text nodes excluded.
    fn elements(&self) -> Vec<Self>;

    fn text_content(&self) -> String;

    fn first_child_named(&self, name: &str) -> Option<Self> {
        self.elements().into_iter().find(|e| e.element_name() == name)
    }

    fn children_named(&self, name: &str) -> Vec<Self> {
        self.elements()
            .into_iter()
            .filter(|e| e.element_name() == name)
            .collect()
    }
}

impl<'a> ListingNode for ElementRef<'a> {
    fn element_name(&self) -> &str {
        self.value().name()
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }

    fn elements(&self) -> Vec<Self> {
        self.children().filter_map(ElementRef::wrap).collect()
    }

    fn text_content(&self) -> String {
        self.text().collect()
    }
}

/// Parse a table of contents page into a validated chapter tree.
pub fn parse_listing(html: &str, site: &SiteConfig) -> Result<ChapterTree, ListingError> {
    let selector = Selector::parse(&site.listing_selector)
        .map_err(|_| ListingError::InvalidSelector(site.listing_selector.clone()))?;

    let document = Html::parse_document(html);
    let root = document
        .select(&selector)
        .next()
        .ok_or_else(|| ListingError::MissingListing(site.listing_selector.clone()))?;

    let chapters = build_chapters(&root.children_named("li"), site)?;
    ChapterTree::new(chapters)
}

/// Turn one level of sibling `li` nodes into chapters, descending into
/// nested containers as they appear.
pub fn build_chapters<N: ListingNode>(
    nodes: &[N],
    site: &SiteConfig,
) -> Result<Vec<Chapter>, ListingError> {
    let mut chapters: Vec<Chapter> = Vec::new();
    // Index of the last chapter that already received a nested list.
    let mut expanded: Option<usize> = None;

    for (position, node) in nodes.iter().enumerate() {
        let class = node.attribute("class").map(str::trim).filter(|c| !c.is_empty());

        match class {
            None => chapters.push(read_chapter(node, position, site)?),
            Some(class) if class == site.container_class => {
                let index = chapters
                    .len()
                    .checked_sub(1)
                    .ok_or(ListingError::OrphanContainer { position })?;
                let parent = &mut chapters[index];

                if expanded == Some(index) {
                    return Err(ListingError::DuplicateContainer {
                        title: parent.title().to_string(),
                    });
                }

                let list = node.first_child_named("ul").ok_or_else(|| {
                    ListingError::MissingNestedList {
                        title: parent.title().to_string(),
                    }
                })?;

                let children = build_chapters(&list.children_named("li"), site)?;
                debug!("'{}' has {} sub-chapters", parent.title(), children.len());
                parent.set_children(children);
                expanded = Some(index);
            }
            Some(class) => {
                return Err(ListingError::UnknownNesting {
                    class: class.to_string(),
                    position,
                });
            }
        }
    }

    Ok(chapters)
}

fn read_chapter<N: ListingNode>(
    node: &N,
    position: usize,
    site: &SiteConfig,
) -> Result<Chapter, ListingError> {
    let anchor = node
        .first_child_named("a")
        .ok_or(ListingError::MissingAnchor { position })?;

    let raw_text = anchor.text_content();
    let href = anchor
        .attribute("href")
        .map(str::trim)
        .filter(|href| !href.is_empty());

    let chapter = Chapter::from_anchor(&raw_text, href.unwrap_or_default(), &site.unfinished_marker);

    let Some(href) = href else {
        return Err(ListingError::MissingTarget {
            title: chapter.title().to_string(),
        });
    };

    if !is_site_path(href) {
        return Err(ListingError::UnsafeTarget {
            url: href.to_string(),
        });
    }

    if chapter.title().is_empty() {
        return Err(ListingError::EmptyTitle {
            url: href.to_string(),
        });
    }

    Ok(chapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Node {
        name: &'static str,
        attrs: Vec<(&'static str, &'static str)>,
        text: &'static str,
        children: Vec<Node>,
    }

    impl ListingNode for Node {
        fn element_name(&self) -> &str {
            self.name
        }

        fn attribute(&self, name: &str) -> Option<&str> {
            self.attrs.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
        }

        fn elements(&self) -> Vec<Self> {
            self.children.clone()
        }

        fn text_content(&self) -> String {
            self.text.to_string()
        }
    }

    fn element(name: &'static str, attrs: Vec<(&'static str, &'static str)>, children: Vec<Node>) -> Node {
        Node { name, attrs, text: "", children }
    }

    fn entry(title: &'static str, href: &'static str) -> Node {
        let anchor = Node { name: "a", attrs: vec![("href", href)], text: title, children: vec![] };
        element("li", vec![], vec![anchor])
    }

    fn container(items: Vec<Node>) -> Node {
        element("li", vec![("class", "book_toc_container")], vec![element("ul", vec![], items)])
    }

    fn build(nodes: &[Node]) -> Result<Vec<Chapter>, ListingError> {
        build_chapters(nodes, &SiteConfig::default())
    }

    fn titles(chapters: &[Chapter]) -> Vec<&str> {
        chapters.iter().map(Chapter::title).collect()
    }

    #[test]
    fn flat_listing_keeps_order() {
        let chapters = build(&[entry("One", "/one"), entry("Two", "/two"), entry("Three", "/three")]).unwrap();
        assert_eq!(titles(&chapters), ["One", "Two", "Three"]);
        assert!(chapters.iter().all(|c| c.children().is_empty()));
    }

    #[test]
    fn container_attaches_to_preceding_chapter() {
        let nodes = [
            entry("A", "/a"),
            entry("B", "/b"),
            container(vec![entry("C", "/c"), container(vec![entry("D", "/d")])]),
            entry("E", "/e"),
        ];
        let chapters = build(&nodes).unwrap();

        assert_eq!(titles(&chapters), ["A", "B", "E"]);
        assert!(chapters[0].children().is_empty());
        assert_eq!(titles(chapters[1].children()), ["C"]);
        assert_eq!(titles(chapters[1].children()[0].children()), ["D"]);
    }

    #[test]
    fn unfinished_marker_is_detected() {
        let chapters = build(&[entry(" Eternalism \u{2692}", "/eternalism"), entry("Nihilism ", "/nihilism")]).unwrap();
        assert!(chapters[0].is_unfinished());
        assert_eq!(chapters[0].title(), "Eternalism");
        assert!(!chapters[1].is_unfinished());
        assert_eq!(chapters[1].title(), "Nihilism");
    }

    #[test]
    fn empty_level_builds_nothing() {
        assert!(build(&[]).unwrap().is_empty());
    }

    #[test]
    fn leading_container_is_an_orphan() {
        let nodes = [container(vec![entry("A", "/a")]), entry("B", "/b")];
        assert_eq!(build(&nodes), Err(ListingError::OrphanContainer { position: 0 }));
    }

    #[test]
    fn orphan_inside_nested_level_is_reported() {
        let nodes = [entry("A", "/a"), container(vec![container(vec![])])];
        assert_eq!(build(&nodes), Err(ListingError::OrphanContainer { position: 0 }));
    }

    #[test]
    fn second_container_for_same_chapter_is_rejected() {
        let nodes = [entry("A", "/a"), container(vec![entry("B", "/b")]), container(vec![entry("C", "/c")])];
        assert_eq!(
            build(&nodes),
            Err(ListingError::DuplicateContainer { title: "A".to_string() })
        );
    }

    #[test]
    fn chapter_without_anchor_is_rejected() {
        let nodes = [entry("A", "/a"), element("li", vec![], vec![])];
        assert_eq!(build(&nodes), Err(ListingError::MissingAnchor { position: 1 }));
    }

    #[test]
    fn anchor_without_href_is_rejected() {
        let anchor = Node { name: "a", attrs: vec![], text: "Lost", children: vec![] };
        let nodes = [element("li", vec![], vec![anchor])];
        assert_eq!(
            build(&nodes),
            Err(ListingError::MissingTarget { title: "Lost".to_string() })
        );
        assert!(matches!(build(&[entry("Blank", "  ")]), Err(ListingError::MissingTarget { .. })));
    }

    #[test]
    fn marker_only_title_is_empty() {
        assert_eq!(
            build(&[entry(" \u{2692} ", "/wip")]),
            Err(ListingError::EmptyTitle { url: "/wip".to_string() })
        );
    }

    #[test]
    fn links_leaving_the_site_are_rejected() {
        for href in ["/../../outside", "/faq?page=2#top", "https://evil.example/x", "//evil.example/x"] {
            let nodes = [entry("A", "/a"), container(vec![entry("Away", href)])];
            assert_eq!(
                build(&nodes),
                Err(ListingError::UnsafeTarget { url: href.to_string() })
            );
        }
    }

    #[test]
    fn unknown_class_is_not_guessed() {
        let nodes = [entry("A", "/a"), element("li", vec![("class", "expanded")], vec![])];
        assert_eq!(
            build(&nodes),
            Err(ListingError::UnknownNesting { class: "expanded".to_string(), position: 1 })
        );
    }

    #[test]
    fn container_without_list_is_rejected() {
        let nodes = [entry("A", "/a"), element("li", vec![("class", "book_toc_container")], vec![])];
        assert_eq!(
            build(&nodes),
            Err(ListingError::MissingNestedList { title: "A".to_string() })
        );
    }

    const PAGE: &str = r#"
        <html><body>
          <nav><ul><li><a href="/elsewhere">Not a chapter</a></li></ul></nav>
          <ul class="book-toc">
            <li><a href="/introduction">Introduction</a></li>
            <li><a href="/stances">Stances ⚒</a></li>
            <li class="book_toc_container">
              <ul>
                <li><a href="/eternalism">Eternalism</a></li>
                <li class="book_toc_container">
                  <ul><li><a href="/eternalism/ordinary">Ordinary <em>eternalism</em></a></li></ul>
                </li>
                <li><a href="/nihilism">Nihilism</a></li>
              </ul>
            </li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn parses_html_listing() {
        let tree = parse_listing(PAGE, &SiteConfig::default()).unwrap();

        let all: Vec<_> = tree.iter().map(|c| (c.title(), c.url())).collect();
        assert_eq!(
            all,
            [
                ("Introduction", "/introduction"),
                ("Stances", "/stances"),
                ("Eternalism", "/eternalism"),
                ("Ordinary eternalism", "/eternalism/ordinary"),
                ("Nihilism", "/nihilism"),
            ]
        );
        assert!(tree.chapters()[1].is_unfinished());
        assert_eq!(tree.max_depth(), 3);
    }

    #[test]
    fn page_without_listing_is_an_error() {
        let err = parse_listing("<html><body><ul></ul></body></html>", &SiteConfig::default()).unwrap_err();
        assert_eq!(err, ListingError::MissingListing("ul.book-toc".to_string()));
    }

    #[test]
    fn empty_listing_is_an_empty_tree() {
        let tree = parse_listing(r#"<ul class="book-toc"></ul>"#, &SiteConfig::default()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.max_depth(), 0);
    }

    #[test]
    fn parent_segments_in_page_fail() {
        let html = r#"<ul class="book-toc"><li><a href="/../../etc/passwd">Escape</a></li></ul>"#;
        assert_eq!(
            parse_listing(html, &SiteConfig::default()),
            Err(ListingError::UnsafeTarget { url: "/../../etc/passwd".to_string() })
        );
    }

    #[test]
    fn duplicate_targets_fail_validation() {
        let html = r#"<ul class="book-toc"><li><a href="/a">A</a></li><li><a href="/a">Again</a></li></ul>"#;
        assert_eq!(
            parse_listing(html, &SiteConfig::default()),
            Err(ListingError::DuplicatePath { path: "a.html".to_string() })
        );
    }
}
