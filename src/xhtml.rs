//! Well-formed XHTML pages rebuilt from parsed HTML.
//!
//! Downloaded pages are HTML, which EPUB readers reject when it is not also
//! valid XML (`<br>`, `&nbsp;`, unclosed `<p>`). Instead of copying source
//! markup, the kept subtrees are walked element by element and written back
//! through the package's XML writer.

use scraper::{ElementRef, Html, Node, Selector};

use crate::config::SiteConfig;
use crate::error::EmitError;
use crate::package::{XmlDocument, CONTENTS_LABEL};

pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements HTML never gives content; they become empty tags.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text HTML does not parse as markup. They are dropped.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "iframe"];

/// Build an XHTML document titled `title` whose body holds `fragments` in
/// order. Elements matching `skip` are left out along with their content.
/// Comments are dropped.
pub fn xhtml_page(title: &str, fragments: &[ElementRef<'_>], skip: Option<&Selector>) -> Result<String, EmitError> {
    write_page(title, None, fragments, skip)
}

fn write_page(
    title: &str,
    heading: Option<&str>,
    fragments: &[ElementRef<'_>],
    skip: Option<&Selector>,
) -> Result<String, EmitError> {
    let mut doc = XmlDocument::compact()?;
    doc.open("html", &[("xmlns", XHTML_NAMESPACE)])?;
    doc.open("head", &[])?;
    doc.text_element("title", &[], title)?;
    doc.close("head")?;
    doc.open("body", &[])?;
    if let Some(heading) = heading {
        doc.text_element("h1", &[], heading)?;
    }
    for fragment in fragments {
        write_element(&mut doc, *fragment, skip)?;
    }
    doc.close("body")?;
    doc.close("html")?;
    doc.finish()
}

/// The table of contents as a standalone page: a heading and the listing's
/// root list. `None` when the page has no listing.
///
/// The root list keeps its class and links, so the stored page parses back
/// into the same chapter tree.
pub fn contents_page(html: &str, site: &SiteConfig) -> Result<Option<String>, EmitError> {
    let Ok(selector) = Selector::parse(&site.listing_selector) else {
        return Ok(None);
    };
    let document = Html::parse_document(html);
    let Some(listing) = document.select(&selector).next() else {
        return Ok(None);
    };

    write_page(CONTENTS_LABEL, Some(CONTENTS_LABEL), &[listing], None).map(Some)
}

fn write_element(doc: &mut XmlDocument, element: ElementRef<'_>, skip: Option<&Selector>) -> Result<(), EmitError> {
    let name = element.value().name();
    if RAW_TEXT_ELEMENTS.contains(&name) || skip.is_some_and(|s| s.matches(&element)) {
        return Ok(());
    }

    // Parsed attributes come out in hash order.
    let mut attrs: Vec<(&str, &str)> = element
        .value()
        .attrs()
        .filter(|(key, _)| is_xml_name(key))
        .collect();
    attrs.sort_unstable_by_key(|(key, _)| *key);

    if VOID_ELEMENTS.contains(&name) {
        return doc.empty(name, &attrs);
    }

    doc.open(name, &attrs)?;
    for child in element.children() {
        if let Some(child) = ElementRef::wrap(child) {
            write_element(doc, child, skip)?;
        } else if let Node::Text(text) = child.value() {
            doc.text(text)?;
        }
    }
    doc.close(name)
}

/// HTML tolerates attribute names XML does not (`"`, `=`, leading digits).
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::events::Event;
    use quick_xml::Reader;

    fn assert_well_formed(xml: &str) {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("not well-formed at {}: {e}\n{xml}", reader.buffer_position()),
            }
        }
    }

    fn page_of(html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let body: Vec<_> = fragment.root_element().children().filter_map(ElementRef::wrap).collect();
        xhtml_page("Test", &body, None).unwrap()
    }

    #[test]
    fn html_only_markup_becomes_xml() {
        let page = page_of("<p>a\u{a0}b<br>c<img src=x alt='1 < 2'></p><p>open paragraph");
        assert_well_formed(&page);
        assert!(page.contains("<p>a\u{a0}b<br/>c<img alt=\"1 &lt; 2\" src=\"x\"/></p><p>open paragraph</p>"));
    }

    #[test]
    fn entities_are_reescaped() {
        let page = page_of("<p>Fish &amp; chips &lt;3 &nbsp;</p>");
        assert_well_formed(&page);
        assert!(page.contains("<p>Fish &amp; chips &lt;3 \u{a0}</p>"));
    }

    #[test]
    fn comments_and_scripts_are_dropped() {
        let page = page_of("<div><!-- note --><script>if (a < b) {}</script><em>kept</em></div>");
        assert_well_formed(&page);
        assert!(page.contains("<div><em>kept</em></div>"));
    }

    #[test]
    fn skipped_elements_lose_their_content() {
        let fragment = Html::parse_fragment(r#"<article><p>x</p><nav class="clearfix">share</nav></article>"#);
        let body: Vec<_> = fragment.root_element().children().filter_map(ElementRef::wrap).collect();
        let skip = Selector::parse("nav.clearfix").unwrap();
        let page = xhtml_page("Test", &body, Some(&skip)).unwrap();
        assert!(page.contains("<article><p>x</p></article>"));
    }

    #[test]
    fn page_has_namespace_and_title() {
        let page = page_of("<p>x</p>");
        assert!(page.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(page.contains(r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Test</title></head><body>"#));
    }

    #[test]
    fn attributes_are_sorted() {
        let page = page_of(r#"<a title="t" href="/h" class="c" id="i">x</a>"#);
        assert!(page.contains(r#"<a class="c" href="/h" id="i" title="t">x</a>"#));
    }

    #[test]
    fn odd_attribute_names_are_dropped() {
        assert!(is_xml_name("data-id"));
        assert!(is_xml_name("xml:lang"));
        assert!(!is_xml_name("\"quoted\""));
        assert!(!is_xml_name("1st"));
        assert!(!is_xml_name(""));
    }

    #[test]
    fn contents_page_keeps_listing_only() {
        let html = r#"<html><body><p>Intro &nbsp;blurb</p>
            <ul class="book-toc"><li><a href="/a">A &amp; B</a></li><li class="book_toc_container"><ul><li><a href="/c">C<br></a></li></ul></li></ul>
            </body></html>"#;
        let page = contents_page(html, &SiteConfig::default()).unwrap().unwrap();

        assert_well_formed(&page);
        assert!(page.contains("<h1>Table of Contents</h1>"));
        assert!(page.contains(r#"<ul class="book-toc"><li><a href="/a">A &amp; B</a></li>"#));
        assert!(!page.contains("Intro"));

        let tree = crate::listing::parse_listing(&page, &SiteConfig::default()).unwrap();
        let titles: Vec<_> = tree.iter().map(|c| c.title()).collect();
        assert_eq!(titles, ["A & B", "C"]);
    }

    #[test]
    fn contents_page_without_listing_is_none() {
        assert_eq!(contents_page("<p>nothing</p>", &SiteConfig::default()).unwrap(), None);
    }
}
