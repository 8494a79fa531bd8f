//! EPUB 2 package metadata: the NCX navigation map, the OPF manifest and
//! spine, and the `META-INF/container.xml` pointer.
//!
//! Every chapter-numbering scheme comes from a single pre-order walk of the
//! [`ChapterTree`], so `navPoint-<n>` in the NCX and `part<n-1>` in the OPF
//! always name the same chapter.

use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::debug;

use crate::chapter::{Chapter, ChapterTree, ChapterVisitor};
use crate::config::BookMetadata;
use crate::error::EmitError;

pub const NCX_FILE: &str = "toc.ncx";
pub const OPF_FILE: &str = "content.opf";
pub const CONTAINER_FILE: &str = "META-INF/container.xml";
pub const MIMETYPE_FILE: &str = "mimetype";
pub const MIMETYPE: &str = "application/epub+zip";

const NCX_NAMESPACE: &str = "http://www.daisy.org/z3986/2005/ncx/";
const OPF_NAMESPACE: &str = "http://www.idpf.org/2007/opf";
const CONTAINER_NAMESPACE: &str = "urn:oasis:names:tc:opendocument:xmlns:container";

const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

const BOOK_ID: &str = "BookId";
const CONTENTS_ID: &str = "contents";
pub(crate) const CONTENTS_LABEL: &str = "Table of Contents";

/// Play order of the first chapter; the contents page takes order 1.
const FIRST_CHAPTER_PLAY_ORDER: usize = 2;

/// Manifest id of the chapter at `index` in pre-order.
pub fn part_id(index: usize) -> String {
    format!("part{}", index + 1)
}

/// Shared writer settings for every XML document in the package.
pub(crate) struct XmlDocument {
    writer: Writer<Vec<u8>>,
}

impl XmlDocument {
    pub(crate) fn new() -> Result<Self, EmitError> {
        Self::with_writer(Writer::new_with_indent(Vec::new(), b' ', 2))
    }

    /// No indentation, for documents with mixed content where added
    /// whitespace would change the text.
    pub(crate) fn compact() -> Result<Self, EmitError> {
        Self::with_writer(Writer::new(Vec::new()))
    }

    fn with_writer(mut writer: Writer<Vec<u8>>) -> Result<Self, EmitError> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(Self { writer })
    }

    pub(crate) fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), EmitError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    pub(crate) fn close(&mut self, name: &str) -> Result<(), EmitError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), EmitError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Empty(start))?;
        Ok(())
    }

    pub(crate) fn text(&mut self, text: &str) -> Result<(), EmitError> {
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(escape(text))))?;
        Ok(())
    }

    pub(crate) fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<(), EmitError> {
        self.open(name, attrs)?;
        self.text(text)?;
        self.close(name)
    }

    pub(crate) fn finish(self) -> Result<String, EmitError> {
        let mut xml = String::from_utf8(self.writer.into_inner())?;
        xml.push('\n');
        Ok(xml)
    }
}

/// Serializes a chapter tree into the package metadata files.
pub struct PackageEmitter<'a> {
    tree: &'a ChapterTree,
    book: &'a BookMetadata,
    contents_path: &'a str,
    year: i32,
}

impl<'a> PackageEmitter<'a> {
    /// `contents_path` is the package-relative path of the table of contents
    /// page; `year` ends the copyright range.
    pub fn new(tree: &'a ChapterTree, book: &'a BookMetadata, contents_path: &'a str, year: i32) -> Self {
        Self {
            tree,
            book,
            contents_path,
            year,
        }
    }

    /// The `toc.ncx` navigation map.
    pub fn navigation_map(&self) -> Result<String, EmitError> {
        let mut doc = XmlDocument::new()?;
        let depth = self.tree.max_depth().to_string();

        doc.open("ncx", &[("xmlns", NCX_NAMESPACE), ("version", "2005-1")])?;

        doc.open("head", &[])?;
        doc.empty("meta", &[("name", "dtb:uid"), ("content", self.book.identifier.as_str())])?;
        doc.empty("meta", &[("name", "dtb:depth"), ("content", depth.as_str())])?;
        doc.empty("meta", &[("name", "dtb:totalPageCount"), ("content", "0")])?;
        doc.empty("meta", &[("name", "dtb:maxPageNumber"), ("content", "0")])?;
        doc.close("head")?;

        doc.open("docTitle", &[])?;
        doc.text_element("text", &[], &self.book.title)?;
        doc.close("docTitle")?;

        doc.open("navMap", &[])?;
        write_nav_point(&mut doc, CONTENTS_ID, 1, CONTENTS_LABEL, self.contents_path)?;
        doc.close("navPoint")?;

        let mut nav = NavPointWriter {
            doc,
            play_order: FIRST_CHAPTER_PLAY_ORDER,
        };
        self.tree.walk(&mut nav)?;
        let mut doc = nav.doc;

        doc.close("navMap")?;
        doc.close("ncx")?;

        debug!("Navigation map written for {} chapters", self.tree.len());
        doc.finish()
    }

    /// The `content.opf` package document: metadata, manifest and spine.
    pub fn manifest(&self) -> Result<String, EmitError> {
        let mut doc = XmlDocument::new()?;
        let parts = self.parts();

        doc.open(
            "package",
            &[
                ("xmlns", OPF_NAMESPACE),
                ("unique-identifier", BOOK_ID),
                ("version", "2.0"),
            ],
        )?;

        doc.open(
            "metadata",
            &[
                ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
                ("xmlns:dcterms", "http://purl.org/dc/terms/"),
                ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
                ("xmlns:opf", OPF_NAMESPACE),
            ],
        )?;
        doc.text_element("dc:title", &[], &self.book.title)?;
        doc.text_element("dc:language", &[("xsi:type", "dcterms:RFC3066")], &self.book.language)?;
        doc.text_element(
            "dc:identifier",
            &[("id", BOOK_ID), ("opf:scheme", "URI")],
            &self.book.identifier,
        )?;
        doc.text_element("dc:description", &[], &self.book.description)?;
        doc.text_element("dc:creator", &[], &self.book.author)?;
        doc.text_element("dc:rights", &[], &self.book.rights(self.year))?;
        doc.close("metadata")?;

        doc.open("manifest", &[])?;
        doc.empty("item", &[("id", "ncx"), ("href", NCX_FILE), ("media-type", NCX_MEDIA_TYPE)])?;
        doc.empty(
            "item",
            &[("id", CONTENTS_ID), ("href", self.contents_path), ("media-type", XHTML_MEDIA_TYPE)],
        )?;
        for (id, chapter) in &parts {
            let href = chapter.local_path();
            doc.empty("item", &[("id", id.as_str()), ("href", href.as_str()), ("media-type", XHTML_MEDIA_TYPE)])?;
        }
        doc.close("manifest")?;

        doc.open("spine", &[("toc", "ncx")])?;
        doc.empty("itemref", &[("idref", CONTENTS_ID)])?;
        for (id, _) in &parts {
            doc.empty("itemref", &[("idref", id.as_str())])?;
        }
        doc.close("spine")?;

        doc.close("package")?;

        debug!("Manifest written with {} parts", parts.len());
        doc.finish()
    }

    /// The fixed `META-INF/container.xml` pointing at the manifest.
    pub fn container(&self) -> Result<String, EmitError> {
        container_document()
    }

    /// All four metadata files as (package path, bytes), in archive order.
    pub fn files(&self) -> Result<Vec<(&'static str, Vec<u8>)>, EmitError> {
        Ok(vec![
            (MIMETYPE_FILE, MIMETYPE.as_bytes().to_vec()),
            (CONTAINER_FILE, self.container()?.into_bytes()),
            (OPF_FILE, self.manifest()?.into_bytes()),
            (NCX_FILE, self.navigation_map()?.into_bytes()),
        ])
    }

    fn parts(&self) -> Vec<(String, &'a Chapter)> {
        self.tree
            .iter()
            .enumerate()
            .map(|(index, chapter)| (part_id(index), chapter))
            .collect()
    }
}

pub fn container_document() -> Result<String, EmitError> {
    let mut doc = XmlDocument::new()?;
    doc.open("container", &[("version", "1.0"), ("xmlns", CONTAINER_NAMESPACE)])?;
    doc.open("rootfiles", &[])?;
    doc.empty("rootfile", &[("full-path", OPF_FILE), ("media-type", OPF_MEDIA_TYPE)])?;
    doc.close("rootfiles")?;
    doc.close("container")?;
    doc.finish()
}

/// Opens a `navPoint` and writes its label and content; the caller closes it.
fn write_nav_point(doc: &mut XmlDocument, id: &str, play_order: usize, label: &str, src: &str) -> Result<(), EmitError> {
    let order = play_order.to_string();
    doc.open("navPoint", &[("id", id), ("playOrder", order.as_str())])?;
    doc.open("navLabel", &[])?;
    doc.text_element("text", &[], label)?;
    doc.close("navLabel")?;
    doc.empty("content", &[("src", src)])
}

struct NavPointWriter {
    doc: XmlDocument,
    play_order: usize,
}

impl ChapterVisitor for NavPointWriter {
    type Error = EmitError;

    fn enter(&mut self, chapter: &Chapter) -> Result<(), EmitError> {
        let id = format!("navPoint-{}", self.play_order);
        write_nav_point(&mut self.doc, &id, self.play_order, chapter.title(), &chapter.local_path())?;
        self.play_order += 1;
        Ok(())
    }

    fn exit(&mut self, _chapter: &Chapter) -> Result<(), EmitError> {
        self.doc.close("navPoint")
    }
}
