//! Error types for listing parsing and package emission.

use thiserror::Error;

/// Structural problems in a table of contents listing.
///
/// Every variant is fatal: a tree that failed to build never reaches the
/// package emitter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    #[error("Invalid listing selector '{0}'")]
    InvalidSelector(String),

    #[error("No table of contents matching '{0}' found in listing")]
    MissingListing(String),

    #[error("Chapter entry {position} has no anchor")]
    MissingAnchor { position: usize },

    #[error("Chapter '{title}' has no link target")]
    MissingTarget { title: String },

    #[error("Chapter link '{url}' is not a path on the site")]
    UnsafeTarget { url: String },

    #[error("Chapter linking to '{url}' has an empty title")]
    EmptyTitle { url: String },

    #[error("Nested list at entry {position} has no preceding chapter to attach to")]
    OrphanContainer { position: usize },

    #[error("Chapter '{title}' has more than one nested list")]
    DuplicateContainer { title: String },

    #[error("Nested list under chapter '{title}' has no <ul> child")]
    MissingNestedList { title: String },

    #[error("Unrecognized nesting marker class '{class}' at entry {position}")]
    UnknownNesting { class: String, position: usize },

    #[error("Two chapters resolve to the same local file '{path}'")]
    DuplicatePath { path: String },
}

/// Failures while serializing the package metadata.
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML writing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
