//! Document assembly: fold ordered per-page texts into one Markdown document.
//!
//! Output layout:
//!
//! ```text
//! # {title}
//! {preamble}            (optional)
//! {marker for page N}   (optional, only when page N has text)
//! {text of page N}
//! ...
//! ```
//!
//! A page whose text is empty contributes nothing, not even its marker, and
//! markers always carry the true page ordinal.

use crate::config::PageMarker;
use std::path::PathBuf;

/// One page block of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    pub ordinal: usize,
    pub text: String,
    /// Rendered as `<!-- Image: path -->` after the page text (summary documents).
    pub image: Option<PathBuf>,
}

/// A titled, ordered sequence of page texts.
#[derive(Debug, Clone, Default)]
pub struct Document {
    title: String,
    preamble: Option<String>,
    pages: Vec<DocumentPage>,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Text placed right under the title, before the first page.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    /// Append a page. Pages must be pushed in ordinal order.
    pub fn push_page(&mut self, ordinal: usize, text: impl Into<String>) {
        self.push(DocumentPage {
            ordinal,
            text: text.into(),
            image: None,
        });
    }

    pub fn push(&mut self, page: DocumentPage) {
        debug_assert!(
            self.pages.last().map_or(true, |p| p.ordinal < page.ordinal),
            "pages out of order"
        );
        self.pages.push(page);
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn pages(&self) -> &[DocumentPage] {
        &self.pages
    }

    /// Number of pages that will appear in the body.
    pub fn non_empty_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.text.trim().is_empty()).count()
    }

    pub fn render(&self, marker: PageMarker) -> String {
        let mut lines: Vec<String> = vec![format!("# {}\n", self.title)];
        if let Some(preamble) = &self.preamble {
            lines.push(format!("{preamble}\n"));
        }

        for page in &self.pages {
            if page.text.trim().is_empty() {
                continue;
            }
            if let Some(m) = marker.render(page.ordinal) {
                lines.push(m);
            }
            lines.push(page.text.clone());
            if let Some(image) = &page.image {
                lines.push(format!("\n<!-- Image: {} -->\n", image.display()));
            }
        }

        let mut out = lines.join("\n");
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}
