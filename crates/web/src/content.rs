//! Markdown content pages (terms, privacy).
//!
//! Pages live in `content/pages/*.md` with YAML frontmatter and are compiled
//! into the binary, so the server does not depend on its working directory.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use comrak::{Options, markdown_to_html};
use gray_matter::{Matter, ParsedEntity, engine::YAML};
use serde::Deserialize;

/// Page sources bundled at compile time, by slug.
const BUNDLED_PAGES: &[(&str, &str)] = &[
    ("terms", include_str!("../content/pages/terms.md")),
    ("privacy", include_str!("../content/pages/privacy.md")),
];

/// Metadata for static pages (terms, privacy, etc.)
#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub updated_at: Option<NaiveDate>,
}

/// A rendered page with metadata and HTML content
#[derive(Debug, Clone)]
pub struct Page {
    pub slug: String,
    pub meta: PageMeta,
    pub content_html: String,
}

/// Content store that holds all rendered pages in memory
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    pages: Arc<HashMap<String, Page>>,
}

impl ContentStore {
    /// Render the bundled pages. Pages that fail to parse are logged and
    /// left out.
    #[must_use]
    pub fn new() -> Self {
        let mut pages = HashMap::new();
        for (slug, source) in BUNDLED_PAGES {
            match parse_page(slug, source) {
                Ok(page) => {
                    tracing::debug!(slug, "Loaded page");
                    pages.insert(page.slug.clone(), page);
                }
                Err(e) => tracing::error!(slug, error = %e, "Failed to load page"),
            }
        }
        Self {
            pages: Arc::new(pages),
        }
    }

    /// Get a page by slug
    #[must_use]
    pub fn get_page(&self, slug: &str) -> Option<&Page> {
        self.pages.get(slug)
    }
}

/// Parse one markdown page with frontmatter.
///
/// # Errors
///
/// Returns an error if the frontmatter is missing or malformed.
pub fn parse_page(slug: &str, source: &str) -> Result<Page, ContentError> {
    let matter = Matter::<YAML>::new();
    let parsed: ParsedEntity<PageMeta> = matter
        .parse(source)
        .map_err(|e| ContentError::Parse(format!("Failed to parse frontmatter: {e}")))?;
    let meta = parsed
        .data
        .ok_or_else(|| ContentError::Parse("Missing frontmatter".to_string()))?;

    Ok(Page {
        slug: slug.to_string(),
        meta,
        content_html: render_markdown(&parsed.content),
    })
}

/// Render markdown to HTML with GitHub Flavored Markdown support.
fn render_markdown(content: &str) -> String {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.header_ids = Some(String::new());

    markdown_to_html(content, &options)
}

/// Errors that can occur when loading content
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_pages_load() {
        let store = ContentStore::new();
        let terms = store.get_page("terms").unwrap();
        assert_eq!(terms.meta.title, "Terms of Service");
        assert!(terms.content_html.contains("<h2"));
        assert!(store.get_page("privacy").is_some());
        assert!(store.get_page("refunds").is_none());
    }

    #[test]
    fn test_missing_frontmatter_rejected() {
        assert!(parse_page("bare", "# Just a heading\n").is_err());
    }

    #[test]
    fn test_frontmatter_fields() {
        let page = parse_page(
            "faq",
            "---\ntitle: FAQ\nupdated_at: 2025-03-01\n---\n\nSome *text*.\n",
        )
        .unwrap();
        assert_eq!(page.meta.title, "FAQ");
        assert_eq!(
            page.meta.updated_at,
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
        assert!(page.meta.description.is_none());
        assert!(page.content_html.contains("<em>text</em>"));
    }
}
