use crate::records::{Category, Document};

/// Maximum number of characters in a summary preview before truncation.
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Turn a title into a URL-friendly slug.
///
/// Lowercases, turns whitespace runs into `-`, drops everything that is
/// not a word character or hyphen, then collapses and trims hyphens.
///
/// ```
/// use docshelf::text_util::slugify;
///
/// assert_eq!(slugify("The Impact of AI on Modern Society"), "the-impact-of-ai-on-modern-society");
/// assert_eq!(slugify("  C++ -- a tour!  "), "c-a-tour");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.trim().to_lowercase().chars() {
        if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        } else if c.is_alphanumeric() || c == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        }
    }
    slug
}

/// Shorten a summary for list views, appending `...` when cut.
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// The navigation route of a document: `/<category>/<slug>` for its first
/// category, `/uncategorized/<slug>` when it has none.
pub fn document_route(document: &Document, categories: &[Category]) -> String {
    let slug = slugify(&document.title);
    match categories.first() {
        Some(category) => format!("/{}/{slug}", category.name),
        None => format!("/uncategorized/{slug}"),
    }
}
