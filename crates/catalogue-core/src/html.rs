//! Anchor extraction from archive HTML pages.
//!
//! Everything here is pure string-in, structs-out. URL resolution and the
//! work/not-work decision happen in [`crate::works`].

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::model::{AuthorEntry, AuthorLink};

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static HEADINGS: Lazy<Selector> = Lazy::new(|| Selector::parse("h2, h3, h4").unwrap());
static INDEX_ITEMS: Lazy<Selector> = Lazy::new(|| Selector::parse("h2, h3, a[href]").unwrap());
static CATEGORY_OR_AUTHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.category, span.author").unwrap());
static SUBJECT_HEADINGS: Lazy<Selector> = Lazy::new(|| Selector::parse("h4").unwrap());
static NAMED_ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[name]").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[alt]").unwrap());

static WORKS_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(works|writings|articles|texts)\b").unwrap());

/// Elements that end the inline run following an anchor.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "hr", "br", "li", "ul", "ol", "table", "tr", "td", "h1", "h2", "h3", "h4", "h5",
    "h6", "blockquote",
];

/// An anchor as found on the page, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    /// Anchor text with whitespace collapsed.
    pub title: String,
    /// The `href` attribute, unresolved.
    pub href: String,
    /// An adjacent icon marks this link as recommended reading.
    pub recommended: bool,
}

/// Anchors under works headings, and every anchor on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub section: Vec<RawLink>,
    pub all: Vec<RawLink>,
}

/// Anchors grouped under one `h4` subject heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSection {
    pub subject: String,
    pub links: Vec<RawLink>,
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn raw_link(a: ElementRef) -> Option<RawLink> {
    let href = a.value().attr("href")?.trim();
    let title = element_text(a);
    if href.is_empty() || title.is_empty() {
        return None;
    }
    Some(RawLink {
        title,
        href: href.to_string(),
        recommended: is_recommended(a),
    })
}

fn alt_is_recommended(img: ElementRef) -> bool {
    img.value()
        .attr("alt")
        .is_some_and(|alt| alt.to_lowercase().contains("recommended"))
}

/// Look for a "recommended" icon after the anchor, up to the next block
/// element or the next anchor. Failing that, a list item or table cell
/// holding only this anchor may carry the icon anywhere inside it.
fn is_recommended(a: ElementRef) -> bool {
    for sibling in a.next_siblings() {
        let Some(el) = ElementRef::wrap(sibling) else {
            continue;
        };
        let name = el.value().name();
        if name == "img" {
            if alt_is_recommended(el) {
                return true;
            }
            continue;
        }
        if name == "a" || BLOCK_ELEMENTS.contains(&name) {
            break;
        }
        if el.select(&IMG).any(alt_is_recommended) {
            return true;
        }
    }

    a.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|p| BLOCK_ELEMENTS.contains(&p.value().name()))
        .filter(|p| matches!(p.value().name(), "li" | "td"))
        .is_some_and(|p| p.select(&ANCHOR).count() == 1 && p.select(&IMG).any(alt_is_recommended))
}

fn heading_rank(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Anchors in the siblings following `heading`, up to `stop`.
fn links_after<F>(heading: ElementRef, mut stop: F) -> Vec<RawLink>
where
    F: FnMut(ElementRef) -> bool,
{
    let mut links = Vec::new();
    for sibling in heading.next_siblings() {
        let Some(el) = ElementRef::wrap(sibling) else {
            continue;
        };
        if stop(el) {
            break;
        }
        if el.value().name() == "a" {
            links.extend(raw_link(el));
        } else {
            links.extend(el.select(&ANCHOR).filter_map(raw_link));
        }
    }
    links
}

/// Collect anchors from a page.
///
/// `section` holds anchors following headings named like "Works",
/// "Writings", "Articles" or "Texts", up to the next heading of the same or
/// higher rank.
pub fn extract_page_links(html: &str) -> PageLinks {
    let doc = Html::parse_document(html);

    let mut section = Vec::new();
    for heading in doc.select(&HEADINGS) {
        if !WORKS_HEADING.is_match(&element_text(heading)) {
            continue;
        }
        let rank = heading_rank(heading.value().name()).unwrap_or(6);
        section.extend(links_after(heading, |el| {
            heading_rank(el.value().name()).is_some_and(|r| r <= rank)
        }));
    }

    let all = doc.select(&ANCHOR).filter_map(raw_link).collect();

    PageLinks { section, all }
}

/// Split a page into subjects at `h4` headings that carry a named anchor.
/// Headings without a name (navigation) are skipped.
pub fn extract_subject_sections(html: &str) -> Vec<SubjectSection> {
    let doc = Html::parse_document(html);
    doc.select(&SUBJECT_HEADINGS)
        .filter(|h| h.select(&NAMED_ANCHOR).next().is_some())
        .filter_map(|h| {
            let subject = element_text(h);
            if subject.is_empty() {
                return None;
            }
            let links = links_after(h, |el| el.value().name() == "h4");
            Some(SubjectSection { subject, links })
        })
        .collect()
}

/// Parse the archive's author index.
///
/// Every anchor with text becomes an entry, tagged with the text of the
/// nearest preceding `h2`/`h3`. Relative links climbing with `../` are
/// skipped; absolute `http` links are kept verbatim.
pub fn parse_author_index(html: &str, base: &Url) -> Vec<AuthorEntry> {
    let doc = Html::parse_document(html);
    let mut category = String::new();
    let mut entries = Vec::new();

    for el in doc.select(&INDEX_ITEMS) {
        let name = el.value().name();
        if name == "h2" || name == "h3" {
            category = element_text(el);
            continue;
        }

        let Some(href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        let text = element_text(el);
        if text.is_empty() || href.is_empty() {
            continue;
        }

        let url = if href.starts_with("http") {
            href.to_string()
        } else if href.starts_with("../") {
            continue;
        } else {
            match base.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            }
        };

        entries.push(AuthorEntry {
            text,
            href: href.to_string(),
            url,
            category: category.clone(),
        });
    }

    entries
}

/// Direct text of an element, without its descendants' text.
fn own_text(el: ElementRef) -> String {
    let text: String = el
        .children()
        .filter_map(|c| c.value().as_text().map(|t| String::from(&**t)))
        .collect();
    collapse_whitespace(&text)
}

/// Parse `span.author` anchors from the archive's by-name author listing.
///
/// Only hrefs ending in `index.htm` and not climbing with `../` are kept.
/// The category is the nearest enclosing or preceding `div.category`.
pub fn parse_author_spans(html: &str) -> Vec<AuthorLink> {
    let doc = Html::parse_document(html);
    let mut category = String::from("unknown");
    let mut authors = Vec::new();

    for el in doc.select(&CATEGORY_OR_AUTHOR) {
        if el.value().name() == "div" {
            let text = own_text(el);
            category = if text.is_empty() {
                "unknown".to_string()
            } else {
                text
            };
            continue;
        }

        let Some(a) = el.select(&ANCHOR).next() else {
            continue;
        };
        let Some(href) = a.value().attr("href").map(str::trim) else {
            continue;
        };
        let name = element_text(a);
        if name.is_empty() || !href.ends_with("index.htm") || href.contains("../") {
            continue;
        }
        authors.push(AuthorLink {
            name,
            href: href.to_string(),
            category: category.clone(),
        });
    }

    authors
}
