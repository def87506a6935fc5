use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Prefixes that mark Wikipedia housekeeping namespaces, not article content
/// (§4.3 step 4). Anchored at the start of the title.
const IGNORE_PATTERN: &str = r"^(Category:|Special:|Wikipedia:|File:|Template_talk:|Talk:|Template:|Portal:|Help:|Main_Page|PubMed_Identifier|Digital_object_identifier|International_Standard_Book_Number)";

fn ignore_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IGNORE_PATTERN).expect("static IGNORE_PATTERN is valid regex"))
}

fn wiki_link_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a[href]").expect("static selector is valid"))
}

fn orphan_table_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("table").expect("static selector is valid"))
}

/// Parses `html` into a deduplicated, filtered list of linked Titles (§4.3).
/// `self_title` is removed from the result (self-loop suppression).
pub fn extract(html: &str, self_title: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    if is_orphan_page(&document) {
        return Vec::new();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();

    for el in document.select(wiki_link_selector()) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Some(title) = href.strip_prefix("/wiki/") else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        if ignore_regex().is_match(title) {
            continue;
        }
        if title == self_title {
            continue;
        }
        if seen.insert(title.to_string()) {
            out.push(title.to_string());
        }
    }

    out
}

fn is_orphan_page(document: &Html) -> bool {
    document.select(orphan_table_selector()).any(|el| {
        el.value()
            .attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c.contains("ambox-Orphan")))
            .unwrap_or(false)
    })
}
