use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Tags that survive formatted mode. Everything else (span included) is
/// unwrapped: the tag goes, its children stay where it was.
const ALLOWED_TAGS: &[&str] = &[
    // structure
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote", "div",
    // styling
    "strong", "b", "em", "i", "u", "br",
    // links
    "a",
];

const ELLIPSIS: &str = "...";

/// Flatten markup to a single line of text: tags dropped, entities decoded,
/// whitespace runs collapsed to one space.
///
/// Decoding can surface new markup (`&lt;b&gt;`) or new entities
/// (`&amp;amp;`), so flattening repeats until the text stops changing.
pub fn plain_text(html: &str) -> String {
    let mut current = flatten(html);
    loop {
        let next = flatten(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn flatten(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    let joined = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep structural and emphasis markup, strip every attribute except `a[href]`.
pub fn formatted(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    // Unwrap first, then peel: a disallowed tag around a lone <div> must not
    // leave a wrapper that a second run would remove.
    let unwrapped = serialize_fragment(html, false);
    let peeled = serialize_fragment(&unwrapped, true);
    BLANK_LINES_RE.replace_all(&peeled, "\n").trim().to_string()
}

/// Cut to `max` characters and mark the cut. `max == 0` means no limit.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str(ELLIPSIS);
    cut
}

fn serialize_fragment(html: &str, peel: bool) -> String {
    let fragment = Html::parse_fragment(html);
    let mut root = fragment.root_element();
    if peel {
        while let Some(inner) = sole_div(root) {
            root = inner;
        }
    }
    let mut out = String::with_capacity(html.len());
    write_children(root, &mut out);
    out
}

/// The only element child of `el` when it is a `<div>` and nothing but
/// whitespace surrounds it.
fn sole_div(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let mut found = None;
    for child in el.children() {
        match child.value() {
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Comment(_) => {}
            Node::Element(e) if e.name() == "div" && found.is_none() => {
                found = ElementRef::wrap(child);
            }
            _ => return None,
        }
    }
    found
}

fn write_children(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            // <template> contents hang off a fragment node under the element.
            Node::Fragment => {
                for inner in child.children() {
                    write_node(inner.value(), ElementRef::wrap(inner), out);
                }
            }
            node => write_node(node, ElementRef::wrap(child), out),
        }
    }
}

fn write_node(node: &Node, el: Option<ElementRef<'_>>, out: &mut String) {
    match (node, el) {
        (Node::Text(text), _) => push_escaped(out, text, false),
        (Node::Element(_), Some(el)) => write_element(el, out),
        _ => {}
    }
}

fn write_element(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    if !ALLOWED_TAGS.contains(&name) {
        write_children(el, out);
        return;
    }

    out.push('<');
    out.push_str(name);
    if name == "a" {
        if let Some(href) = el.value().attr("href") {
            out.push_str(" href=\"");
            push_escaped(out, href, true);
            out.push('"');
        }
    }
    out.push('>');

    if name == "br" {
        return;
    }
    write_children(el, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn push_escaped(out: &mut String, text: &str, in_attr: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !in_attr => out.push_str("&lt;"),
            '>' if !in_attr => out.push_str("&gt;"),
            '"' if in_attr => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

// ── Tests ──
