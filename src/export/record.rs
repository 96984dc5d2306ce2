use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::items::{read_item, RawItem};
use crate::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Post,
    Page,
    Attachment,
    Other,
}

impl RecordKind {
    pub fn from_post_type(post_type: &str) -> Self {
        match post_type.trim() {
            "post" => RecordKind::Post,
            "page" => RecordKind::Page,
            "attachment" => RecordKind::Attachment,
            _ => RecordKind::Other,
        }
    }

    /// Posts and pages carry content; everything else is media or noise.
    pub fn is_content(self) -> bool {
        matches!(self, RecordKind::Post | RecordKind::Page)
    }
}

/// How excerpt and body markup is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Flat text; the body is cut at `max_chars` (0 = no cut).
    Plain { max_chars: usize },
    /// Allow-listed markup, never cut.
    Formatted,
}

/// One normalized export item. Field names double as the plain table columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub post_id: String,
    pub title: String,
    pub post_type: String,
    pub post_date: String,
    pub category: String,
    pub link: String,
    pub excerpt: String,
    pub content: String,
    pub attachment_url: String,
    /// `wp:post_parent` of attachments. Not a table column, so it only
    /// survives when records are reconciled straight from the export.
    #[serde(skip)]
    pub post_parent: String,
}

impl ExportRecord {
    pub fn kind(&self) -> RecordKind {
        RecordKind::from_post_type(&self.post_type)
    }

    fn is_blank(&self) -> bool {
        self.post_id.is_empty() && self.title.is_empty() && self.link.is_empty()
    }
}

/// Normalize one item fragment. Returns `None` only when id, title and link
/// are all empty.
pub fn extract_record(fragment: &str, mode: BodyMode) -> Option<ExportRecord> {
    from_raw(read_item(fragment), mode)
}

fn from_raw(raw: RawItem, mode: BodyMode) -> Option<ExportRecord> {
    let post_type = trimmed(raw.post_type);
    let kind = RecordKind::from_post_type(&post_type);

    let attachment_url = match kind {
        RecordKind::Attachment => trimmed(raw.attachment_url),
        _ => String::new(),
    };

    let record = ExportRecord {
        post_id: digits_only(trimmed(raw.post_id)),
        title: raw.title.as_deref().map(sanitize::plain_text).unwrap_or_default(),
        link: resolve_link(raw.link.as_deref(), raw.post_name.as_deref()),
        post_date: resolve_date(raw.post_date.as_deref(), raw.pub_date.as_deref()),
        category: trimmed(raw.category),
        excerpt: raw
            .excerpt
            .as_deref()
            .map(|html| render_body(html, mode, false))
            .unwrap_or_default(),
        content: raw
            .content
            .as_deref()
            .map(|html| render_body(html, mode, true))
            .unwrap_or_default(),
        attachment_url,
        post_parent: parent_id(trimmed(raw.post_parent)),
        post_type,
    };

    if record.is_blank() {
        None
    } else {
        Some(record)
    }
}

fn render_body(html: &str, mode: BodyMode, truncate: bool) -> String {
    match mode {
        BodyMode::Plain { max_chars } => {
            let text = sanitize::plain_text(html);
            if truncate {
                sanitize::truncate_chars(&text, max_chars)
            } else {
                text
            }
        }
        BodyMode::Formatted => sanitize::formatted(html),
    }
}

/// Explicit link first, else the post name as a root-relative path.
fn resolve_link(link: Option<&str>, post_name: Option<&str>) -> String {
    if let Some(link) = link.map(str::trim).filter(|l| !l.is_empty()) {
        return link.to_string();
    }
    match post_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) if name.starts_with('/') => name.to_string(),
        Some(name) => format!("/{}", name),
        None => String::new(),
    }
}

/// `wp:post_date` first, else `pubDate`. An RFC 2822 pubDate is rewritten in
/// the post-date layout so the column sorts consistently.
fn resolve_date(post_date: Option<&str>, pub_date: Option<&str>) -> String {
    if let Some(date) = post_date.map(str::trim).filter(|d| !d.is_empty()) {
        return date.to_string();
    }
    match pub_date.map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => DateTime::parse_from_rfc2822(date)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| date.to_string()),
        None => String::new(),
    }
}

fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn digits_only(id: String) -> String {
    if id.chars().all(|c| c.is_ascii_digit()) {
        id
    } else {
        String::new()
    }
}

// WordPress writes 0 for "no parent"
fn parent_id(parent: String) -> String {
    match digits_only(parent) {
        p if p == "0" => String::new(),
        p => p,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: BodyMode = BodyMode::Plain { max_chars: 1000 };

    #[test]
    fn kind_classifies_post_types() {
        assert_eq!(RecordKind::from_post_type("post"), RecordKind::Post);
        assert_eq!(RecordKind::from_post_type(" page "), RecordKind::Page);
        assert_eq!(RecordKind::from_post_type("attachment"), RecordKind::Attachment);
        assert_eq!(RecordKind::from_post_type("nav_menu_item"), RecordKind::Other);
        assert!(!RecordKind::Attachment.is_content());
    }

    #[test]
    fn link_falls_back_to_post_name() {
        assert_eq!(resolve_link(Some(" /a "), Some("b")), "/a");
        assert_eq!(resolve_link(Some(""), Some("blog/b")), "/blog/b");
        assert_eq!(resolve_link(None, Some("/blog/b")), "/blog/b");
        assert_eq!(resolve_link(None, None), "");
    }

    #[test]
    fn date_falls_back_to_pub_date() {
        assert_eq!(
            resolve_date(Some("2019-05-01 10:00:00"), Some("Sat, 15 Jul 2017 18:30:00 +0000")),
            "2019-05-01 10:00:00"
        );
        assert_eq!(
            resolve_date(None, Some("Sat, 15 Jul 2017 18:30:00 +0000")),
            "2017-07-15 18:30:00"
        );
        assert_eq!(resolve_date(None, Some("sometime in 2017")), "sometime in 2017");
        assert_eq!(resolve_date(None, None), "");
    }

    #[test]
    fn attachment_url_only_on_attachments() {
        let post = extract_record(
            "<wp:post_id>1</wp:post_id><wp:post_type>post</wp:post_type>\
             <wp:attachment_url>https://x/a.jpg</wp:attachment_url>",
            PLAIN,
        )
        .unwrap();
        assert_eq!(post.attachment_url, "");

        let media = extract_record(
            "<wp:post_id>2</wp:post_id><wp:post_type>attachment</wp:post_type>\
             <wp:post_parent>1</wp:post_parent>\
             <wp:attachment_url>https://x/a.jpg</wp:attachment_url>",
            PLAIN,
        )
        .unwrap();
        assert_eq!(media.attachment_url, "https://x/a.jpg");
        assert_eq!(media.post_parent, "1");
        assert_eq!(media.kind(), RecordKind::Attachment);
    }

    #[test]
    fn keeps_any_record_with_id_title_or_link() {
        let cases = [
            "<wp:post_id>9</wp:post_id>",
            "<title>Only a title</title>",
            "<link>/only-link</link>",
            "<wp:post_name>only-name</wp:post_name>",
        ];
        for case in cases {
            assert!(extract_record(case, PLAIN).is_some(), "{case}");
        }
    }

    #[test]
    fn drops_record_without_id_title_or_link() {
        let fragment = "<wp:post_type>post</wp:post_type><wp:status>draft</wp:status>\
                        <content:encoded><![CDATA[<p>orphan body</p>]]></content:encoded>";
        assert_eq!(extract_record(fragment, PLAIN), None);
        assert_eq!(extract_record("<wp:post_id>abc</wp:post_id>", PLAIN), None);
    }

    #[test]
    fn plain_mode_truncates_body_but_not_excerpt() {
        let long = "word ".repeat(50);
        let fragment = format!(
            "<title>T</title>\
             <excerpt:encoded><![CDATA[<p>{long}</p>]]></excerpt:encoded>\
             <content:encoded><![CDATA[<p>{long}</p>]]></content:encoded>"
        );
        let record = extract_record(&fragment, BodyMode::Plain { max_chars: 20 }).unwrap();
        assert_eq!(record.content, "word word word word ...");
        assert_eq!(record.excerpt, long.trim());
    }

    #[test]
    fn formatted_mode_keeps_markup() {
        let fragment = "<title>T</title>\
             <content:encoded><![CDATA[<p class=\"x\">Hi <span>there</span></p>]]></content:encoded>";
        let record = extract_record(fragment, BodyMode::Formatted).unwrap();
        assert_eq!(record.content, "<p>Hi there</p>");
    }
}
