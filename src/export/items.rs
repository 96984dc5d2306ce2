use std::sync::LazyLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::debug;

static ITEM_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<item(?:\s[^>]*)?>").unwrap());

const ITEM_CLOSE: &str = "</item>";

/// Fields of one `<item>`, exactly as found. `None` means the tag was absent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub post_name: Option<String>,
    pub post_id: Option<String>,
    pub post_type: Option<String>,
    pub post_date: Option<String>,
    pub pub_date: Option<String>,
    pub post_parent: Option<String>,
    pub category: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    PostName,
    PostId,
    PostType,
    PostDate,
    PubDate,
    PostParent,
    Category,
    Excerpt,
    Content,
    AttachmentUrl,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Field> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"wp:post_name" => Some(Field::PostName),
            b"wp:post_id" => Some(Field::PostId),
            b"wp:post_type" => Some(Field::PostType),
            b"wp:post_date" => Some(Field::PostDate),
            b"pubDate" => Some(Field::PubDate),
            b"wp:post_parent" => Some(Field::PostParent),
            b"category" => Some(Field::Category),
            b"excerpt:encoded" => Some(Field::Excerpt),
            b"content:encoded" => Some(Field::Content),
            b"wp:attachment_url" => Some(Field::AttachmentUrl),
            _ => None,
        }
    }
}

impl RawItem {
    /// First occurrence wins; later duplicates (extra categories) are ignored.
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::PostName => &mut self.post_name,
            Field::PostId => &mut self.post_id,
            Field::PostType => &mut self.post_type,
            Field::PostDate => &mut self.post_date,
            Field::PubDate => &mut self.pub_date,
            Field::PostParent => &mut self.post_parent,
            Field::Category => &mut self.category,
            Field::Excerpt => &mut self.excerpt,
            Field::Content => &mut self.content,
            Field::AttachmentUrl => &mut self.attachment_url,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

/// Split an export document into `<item>` fragments. Channel metadata before
/// the first item is skipped; each fragment ends at its `</item>`, or runs to
/// the next `<item>` when the close tag is missing.
pub fn split_items(xml: &str) -> Vec<&str> {
    ITEM_OPEN_RE
        .split(xml)
        .skip(1)
        .map(|chunk| match chunk.find(ITEM_CLOSE) {
            Some(end) => &chunk[..end],
            None => chunk,
        })
        .collect()
}

/// Read the known fields out of one item fragment. Squarespace exports are
/// not always well-formed, so end-name checking is off and a reader error
/// just ends the scan with whatever was collected.
pub fn read_item(fragment: &str) -> RawItem {
    let mut reader = Reader::from_str(fragment);
    reader.config_mut().check_end_names = false;

    let mut item = RawItem::default();
    let mut current: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = Field::from_tag(e.name().as_ref());
                text.clear();
            }
            Ok(Event::Text(e)) if current.is_some() => match e.unescape() {
                Ok(t) => text.push_str(&t),
                // Undeclared HTML entities (&nbsp;) are left for the sanitizer
                Err(_) => text.push_str(&String::from_utf8_lossy(&e)),
            },
            Ok(Event::CData(e)) if current.is_some() => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::End(_)) => {
                if let Some(field) = current.take() {
                    item.set(field, std::mem::take(&mut text));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(
                    "Stopping item scan at byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            _ => {}
        }
    }

    item
}

// ── Tests ──
