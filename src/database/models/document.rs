use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::ContentHandle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub page_count: u32,
    pub content_handle: ContentHandle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub document_id: Uuid,
    pub requested_by: Uuid,
    pub content_handle: ContentHandle,
    pub content_type: String,
    pub size: i64,
    pub annotation_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Page counts above this are treated as corrupt.
const MAX_PAGES: u32 = 100_000;

/// Counts pages of a PDF; other content is a single page.
///
/// The `/Count` of the page tree root wins when present, since page objects
/// may sit in compressed object streams. Otherwise each `/Type /Page`
/// dictionary is counted.
pub fn count_pages(content_type: &str, content: &[u8]) -> u32 {
    if !content_type.eq_ignore_ascii_case("application/pdf") && !content.starts_with(b"%PDF") {
        return 1;
    }

    let from_tree = type_entries(content, b"/Pages")
        .filter_map(|pos| enclosing_dict(content, pos))
        .filter_map(count_entry)
        .filter(|count| (1..=MAX_PAGES).contains(count))
        .max();
    let objects = type_entries(content, b"/Page").count() as u32;

    from_tree.unwrap_or(objects).clamp(1, MAX_PAGES)
}

/// Offsets of every `/Type <name>` entry whose value is exactly `name`.
fn type_entries<'a>(content: &'a [u8], name: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    find_all(content, b"/Type").filter(move |&pos| {
        let value = skip_whitespace(&content[pos + b"/Type".len()..]);
        value.starts_with(name) && value.get(name.len()).map_or(true, |&b| is_delimiter(b))
    })
}

/// The `<< ... >>` span around `pos`, without descending into nested dictionaries.
fn enclosing_dict(content: &[u8], pos: usize) -> Option<&[u8]> {
    let open = content[..pos].windows(2).rposition(|w| w == b"<<")?;
    let close = content[pos..].windows(2).position(|w| w == b">>")?;
    Some(&content[open..pos + close])
}

fn count_entry(dict: &[u8]) -> Option<u32> {
    find_all(dict, b"/Count").find_map(|pos| {
        let value = skip_whitespace(&dict[pos + b"/Count".len()..]);
        let digits = value.iter().take_while(|b| b.is_ascii_digit()).count();
        std::str::from_utf8(&value[..digits]).ok()?.parse().ok()
    })
}

fn find_all<'a>(haystack: &'a [u8], needle: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(move |(_, window)| *window == needle)
        .map(|(pos, _)| pos)
}

fn skip_whitespace(bytes: &[u8]) -> &[u8] {
    let skipped = bytes.iter().take_while(|b| is_pdf_whitespace(**b)).count();
    &bytes[skipped..]
}

fn is_pdf_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    is_pdf_whitespace(b) || matches!(b, b'/' | b'<' | b'>' | b'[' | b']' | b'(' | b')' | b'{' | b'}' | b'%')
}
