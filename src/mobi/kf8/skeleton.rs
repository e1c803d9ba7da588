//! KF8 skeleton: HTML chunking and AID assignment.
//!
//! KF8 navigation addresses content through ~8 KB chunks anchored by `aid`
//! attributes. The chunker runs one linear tag scan over the HTML, breaks
//! preferentially on closing tags near the target size, assigns each chunk
//! an AID from an increasing counter, and records which tags open and close
//! inside each chunk for the hierarchy pass.

use regex_lite::Regex;

use crate::error::Result;

/// Default target chunk length in bytes.
pub const TARGET_CHUNK_SIZE: usize = 8192;

/// AID digits: the counter renders through this alphabet.
const AID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Open,
    Close,
    SelfClose,
}

/// A tag occurrence found by the scan.
#[derive(Debug, Clone)]
pub struct TagPosition {
    pub name: String,
    /// Byte offset of `<` in the input.
    pub position: usize,
    /// Byte offset just past `>`.
    pub end: usize,
    pub kind: TagKind,
}

/// A contiguous byte range of the HTML.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: usize,
    pub aid: String,
    pub offset: usize,
    pub length: usize,
    pub content: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub open_tags: Vec<TagPosition>,
    pub close_tags: Vec<TagPosition>,
}

impl Chunk {
    /// Opens minus closes: how much deeper the document is after this chunk.
    pub fn net_depth(&self) -> i32 {
        self.open_tags.len() as i32 - self.close_tags.len() as i32
    }
}

/// The chunked HTML structure.
pub struct Skeleton {
    target: usize,
    min: usize,
    max: usize,
    aid_counter: u32,
    pub chunks: Vec<Chunk>,
    pub total_length: usize,
}

impl Skeleton {
    /// Bounds scale with the target: [3/4 · target, 5/4 · target], which for
    /// the default 8192 gives the canonical [6144, 10240] window.
    pub fn new(target_chunk_size: usize) -> Self {
        let target = target_chunk_size.max(64);
        Self {
            target,
            min: target * 3 / 4,
            max: target * 5 / 4,
            aid_counter: 0,
            chunks: Vec::new(),
            total_length: 0,
        }
    }

    /// Split `html` into chunks. Input shorter than the minimum produces a
    /// single chunk.
    pub fn chunk_html(&mut self, html: &str) -> Result<()> {
        let tags = parse_tags(html);

        let mut current = 0;
        while current < html.len() {
            let break_point = self.find_break(html, &tags, current);

            let open_tags: Vec<TagPosition> = tags
                .iter()
                .filter(|t| t.position >= current && t.position < break_point)
                .filter(|t| t.kind == TagKind::Open)
                .cloned()
                .collect();
            let close_tags: Vec<TagPosition> = tags
                .iter()
                .filter(|t| t.position >= current && t.position < break_point)
                .filter(|t| t.kind == TagKind::Close)
                .cloned()
                .collect();

            let aid = self.next_aid();
            self.chunks.push(Chunk {
                id: self.chunks.len(),
                aid,
                offset: current,
                length: break_point - current,
                content: html[current..break_point].to_string(),
                parent: None,
                children: Vec::new(),
                open_tags,
                close_tags,
            });

            current = break_point;
        }

        self.total_length = html.len();
        Ok(())
    }

    /// Next break position after `current`: the closing tag nearest the
    /// target inside the [min, max] window, else the target itself.
    fn find_break(&self, html: &str, tags: &[TagPosition], current: usize) -> usize {
        let target = current + self.target;
        if target >= html.len() {
            return html.len();
        }

        let window_lo = current + self.min;
        let window_hi = current + self.max;

        let mut best: Option<(usize, usize)> = None; // (distance to target, break)
        for tag in tags {
            if tag.position < window_lo {
                continue;
            }
            if tag.position > window_hi {
                break;
            }
            if tag.kind != TagKind::Close {
                continue;
            }
            let distance = tag.position.abs_diff(target);
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, tag.end));
            }
        }

        if let Some((_, break_point)) = best {
            return break_point.min(html.len());
        }

        // No closing tag in the window: break at the target, nudged to a
        // char boundary, clamped to [min, max].
        let mut break_point = target;
        while !html.is_char_boundary(break_point) {
            break_point -= 1;
        }
        if break_point < window_lo {
            break_point = window_lo;
            while break_point < html.len() && !html.is_char_boundary(break_point) {
                break_point += 1;
            }
        }
        break_point.min(html.len())
    }

    fn next_aid(&mut self) -> String {
        let aid = encode_aid(self.aid_counter);
        self.aid_counter += 1;
        aid
    }

    /// Link each chunk to the nearest earlier chunk whose net tag depth is
    /// strictly below the chunk's open-tag count.
    pub fn build_hierarchy(&mut self) {
        for i in 0..self.chunks.len() {
            let depth = self.chunks[i].open_tags.len() as i32;
            for j in (0..i).rev() {
                if self.chunks[j].net_depth() < depth {
                    self.chunks[i].parent = Some(j);
                    self.chunks[j].children.push(i);
                    break;
                }
            }
        }
    }

    /// Concatenate all chunks, inserting each chunk's ` aid="…"` into its
    /// first real opening tag. `<!DOCTYPE`, comments, and processing
    /// instructions never carry anchors.
    pub fn assign_aid_attributes(&self) -> String {
        let mut result = String::with_capacity(self.total_length + self.chunks.len() * 12);

        for chunk in &self.chunks {
            match aid_insert_position(&chunk.content) {
                Some(insert_pos) => {
                    result.push_str(&chunk.content[..insert_pos]);
                    result.push_str(&format!(" aid=\"{}\"", chunk.aid));
                    result.push_str(&chunk.content[insert_pos..]);
                }
                None => result.push_str(&chunk.content),
            }
        }

        result
    }
}

/// Render a counter value with the AID alphabet.
pub fn encode_aid(mut n: u32) -> String {
    let base = AID_ALPHABET.len() as u32;
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(AID_ALPHABET[(n % base) as usize]);
        n /= base;
    }
    digits.reverse();
    String::from_utf8(digits).expect("alphabet is ASCII")
}

/// Scan for `<name…>`, `</name>`, and `<name…/>` occurrences.
pub fn parse_tags(html: &str) -> Vec<TagPosition> {
    let re = Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*(?:\s[^>]*)?>").expect("static pattern");

    re.find_iter(html)
        .map(|m| {
            let text = m.as_str();
            let kind = if text.starts_with("</") {
                TagKind::Close
            } else if text.ends_with("/>") {
                TagKind::SelfClose
            } else {
                TagKind::Open
            };
            let name_start = if kind == TagKind::Close { 2 } else { 1 };
            let name_end = text[name_start..]
                .find(|c: char| !c.is_ascii_alphanumeric())
                .map(|i| name_start + i)
                .unwrap_or(text.len() - 1);
            TagPosition {
                name: text[name_start..name_end].to_ascii_lowercase(),
                position: m.start(),
                end: m.end(),
                kind,
            }
        })
        .collect()
}

/// Where to inject ` aid="…"` inside the chunk's first opening tag: right
/// before the first whitespace after the tag name, the `/>` of a
/// self-closing tag, or the terminating `>`. `None` when the chunk holds no
/// taggable element.
fn aid_insert_position(content: &str) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut search = 0;

    while let Some(rel) = memchr::memchr(b'<', &bytes[search..]) {
        let tag_start = search + rel;
        let rest = &content[tag_start..];

        if rest.starts_with("</") {
            search = tag_start + 2;
            continue;
        }
        if rest.starts_with("<!DOCTYPE")
            || rest.starts_with("<!doctype")
            || rest.starts_with("<!--")
            || rest.starts_with("<?xml")
        {
            search = tag_start + 2;
            continue;
        }
        if rest.len() < 2 || !rest.as_bytes()[1].is_ascii_alphabetic() {
            search = tag_start + 1;
            continue;
        }

        // Inside the tag: stop at whitespace, "/>", or ">".
        let mut i = tag_start + 1;
        while i < bytes.len() {
            let b = bytes[i];
            if b.is_ascii_whitespace() || b == b'>' {
                return Some(i);
            }
            if b == b'/' && bytes.get(i + 1) == Some(&b'>') {
                return Some(i);
            }
            i += 1;
        }
        return None;
    }

    None
}
