//! Navigation index (INDX/TAGX/CNCX) generation for the table of contents.
//!
//! One INDX record holds a 192-byte header, the TAGX tag-definition table,
//! the CNCX string table (labels, each VWI-length-prefixed), and one IDXT
//! entry per TOC entry. The entry payload is a sequence of VWIs in TAGX tag
//! order.

use regex_lite::Regex;

use super::varint;
use crate::error::Result;

pub const INDX_HEADER_SIZE: usize = 192;

/// Tag table entry: id plus control byte.
#[derive(Debug, Clone, Copy)]
pub struct TagxEntry {
    pub tag_id: u32,
    pub control: u8,
}

/// An index entry: text offset plus tag values keyed by TAGX position.
#[derive(Debug, Clone)]
struct IdxtEntry {
    offset: u32,
    values: Vec<Vec<u32>>,
}

/// A complete INDX structure ready for encoding.
pub struct Indx {
    tagx: Vec<TagxEntry>,
    cncx: Vec<String>,
    entries: Vec<IdxtEntry>,
}

impl Indx {
    pub fn new() -> Self {
        Self {
            tagx: Vec::new(),
            cncx: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn add_tag(&mut self, tag_id: u32, control: u8) {
        self.tagx.push(TagxEntry { tag_id, control });
    }

    /// Append a string to CNCX, returning its index.
    pub fn add_string(&mut self, s: &str) -> u32 {
        self.cncx.push(s.to_string());
        (self.cncx.len() - 1) as u32
    }

    /// Append an entry; `values[i]` holds the values for TAGX tag `i`.
    pub fn add_entry(&mut self, offset: u32, values: Vec<Vec<u32>>) {
        self.entries.push(IdxtEntry { offset, values });
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Encode into one PalmDB record payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let tagx = self.encode_tagx();
        let cncx = self.encode_cncx();

        let mut out = Vec::with_capacity(INDX_HEADER_SIZE + tagx.len() + cncx.len());

        // Header: TAGX offset, id, header length, reserved, index type,
        // index offset (start of CNCX), record count, record size, encoding,
        // then zero padding out to 192 bytes.
        out.extend_from_slice(&(INDX_HEADER_SIZE as u32).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(INDX_HEADER_SIZE as u32).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&((INDX_HEADER_SIZE + tagx.len()) as u32).to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&65001u32.to_be_bytes());
        out.resize(INDX_HEADER_SIZE, 0);

        out.extend_from_slice(&tagx);
        out.extend_from_slice(&cncx);

        for entry in &self.entries {
            out.extend_from_slice(&varint::encode_forward(entry.offset));
            for (i, _tag) in self.tagx.iter().enumerate() {
                if let Some(values) = entry.values.get(i) {
                    for &value in values {
                        out.extend_from_slice(&varint::encode_forward(value));
                    }
                }
            }
        }

        Ok(out)
    }

    fn encode_tagx(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.tagx.len() * 4);
        out.extend_from_slice(&(self.tagx.len() as u32).to_be_bytes());
        for tag in &self.tagx {
            out.push(tag.control);
            let id = tag.tag_id.to_be_bytes();
            out.extend_from_slice(&id[1..4]);
        }
        out
    }

    fn encode_cncx(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for s in &self.cncx {
            out.extend_from_slice(&varint::encode_forward(s.len() as u32));
            out.extend_from_slice(s.as_bytes());
        }
        out
    }
}

impl Default for Indx {
    fn default() -> Self {
        Self::new()
    }
}

/// One flattened TOC entry with its resolved position.
#[derive(Debug, Clone)]
pub struct TocIndexEntry {
    pub label: String,
    pub href: String,
    pub level: u32,
    pub parent_index: i32,
    pub offset: u32,
}

/// Builds the TOC index: collects entries, resolves their text offsets, and
/// emits the INDX record.
#[derive(Default)]
pub struct TocIndexBuilder {
    entries: Vec<TocIndexEntry>,
    record_sizes: Vec<usize>,
}

impl TocIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record sizes establish the byte-offset → record-index map.
    pub fn set_text_records(&mut self, records: &[Vec<u8>]) {
        self.record_sizes = records.iter().map(Vec::len).collect();
    }

    /// Add an entry. The parent is the latest earlier entry with a strictly
    /// lower level, or −1.
    pub fn add_entry(&mut self, label: &str, href: &str, level: u32, offset: u32) {
        let parent_index = self
            .entries
            .iter()
            .rposition(|e| e.level < level)
            .map(|i| i as i32)
            .unwrap_or(-1);

        self.entries.push(TocIndexEntry {
            label: label.to_string(),
            href: href.to_string(),
            level,
            parent_index,
            offset,
        });
    }

    pub fn entries(&self) -> &[TocIndexEntry] {
        &self.entries
    }

    /// Which record a byte offset falls into, given the prefix sums of
    /// record lengths. Offsets past the end land in the last record.
    pub fn record_for_offset(&self, offset: u32) -> usize {
        let mut running = 0u32;
        for (i, &size) in self.record_sizes.iter().enumerate() {
            running += size as u32;
            if offset < running {
                return i;
            }
        }
        self.record_sizes.len().saturating_sub(1)
    }

    /// Byte offset of the element carrying `href`'s anchor in the rendered
    /// HTML: the position of the tag with a matching `id` or `name`
    /// attribute. Returns 0 when the anchor is absent.
    pub fn find_offset_for_href(html: &str, href: &str) -> u32 {
        let target = href.strip_prefix('#').unwrap_or(href);
        let escaped = regex_escape(target);

        for attr in ["id", "name"] {
            let pattern = format!(r#"<[^>]+{attr}=['"]{escaped}['"]"#);
            if let Ok(re) = Regex::new(&pattern) {
                if let Some(m) = re.find(html) {
                    return m.start() as u32;
                }
            }
        }
        0
    }

    /// Emit the INDX record. Four tags, control byte 0x01 each: CNCX label
    /// reference, text offset, level, parent index.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut indx = Indx::new();
        indx.add_tag(1, 0x01);
        indx.add_tag(2, 0x01);
        indx.add_tag(3, 0x01);
        indx.add_tag(4, 0x01);

        for entry in &self.entries {
            let label_ref = indx.add_string(&entry.label);
            indx.add_entry(
                entry.offset,
                vec![
                    vec![label_ref],
                    vec![entry.offset],
                    vec![entry.level],
                    vec![entry.parent_index as u32],
                ],
            );
        }

        indx.encode()
    }
}

/// Quote regex metacharacters in a literal string.
fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_punctuation() {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    #[test]
    fn header_layout() {
        let mut builder = TocIndexBuilder::new();
        builder.add_entry("Chapter 1", "#ch1", 1, 10);
        builder.add_entry("Chapter 2", "#ch2", 1, 90);
        let record = builder.build().unwrap();

        // TAGX offset at +0, header length 192, encoding 65001.
        assert_eq!(u32_at(&record, 0), 192);
        assert_eq!(u32_at(&record, 8), 192);
        assert_eq!(u32_at(&record, 24), 2); // entry count
        assert_eq!(u32_at(&record, 32), 65001);

        // TAGX: 4 tags, control 0x01, 24-bit tag ids 1..4.
        let tagx = &record[192..];
        assert_eq!(u32_at(tagx, 0), 4);
        assert_eq!(tagx[4], 0x01);
        assert_eq!(&tagx[5..8], &[0, 0, 1]);
        assert_eq!(tagx[8], 0x01);
        assert_eq!(&tagx[9..12], &[0, 0, 2]);

        // Index offset points past TAGX (4 + 4*4 = 20 bytes).
        assert_eq!(u32_at(&record, 20), 212);
        // CNCX starts with VWI(9) then the first label.
        assert_eq!(record[212], 0x89);
        assert_eq!(&record[213..222], b"Chapter 1");
    }

    #[test]
    fn parent_resolution() {
        let mut builder = TocIndexBuilder::new();
        builder.add_entry("Part", "#p1", 1, 0);
        builder.add_entry("Chapter", "#c1", 2, 100);
        builder.add_entry("Section", "#s1", 3, 200);
        builder.add_entry("Chapter", "#c2", 2, 300);
        builder.add_entry("Part", "#p2", 1, 400);

        let parents: Vec<i32> = builder.entries().iter().map(|e| e.parent_index).collect();
        assert_eq!(parents, vec![-1, 0, 1, 0, -1]);

        // Every parent refers to a prior entry of strictly lower level.
        for entry in builder.entries() {
            if entry.parent_index >= 0 {
                let parent = &builder.entries()[entry.parent_index as usize];
                assert!(parent.level < entry.level);
            }
        }
    }

    #[test]
    fn offset_to_record_mapping() {
        let mut builder = TocIndexBuilder::new();
        builder.set_text_records(&[vec![0; 100], vec![0; 50], vec![0; 25]]);
        assert_eq!(builder.record_for_offset(0), 0);
        assert_eq!(builder.record_for_offset(99), 0);
        assert_eq!(builder.record_for_offset(100), 1);
        assert_eq!(builder.record_for_offset(149), 1);
        assert_eq!(builder.record_for_offset(150), 2);
        assert_eq!(builder.record_for_offset(9999), 2);
    }

    #[test]
    fn href_offsets_found_in_order() {
        let html =
            r#"<body><h2 id="ch1">Chapter 1</h2><p>text</p><h2 id="ch2">Chapter 2</h2></body>"#;
        let first = TocIndexBuilder::find_offset_for_href(html, "#ch1");
        let second = TocIndexBuilder::find_offset_for_href(html, "#ch2");
        assert!(first > 0);
        assert!(second > first);
        assert_eq!(TocIndexBuilder::find_offset_for_href(html, "#missing"), 0);
    }

    #[test]
    fn name_attribute_also_matches() {
        let html = r#"<p>intro</p><a name="note1">note</a>"#;
        let offset = TocIndexBuilder::find_offset_for_href(html, "#note1");
        assert_eq!(offset, 12);
    }

    #[test]
    fn idxt_entry_values() {
        let mut builder = TocIndexBuilder::new();
        builder.add_entry("A", "#a", 1, 5);
        let record = builder.build().unwrap();

        // After CNCX ("A" with VWI length = 2 bytes at 212) the IDXT entry
        // follows: VWI(5), VWI(0 label ref), VWI(5), VWI(1), VWI(-1 as u32).
        let idxt = &record[214..];
        assert_eq!(idxt[0], 0x85);
        assert_eq!(idxt[1], 0x80);
        assert_eq!(idxt[2], 0x85);
        assert_eq!(idxt[3], 0x81);
        let (parent, n) = crate::mobi::varint::decode_forward(&idxt[4..]).unwrap();
        assert_eq!(parent, u32::MAX); // -1
        assert_eq!(n, 5);
    }
}
