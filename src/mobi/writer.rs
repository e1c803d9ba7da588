//! MOBI 6 file assembly.
//!
//! The writer lays records out in a fixed order: header (record 0, written
//! last), compressed text, the optional TOC index, cover, thumbnail, the
//! remaining manifest images in sorted id order, then the mandatory
//! FLIS/FCIS/EOF tail. Record 0 references indices that only exist once the
//! tail is in place, so it starts as a placeholder and is patched in before
//! the PalmDB is flushed.

use std::collections::HashMap;
use std::io::Write;

use log::warn;
use regex_lite::{Captures, Regex};

use crate::book::{Book, Metadata};
use crate::error::{Error, Result};
use crate::util::UidSource;

use super::headers::{Compression, MobiHeader, NULL_INDEX};
use super::index::TocIndexBuilder;
use super::palmdb::{transliterate_name, PalmDbWriter};
use super::palmdoc::{self, RECORD_SIZE};
use super::ExthWriter;

/// Options recognized by the MOBI/KF8 writers.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub compression: Compression,
    pub with_exth: bool,
    pub title_override: Option<String>,
    /// Cover image bytes; also cloned as the thumbnail record.
    pub cover_image: Option<Vec<u8>>,
    pub generate_toc: bool,
    pub enable_chunking: bool,
    pub target_chunk_size: usize,
    /// Text shorter than this is stored uncompressed.
    pub compression_threshold: usize,
    /// Joint MOBI6+KF8 output with a BOUNDARY record.
    pub kf8_boundary: bool,
    /// Pin the id generator for reproducible output.
    pub uid_seed: Option<u32>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: Compression::PalmDoc,
            with_exth: true,
            title_override: None,
            cover_image: None,
            generate_toc: true,
            enable_chunking: true,
            target_chunk_size: super::kf8::TARGET_CHUNK_SIZE,
            compression_threshold: RECORD_SIZE,
            kf8_boundary: false,
            uid_seed: None,
        }
    }
}

/// Where everything landed during assembly; consumed by the header patch.
pub(crate) struct Mobi6Layout {
    pub text_len: usize,
    pub text_record_count: usize,
    pub compression: Compression,
    pub toc_index: u32,
    pub first_image_index: u32,
    pub flis_index: u32,
    pub fcis_index: u32,
}

/// Writes a [`Book`] as a standalone MOBI 6 file.
pub struct MobiWriter<'a> {
    book: &'a Book,
    options: WriteOptions,
}

/// Write a book as MOBI 6 into `sink`.
pub fn write_mobi6<W: Write>(book: &Book, options: WriteOptions, sink: &mut W) -> Result<()> {
    MobiWriter::with_options(book, options).write(sink)
}

impl<'a> MobiWriter<'a> {
    pub fn new(book: &'a Book) -> Self {
        Self::with_options(book, WriteOptions::default())
    }

    pub fn with_options(book: &'a Book, options: WriteOptions) -> Self {
        Self { book, options }
    }

    pub fn write<W: Write>(&self, sink: &mut W) -> Result<()> {
        let mut uids = self.uid_source();
        let mut palm = PalmDbWriter::new(&self.book_name(), &mut uids);

        let layout = self.assemble(&mut palm)?;
        let record0 = self.build_record0(&layout, None, uids.next_nonzero())?;
        palm.set_record(0, record0);

        palm.write(sink)
    }

    pub(crate) fn options(&self) -> &WriteOptions {
        &self.options
    }

    pub(crate) fn uid_source(&self) -> UidSource {
        match self.options.uid_seed {
            Some(seed) => UidSource::from_seed(seed),
            None => UidSource::from_entropy(),
        }
    }

    /// Database name: the title override or metadata title, defaulted when
    /// the input carries none.
    pub(crate) fn book_name(&self) -> String {
        let name = self
            .options
            .title_override
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(self.book.metadata.title.as_str());
        if name.is_empty() {
            warn!("book has no title, using \"unknown\"");
            return "unknown".to_string();
        }
        name.to_string()
    }

    /// Build every record after record 0 and return the layout. Record 0 is
    /// added as an empty placeholder to keep indices stable.
    pub(crate) fn assemble(&self, palm: &mut PalmDbWriter) -> Result<Mobi6Layout> {
        // Pass 1 establishes the rewritten text size; pass 2 produces the
        // bytes that are actually split into records. Image indices are
        // relative to FirstImageIndex, so both passes see the same map and
        // must agree byte for byte.
        let sizing_pass = self.resolve_image_sources(&self.book.content);
        let resolved = self.resolve_image_sources(&self.book.content);
        if sizing_pass.len() != resolved.len() {
            return Err(Error::Structure(
                "image resolution passes produced different lengths".into(),
            ));
        }

        let text = resolved.as_bytes();
        let compression = self.effective_compression(text.len());
        let text_records = split_text_records(text, compression);
        let text_record_count = text_records.len();

        palm.add_record(Vec::new(), 0, 0); // record 0 placeholder

        for record in &text_records {
            let uid = palm.num_records() as u32;
            palm.add_record(record.clone(), 0, uid);
        }

        // TOC index record.
        let mut toc_index = NULL_INDEX;
        if self.options.generate_toc && !self.book.toc.is_empty() {
            let mut builder = TocIndexBuilder::new();
            builder.set_text_records(&text_records);
            for entry in self.book.flat_toc() {
                let offset = TocIndexBuilder::find_offset_for_href(&resolved, &entry.href);
                builder.add_entry(&entry.label, &entry.href, entry.level, offset);
            }
            toc_index = palm.num_records() as u32;
            palm.add_record(builder.build()?, 0, toc_index);
        }

        // Images: cover, thumbnail clone, then the rest of the manifest.
        let has_cover = self.options.cover_image.is_some();
        let mut first_image_index = NULL_INDEX;
        if has_cover || self.book.has_images() {
            first_image_index = palm.num_records() as u32;

            if let Some(ref cover) = self.options.cover_image {
                let uid = palm.num_records() as u32;
                palm.add_record(cover.clone(), 0, uid);
                // Thumbnail resizing is stubbed: the cover doubles as its
                // own thumbnail.
                let uid = palm.num_records() as u32;
                palm.add_record(cover.clone(), 0, uid);
            }

            let skip = if has_cover {
                self.book.metadata.cover_id.as_deref()
            } else {
                None
            };
            for id in self.book.image_ids(skip) {
                if let Some(resource) = self.book.get_resource(id) {
                    let uid = palm.num_records() as u32;
                    palm.add_record(resource.data.clone(), 0, uid);
                }
            }
        }

        // Mandatory structural tail.
        let flis_index = palm.num_records() as u32;
        palm.add_record(flis_record(), 0, flis_index);
        let fcis_index = palm.num_records() as u32;
        palm.add_record(fcis_record(text.len() as u32), 0, fcis_index);
        let uid = palm.num_records() as u32;
        palm.add_record(vec![0, 0, 0, 0], 0, uid);

        if palm.num_records() > usize::from(u16::MAX) {
            return Err(Error::Encode(format!(
                "record count {} exceeds u16",
                palm.num_records()
            )));
        }

        Ok(Mobi6Layout {
            text_len: text.len(),
            text_record_count,
            compression,
            toc_index,
            first_image_index,
            flis_index,
            fcis_index,
        })
    }

    /// Build record 0: MOBI header, optional EXTH, ASCII full name.
    /// `kf8_boundary` is the BOUNDARY record index of a joint file; it caps
    /// LastContentRec and adds the EXTH 121 record.
    pub(crate) fn build_record0(
        &self,
        layout: &Mobi6Layout,
        kf8_boundary: Option<u32>,
        unique_id: u32,
    ) -> Result<Vec<u8>> {
        if layout.text_record_count > usize::from(u16::MAX) {
            return Err(Error::Encode(format!(
                "text record count {} exceeds u16",
                layout.text_record_count
            )));
        }

        let mut header = MobiHeader::new(
            layout.text_len as u32,
            layout.text_record_count as u16,
            unique_id,
        );
        header.compression = layout.compression;
        header.first_content_rec = 1;
        header.last_content_rec = match kf8_boundary {
            Some(boundary) => (boundary - 1) as u16,
            None => layout.text_record_count as u16,
        };
        header.first_image_index = layout.first_image_index;
        header.first_non_book_index = layout.first_image_index;
        header.flis_index = layout.flis_index;
        header.fcis_index = layout.fcis_index;
        header.indx_record_offset = layout.toc_index;

        let name = transliterate_name(&self.book_name());

        let mut exth = ExthWriter::new();
        if self.options.with_exth {
            let metadata = self.effective_metadata();
            exth.add_from_metadata(&metadata, &self.book_name());

            if self.options.cover_image.is_some() {
                exth.add_cover_offset(0);
                exth.add_thumbnail_offset(1);
                exth.add_has_fake_cover(0);
                exth.add_k8_cover_image("kindle:embed:0001");
                header.exth_flags |= 0x10;
            }
            if let Some(boundary) = kf8_boundary {
                exth.add_kf8_boundary(boundary);
            }
        } else {
            header.exth_flags = 0;
        }

        header.full_name_offset = 248 + exth.total_len() as u32;
        header.full_name_length = name.len() as u32;

        let mut record0 = Vec::with_capacity(248 + exth.total_len() + name.len() + 2);
        header.write_into(&mut record0);
        exth.write_into(&mut record0)?;
        record0.extend_from_slice(name.as_bytes());
        record0.extend_from_slice(&[0, 0]);

        Ok(record0)
    }

    /// Metadata with missing required fields defaulted.
    fn effective_metadata(&self) -> Metadata {
        let mut metadata = self.book.metadata.clone();
        if metadata.title.is_empty() {
            metadata.title = "unknown".to_string();
        }
        if metadata.language.is_empty() {
            warn!("book has no language, using \"en\"");
            metadata.language = "en".to_string();
        }
        metadata
    }

    fn effective_compression(&self, text_len: usize) -> Compression {
        effective_compression(&self.options, text_len)
    }

    /// Rewrite `src="id"` references into `recindex="NNNNN"`, the 1-based
    /// image record index relative to FirstImageIndex: cover 1, thumbnail 2,
    /// manifest images next in sorted id order.
    pub(crate) fn resolve_image_sources(&self, content: &str) -> String {
        let mut image_map: HashMap<&str, u32> = HashMap::new();
        let cover_id = self.book.metadata.cover_id.as_deref();
        let has_cover = self.options.cover_image.is_some();

        let mut next = 1u32;
        if has_cover {
            image_map.insert(cover_id.unwrap_or("cover.jpg"), next);
            next += 2; // the thumbnail sits at 2 and is never referenced
        }
        let skip = if has_cover { cover_id } else { None };
        for id in self.book.image_ids(skip) {
            image_map.insert(id, next);
            next += 1;
        }

        let re = Regex::new(r#"src=(["'])([^"']+)["']"#).expect("static pattern");
        re.replace_all(content, |caps: &Captures| {
            let quote = &caps[1];
            let url = caps[2].strip_prefix('#').unwrap_or(&caps[2]);
            match image_map.get(url) {
                Some(index) => format!("recindex={quote}{index:05}{quote}"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
    }
}

/// Compression to actually use: short text is stored raw.
pub(crate) fn effective_compression(options: &WriteOptions, text_len: usize) -> Compression {
    if text_len < options.compression_threshold {
        return Compression::None;
    }
    options.compression
}

/// Split text into 4096-byte records, compressing each independently.
/// ExtraRecordFlags stays 0, so records carry no trailing entries.
pub(crate) fn split_text_records(text: &[u8], compression: Compression) -> Vec<Vec<u8>> {
    let mut records = Vec::with_capacity(text.len() / RECORD_SIZE + 1);
    let mut pos = 0;
    while pos < text.len() {
        let end = (pos + RECORD_SIZE).min(text.len());
        let chunk = &text[pos..end];
        records.push(match compression {
            Compression::PalmDoc => palmdoc::compress_record(chunk),
            Compression::None => chunk.to_vec(),
        });
        pos = end;
    }
    records
}

/// The fixed 36-byte FLIS record.
pub(crate) fn flis_record() -> Vec<u8> {
    let mut out = Vec::with_capacity(36);
    out.extend_from_slice(b"FLIS");
    out.extend_from_slice(&8u32.to_be_bytes());
    out.extend_from_slice(&65u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&NULL_INDEX.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&3u16.to_be_bytes());
    out.extend_from_slice(&3u32.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&NULL_INDEX.to_be_bytes());
    debug_assert_eq!(out.len(), 36);
    out
}

/// The fixed 44-byte FCIS record; carries the uncompressed text size.
pub(crate) fn fcis_record(text_size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(44);
    out.extend_from_slice(b"FCIS");
    out.extend_from_slice(&20u32.to_be_bytes());
    out.extend_from_slice(&16u32.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&text_size.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&32u32.to_be_bytes());
    out.extend_from_slice(&8u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    debug_assert_eq!(out.len(), 44);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Author, TocEntry};

    fn minimal_book() -> Book {
        let mut book = Book::new();
        book.metadata.title = "Test Book".into();
        book.metadata.language = "en".into();
        book.metadata.authors.push(Author {
            first_name: "John".into(),
            last_name: "Doe".into(),
            ..Default::default()
        });
        book.content =
            "<html><body><h2 id=\"ch1\">Chapter 1</h2><p>One paragraph.</p></body></html>"
                .to_string();
        book.toc.push(TocEntry::new("ch1", "Chapter 1", "#ch1"));
        book
    }

    fn options() -> WriteOptions {
        WriteOptions {
            uid_seed: Some(99),
            ..WriteOptions::default()
        }
    }

    #[test]
    fn structural_records() {
        assert_eq!(flis_record().len(), 36);
        assert_eq!(&flis_record()[0..4], b"FLIS");
        let fcis = fcis_record(0x0102_0304);
        assert_eq!(fcis.len(), 44);
        assert_eq!(&fcis[0..4], b"FCIS");
        assert_eq!(&fcis[20..24], &[1, 2, 3, 4]);
    }

    #[test]
    fn minimal_book_layout() {
        let book = minimal_book();
        let mut out = Vec::new();
        write_mobi6(&book, options(), &mut out).unwrap();

        assert!(out.len() >= 78);
        assert_eq!(&out[60..68], b"BOOKMOBI");

        // Records: header, one text record, TOC INDX, FLIS, FCIS, EOF.
        let num_records = u16::from_be_bytes([out[76], out[77]]);
        assert_eq!(num_records, 6);

        // Record 0 starts right after the index table; "MOBI" at +0x10.
        let record0 = 78 + 8 * num_records as usize;
        assert_eq!(&out[record0 + 0x10..record0 + 0x14], b"MOBI");
        assert_eq!(
            u32::from_be_bytes([
                out[record0 + 0x14],
                out[record0 + 0x15],
                out[record0 + 0x16],
                out[record0 + 0x17]
            ]),
            232
        );
    }

    #[test]
    fn minimal_book_without_extras() {
        // PalmDB with no TOC and no images: record 0 sits at 78 + 8 * N.
        let mut book = minimal_book();
        book.toc.clear();
        let opts = WriteOptions {
            compression: Compression::None,
            generate_toc: false,
            ..options()
        };
        let mut out = Vec::new();
        write_mobi6(&book, opts, &mut out).unwrap();

        let num_records = u16::from_be_bytes([out[76], out[77]]) as usize;
        assert_eq!(num_records, 5); // header, text, FLIS, FCIS, EOF
        let record0 = 78 + 8 * num_records;
        assert_eq!(&out[record0 + 0x10..record0 + 0x14], b"MOBI");
    }

    #[test]
    fn fixed_seed_output_is_reproducible() {
        let book = minimal_book();
        let mut a = Vec::new();
        let mut b = Vec::new();
        write_mobi6(&book, options(), &mut a).unwrap();
        write_mobi6(&book, options(), &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn no_images_leaves_sentinels() {
        let book = minimal_book();
        let writer = MobiWriter::with_options(&book, options());
        let mut uids = writer.uid_source();
        let mut palm = PalmDbWriter::new("t", &mut uids);
        let layout = writer.assemble(&mut palm).unwrap();
        assert_eq!(layout.first_image_index, NULL_INDEX);

        let record0 = writer.build_record0(&layout, None, 1).unwrap();
        let at = |o: usize| {
            u32::from_be_bytes([record0[o], record0[o + 1], record0[o + 2], record0[o + 3]])
        };
        assert_eq!(at(0x6C), NULL_INDEX);
        assert_eq!(at(0x50), NULL_INDEX);
    }

    #[test]
    fn empty_toc_leaves_indx_sentinel() {
        let mut book = minimal_book();
        book.toc.clear();
        let writer = MobiWriter::with_options(&book, options());
        let mut uids = writer.uid_source();
        let mut palm = PalmDbWriter::new("t", &mut uids);
        let layout = writer.assemble(&mut palm).unwrap();
        assert_eq!(layout.toc_index, NULL_INDEX);
    }

    #[test]
    fn recindex_rewriting_two_images() {
        let mut book = minimal_book();
        book.metadata.cover_id = Some("cover.jpg".into());
        book.add_resource("cover.jpg", "cover.jpg", "image/jpeg", vec![0xFF, 0xD8]);
        book.add_resource("fig1.png", "fig1.png", "image/png", vec![0x89, 0x50]);
        book.content = "<p><img src=\"cover.jpg\"/><img src=\"fig1.png\"/></p>".to_string();

        let opts = WriteOptions {
            cover_image: Some(vec![0xFF, 0xD8]),
            ..options()
        };
        let writer = MobiWriter::with_options(&book, opts);
        let resolved = writer.resolve_image_sources(&book.content);
        assert!(resolved.contains("recindex=\"00001\""));
        assert!(resolved.contains("recindex=\"00003\""));
        assert!(!resolved.contains("src="));

        // Rewriting is a fixed point: a second pass over already rewritten
        // text changes nothing.
        assert_eq!(writer.resolve_image_sources(&resolved), resolved);
    }

    #[test]
    fn unknown_src_left_alone() {
        let book = minimal_book();
        let writer = MobiWriter::with_options(&book, options());
        let html = "<img src=\"http://example.com/x.png\"/>";
        assert_eq!(writer.resolve_image_sources(html), html);
    }

    #[test]
    fn image_records_follow_cover_thumbnail_order() {
        let mut book = minimal_book();
        book.toc.clear();
        book.metadata.cover_id = Some("cover.jpg".into());
        book.add_resource("cover.jpg", "cover.jpg", "image/jpeg", b"COVER".to_vec());
        book.add_resource("fig1.png", "fig1.png", "image/png", b"FIG1".to_vec());

        let opts = WriteOptions {
            cover_image: Some(b"COVER".to_vec()),
            generate_toc: false,
            compression: Compression::None,
            ..options()
        };
        let writer = MobiWriter::with_options(&book, opts);
        let mut uids = writer.uid_source();
        let mut palm = PalmDbWriter::new("t", &mut uids);
        let layout = writer.assemble(&mut palm).unwrap();

        // header + 1 text record, then cover/thumbnail/fig1.
        assert_eq!(layout.first_image_index, 2);
        assert_eq!(layout.flis_index, 5);
        assert_eq!(layout.fcis_index, 6);
        assert_eq!(palm.num_records(), 8);
    }

    #[test]
    fn tiny_text_stored_raw() {
        let book = minimal_book();
        let writer = MobiWriter::with_options(&book, options());
        // Content is shorter than the 4096-byte threshold.
        assert_eq!(
            writer.effective_compression(book.content.len()),
            Compression::None
        );
        assert_eq!(writer.effective_compression(10_000), Compression::PalmDoc);
    }

    #[test]
    fn default_title_and_language() {
        let mut book = minimal_book();
        book.metadata.title = String::new();
        book.metadata.language = String::new();
        let writer = MobiWriter::with_options(&book, options());
        assert_eq!(writer.book_name(), "unknown");
        let metadata = writer.effective_metadata();
        assert_eq!(metadata.language, "en");

        // The conversion still succeeds.
        let mut out = Vec::new();
        write_mobi6(&book, options(), &mut out).unwrap();
        assert_eq!(&out[60..64], b"BOOK");
    }
}
