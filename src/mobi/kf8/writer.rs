//! KF8 (MOBI 8) file assembly.
//!
//! Two flavors. The pure-KF8 file is the default: AID-annotated text,
//! images, and an FDST record behind a version-8 header. The joint file
//! carries a complete MOBI 6 section, a `BOUNDARY` record, and the KF8
//! section after it; record 0's EXTH names the boundary index so readers
//! can pick their side.

use std::io::Write;

use crate::book::Book;
use crate::error::{Error, Result};
use crate::mobi::headers::{MobiHeader, NULL_INDEX};
use crate::mobi::palmdb::{transliterate_name, PalmDbWriter};
use crate::mobi::writer::{effective_compression, split_text_records, MobiWriter, WriteOptions};
use crate::mobi::ExthWriter;

use super::fdst::Fdst;
use super::skeleton::Skeleton;

/// Write a book as a pure KF8 file into `sink`.
pub fn write_kf8<W: Write>(book: &Book, options: WriteOptions, sink: &mut W) -> Result<()> {
    Kf8Writer::with_options(book, options).write(sink)
}

/// Write a joint MOBI6+KF8 file into `sink`.
pub fn write_joint<W: Write>(book: &Book, options: WriteOptions, sink: &mut W) -> Result<()> {
    Kf8Writer::with_options(book, options).write_joint(sink)
}

/// Writes KF8 and joint files.
pub struct Kf8Writer<'a> {
    book: &'a Book,
    mobi: MobiWriter<'a>,
}

impl<'a> Kf8Writer<'a> {
    pub fn new(book: &'a Book) -> Self {
        Self::with_options(book, WriteOptions::default())
    }

    pub fn with_options(book: &'a Book, options: WriteOptions) -> Self {
        Self {
            book,
            mobi: MobiWriter::with_options(book, options),
        }
    }

    /// Chunk the HTML and annotate it with AIDs; the FDST table covers the
    /// pre-annotation chunk ranges. Without chunking the whole text is one
    /// flow.
    fn prepare_content(&self) -> Result<(String, Fdst)> {
        let options = self.mobi.options();
        if options.enable_chunking && !self.book.content.is_empty() {
            let mut skeleton = Skeleton::new(options.target_chunk_size);
            skeleton.chunk_html(&self.book.content)?;
            skeleton.build_hierarchy();
            let content = skeleton.assign_aid_attributes();
            let fdst = Fdst::from_skeleton(&skeleton);
            Ok((content, fdst))
        } else {
            let mut fdst = Fdst::new();
            if !self.book.content.is_empty() {
                fdst.add_entry(0, self.book.content.len() as u32);
            }
            Ok((self.book.content.clone(), fdst))
        }
    }

    /// Pure KF8: header, text, images in manifest order, FDST.
    pub fn write<W: Write>(&self, sink: &mut W) -> Result<()> {
        let options = self.mobi.options();
        let (content, fdst) = self.prepare_content()?;

        let text = content.as_bytes();
        let compression = effective_compression(options, text.len());
        let text_records = split_text_records(text, compression);
        let text_record_count = text_records.len();

        let mut uids = self.mobi.uid_source();
        let mut palm = PalmDbWriter::new(&self.mobi.book_name(), &mut uids);

        palm.add_record(Vec::new(), 0, 0); // header placeholder
        for record in &text_records {
            let uid = palm.num_records() as u32;
            palm.add_record(record.clone(), 0, uid);
        }

        let mut first_image_index = NULL_INDEX;
        let image_ids = self.book.image_ids(None);
        if !image_ids.is_empty() {
            first_image_index = palm.num_records() as u32;
            for id in image_ids {
                if let Some(resource) = self.book.get_resource(id) {
                    let uid = palm.num_records() as u32;
                    palm.add_record(resource.data.clone(), 0, uid);
                }
            }
        }

        if !fdst.is_empty() {
            let uid = palm.num_records() as u32;
            palm.add_record(fdst.encode()?, 0, uid);
        }

        check_record_count(palm.num_records())?;

        let header = self.build_kf8_header(
            text.len(),
            text_record_count,
            1,
            text_record_count as u32,
            first_image_index,
            compression,
            true,
            uids.next_nonzero(),
        )?;
        palm.set_record(0, header);

        palm.write(sink)
    }

    /// Joint file: the full MOBI 6 section, a BOUNDARY record at index B,
    /// the KF8 header at B+1, KF8 text from B+2, then FDST. Record 0's
    /// EXTH type-121 record carries B.
    pub fn write_joint<W: Write>(&self, sink: &mut W) -> Result<()> {
        let options = self.mobi.options();
        let mut uids = self.mobi.uid_source();
        let mut palm = PalmDbWriter::new(&self.mobi.book_name(), &mut uids);

        let layout = self.mobi.assemble(&mut palm)?;

        let boundary = palm.num_records() as u32;
        palm.add_record(b"BOUNDARY".to_vec(), 0, boundary);

        let (content, fdst) = self.prepare_content()?;
        let text = content.as_bytes();
        let compression = effective_compression(options, text.len());
        let text_records = split_text_records(text, compression);
        let text_record_count = text_records.len();

        // KF8 header sits right after the boundary; its content records
        // start one past it.
        let kf8_header = self.build_kf8_header(
            text.len(),
            text_record_count,
            boundary + 2,
            boundary + 1 + text_record_count as u32,
            NULL_INDEX,
            compression,
            false,
            uids.next_nonzero(),
        )?;
        let uid = palm.num_records() as u32;
        palm.add_record(kf8_header, 0, uid);

        for record in &text_records {
            let uid = palm.num_records() as u32;
            palm.add_record(record.clone(), 0, uid);
        }

        if !fdst.is_empty() {
            let uid = palm.num_records() as u32;
            palm.add_record(fdst.encode()?, 0, uid);
        }

        check_record_count(palm.num_records())?;

        let record0 = self
            .mobi
            .build_record0(&layout, Some(boundary), uids.next_nonzero())?;
        palm.set_record(0, record0);

        palm.write(sink)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_kf8_header(
        &self,
        text_len: usize,
        text_record_count: usize,
        first_content: u32,
        last_content: u32,
        first_image_index: u32,
        compression: crate::mobi::headers::Compression,
        with_exth: bool,
        unique_id: u32,
    ) -> Result<Vec<u8>> {
        if text_record_count > usize::from(u16::MAX) || last_content > u32::from(u16::MAX) {
            return Err(Error::Encode(format!(
                "text record count {text_record_count} exceeds u16"
            )));
        }

        let mut header = MobiHeader::new(text_len as u32, text_record_count as u16, unique_id);
        header.mark_kf8();
        header.compression = compression;
        header.first_content_rec = first_content as u16;
        header.last_content_rec = last_content as u16;
        header.first_image_index = first_image_index;
        header.first_non_book_index = first_image_index;

        let name = transliterate_name(&self.mobi.book_name());

        let mut exth = ExthWriter::new();
        if with_exth && self.mobi.options().with_exth {
            exth.add_from_metadata(&self.book.metadata, &self.mobi.book_name());
        } else {
            header.exth_flags = 0;
        }

        header.full_name_offset = 248 + exth.total_len() as u32;
        header.full_name_length = name.len() as u32;

        let mut out = Vec::with_capacity(248 + exth.total_len() + name.len() + 2);
        header.write_into(&mut out);
        exth.write_into(&mut out)?;
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&[0, 0]);
        Ok(out)
    }
}

fn check_record_count(count: usize) -> Result<()> {
    if count > usize::from(u16::MAX) {
        return Err(Error::Encode(format!("record count {count} exceeds u16")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::TocEntry;
    use crate::mobi::palmdb::HEADER_SIZE;

    fn sample_book() -> Book {
        let mut book = Book::new();
        book.metadata.title = "KF8 Sample".into();
        book.metadata.language = "en".into();
        let mut content = String::from("<html><body>");
        for i in 0..40 {
            content.push_str(&format!("<h2 id=\"ch{i}\">Chapter {i}</h2>"));
            for _ in 0..20 {
                content.push_str("<p>Filler paragraph with enough text to chunk on.</p>");
            }
        }
        content.push_str("</body></html>");
        book.content = content;
        book.toc.push(TocEntry::new("ch0", "Chapter 0", "#ch0"));
        book
    }

    fn options() -> WriteOptions {
        WriteOptions {
            uid_seed: Some(7),
            ..WriteOptions::default()
        }
    }

    fn record_bounds(data: &[u8], index: usize) -> (usize, usize) {
        let num = u16::from_be_bytes([data[76], data[77]]) as usize;
        let entry = |i: usize| {
            u32::from_be_bytes([
                data[HEADER_SIZE + i * 8],
                data[HEADER_SIZE + i * 8 + 1],
                data[HEADER_SIZE + i * 8 + 2],
                data[HEADER_SIZE + i * 8 + 3],
            ]) as usize
        };
        let start = entry(index);
        let end = if index + 1 < num {
            entry(index + 1)
        } else {
            data.len()
        };
        (start, end)
    }

    #[test]
    fn pure_kf8_header_signaling() {
        let book = sample_book();
        let mut out = Vec::new();
        write_kf8(&book, options(), &mut out).unwrap();

        assert_eq!(&out[60..68], b"BOOKMOBI");
        let (rec0, _) = record_bounds(&out, 0);
        assert_eq!(&out[rec0 + 0x10..rec0 + 0x14], b"MOBI");
        let mobi_type = u32::from_be_bytes([
            out[rec0 + 0x18],
            out[rec0 + 0x19],
            out[rec0 + 0x1A],
            out[rec0 + 0x1B],
        ]);
        let version = u32::from_be_bytes([
            out[rec0 + 0x24],
            out[rec0 + 0x25],
            out[rec0 + 0x26],
            out[rec0 + 0x27],
        ]);
        assert_eq!(mobi_type, 248);
        assert_eq!(version, 8);
    }

    #[test]
    fn pure_kf8_last_record_is_fdst() {
        let book = sample_book();
        let mut out = Vec::new();
        write_kf8(&book, options(), &mut out).unwrap();

        let num = u16::from_be_bytes([out[76], out[77]]) as usize;
        let (start, end) = record_bounds(&out, num - 1);
        assert_eq!(&out[start..start + 4], b"FDST");
        let entries = u32::from_be_bytes([
            out[start + 8],
            out[start + 9],
            out[start + 10],
            out[start + 11],
        ]) as usize;
        assert_eq!(end - start, 12 + entries * 8);
        assert!(entries >= 1);
    }

    #[test]
    fn joint_boundary_record_and_exth() {
        let book = sample_book();
        let opts = WriteOptions {
            kf8_boundary: true,
            ..options()
        };
        let mut out = Vec::new();
        write_joint(&book, opts, &mut out).unwrap();

        // Find the type-121 EXTH record in record 0.
        let (rec0, rec0_end) = record_bounds(&out, 0);
        let record0 = &out[rec0..rec0_end];
        assert_eq!(&record0[0x10..0x14], b"MOBI");

        let exth = &record0[248..];
        assert_eq!(&exth[0..4], b"EXTH");
        let count = u32::from_be_bytes([exth[8], exth[9], exth[10], exth[11]]);
        let mut pos = 12;
        let mut boundary = None;
        for _ in 0..count {
            let record_type =
                u32::from_be_bytes([exth[pos], exth[pos + 1], exth[pos + 2], exth[pos + 3]]);
            let len = u32::from_be_bytes([
                exth[pos + 4],
                exth[pos + 5],
                exth[pos + 6],
                exth[pos + 7],
            ]) as usize;
            if record_type == 121 {
                boundary = Some(u32::from_be_bytes([
                    exth[pos + 8],
                    exth[pos + 9],
                    exth[pos + 10],
                    exth[pos + 11],
                ]));
            }
            pos += len;
        }

        // The payload names the BOUNDARY record.
        let boundary = boundary.expect("EXTH 121 present") as usize;
        let (start, end) = record_bounds(&out, boundary);
        assert_eq!(&out[start..end.min(start + 8)], b"BOUNDARY");

        // The record after the boundary is the KF8 header.
        let (kf8, _) = record_bounds(&out, boundary + 1);
        assert_eq!(&out[kf8 + 0x10..kf8 + 0x14], b"MOBI");
        let version = u32::from_be_bytes([
            out[kf8 + 0x24],
            out[kf8 + 0x25],
            out[kf8 + 0x26],
            out[kf8 + 0x27],
        ]);
        assert_eq!(version, 8);
        let first_content =
            u16::from_be_bytes([out[kf8 + 0xC0], out[kf8 + 0xC1]]) as usize;
        assert_eq!(first_content, boundary + 2);

        // MOBI 6 side stops right before the boundary.
        let last_content = u16::from_be_bytes([out[rec0 + 0xC2], out[rec0 + 0xC3]]) as usize;
        assert_eq!(last_content, boundary - 1);
    }

    #[test]
    fn chunking_disabled_single_flow() {
        let mut book = sample_book();
        book.toc.clear();
        let opts = WriteOptions {
            enable_chunking: false,
            generate_toc: false,
            ..options()
        };
        let writer = Kf8Writer::with_options(&book, opts);
        let (content, fdst) = writer.prepare_content().unwrap();
        assert_eq!(content, book.content);
        assert_eq!(fdst.len(), 1);
        assert_eq!(fdst.entries()[0].end as usize, book.content.len());
    }
}
