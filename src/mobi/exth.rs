//! EXTH metadata block writer.
//!
//! EXTH sits between the MOBI header and the full-name bytes in record 0:
//! `"EXTH"`, total length, record count, then `(type, length, data)` records
//! where length covers the 8-byte record prelude.

use crate::book::Metadata;
use crate::error::{Error, Result};

pub const AUTHOR: u32 = 100;
pub const PUBLISHER: u32 = 101;
pub const DESCRIPTION: u32 = 103;
pub const ISBN: u32 = 104;
pub const SUBJECT: u32 = 105;
pub const PUBLISHED_DATE: u32 = 106;
pub const RIGHTS: u32 = 109;
pub const KF8_BOUNDARY: u32 = 121;
pub const K8_COVER_IMAGE: u32 = 129;
pub const CREATOR_SOFTWARE: u32 = 200;
pub const COVER_OFFSET: u32 = 201;
pub const THUMB_OFFSET: u32 = 202;
pub const HAS_FAKE_COVER: u32 = 203;
pub const TITLE: u32 = 503;
pub const LANGUAGE: u32 = 524;

const CREATOR_SOFTWARE_NAME: &str = "fb2mobi - FB2 to MOBI converter";

/// Builds the EXTH block record by record.
#[derive(Default)]
pub struct ExthWriter {
    records: Vec<(u32, Vec<u8>)>,
}

impl ExthWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, record_type: u32, data: Vec<u8>) {
        self.records.push((record_type, data));
    }

    fn add_string(&mut self, record_type: u32, value: &str) {
        self.add(record_type, value.as_bytes().to_vec());
    }

    fn add_u32(&mut self, record_type: u32, value: u32) {
        self.add(record_type, value.to_be_bytes().to_vec());
    }

    pub fn add_author(&mut self, author: &str) {
        self.add_string(AUTHOR, author);
    }

    pub fn add_title(&mut self, title: &str) {
        self.add_string(TITLE, title);
    }

    pub fn add_publisher(&mut self, publisher: &str) {
        self.add_string(PUBLISHER, publisher);
    }

    pub fn add_description(&mut self, description: &str) {
        self.add_string(DESCRIPTION, description);
    }

    pub fn add_isbn(&mut self, isbn: &str) {
        self.add_string(ISBN, isbn);
    }

    pub fn add_subjects(&mut self, subjects: &[String]) {
        if !subjects.is_empty() {
            self.add_string(SUBJECT, &subjects.join(", "));
        }
    }

    pub fn add_published_date(&mut self, date: &str) {
        self.add_string(PUBLISHED_DATE, date);
    }

    pub fn add_rights(&mut self, rights: &str) {
        self.add_string(RIGHTS, rights);
    }

    pub fn add_language(&mut self, language: &str) {
        self.add_string(LANGUAGE, language);
    }

    pub fn add_creator_software(&mut self) {
        self.add_string(CREATOR_SOFTWARE, CREATOR_SOFTWARE_NAME);
    }

    pub fn add_cover_offset(&mut self, offset: u32) {
        self.add_u32(COVER_OFFSET, offset);
    }

    pub fn add_thumbnail_offset(&mut self, offset: u32) {
        self.add_u32(THUMB_OFFSET, offset);
    }

    pub fn add_has_fake_cover(&mut self, value: u32) {
        self.add_u32(HAS_FAKE_COVER, value);
    }

    pub fn add_k8_cover_image(&mut self, image_id: &str) {
        self.add_string(K8_COVER_IMAGE, image_id);
    }

    /// Record index where the KF8 section of a joint file starts.
    pub fn add_kf8_boundary(&mut self, boundary: u32) {
        self.add_u32(KF8_BOUNDARY, boundary);
    }

    /// Standard metadata records for a book.
    pub fn add_from_metadata(&mut self, metadata: &Metadata, title: &str) {
        self.add_title(title);
        let authors = metadata.author_line();
        if !authors.is_empty() {
            self.add_author(&authors);
        }
        if let Some(ref publisher) = metadata.publisher {
            self.add_publisher(publisher);
        }
        if let Some(ref annotation) = metadata.annotation {
            self.add_description(annotation);
        }
        if let Some(ref isbn) = metadata.isbn {
            self.add_isbn(isbn);
        }
        self.add_subjects(&metadata.genres);
        if let Some(ref year) = metadata.year {
            self.add_published_date(year);
        }
        if let Some(ref rights) = metadata.rights {
            self.add_rights(rights);
        }
        if !metadata.language.is_empty() {
            self.add_language(&metadata.language);
        }
        self.add_creator_software();
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Total block size including the 12-byte prelude; 0 when empty.
    pub fn total_len(&self) -> usize {
        if self.records.is_empty() {
            return 0;
        }
        12 + self
            .records
            .iter()
            .map(|(_, data)| 8 + data.len())
            .sum::<usize>()
    }

    /// Append the encoded block to `out`.
    pub fn write_into(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }

        for (record_type, data) in &self.records {
            if data.len() > (u32::MAX as usize) - 8 {
                return Err(Error::Encode(format!(
                    "EXTH record {record_type} too large: {} bytes",
                    data.len()
                )));
            }
        }

        out.extend_from_slice(b"EXTH");
        out.extend_from_slice(&(self.total_len() as u32).to_be_bytes());
        out.extend_from_slice(&(self.records.len() as u32).to_be_bytes());

        for (record_type, data) in &self.records {
            out.extend_from_slice(&record_type.to_be_bytes());
            out.extend_from_slice(&((8 + data.len()) as u32).to_be_bytes());
            out.extend_from_slice(data);
        }

        Ok(())
    }
}
