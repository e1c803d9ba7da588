//! Structural validation of produced MOBI bytes.
//!
//! A best-effort parse-back over the finished file: hard failures are
//! container-level (magics, minimum sizes), everything else is a warning.

use std::fmt;

/// Validates a MOBI file image in memory.
pub struct Validator<'a> {
    data: &'a [u8],
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> Validator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Run every check. Returns true when no errors were recorded.
    pub fn validate(&mut self) -> bool {
        self.errors.clear();
        self.warnings.clear();

        if self.data.len() < 78 {
            self.error("file too short to be a valid MOBI");
            return false;
        }

        self.check_palmdb_header();
        if let Some(mobi_offset) = self.check_mobi_header() {
            self.check_exth(mobi_offset);
        }

        self.errors.is_empty()
    }

    fn check_palmdb_header(&mut self) {
        if self.data[..32].iter().all(|&b| b == 0) {
            self.warning("empty database name");
        }

        if &self.data[60..64] != b"BOOK" {
            self.error("file type is not 'BOOK'");
        }
        if &self.data[64..68] != b"MOBI" {
            self.error("creator is not 'MOBI'");
        }
    }

    /// Locate and check record 0's MOBI header; returns its file offset.
    fn check_mobi_header(&mut self) -> Option<usize> {
        let num_records = u16::from_be_bytes([self.data[76], self.data[77]]) as usize;
        let table_end = 78 + num_records * 8;
        if num_records == 0 || self.data.len() < table_end {
            self.error("record index table truncated");
            return None;
        }

        let record0 = u32::from_be_bytes([
            self.data[78],
            self.data[79],
            self.data[80],
            self.data[81],
        ]) as usize;
        if record0 + 0x18 > self.data.len() {
            self.error("record 0 truncated");
            return None;
        }

        let mobi_offset = record0 + 0x10;
        if &self.data[mobi_offset..mobi_offset + 4] != b"MOBI" {
            self.error("MOBI header magic not found");
            return None;
        }

        let header_length = self.u32_at(mobi_offset + 4);
        if header_length < 232 {
            self.error(format!(
                "MOBI header length {header_length} below the 232-byte minimum"
            ));
        }

        if record0 + 0x28 <= self.data.len() {
            let version = self.u32_at(record0 + 0x24);
            if !(2..=8).contains(&version) {
                self.warning(format!("unusual MOBI version {version} (expected 2..8)"));
            }

            let encoding = self.u32_at(record0 + 0x1C);
            if encoding != 65001 {
                self.warning(format!("text encoding {encoding} is not UTF-8 (65001)"));
            }
        }

        Some(mobi_offset)
    }

    fn check_exth(&mut self, mobi_offset: usize) {
        let header_length = self.u32_at(mobi_offset + 4) as usize;
        let exth_offset = mobi_offset + header_length;
        if exth_offset + 12 > self.data.len() {
            return;
        }

        if &self.data[exth_offset..exth_offset + 4] != b"EXTH" {
            self.warning("no EXTH block (metadata may be limited)");
            return;
        }

        let record_count = self.u32_at(exth_offset + 8);
        if record_count == 0 {
            self.warning("EXTH block has no records");
        }

        let mut has_author = false;
        let mut has_publisher = false;
        let mut has_title = false;

        let mut pos = exth_offset + 12;
        for _ in 0..record_count {
            if pos + 8 > self.data.len() {
                break;
            }
            let record_type = self.u32_at(pos);
            let record_len = self.u32_at(pos + 4) as usize;
            if record_len < 8 || pos + record_len > self.data.len() {
                break;
            }
            match record_type {
                100 => has_author = true,
                101 => has_publisher = true,
                503 => has_title = true,
                _ => {}
            }
            pos += record_len;
        }

        if !has_author {
            self.warning("EXTH missing author record (100)");
        }
        if !has_publisher {
            self.warning("EXTH missing publisher record (101)");
        }
        if !has_title {
            self.warning("EXTH missing title record (503)");
        }
    }

    fn u32_at(&self, offset: usize) -> u32 {
        u32::from_be_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Display for Validator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() && self.warnings.is_empty() {
            return writeln!(f, "file is structurally valid");
        }
        for error in &self.errors {
            writeln!(f, "error: {error}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {warning}")?;
        }
        if self.errors.is_empty() {
            writeln!(f, "file is valid (with warnings)")
        } else {
            writeln!(f, "file is NOT valid")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Author, Book};
    use crate::mobi::writer::{write_mobi6, WriteOptions};

    fn written_book() -> Vec<u8> {
        let mut book = Book::new();
        book.metadata.title = "Valid Book".into();
        book.metadata.language = "en".into();
        book.metadata.authors.push(Author {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            ..Default::default()
        });
        book.metadata.publisher = Some("Publisher".into());
        book.content = "<html><body><p>text</p></body></html>".into();

        let mut out = Vec::new();
        let options = WriteOptions {
            uid_seed: Some(1),
            ..WriteOptions::default()
        };
        write_mobi6(&book, options, &mut out).unwrap();
        out
    }

    #[test]
    fn produced_file_passes() {
        let data = written_book();
        let mut validator = Validator::new(&data);
        assert!(validator.validate(), "errors: {:?}", validator.errors());
        assert!(validator.warnings().is_empty(), "{:?}", validator.warnings());
    }

    #[test]
    fn short_file_fails() {
        let data = vec![0u8; 40];
        let mut validator = Validator::new(&data);
        assert!(!validator.validate());
    }

    #[test]
    fn corrupted_type_fails() {
        let mut data = written_book();
        data[60..64].copy_from_slice(b"JUNK");
        let mut validator = Validator::new(&data);
        assert!(!validator.validate());
        assert!(validator.errors()[0].contains("BOOK"));
    }

    #[test]
    fn missing_exth_warns() {
        let mut book = Book::new();
        book.metadata.title = "No Exth".into();
        book.metadata.language = "en".into();
        book.content = "<p>x</p>".into();

        let mut out = Vec::new();
        let options = WriteOptions {
            with_exth: false,
            uid_seed: Some(1),
            ..WriteOptions::default()
        };
        write_mobi6(&book, options, &mut out).unwrap();

        let mut validator = Validator::new(&out);
        assert!(validator.validate());
        assert!(validator
            .warnings()
            .iter()
            .any(|w| w.contains("EXTH")));
    }
}
