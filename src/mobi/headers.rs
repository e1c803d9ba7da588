//! MOBI header (record 0) writer.
//!
//! Record 0 opens with the 16-byte PalmDOC header, then the 232-byte MOBI
//! header (`"MOBI"` magic through the INDX record offset), then the optional
//! EXTH block and the full-name bytes. The format is packed big-endian with
//! no padding, so every field is written individually; a test pins the
//! region to exactly 248 bytes.

pub const NULL_INDEX: u32 = 0xFFFF_FFFF;

/// MOBI header length from the magic onward.
pub const HEADER_LEN: u32 = 232;
/// PalmDOC prelude plus MOBI header: where EXTH (or the name) starts.
pub const FULL_HEADER_LEN: u32 = 16 + HEADER_LEN;

pub const UTF8_ENCODING: u32 = 65001;

/// Text record compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    PalmDoc,
}

impl Compression {
    pub fn code(self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::PalmDoc => 2,
        }
    }
}

/// The writable fields of record 0. Everything not listed here is emitted as
/// the fixed constant the format expects.
#[derive(Debug, Clone)]
pub struct MobiHeader {
    // PalmDOC prelude
    pub compression: Compression,
    pub uncompressed_text_size: u32,
    pub record_count: u16,
    pub record_size: u16,

    // MOBI header
    pub mobi_type: u32,
    pub text_encoding: u32,
    pub unique_id: u32,
    pub file_version: u32,
    pub first_non_book_index: u32,
    pub full_name_offset: u32,
    pub full_name_length: u32,
    pub locale: u32,
    pub min_version: u32,
    pub first_image_index: u32,
    pub exth_flags: u32,
    pub first_content_rec: u16,
    pub last_content_rec: u16,
    pub fcis_index: u32,
    pub flis_index: u32,
    pub extra_record_flags: u32,
    pub indx_record_offset: u32,
}

impl MobiHeader {
    /// Header with MOBI 6 defaults: UTF-8 text, 4096-byte records, EXTH flag
    /// set, every index field at the "no such record" sentinel.
    pub fn new(uncompressed_text_size: u32, record_count: u16, unique_id: u32) -> Self {
        Self {
            compression: Compression::PalmDoc,
            uncompressed_text_size,
            record_count,
            record_size: 4096,
            mobi_type: 2,
            text_encoding: UTF8_ENCODING,
            unique_id,
            file_version: 6,
            first_non_book_index: NULL_INDEX,
            full_name_offset: FULL_HEADER_LEN,
            full_name_length: 0,
            locale: 1049,
            min_version: 6,
            first_image_index: NULL_INDEX,
            exth_flags: 0x40,
            first_content_rec: 1,
            last_content_rec: record_count,
            fcis_index: NULL_INDEX,
            flis_index: NULL_INDEX,
            extra_record_flags: 0,
            indx_record_offset: NULL_INDEX,
        }
    }

    /// Switch the type/version signaling to KF8.
    pub fn mark_kf8(&mut self) {
        self.mobi_type = 248;
        self.file_version = 8;
        self.min_version = 8;
    }

    /// Serialize the 248-byte header region into `out`.
    pub fn write_into(&self, out: &mut Vec<u8>) {
        let start = out.len();

        // PalmDOC header, 16 bytes.
        out.extend_from_slice(&self.compression.code().to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&self.uncompressed_text_size.to_be_bytes());
        out.extend_from_slice(&self.record_count.to_be_bytes());
        out.extend_from_slice(&self.record_size.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // encryption: none
        out.extend_from_slice(&0u16.to_be_bytes());

        // 0x10: magic and lengths.
        out.extend_from_slice(b"MOBI");
        out.extend_from_slice(&HEADER_LEN.to_be_bytes());
        out.extend_from_slice(&self.mobi_type.to_be_bytes());
        out.extend_from_slice(&self.text_encoding.to_be_bytes());
        out.extend_from_slice(&self.unique_id.to_be_bytes());
        out.extend_from_slice(&self.file_version.to_be_bytes());

        // 0x28: ten reserved index fields (orthographic, inflection, names,
        // keys, extra 0-5), all absent.
        for _ in 0..10 {
            out.extend_from_slice(&NULL_INDEX.to_be_bytes());
        }

        // 0x50
        out.extend_from_slice(&self.first_non_book_index.to_be_bytes());
        out.extend_from_slice(&self.full_name_offset.to_be_bytes());
        out.extend_from_slice(&self.full_name_length.to_be_bytes());
        out.extend_from_slice(&self.locale.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // input language
        out.extend_from_slice(&0u32.to_be_bytes()); // output language
        out.extend_from_slice(&self.min_version.to_be_bytes());
        out.extend_from_slice(&self.first_image_index.to_be_bytes());

        // 0x70: Huffman record group, unused without HUFF/CDIC compression.
        for _ in 0..4 {
            out.extend_from_slice(&0u32.to_be_bytes());
        }

        // 0x80
        out.extend_from_slice(&self.exth_flags.to_be_bytes());

        // 0x84: 32 reserved bytes.
        out.extend_from_slice(&[0u8; 32]);

        // 0xA4: unknown, then the DRM group (absent).
        out.extend_from_slice(&NULL_INDEX.to_be_bytes());
        out.extend_from_slice(&NULL_INDEX.to_be_bytes()); // DRM offset
        out.extend_from_slice(&0u32.to_be_bytes()); // DRM count
        out.extend_from_slice(&0u32.to_be_bytes()); // DRM size
        out.extend_from_slice(&0u32.to_be_bytes()); // DRM flags

        // 0xB8: 8 reserved bytes.
        out.extend_from_slice(&[0u8; 8]);

        // 0xC0
        out.extend_from_slice(&self.first_content_rec.to_be_bytes());
        out.extend_from_slice(&self.last_content_rec.to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());

        // 0xC8
        out.extend_from_slice(&self.fcis_index.to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&self.flis_index.to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());

        // 0xD8: 8 reserved bytes.
        out.extend_from_slice(&[0u8; 8]);

        // 0xE0
        out.extend_from_slice(&NULL_INDEX.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // first compilation section
        out.extend_from_slice(&NULL_INDEX.to_be_bytes()); // compilation section count
        out.extend_from_slice(&NULL_INDEX.to_be_bytes());

        // 0xF0
        out.extend_from_slice(&self.extra_record_flags.to_be_bytes());
        out.extend_from_slice(&self.indx_record_offset.to_be_bytes());

        debug_assert_eq!(out.len() - start, FULL_HEADER_LEN as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded() -> Vec<u8> {
        let mut header = MobiHeader::new(12345, 4, 0xDEADBEEF);
        header.first_non_book_index = 6;
        header.first_image_index = 6;
        header.exth_flags = 0x50;
        header.first_content_rec = 1;
        header.last_content_rec = 4;
        header.fcis_index = 10;
        header.flis_index = 9;
        header.indx_record_offset = 5;
        header.full_name_offset = 300;
        header.full_name_length = 9;

        let mut out = Vec::new();
        header.write_into(&mut out);
        out
    }

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    fn u16_at(data: &[u8], offset: usize) -> u16 {
        u16::from_be_bytes([data[offset], data[offset + 1]])
    }

    #[test]
    fn emitted_size_is_exact() {
        assert_eq!(encoded().len(), 248);
    }

    #[test]
    fn fields_land_at_fixed_offsets() {
        let out = encoded();

        assert_eq!(u16_at(&out, 0x00), 2); // PalmDOC compression
        assert_eq!(u32_at(&out, 0x04), 12345); // uncompressed size
        assert_eq!(u16_at(&out, 0x08), 4); // record count
        assert_eq!(u16_at(&out, 0x0A), 4096); // record size
        assert_eq!(&out[0x10..0x14], b"MOBI");
        assert_eq!(u32_at(&out, 0x14), 232); // header length
        assert_eq!(u32_at(&out, 0x18), 2); // type: book
        assert_eq!(u32_at(&out, 0x1C), 65001); // UTF-8
        assert_eq!(u32_at(&out, 0x20), 0xDEADBEEF);
        assert_eq!(u32_at(&out, 0x24), 6); // version
        assert_eq!(u32_at(&out, 0x28), NULL_INDEX);
        assert_eq!(u32_at(&out, 0x50), 6); // first non-book
        assert_eq!(u32_at(&out, 0x54), 300); // full name offset
        assert_eq!(u32_at(&out, 0x58), 9); // full name length
        assert_eq!(u32_at(&out, 0x5C), 1049); // locale
        assert_eq!(u32_at(&out, 0x68), 6); // min version
        assert_eq!(u32_at(&out, 0x6C), 6); // first image
        assert_eq!(u32_at(&out, 0x80), 0x50); // EXTH flags
        assert_eq!(u16_at(&out, 0xC0), 1); // first content rec
        assert_eq!(u16_at(&out, 0xC2), 4); // last content rec
        assert_eq!(u32_at(&out, 0xC8), 10); // FCIS
        assert_eq!(u32_at(&out, 0xD0), 9); // FLIS
        assert_eq!(u32_at(&out, 0xF0), 0); // extra record flags
        assert_eq!(u32_at(&out, 0xF4), 5); // INDX record offset
    }

    #[test]
    fn kf8_signaling() {
        let mut header = MobiHeader::new(0, 0, 1);
        header.mark_kf8();

        let mut out = Vec::new();
        header.write_into(&mut out);
        assert_eq!(u32_at(&out, 0x18), 248); // MOBI type
        assert_eq!(u32_at(&out, 0x24), 8); // file version
        assert_eq!(u32_at(&out, 0x68), 8); // min version
    }
}
