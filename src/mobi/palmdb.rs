//! Palm Database container writer.
//!
//! A PalmDB file is a 78-byte header, an 8-byte index entry per record, and
//! the concatenated record payloads. MOBI readers find everything else
//! through this table, so the offsets must be exact.

use std::io::Write;

use crate::error::Result;
use crate::util::UidSource;

pub const HEADER_SIZE: usize = 78;
pub const TYPE: &[u8; 4] = b"BOOK";
pub const CREATOR: &[u8; 4] = b"MOBI";

/// Palm OS epoch (1904-01-01) offset from the Unix epoch, in seconds.
/// Dates are pinned to the epoch itself so output is reproducible.
const PALM_EPOCH_OFFSET: u32 = 2_082_844_800;

struct Record {
    data: Vec<u8>,
    attributes: u8,
    unique_id: u32,
}

/// Accumulates records, then emits the complete database.
pub struct PalmDbWriter {
    name: String,
    uid_seed: u32,
    records: Vec<Record>,
}

impl PalmDbWriter {
    pub fn new(name: &str, uids: &mut UidSource) -> Self {
        Self {
            name: name.to_string(),
            uid_seed: uids.next_nonzero(),
            records: Vec::new(),
        }
    }

    /// Append a record.
    pub fn add_record(&mut self, data: Vec<u8>, attributes: u8, unique_id: u32) {
        self.records.push(Record {
            data,
            attributes,
            unique_id,
        });
    }

    /// Replace the payload of record `index`. Headers that depend on later
    /// record positions are written with a placeholder and patched through
    /// this before [`write`](Self::write).
    pub fn set_record(&mut self, index: usize, data: Vec<u8>) {
        if let Some(record) = self.records.get_mut(index) {
            record.data = data;
        }
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    /// Emit header, record index table, and payloads.
    pub fn write<W: Write>(&self, sink: &mut W) -> Result<()> {
        let mut header = Vec::with_capacity(HEADER_SIZE);

        let mut name_field = [0u8; 32];
        let ascii = transliterate_name(&self.name);
        let ascii = ascii.as_bytes();
        let copy_len = ascii.len().min(31);
        name_field[..copy_len].copy_from_slice(&ascii[..copy_len]);
        header.extend_from_slice(&name_field);

        header.extend_from_slice(&0u16.to_be_bytes()); // attributes
        header.extend_from_slice(&0u16.to_be_bytes()); // version
        header.extend_from_slice(&PALM_EPOCH_OFFSET.to_be_bytes()); // creation date
        header.extend_from_slice(&PALM_EPOCH_OFFSET.to_be_bytes()); // modification date
        header.extend_from_slice(&0u32.to_be_bytes()); // last backup
        header.extend_from_slice(&0u32.to_be_bytes()); // modification number
        header.extend_from_slice(&0u32.to_be_bytes()); // app info offset
        header.extend_from_slice(&0u32.to_be_bytes()); // sort info offset
        header.extend_from_slice(TYPE);
        header.extend_from_slice(CREATOR);
        header.extend_from_slice(&self.uid_seed.to_be_bytes());
        header.extend_from_slice(&0u32.to_be_bytes()); // next record list id
        header.extend_from_slice(&(self.records.len() as u16).to_be_bytes());
        debug_assert_eq!(header.len(), HEADER_SIZE);

        sink.write_all(&header)?;

        // Index table: offset u32 + attributes u8 + unique id u24.
        let mut offset = HEADER_SIZE + self.records.len() * 8;
        for record in &self.records {
            sink.write_all(&(offset as u32).to_be_bytes())?;
            let uid = record.unique_id.to_be_bytes();
            sink.write_all(&[record.attributes, uid[1], uid[2], uid[3]])?;
            offset += record.data.len();
        }

        for record in &self.records {
            sink.write_all(&record.data)?;
        }

        Ok(())
    }
}

/// ASCII rendering of a database name. The PalmDB name field predates
/// Unicode, so Cyrillic maps through a transliteration table and anything
/// else non-ASCII becomes `?`. Truncated to 31 bytes.
pub fn transliterate_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());

    for ch in name.chars() {
        if ch == '\0' {
            continue;
        }
        if ch.is_ascii() {
            result.push(ch);
        } else {
            result.push_str(transliterate_char(ch));
        }
    }

    if result.len() > 31 {
        result.truncate(31);
    }
    result
}

fn transliterate_char(ch: char) -> &'static str {
    match ch {
        'А' => "A",
        'Б' => "B",
        'В' => "V",
        'Г' => "G",
        'Д' => "D",
        'Е' => "E",
        'Ё' => "Yo",
        'Ж' => "Zh",
        'З' => "Z",
        'И' => "I",
        'Й' => "Y",
        'К' => "K",
        'Л' => "L",
        'М' => "M",
        'Н' => "N",
        'О' => "O",
        'П' => "P",
        'Р' => "R",
        'С' => "S",
        'Т' => "T",
        'У' => "U",
        'Ф' => "F",
        'Х' => "Kh",
        'Ц' => "Ts",
        'Ч' => "Ch",
        'Ш' => "Sh",
        'Щ' => "Shch",
        'Ъ' => "\"",
        'Ы' => "'",
        'Ь' => "'",
        'Э' => "E",
        'Ю' => "Yu",
        'Я' => "Ya",
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "yo",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' => "\"",
        'ы' => "'",
        'ь' => "'",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        _ => "?",
    }
}
