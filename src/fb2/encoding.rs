//! Character-encoding detection for FB2 input.
//!
//! FB2 files from the wild arrive in windows-1251, koi8-r, utf-16, and
//! occasionally lie about it. Detection order: byte-order mark, then the XML
//! declaration's `encoding` attribute, then UTF-8.

use encoding_rs::{Encoding, UTF_8};
use log::warn;

use crate::error::Result;

/// Decode raw FB2 bytes to UTF-8 text. Null bytes are stripped (some
/// exporters pad with them) and undecodable sequences are replaced rather
/// than fatal.
pub fn to_utf8(data: &[u8]) -> Result<String> {
    let encoding = detect_encoding(data);
    let (text, actual, had_errors) = encoding.decode(data);
    if had_errors {
        warn!(
            "input contained byte sequences invalid for {}; replaced",
            actual.name()
        );
    }

    if text.contains('\0') {
        Ok(text.replace('\0', ""))
    } else {
        Ok(text.into_owned())
    }
}

/// The encoding the document claims or implies.
pub fn detect_encoding(data: &[u8]) -> &'static Encoding {
    if let Some((encoding, _bom_len)) = Encoding::for_bom(data) {
        return encoding;
    }

    if let Some(label) = declared_encoding(data) {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            return encoding;
        }
        warn!("unknown encoding label {label:?}, assuming UTF-8");
    }

    UTF_8
}

/// The `encoding` attribute of the XML declaration, when present.
fn declared_encoding(data: &[u8]) -> Option<String> {
    // The declaration is ASCII and sits in the first bytes of the file.
    let head_len = data.len().min(256);
    let head = String::from_utf8_lossy(&data[..head_len]);

    let decl_start = head.find("<?xml")?;
    let decl_end = head[decl_start..].find("?>")? + decl_start;
    let declaration = &head[decl_start..decl_end];

    let attr_pos = declaration.find("encoding=")?;
    let rest = &declaration[attr_pos + "encoding=".len()..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let value_end = rest[1..].find(quote)?;
    Some(rest[1..1 + value_end].to_ascii_lowercase())
}
