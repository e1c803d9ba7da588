//! FB2 (FictionBook 2.0) reading: encoding detection, parsing, HTML
//! transformation, and [`Book`] construction.

pub mod b64;
pub mod encoding;
pub mod transform;

mod parser;

use std::io::Cursor;
use std::path::Path;

use log::warn;

use crate::book::{Book, TocEntry};
use crate::error::{Error, Result};

pub use parser::{parse_document, Binary, Fb2Document};
pub use transform::{to_html, FlatTocEntry, Transformed};

/// Read an FB2 (or zipped FBZ) file into a [`Book`].
pub fn read_fb2<P: AsRef<Path>>(path: P) -> Result<Book> {
    let data = std::fs::read(path)?;
    read_fb2_bytes(&data)
}

/// Parse FB2 bytes into a [`Book`]: decoded metadata, rendered HTML
/// content, TOC tree, and manifest resources from the embedded binaries.
pub fn read_fb2_bytes(data: &[u8]) -> Result<Book> {
    let data = match unwrap_fbz(data)? {
        Some(inner) => inner,
        None => data.to_vec(),
    };

    let text = encoding::to_utf8(&data)?;
    let document = parse_document(&text)?;
    let transformed = to_html(&text, &document.metadata, false)?;

    let mut book = Book::new();
    book.metadata = document.metadata;
    book.content = transformed.html;
    book.toc = build_toc_tree(&transformed.toc);

    for binary in document.binaries {
        book.add_resource(
            binary.id.clone(),
            binary.id.clone(),
            binary.content_type,
            binary.data,
        );
    }

    // A cover reference pointing at a missing binary is dropped.
    let dangling_cover = book
        .metadata
        .cover_id
        .as_deref()
        .is_some_and(|id| !book.resources.contains_key(id));
    if dangling_cover {
        warn!(
            "cover id {:?} has no matching binary",
            book.metadata.cover_id.as_deref().unwrap_or_default()
        );
        book.metadata.cover_id = None;
    }

    Ok(book)
}

/// When `data` is a ZIP archive, extract the first `.fb2` member.
fn unwrap_fbz(data: &[u8]) -> Result<Option<Vec<u8>>> {
    if !data.starts_with(b"PK\x03\x04") {
        return Ok(None);
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.name().to_ascii_lowercase().ends_with(".fb2") {
            let mut contents = Vec::with_capacity(file.size() as usize);
            std::io::copy(&mut file, &mut contents)?;
            return Ok(Some(contents));
        }
    }

    Err(Error::InvalidFb2("no .fb2 file found in archive".into()))
}

/// Nest flat TOC entries by level.
fn build_toc_tree(flat: &[FlatTocEntry]) -> Vec<TocEntry> {
    let mut roots: Vec<TocEntry> = Vec::new();
    // Path of child indices into the tree, one per open level.
    let mut path: Vec<usize> = Vec::new();

    for entry in flat {
        let node = TocEntry {
            id: entry.id.clone(),
            label: entry.label.clone(),
            href: entry.href.clone(),
            level: entry.level,
            children: Vec::new(),
        };

        let depth = (entry.level.saturating_sub(1)) as usize;
        path.truncate(depth);

        let mut parent: Option<&mut TocEntry> = None;
        for &index in &path {
            parent = Some(match parent {
                None => &mut roots[index],
                Some(p) => &mut p.children[index],
            });
        }

        match parent {
            None => {
                roots.push(node);
                path.clear();
                path.push(roots.len() - 1);
            }
            Some(p) => {
                p.children.push(node);
                let last = p.children.len() - 1;
                path.push(last);
            }
        }
    }

    roots
}
