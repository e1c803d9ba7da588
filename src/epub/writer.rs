//! EPUB 2 packaging.
//!
//! An EPUB is a ZIP archive: the `mimetype` entry first and uncompressed,
//! `META-INF/container.xml`, the OPF package document, the NCX table of
//! contents, the rendered content document, and the manifest resources.

use std::io::{Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::book::{Book, TocEntry};
use crate::error::Result;
use crate::util::{escape_xml, UidSource};

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Write a [`Book`] as an EPUB 2 archive into `sink`.
pub fn write_epub<W: Write + Seek>(book: &Book, sink: W) -> Result<()> {
    let mut zip = ZipWriter::new(sink);

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // The mimetype entry must come first and uncompressed.
    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    let identifier = book_identifier(book);

    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(generate_opf(book, &identifier).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", deflated)?;
    zip.write_all(generate_ncx(book, &identifier).as_bytes())?;

    zip.start_file("OEBPS/content.html", deflated)?;
    zip.write_all(book.content.as_bytes())?;

    for resource in book.resources.values() {
        zip.start_file(format!("OEBPS/{}", resource.href), deflated)?;
        zip.write_all(&resource.data)?;
    }

    zip.finish()?;
    Ok(())
}

/// ISBN when present, else a urn:uuid derived from the title.
fn book_identifier(book: &Book) -> String {
    if let Some(ref isbn) = book.metadata.isbn {
        if !isbn.is_empty() {
            return isbn.clone();
        }
    }

    let seed = book
        .metadata
        .title
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    let mut uids = UidSource::from_seed(seed);
    let mut parts = [0u32; 4];
    for part in &mut parts {
        *part = uids.next_nonzero();
    }
    format!(
        "urn:uuid:{:08x}-{:04x}-{:04x}-{:04x}-{:04x}{:08x}",
        parts[0],
        parts[1] >> 16,
        (parts[1] & 0xFFFF) | 0x4000,
        (parts[2] >> 16) & 0x3FFF | 0x8000,
        parts[2] & 0xFFFF,
        parts[3]
    )
}

fn generate_opf(book: &Book, identifier: &str) -> String {
    let metadata = &book.metadata;
    let mut opf = String::new();

    opf.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
"#,
    );

    opf.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        escape_xml(&metadata.title)
    ));
    opf.push_str(&format!(
        "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
        escape_xml(identifier)
    ));

    let language = if metadata.language.is_empty() {
        "en"
    } else {
        &metadata.language
    };
    opf.push_str(&format!("    <dc:language>{language}</dc:language>\n"));

    for author in &metadata.authors {
        opf.push_str(&format!(
            "    <dc:creator opf:file-as=\"{}\">{}</dc:creator>\n",
            escape_xml(&author.sort_name()),
            escape_xml(&author.full_name())
        ));
    }
    if let Some(ref publisher) = metadata.publisher {
        opf.push_str(&format!(
            "    <dc:publisher>{}</dc:publisher>\n",
            escape_xml(publisher)
        ));
    }
    if let Some(ref annotation) = metadata.annotation {
        opf.push_str(&format!(
            "    <dc:description>{}</dc:description>\n",
            escape_xml(annotation)
        ));
    }
    for genre in &metadata.genres {
        opf.push_str(&format!(
            "    <dc:subject>{}</dc:subject>\n",
            escape_xml(genre)
        ));
    }
    if let Some(ref year) = metadata.year {
        opf.push_str(&format!("    <dc:date>{}</dc:date>\n", escape_xml(year)));
    }
    if let Some(ref rights) = metadata.rights {
        opf.push_str(&format!(
            "    <dc:rights>{}</dc:rights>\n",
            escape_xml(rights)
        ));
    }
    if let Some(ref series) = metadata.series {
        opf.push_str(&format!(
            "    <meta name=\"calibre:series\" content=\"{}\"/>\n",
            escape_xml(&series.name)
        ));
        opf.push_str(&format!(
            "    <meta name=\"calibre:series_index\" content=\"{}\"/>\n",
            series.index
        ));
    }
    if let Some(ref cover_id) = metadata.cover_id {
        opf.push_str(&format!(
            "    <meta name=\"cover\" content=\"{}\"/>\n",
            escape_xml(&href_to_id(cover_id))
        ));
    }

    opf.push_str("  </metadata>\n  <manifest>\n");
    opf.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );
    opf.push_str(
        "    <item id=\"content\" href=\"content.html\" media-type=\"application/xhtml+xml\"/>\n",
    );
    for resource in book.resources.values() {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            escape_xml(&href_to_id(&resource.id)),
            escape_xml(&resource.href),
            escape_xml(&resource.media_type)
        ));
    }

    opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");
    opf.push_str("    <itemref idref=\"content\"/>\n");
    opf.push_str("  </spine>\n</package>\n");
    opf
}

fn generate_ncx(book: &Book, identifier: &str) -> String {
    let mut ncx = String::new();

    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content=""#,
    );
    ncx.push_str(&escape_xml(identifier));
    ncx.push_str(
        r#""/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>"#,
    );
    ncx.push_str(&escape_xml(&book.metadata.title));
    ncx.push_str(
        r#"</text>
  </docTitle>
  <navMap>
"#,
    );

    let mut play_order = 1;
    for entry in &book.toc {
        write_nav_point(&mut ncx, entry, &mut play_order, 2);
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

fn write_nav_point(ncx: &mut String, entry: &TocEntry, play_order: &mut usize, indent: usize) {
    let pad = "  ".repeat(indent);
    ncx.push_str(&format!(
        "{pad}<navPoint id=\"navpoint-{0}\" playOrder=\"{0}\">\n",
        play_order
    ));
    ncx.push_str(&format!(
        "{pad}  <navLabel><text>{}</text></navLabel>\n",
        escape_xml(&entry.label)
    ));
    ncx.push_str(&format!(
        "{pad}  <content src=\"content.html{}\"/>\n",
        escape_xml(&entry.href)
    ));
    *play_order += 1;

    for child in &entry.children {
        write_nav_point(ncx, child, play_order, indent + 1);
    }
    ncx.push_str(&format!("{pad}</navPoint>\n"));
}

/// Manifest ids must be XML names; hrefs may not be.
fn href_to_id(href: &str) -> String {
    let id: String = href
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if id.starts_with(|c: char| c.is_ascii_digit()) {
        format!("id_{id}")
    } else {
        id
    }
}
