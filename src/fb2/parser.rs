//! FB2 document parsing: metadata and embedded binaries.
//!
//! One streaming pass over the XML collects the `description` metadata and
//! decodes every `<binary>` payload. The body itself is handled by the
//! transformer, which walks the same text separately.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::book::{Author, Metadata, Series};
use crate::error::Result;

use super::b64;

/// A decoded `<binary>` element.
#[derive(Debug, Clone)]
pub struct Binary {
    pub id: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Parsed FB2 description plus embedded binaries.
#[derive(Debug, Default)]
pub struct Fb2Document {
    pub metadata: Metadata,
    pub binaries: Vec<Binary>,
}

/// Attribute value by local name (handles `l:href`/`xlink:href`).
pub(crate) fn attr_local(start: &BytesStart, name: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Parse the description block and binaries out of FB2 text.
pub fn parse_document(text: &str) -> Result<Fb2Document> {
    let mut reader = Reader::from_str(text);
    let mut doc = Fb2Document::default();

    let mut stack: Vec<String> = Vec::new();
    let mut current_text = String::new();
    let mut annotation = String::new();
    let mut current_author: Option<Author> = None;
    let mut current_binary: Option<Binary> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                current_text.clear();

                match name.as_str() {
                    "author" if in_title_info(&stack) => {
                        current_author = Some(Author::default());
                    }
                    "sequence" if in_title_info(&stack) => {
                        read_sequence(&e, &mut doc.metadata);
                    }
                    "binary" => {
                        current_binary = Some(Binary {
                            id: attr_local(&e, b"id").unwrap_or_default(),
                            content_type: attr_local(&e, b"content-type")
                                .unwrap_or_else(|| "image/jpeg".to_string()),
                            data: Vec::new(),
                        });
                        current_text.clear();
                    }
                    _ => {}
                }

                stack.push(name);
            }
            Event::Empty(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"image" if stack.iter().any(|s| s == "coverpage") => {
                        if let Some(href) = attr_local(&e, b"href") {
                            let id = href.strip_prefix('#').unwrap_or(&href);
                            doc.metadata.cover_id = Some(id.to_string());
                        }
                    }
                    b"sequence" if in_title_info(&stack) => {
                        read_sequence(&e, &mut doc.metadata);
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                current_text.push_str(&text);
                if stack.iter().any(|s| s == "annotation") {
                    annotation.push_str(&text);
                }
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else { continue };
                let text = current_text.trim().to_string();
                current_text.clear();

                match name.as_str() {
                    "book-title" if in_title_info(&stack) => doc.metadata.title = text,
                    "genre" if in_title_info(&stack) => {
                        if !text.is_empty() {
                            doc.metadata.genres.push(text);
                        }
                    }
                    "lang" if in_title_info(&stack) => doc.metadata.language = text,
                    "keywords" if in_title_info(&stack) => {
                        doc.metadata.keywords = text
                            .split(',')
                            .map(|k| k.trim().to_string())
                            .filter(|k| !k.is_empty())
                            .collect();
                    }
                    "first-name" => set_author_part(&mut current_author, |a| &mut a.first_name, text),
                    "middle-name" => {
                        set_author_part(&mut current_author, |a| &mut a.middle_name, text)
                    }
                    "last-name" => set_author_part(&mut current_author, |a| &mut a.last_name, text),
                    "nickname" => set_author_part(&mut current_author, |a| &mut a.nickname, text),
                    "author" => {
                        if let Some(author) = current_author.take() {
                            doc.metadata.authors.push(author);
                        }
                    }
                    "annotation" if in_title_info(&stack) => {
                        let trimmed = annotation.trim();
                        if !trimmed.is_empty() {
                            doc.metadata.annotation = Some(trimmed.to_string());
                        }
                        annotation.clear();
                    }
                    "p" if stack.iter().any(|s| s == "annotation") => annotation.push('\n'),
                    "publisher" if in_publish_info(&stack) => {
                        if !text.is_empty() {
                            doc.metadata.publisher = Some(text);
                        }
                    }
                    "year" if in_publish_info(&stack) => {
                        if !text.is_empty() {
                            doc.metadata.year = Some(text);
                        }
                    }
                    "isbn" if in_publish_info(&stack) => {
                        if !text.is_empty() {
                            doc.metadata.isbn = Some(text);
                        }
                    }
                    "binary" => {
                        if let Some(mut binary) = current_binary.take() {
                            if !binary.id.is_empty() {
                                binary.data = b64::decode(text.as_bytes());
                                doc.binaries.push(binary);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(doc)
}

fn in_title_info(stack: &[String]) -> bool {
    stack.iter().any(|s| s == "title-info")
}

fn in_publish_info(stack: &[String]) -> bool {
    stack.iter().any(|s| s == "publish-info")
}

fn read_sequence(start: &BytesStart, metadata: &mut Metadata) {
    if metadata.series.is_some() {
        return;
    }
    if let Some(name) = attr_local(start, b"name") {
        let index = attr_local(start, b"number")
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0);
        metadata.series = Some(Series { name, index });
    }
}

fn set_author_part(
    author: &mut Option<Author>,
    field: impl FnOnce(&mut Author) -> &mut String,
    value: String,
) {
    if let Some(a) = author.as_mut() {
        *field(a) = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
  <description>
    <title-info>
      <genre>sf</genre>
      <genre>prose</genre>
      <author>
        <first-name>Иван</first-name>
        <middle-name>И</middle-name>
        <last-name>Петров</last-name>
      </author>
      <book-title>Тестовая книга</book-title>
      <annotation><p>First line.</p><p>Second line.</p></annotation>
      <keywords>space, ships</keywords>
      <coverpage><image l:href="#cover.jpg"/></coverpage>
      <lang>ru</lang>
      <sequence name="Saga" number="3"/>
    </title-info>
    <publish-info>
      <publisher>Test Press</publisher>
      <year>1999</year>
      <isbn>1-2345-678-9</isbn>
    </publish-info>
  </description>
  <body>
    <section id="s1"><title><p>One</p></title><p>Text.</p></section>
  </body>
  <binary id="cover.jpg" content-type="image/jpeg">aGVsbG8=</binary>
</FictionBook>"##;

    #[test]
    fn metadata_extraction() {
        let doc = parse_document(SAMPLE).unwrap();
        let m = &doc.metadata;
        assert_eq!(m.title, "Тестовая книга");
        assert_eq!(m.language, "ru");
        assert_eq!(m.genres, vec!["sf", "prose"]);
        assert_eq!(m.authors.len(), 1);
        assert_eq!(m.authors[0].full_name(), "Иван И Петров");
        assert_eq!(m.publisher.as_deref(), Some("Test Press"));
        assert_eq!(m.year.as_deref(), Some("1999"));
        assert_eq!(m.isbn.as_deref(), Some("1-2345-678-9"));
        assert_eq!(m.keywords, vec!["space", "ships"]);
        assert_eq!(m.cover_id.as_deref(), Some("cover.jpg"));

        let series = m.series.as_ref().unwrap();
        assert_eq!(series.name, "Saga");
        assert_eq!(series.index, 3);

        let annotation = m.annotation.as_deref().unwrap();
        assert!(annotation.contains("First line."));
        assert!(annotation.contains("Second line."));
    }

    #[test]
    fn binary_decoding() {
        let doc = parse_document(SAMPLE).unwrap();
        assert_eq!(doc.binaries.len(), 1);
        assert_eq!(doc.binaries[0].id, "cover.jpg");
        assert_eq!(doc.binaries[0].content_type, "image/jpeg");
        assert_eq!(doc.binaries[0].data, b"hello");
    }

    #[test]
    fn binary_without_id_is_dropped() {
        let doc =
            parse_document("<FictionBook><binary content-type=\"image/png\">AA==</binary></FictionBook>")
                .unwrap();
        assert!(doc.binaries.is_empty());
    }

    #[test]
    fn missing_metadata_yields_defaults() {
        let doc = parse_document("<FictionBook><body/></FictionBook>").unwrap();
        assert!(doc.metadata.title.is_empty());
        assert!(doc.metadata.authors.is_empty());
        assert!(doc.metadata.series.is_none());
    }
}
