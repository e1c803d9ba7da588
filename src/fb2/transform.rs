//! FB2 body → HTML transformation.
//!
//! Streams over the XML once, emitting HTML for the body content and
//! collecting a flat TOC (section id, title, level) along the way. Sections
//! become `<div id="…">` blocks so the MOBI TOC index can resolve anchors by
//! scanning the rendered HTML.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::book::Metadata;
use crate::error::Result;
use crate::util::escape_xml;

use super::parser::attr_local;

/// One collected TOC entry, in document order.
#[derive(Debug, Clone)]
pub struct FlatTocEntry {
    pub id: String,
    pub label: String,
    pub href: String,
    pub level: u32,
}

/// The rendered HTML and the TOC extracted from the first body.
#[derive(Debug)]
pub struct Transformed {
    pub html: String,
    pub toc: Vec<FlatTocEntry>,
}

const STYLE: &str = "body { text-align: justify; margin: 2em; }\n\
h1, h2, h3, h4, h5, h6 { font-weight: bold; page-break-before: always; }\n\
.epigraph { width: 75%; margin-left: 25%; font-style: italic; }\n\
.subtitle { text-align: center; }\n\
.paragraph { text-indent: 2em; margin-top: 0; margin-bottom: 0; }\n\
blockquote { margin-left: 4em; margin-top: 1em; margin-right: 0.2em; }\n\
code { font-family: monospace; }\n\
table { border-collapse: collapse; margin: 1em auto; }\n\
td, th { border: 1px solid black; padding: 0.3em; }\n";

/// Transform FB2 text into a standalone HTML document.
///
/// `no_inline_toc` suppresses the generated `<ul>` table of contents that
/// otherwise precedes the content.
pub fn to_html(text: &str, metadata: &Metadata, no_inline_toc: bool) -> Result<Transformed> {
    let mut renderer = Renderer::new(text);
    renderer.run()?;

    let title = if metadata.title.is_empty() {
        "unknown"
    } else {
        &metadata.title
    };

    let mut html = String::with_capacity(renderer.out.len() + 1024);
    html.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    html.push_str("<!DOCTYPE html>\n");
    html.push_str(&format!(
        "<html lang=\"{}\">\n<head>\n<meta charset=\"UTF-8\"/>\n<title>{}</title>\n",
        escape_xml(&metadata.language),
        escape_xml(title)
    ));
    html.push_str("<style type=\"text/css\">\n");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n");

    if let Some(ref annotation) = metadata.annotation {
        html.push_str("<div class=\"annotation\">");
        html.push_str(&escape_xml(annotation));
        html.push_str("</div>\n<hr/>\n");
    }

    if !no_inline_toc && !renderer.toc.is_empty() {
        html.push_str(&inline_toc(&renderer.toc));
        html.push_str("<hr/>\n");
    }

    html.push_str(&renderer.out);
    html.push_str("</body>\n</html>\n");

    Ok(Transformed {
        html,
        toc: renderer.toc,
    })
}

struct Renderer<'a> {
    reader: Reader<&'a [u8]>,
    out: String,
    toc: Vec<FlatTocEntry>,
    /// How many `<body>` elements deep we are; content renders inside any,
    /// the TOC tracks only the first.
    body_depth: usize,
    body_index: usize,
    section_depth: u32,
    section_counter: usize,
    /// TOC slot awaiting its label, per open section.
    open_sections: Vec<Option<usize>>,
    in_title: bool,
    title_parts: Vec<String>,
}

impl<'a> Renderer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            reader: Reader::from_str(text),
            out: String::with_capacity(text.len()),
            toc: Vec::new(),
            body_depth: 0,
            body_index: 0,
            section_depth: 0,
            section_counter: 0,
            open_sections: Vec::new(),
            in_title: false,
            title_parts: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<()> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => self.start(&e),
                Event::Empty(e) => self.empty(&e),
                Event::Text(e) => {
                    let text = e.unescape()?;
                    self.text(&text);
                }
                Event::End(e) => {
                    let name = e.local_name().as_ref().to_vec();
                    self.end(&name);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(())
    }

    fn start(&mut self, e: &BytesStart) {
        let name = e.local_name();
        if name.as_ref() == b"body" {
            self.body_depth += 1;
            self.body_index += 1;
            self.out.push_str("<div>\n");
            if let Some(body_name) = attr_local(e, b"name") {
                self.out.push_str(&format!(
                    "<h4 class=\"subtitle\">{}</h4>\n",
                    escape_xml(&body_name)
                ));
            }
            return;
        }
        if self.body_depth == 0 {
            return;
        }

        match name.as_ref() {
            b"section" => {
                self.section_depth += 1;
                self.section_counter += 1;
                let id = attr_local(e, b"id")
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("section_{}", self.section_counter));

                self.out.push_str(&format!("<div id=\"{}\">\n", escape_xml(&id)));

                if self.body_index == 1 {
                    self.toc.push(FlatTocEntry {
                        href: format!("#{id}"),
                        id,
                        label: String::new(),
                        level: self.section_depth,
                    });
                    self.open_sections.push(Some(self.toc.len() - 1));
                } else {
                    self.open_sections.push(None);
                }
            }
            b"title" => {
                self.in_title = true;
                self.title_parts.clear();
            }
            b"p" => {
                if self.in_title {
                    self.title_parts.push(String::new());
                } else {
                    self.out.push_str("<p class=\"paragraph\">");
                }
            }
            b"subtitle" => self.out.push_str("<h5 class=\"subtitle\">"),
            b"emphasis" => self.out.push_str("<em>"),
            b"strong" => self.out.push_str("<strong>"),
            b"strikethrough" => self.out.push_str("<del>"),
            b"sub" => self.out.push_str("<sub>"),
            b"sup" => self.out.push_str("<sup>"),
            b"code" => self.out.push_str("<code>"),
            b"epigraph" => self.out.push_str("<blockquote class=\"epigraph\">\n"),
            b"cite" | b"poem" => self.out.push_str("<blockquote>\n"),
            b"stanza" => {}
            b"v" => self.out.push_str("<p>"),
            b"text-author" => self.out.push_str("<p><em>"),
            b"table" => self.out.push_str("<table>\n"),
            b"tr" => self.out.push_str("<tr>"),
            b"td" | b"th" => self.out.push_str("<td>"),
            b"a" => {
                let href = attr_local(e, b"href").unwrap_or_default();
                self.out
                    .push_str(&format!("<a href=\"{}\">", escape_xml(&href)));
            }
            b"image" => self.image(e),
            _ => {}
        }
    }

    fn empty(&mut self, e: &BytesStart) {
        if self.body_depth == 0 {
            return;
        }
        match e.local_name().as_ref() {
            b"empty-line" => self.out.push_str("<br/>\n"),
            b"image" => self.image(e),
            _ => {}
        }
    }

    fn image(&mut self, e: &BytesStart) {
        let Some(href) = attr_local(e, b"href") else {
            return;
        };
        let id = href.strip_prefix('#').unwrap_or(&href);
        let alt = attr_local(e, b"alt").unwrap_or_default();
        self.out.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\"/>\n",
            escape_xml(id),
            escape_xml(&alt)
        ));
    }

    fn text(&mut self, text: &str) {
        if self.body_depth == 0 {
            return;
        }
        if self.in_title {
            if let Some(part) = self.title_parts.last_mut() {
                part.push_str(text);
            }
            return;
        }
        if !text.trim().is_empty() {
            self.out.push_str(&escape_xml(text));
        }
    }

    fn end(&mut self, name: &[u8]) {
        if name == b"body" {
            if self.body_depth > 0 {
                self.body_depth -= 1;
                self.out.push_str("</div>\n");
            }
            return;
        }
        if self.body_depth == 0 {
            return;
        }

        match name {
            b"section" => {
                self.out.push_str("</div>\n");
                if let Some(Some(toc_index)) = self.open_sections.pop() {
                    let position = toc_index + 1;
                    let entry = &mut self.toc[toc_index];
                    if entry.label.is_empty() {
                        entry.label = format!("Section {position}");
                    }
                }
                self.section_depth = self.section_depth.saturating_sub(1);
            }
            b"title" => {
                self.in_title = false;
                let parts: Vec<String> = self
                    .title_parts
                    .drain(..)
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
                if parts.is_empty() {
                    return;
                }

                // Heading level follows section depth; the body title is h1.
                let level = (self.section_depth + 1).min(6);
                let escaped: Vec<String> = parts.iter().map(|p| escape_xml(p)).collect();
                self.out
                    .push_str(&format!("<h{level}>{}</h{level}>\n", escaped.join("<br/>")));

                if let Some(Some(toc_index)) = self.open_sections.last().copied() {
                    let entry = &mut self.toc[toc_index];
                    if entry.label.is_empty() {
                        entry.label = parts.join(" ");
                    }
                }
            }
            b"p" => {
                if !self.in_title {
                    self.out.push_str("</p>\n");
                }
            }
            b"subtitle" => self.out.push_str("</h5>\n"),
            b"emphasis" => self.out.push_str("</em>"),
            b"strong" => self.out.push_str("</strong>"),
            b"strikethrough" => self.out.push_str("</del>"),
            b"sub" => self.out.push_str("</sub>"),
            b"sup" => self.out.push_str("</sup>"),
            b"code" => self.out.push_str("</code>"),
            b"epigraph" | b"cite" | b"poem" => self.out.push_str("</blockquote>\n"),
            b"v" => self.out.push_str("</p>\n"),
            b"text-author" => self.out.push_str("</em></p>\n"),
            b"table" => self.out.push_str("</table>\n"),
            b"tr" => self.out.push_str("</tr>\n"),
            b"td" | b"th" => self.out.push_str("</td>"),
            b"a" => self.out.push_str("</a>"),
            _ => {}
        }
    }
}

/// Nested `<ul>` rendering of the collected TOC.
fn inline_toc(entries: &[FlatTocEntry]) -> String {
    let mut out = String::from("<ul>\n");
    let mut level = 1;

    for entry in entries {
        while level < entry.level {
            out.push_str("<ul>\n");
            level += 1;
        }
        while level > entry.level {
            out.push_str("</ul>\n");
            level -= 1;
        }
        out.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            escape_xml(&entry.href),
            escape_xml(&entry.label)
        ));
    }
    while level > 0 {
        out.push_str("</ul>\n");
        level -= 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
  <description><title-info><book-title>T</book-title><lang>en</lang></title-info></description>
  <body>
    <section id="ch1">
      <title><p>Chapter 1</p></title>
      <p>First <emphasis>em</emphasis> text.</p>
      <empty-line/>
      <section>
        <title><p>Part 1</p></title>
        <p>Nested.</p>
        <image l:href="#pic.png" alt="a picture"/>
      </section>
    </section>
    <section id="ch2">
      <title><p>Chapter 2</p></title>
      <p>Second.</p>
    </section>
  </body>
</FictionBook>"##;

    fn transformed() -> Transformed {
        let metadata = Metadata {
            title: "T".into(),
            language: "en".into(),
            ..Default::default()
        };
        to_html(SAMPLE, &metadata, false).unwrap()
    }

    #[test]
    fn sections_become_anchored_divs() {
        let result = transformed();
        assert!(result.html.contains("<div id=\"ch1\">"));
        assert!(result.html.contains("<div id=\"ch2\">"));
        // Generated id for the anonymous nested section.
        assert!(result.html.contains("<div id=\"section_2\">"));
    }

    #[test]
    fn headings_follow_nesting() {
        let result = transformed();
        assert!(result.html.contains("<h2>Chapter 1</h2>"));
        assert!(result.html.contains("<h3>Part 1</h3>"));
    }

    #[test]
    fn toc_levels_and_labels() {
        let result = transformed();
        let toc: Vec<(u32, &str, &str)> = result
            .toc
            .iter()
            .map(|e| (e.level, e.label.as_str(), e.href.as_str()))
            .collect();
        assert_eq!(
            toc,
            vec![
                (1, "Chapter 1", "#ch1"),
                (2, "Part 1", "#section_2"),
                (1, "Chapter 2", "#ch2"),
            ]
        );
    }

    #[test]
    fn inline_markup_maps_to_html() {
        let result = transformed();
        assert!(result
            .html
            .contains("<p class=\"paragraph\">First <em>em</em> text.</p>"));
        assert!(result.html.contains("<br/>"));
        assert!(result
            .html
            .contains("<img src=\"pic.png\" alt=\"a picture\"/>"));
    }

    #[test]
    fn inline_toc_nesting() {
        let result = transformed();
        let toc_html = inline_toc(&result.toc);
        assert!(toc_html.contains("<a href=\"#ch1\">Chapter 1</a>"));
        // Nested entry opens a second list.
        assert_eq!(toc_html.matches("<ul>").count(), 2);
        assert_eq!(toc_html.matches("</ul>").count(), 2);
    }

    #[test]
    fn no_inline_toc_option() {
        let metadata = Metadata {
            title: "T".into(),
            language: "en".into(),
            ..Default::default()
        };
        let result = to_html(SAMPLE, &metadata, true).unwrap();
        assert!(!result.html.contains("<li>"));
    }

    #[test]
    fn description_content_not_rendered() {
        let result = transformed();
        // The book-title element lives outside <body> and must not leak.
        assert!(!result.html.contains("<p class=\"paragraph\">T</p>"));
    }
}
