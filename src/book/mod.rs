//! Format-agnostic book model.
//!
//! A [`Book`] is what the FB2 pipeline produces and what every writer
//! consumes: metadata, one canonical HTML content blob, a table of contents
//! tree, and a manifest of binary resources keyed by id.

use std::collections::BTreeMap;

/// A resource (image, stylesheet, font) with its data and media type.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// An author with structured name parts.
#[derive(Debug, Clone, Default)]
pub struct Author {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub nickname: String,
}

impl Author {
    /// "First Middle Last", falling back to the nickname.
    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [
            self.first_name.as_str(),
            self.middle_name.as_str(),
            self.last_name.as_str(),
        ]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();

        if parts.is_empty() {
            self.nickname.clone()
        } else {
            parts.join(" ")
        }
    }

    /// "Last, First Middle" for sorting.
    pub fn sort_name(&self) -> String {
        if self.last_name.is_empty() {
            return self.full_name();
        }
        let mut name = self.last_name.clone();
        if !self.first_name.is_empty() {
            name.push_str(", ");
            name.push_str(&self.first_name);
            if !self.middle_name.is_empty() {
                name.push(' ');
                name.push_str(&self.middle_name);
            }
        }
        name
    }
}

/// Series membership (name plus position).
#[derive(Debug, Clone)]
pub struct Series {
    pub name: String,
    pub index: u32,
}

/// Book metadata (FB2 title-info + publish-info).
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<Author>,
    pub language: String,
    pub publisher: Option<String>,
    pub isbn: Option<String>,
    pub year: Option<String>,
    pub series: Option<Series>,
    pub genres: Vec<String>,
    pub keywords: Vec<String>,
    pub annotation: Option<String>,
    pub rights: Option<String>,
    /// Manifest id of the cover image, when the FB2 declares one.
    pub cover_id: Option<String>,
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Authors joined as a single display string.
    pub fn author_line(&self) -> String {
        self.authors
            .iter()
            .map(Author::full_name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A table of contents entry (hierarchical).
#[derive(Debug, Clone)]
pub struct TocEntry {
    pub id: String,
    pub label: String,
    pub href: String,
    pub level: u32,
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    pub fn new(id: impl Into<String>, label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            href: href.into(),
            level: 1,
            children: Vec::new(),
        }
    }
}

/// An ebook in a format-agnostic representation.
///
/// Immutable while a writer runs; writers borrow it read-only and own their
/// transient record buffers.
#[derive(Debug, Clone, Default)]
pub struct Book {
    pub metadata: Metadata,
    /// The rendered HTML for the whole book. Image references use
    /// `src="<resource id>"`; the MOBI writer rewrites them to `recindex=`.
    pub content: String,
    pub toc: Vec<TocEntry>,
    /// Manifest keyed by resource id. BTreeMap keeps iteration in sorted id
    /// order, which fixes the image record order.
    pub resources: BTreeMap<String, Resource>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(
        &mut self,
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: impl Into<String>,
        data: Vec<u8>,
    ) {
        let id = id.into();
        self.resources.insert(
            id.clone(),
            Resource {
                id,
                href: href.into(),
                media_type: media_type.into(),
                data,
            },
        );
    }

    pub fn get_resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Cover image bytes, when the metadata names a cover present in the
    /// manifest.
    pub fn cover_data(&self) -> Option<&[u8]> {
        let id = self.metadata.cover_id.as_deref()?;
        self.resources.get(id).map(|r| r.data.as_slice())
    }

    pub fn has_images(&self) -> bool {
        self.resources
            .values()
            .any(|r| r.media_type.starts_with("image/"))
    }

    /// Image resource ids in sorted order, optionally skipping one id
    /// (the cover, which the writer places separately).
    pub fn image_ids(&self, skip: Option<&str>) -> Vec<&str> {
        self.resources
            .values()
            .filter(|r| r.media_type.starts_with("image/"))
            .filter(|r| Some(r.id.as_str()) != skip)
            .map(|r| r.id.as_str())
            .collect()
    }

    /// Depth-first flattening of the TOC tree.
    pub fn flat_toc(&self) -> Vec<&TocEntry> {
        fn walk<'a>(entries: &'a [TocEntry], out: &mut Vec<&'a TocEntry>) {
            for entry in entries {
                out.push(entry);
                walk(&entry.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.toc, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_names() {
        let author = Author {
            first_name: "John".into(),
            middle_name: "Q".into(),
            last_name: "Doe".into(),
            nickname: String::new(),
        };
        assert_eq!(author.full_name(), "John Q Doe");
        assert_eq!(author.sort_name(), "Doe, John Q");

        let nick = Author {
            nickname: "anon".into(),
            ..Default::default()
        };
        assert_eq!(nick.full_name(), "anon");
    }

    #[test]
    fn image_ids_sorted_and_filtered() {
        let mut book = Book::new();
        book.add_resource("z.png", "z.png", "image/png", vec![1]);
        book.add_resource("a.jpg", "a.jpg", "image/jpeg", vec![2]);
        book.add_resource("style.css", "style.css", "text/css", vec![3]);

        assert_eq!(book.image_ids(None), vec!["a.jpg", "z.png"]);
        assert_eq!(book.image_ids(Some("a.jpg")), vec!["z.png"]);
        assert!(book.has_images());
    }

    #[test]
    fn flat_toc_depth_first() {
        let mut book = Book::new();
        let mut ch1 = TocEntry::new("ch1", "Chapter 1", "#ch1");
        let mut sub = TocEntry::new("s1", "Part 1", "#s1");
        sub.level = 2;
        ch1.children.push(sub);
        book.toc.push(ch1);
        book.toc.push(TocEntry::new("ch2", "Chapter 2", "#ch2"));

        let flat: Vec<&str> = book.flat_toc().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(flat, vec!["ch1", "s1", "ch2"]);
    }
}
