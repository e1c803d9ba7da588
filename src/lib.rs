//! # fb2mobi
//!
//! Converts FictionBook (FB2) documents into e-reader containers: MOBI 6,
//! KF8 (MOBI 8), joint MOBI6+KF8 files, and EPUB 2 archives.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fb2mobi::{read_fb2, write_mobi6, WriteOptions};
//!
//! let book = read_fb2("input.fb2")?;
//! let mut out = std::fs::File::create("output.mobi")?;
//! write_mobi6(&book, WriteOptions::default(), &mut out)?;
//! # Ok::<(), fb2mobi::Error>(())
//! ```
//!
//! ## Building Books Programmatically
//!
//! The [`Book`] struct is the format-agnostic representation every writer
//! consumes:
//!
//! ```
//! use fb2mobi::{Book, TocEntry};
//!
//! let mut book = Book::new();
//! book.metadata.title = "My Book".into();
//! book.metadata.language = "en".into();
//! book.content = "<html><body><h2 id=\"ch1\">One</h2></body></html>".into();
//! book.toc.push(TocEntry::new("ch1", "Chapter 1", "#ch1"));
//! ```

pub mod book;
pub mod epub;
pub mod error;
pub mod fb2;
pub mod mobi;
pub(crate) mod util;

pub use book::{Author, Book, Metadata, Resource, Series, TocEntry};
pub use epub::write_epub;
pub use error::{Error, Result};
pub use fb2::{read_fb2, read_fb2_bytes};
pub use mobi::{write_joint, write_kf8, write_mobi6, Compression, Validator, WriteOptions};
