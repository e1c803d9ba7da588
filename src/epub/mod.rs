//! EPUB 2 output.

mod writer;

pub use writer::write_epub;
