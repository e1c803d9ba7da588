//! Error types for conversion operations.

use thiserror::Error;

/// Errors that can occur while reading FB2 input or writing an ebook container.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid FB2: {0}")]
    InvalidFb2(String),

    /// A value did not fit its wire representation (VWI overflow, EXTH record
    /// too large, record index past u16).
    #[error("Encoding error: {0}")]
    Encode(String),

    /// Produced bytes violate a container invariant (FDST overlap, index
    /// back-reference to a missing record).
    #[error("Invalid structure: {0}")]
    Structure(String),

    /// The input book is missing something the writer cannot default.
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
