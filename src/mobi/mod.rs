//! MOBI container formats: PalmDB packing, MOBI 6 and KF8 assembly.

pub mod headers;
pub mod index;
pub mod kf8;
pub mod palmdb;
pub mod palmdoc;
pub mod validate;
pub mod varint;

mod exth;
mod writer;

pub use exth::ExthWriter;
pub use headers::Compression;
pub use kf8::writer::{write_joint, write_kf8, Kf8Writer};
pub use validate::Validator;
pub use writer::{write_mobi6, MobiWriter, WriteOptions};
