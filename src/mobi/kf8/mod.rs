//! KF8 (MOBI 8): skeleton chunking, flow division table, writers.

pub mod fdst;
pub mod skeleton;
pub mod writer;

pub use fdst::Fdst;
pub use skeleton::{Skeleton, TARGET_CHUNK_SIZE};
