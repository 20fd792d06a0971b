//! Legacy hierarchical-dataset storage engine.
//!
//! Archives are a single JSON document with nested groups and a
//! content-addressed dataset table. Slower and larger than Ogawa, but
//! trivially inspectable.

mod document;
mod reader;
mod writer;

pub use document::{LegacyDocument, LEGACY_MAGIC, LEGACY_VERSION};
pub use reader::LegacyArchiveReader;
pub use writer::{LegacyArchiveWriter, LegacyStore};
