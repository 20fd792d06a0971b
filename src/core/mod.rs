//! Core layer - abstract traits and fundamental types.
//!
//! This module provides:
//! - [`TimeSampling`] - time sampling for animated properties
//! - [`MetaData`] - ordered key-value metadata
//! - [`ObjectHeader`] / [`PropertyHeader`] - headers for objects and properties
//! - the storage backend contract (reader/writer traits)
//! - [`ArraySampleKey`] - sample content keys
//! - [`write_tree`] - the in-memory write tree shared by the engines

mod time_sampling;
mod metadata;
mod header;
mod traits;
mod sample;
mod key;
mod cache;
pub mod write_tree;

pub use time_sampling::{
    Chrono, TimeSampling, TimeSamplingType, ACYCLIC_TIME_PER_CYCLE, CHRONO_EPSILON,
};
pub use metadata::MetaData;
pub use header::{join_path, ObjectHeader, PropertyHeader, PropertyType};
pub use traits::{
    // Archive traits
    ArchiveReader, ArchiveWriter,
    // Object traits
    ObjectReader, ObjectWriter,
    // Property traits
    PropertyReader,
    ScalarPropertyReader, ScalarPropertyWriter,
    ArrayPropertyReader, ArrayPropertyWriter,
    CompoundPropertyReader, CompoundPropertyWriter,
    check_index,
};
pub use sample::{ArraySample, SampleSelector};
pub use key::{compute_digest, from_hex, to_hex, ArraySampleKey, DigestBuilder, SampleDigest};
pub use cache::{CachePos, HandleCache, ReadArraySampleCache};
