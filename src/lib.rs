//! # alembic-core
//!
//! The abstract storage layer of the Alembic interchange format: a
//! hierarchy of objects carrying compound, scalar and array properties,
//! sampled over time, written through pluggable storage engines and
//! readable as one merged tree from several layered archives.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (POD, DataType, Dimensions, errors)
//! - [`core`] - Metadata, time sampling, headers, sample keys and the backend traits
//! - [`ogawa`] - Chunked streaming engine
//! - [`legacy`] - Hierarchical-dataset engine
//! - [`engine`] - Engine selection by magic bytes
//! - [`layer`] - Archive layering (prune / replace merge)
//! - [`abc`] - High-level API (IArchive, OArchive, objects, properties)
//! - [`config`] - Settings file and environment overrides
//!
//! ## Example
//!
//! ```ignore
//! use alembic_core::prelude::*;
//!
//! let archive = IArchive::open("animation.abc")?;
//! for child in archive.top()?.children() {
//!     println!("{}", child?.name());
//! }
//! ```

pub mod util;
pub mod core;
pub mod ogawa;
pub mod legacy;
pub mod engine;
pub mod layer;
pub mod abc;
pub mod config;

// Re-export commonly used types
pub use util::{DataType, Dimensions, Error, PlainOldDataType, Result};
pub use engine::{Engine, ReadOptions, WriteOptions};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::abc::{
        copy_archive, IArchive, IArrayProperty, ICompoundProperty, IObject, IProperty,
        IScalarProperty, OArchive, OArrayProperty, OCompoundProperty, OObject, OScalarProperty,
    };
    pub use crate::core::{MetaData, SampleSelector, TimeSampling};
    pub use crate::engine::{Engine, ReadOptions, WriteOptions};
    pub use crate::layer::LayerOptions;
    pub use crate::util::{AlembicPod, Bool, DataType, Dimensions, Error, PlainOldDataType, Result};
}
