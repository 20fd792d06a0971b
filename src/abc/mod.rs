//! High-level archive API.
//!
//! This module provides the main entry points for reading and writing archives:
//! - [`IArchive`] / [`OArchive`] - Archive (file) access
//! - [`IObject`] / [`OObject`] - Hierarchical objects, including instances
//! - [`ICompoundProperty`] / [`OCompoundProperty`] - Property containers
//! - [`IScalarProperty`] / [`OScalarProperty`] - Single-value properties
//! - [`IArrayProperty`] / [`OArrayProperty`] - Array properties
//!
//! ## Example
//!
//! ```ignore
//! use alembic_core::prelude::*;
//!
//! let mut archive = OArchive::create("scene.abc", Engine::Ogawa)?;
//! let ts = archive.add_time_sampling(TimeSampling::uniform(1.0 / 24.0, 0.0)?);
//! let mesh = archive.top().create_child("mesh", MetaData::new())?;
//! let mut p = mesh.properties().create_array("P", DataType::VEC3F, MetaData::new(), ts)?;
//! p.set_typed(&[0.0f32, 1.0, 2.0])?;
//! archive.close()?;
//! ```

mod archive;
mod copy;
mod object;
mod property;
mod write_context;

pub use archive::{keys, IArchive, OArchive};
pub use copy::copy_archive;
pub use object::{IObject, OObject, INSTANCE_SOURCE};
pub use property::{
    IArrayProperty, ICompoundProperty, IProperty, IScalarProperty, OArrayProperty,
    OCompoundProperty, OScalarProperty,
};
