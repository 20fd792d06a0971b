//! Archive layering.
//!
//! Several archives with "the same" tree are merged level by level into one
//! logical archive; later inputs win. Children whose metadata carries
//! `prune=1` delete the name from the merged level, `replace=1` drops the
//! contributions of earlier inputs for that name. Merged nodes are built
//! lazily on first access and cached through weak handles.

mod archive;
mod merge;
mod object;
mod property;

use serde::{Deserialize, Serialize};

pub use archive::LayeredArchive;
pub use merge::{Backing, MergeSlot, MergeTable, Mergeable};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerOptions {
    /// Fail with `LayerConflict` when a layer changes a property's shape
    /// instead of silently overriding it.
    pub strict: bool,
}

impl LayerOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}
