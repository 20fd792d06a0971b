//! Chunked streaming storage engine.
//!
//! ## File Structure
//!
//! ```text
//! +------------------+
//! | Magic: "Ogawa"   |  5 bytes
//! +------------------+
//! | Frozen flag      |  1 byte (0x00 or 0xFF)
//! +------------------+
//! | Version          |  2 bytes (u16 LE)
//! +------------------+
//! | Root Group Pos   |  8 bytes (u64 LE)
//! +------------------+
//! | ... Data ...     |
//! +------------------+
//! ```
//!
//! The root group holds `[version, library version, top object, archive
//! metadata, time samplings, indexed metadata]`. Each object group is
//! `[properties, child objects..., child headers]`; each compound group is
//! `[child properties..., property headers]`.

mod format;
mod reader;
mod stream;
mod read_util;
mod write_util;
mod writer;
mod abc_impl;

pub use format::*;
pub use reader::{IData, IGroup, IStreams};
pub use stream::OStream;
pub use write_util::library_version_string;
pub use writer::{OgawaArchiveWriter, OgawaStore};
pub use abc_impl::OgawaArchiveReader;
