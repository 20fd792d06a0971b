//! Storage engine selection.
//!
//! Readers pick the engine from the first bytes of the file; writers use
//! whatever [`WriteOptions::engine`] names.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{ArchiveReader, ArchiveWriter, ReadArraySampleCache};
use crate::legacy::{LegacyArchiveReader, LegacyArchiveWriter, LEGACY_MAGIC};
use crate::ogawa::{OgawaArchiveReader, OgawaArchiveWriter, OGAWA_MAGIC};
use crate::util::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Ogawa,
    Legacy,
}

impl Engine {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ogawa => "ogawa",
            Self::Legacy => "legacy",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ogawa" => Some(Self::Ogawa),
            "legacy" | "hdf5" => Some(Self::Legacy),
            _ => None,
        }
    }

    /// Engine that wrote `path`, judged by its magic bytes.
    pub fn sniff(path: impl AsRef<Path>) -> Result<Self> {
        let mut head = [0u8; 16];
        let mut file = File::open(path.as_ref())?;
        let mut filled = 0;
        while filled < head.len() {
            match file.read(&mut head[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        let head = &head[..filled];
        if head.starts_with(OGAWA_MAGIC) {
            Ok(Self::Ogawa)
        } else if head.starts_with(LEGACY_MAGIC) {
            Ok(Self::Legacy)
        } else {
            Err(Error::InvalidMagic)
        }
    }

    /// Open `path` with whichever engine wrote it.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<dyn ArchiveReader>> {
        Self::open_with(path, &ReadOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Arc<dyn ArchiveReader>> {
        let path = path.as_ref();
        let failed = |engine: &str, e: Error| Error::ArchiveOpenFailed {
            path: path.to_path_buf(),
            engine: engine.to_string(),
            reason: e.to_string(),
        };

        let engine = Self::sniff(path).map_err(|e| failed("auto", e))?;
        debug!(path = %path.display(), engine = engine.name(), "opening archive");
        let reader: Arc<dyn ArchiveReader> = match engine {
            Self::Ogawa => {
                let cache = Arc::new(ReadArraySampleCache::new(options.cache_bytes));
                Arc::new(
                    OgawaArchiveReader::open_with(path, options.mmap, cache)
                        .map_err(|e| failed(engine.name(), e))?,
                )
            }
            Self::Legacy => {
                Arc::new(LegacyArchiveReader::open(path).map_err(|e| failed(engine.name(), e))?)
            }
        };
        Ok(reader)
    }

    /// Create a new archive at `path`, truncating any existing file.
    pub fn create(path: impl AsRef<Path>, options: &WriteOptions) -> Result<Box<dyn ArchiveWriter>> {
        let path = path.as_ref();
        let created: Result<Box<dyn ArchiveWriter>> = match options.engine {
            Self::Ogawa => OgawaArchiveWriter::create(path, options.dedup)
                .map(|w| Box::new(w) as Box<dyn ArchiveWriter>),
            Self::Legacy => LegacyArchiveWriter::create(path, options.dedup)
                .map(|w| Box::new(w) as Box<dyn ArchiveWriter>),
        };
        created.map_err(|e| Error::ArchiveOpenFailed {
            path: path.to_path_buf(),
            engine: options.engine.name().to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| Error::other(format!("unknown engine '{s}'")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOptions {
    pub engine: Engine,
    /// Share one stored payload between equal samples archive-wide.
    pub dedup: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            engine: Engine::Ogawa,
            dedup: true,
        }
    }
}

impl WriteOptions {
    pub fn engine(engine: Engine) -> Self {
        Self {
            engine,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadOptions {
    /// Memory-map Ogawa files instead of buffered reads.
    pub mmap: bool,
    /// Byte budget of the array sample cache.
    pub cache_bytes: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            mmap: cfg!(feature = "mmap"),
            cache_bytes: 64 * 1024 * 1024,
        }
    }
}
