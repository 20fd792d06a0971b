//! Input and output archives.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use super::object::{IObject, OObject};
use super::write_context::WriteContext;
use crate::core::{ArchiveReader, ArchiveWriter, MetaData, TimeSampling};
use crate::engine::{Engine, ReadOptions, WriteOptions};
use crate::layer::{LayerOptions, LayeredArchive};
use crate::ogawa::library_version_string;
use crate::util::{Error, Result};

/// Archive metadata keys.
pub mod keys {
    pub const APPLICATION: &str = "_ai_Application";
    pub const DATE_WRITTEN: &str = "_ai_DateWritten";
    pub const DESCRIPTION: &str = "_ai_Description";
    pub const DCC_FPS: &str = "_ai_DCC_FPS";
    pub const ALEMBIC_VERSION: &str = "_ai_AlembicVersion";
}

// ============================================================================
// IArchive
// ============================================================================

/// Input archive.
#[derive(Clone)]
pub struct IArchive {
    reader: Arc<dyn ArchiveReader>,
}

impl IArchive {
    /// Open `path` with the engine named by its magic bytes.
    ///
    /// # Example
    /// ```ignore
    /// let archive = IArchive::open("scene.abc")?;
    /// println!("{} children", archive.top()?.num_children());
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &ReadOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Self> {
        Ok(Self::from_reader(Engine::open_with(path, options)?))
    }

    /// Open several archives as one merged view. Later paths win.
    pub fn open_layered<P: AsRef<Path>>(
        paths: &[P],
        read: &ReadOptions,
        layer: LayerOptions,
    ) -> Result<Self> {
        let inputs = paths
            .iter()
            .map(|p| Engine::open_with(p, read))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_reader(Arc::new(LayeredArchive::new(inputs, layer)?)))
    }

    pub fn from_reader(reader: Arc<dyn ArchiveReader>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &Arc<dyn ArchiveReader> {
        &self.reader
    }

    pub fn name(&self) -> &str {
        self.reader.name()
    }

    pub fn engine(&self) -> &'static str {
        self.reader.engine()
    }

    pub fn num_time_samplings(&self) -> usize {
        self.reader.num_time_samplings()
    }

    /// Time sampling `index`; `InvalidIndex` past the end of the table.
    pub fn time_sampling(&self, index: usize) -> Result<Arc<TimeSampling>> {
        self.reader
            .time_sampling(index)
            .ok_or(Error::InvalidIndex(index as i64))
    }

    pub fn max_num_samples_for_time_sampling(&self, index: usize) -> Option<usize> {
        self.reader.max_num_samples_for_time_sampling(index)
    }

    pub fn archive_metadata(&self) -> &MetaData {
        self.reader.archive_metadata()
    }

    pub fn app_name(&self) -> Option<&str> {
        self.archive_metadata().try_get(keys::APPLICATION)
    }

    pub fn date_written(&self) -> Option<&str> {
        self.archive_metadata().try_get(keys::DATE_WRITTEN)
    }

    pub fn user_description(&self) -> Option<&str> {
        self.archive_metadata().try_get(keys::DESCRIPTION)
    }

    pub fn dcc_fps(&self) -> Option<f64> {
        self.archive_metadata()
            .try_get(keys::DCC_FPS)
            .and_then(|s| s.parse().ok())
    }

    pub fn library_version(&self) -> Option<&str> {
        self.archive_metadata().try_get(keys::ALEMBIC_VERSION)
    }

    pub fn top(&self) -> Result<IObject> {
        IObject::top(Arc::clone(&self.reader))
    }

    /// Object at a full path such as `/a/b`, resolving instances on the way.
    pub fn find_object(&self, path: &str) -> Result<Option<IObject>> {
        let mut current = self.top()?;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            match current.try_child_by_name(part)? {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

impl std::fmt::Debug for IArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IArchive").field("name", &self.name()).finish()
    }
}

// ============================================================================
// OArchive
// ============================================================================

/// Output archive. Dropping it without [`OArchive::close`] still finalizes
/// the file; errors are then only logged.
pub struct OArchive {
    writer: Option<Box<dyn ArchiveWriter>>,
    ctx: Arc<Mutex<WriteContext>>,
    top: OObject,
    metadata: MetaData,
}

impl OArchive {
    pub fn create(path: impl AsRef<Path>, engine: Engine) -> Result<Self> {
        Self::create_with(path, &WriteOptions::engine(engine))
    }

    pub fn create_with(path: impl AsRef<Path>, options: &WriteOptions) -> Result<Self> {
        let writer = Engine::create(path, options)?;
        let ctx = Arc::new(Mutex::new(WriteContext::new()));
        let top = OObject::new(writer.top(), Arc::clone(&ctx));
        debug!(archive = writer.name(), engine = writer.engine(), "opened output archive");
        Ok(Self {
            writer: Some(writer),
            ctx,
            top,
            metadata: MetaData::new(),
        })
    }

    pub fn name(&self) -> &str {
        self.writer.as_ref().map_or("", |w| w.name())
    }

    pub fn top(&self) -> OObject {
        self.top.clone()
    }

    /// Register `ts`, returning the index of an equal sampling if one exists.
    /// Index 0 is the identity sampling.
    pub fn add_time_sampling(&self, ts: TimeSampling) -> u32 {
        self.ctx.lock().add_time_sampling(ts)
    }

    pub fn num_time_samplings(&self) -> usize {
        self.ctx.lock().time_samplings.len()
    }

    pub fn time_sampling(&self, index: usize) -> Result<TimeSampling> {
        self.ctx
            .lock()
            .time_samplings
            .get(index)
            .cloned()
            .ok_or(Error::InvalidIndex(index as i64))
    }

    pub fn archive_metadata(&self) -> &MetaData {
        &self.metadata
    }

    pub fn archive_metadata_mut(&mut self) -> &mut MetaData {
        &mut self.metadata
    }

    pub fn set_app_name(&mut self, name: &str) {
        self.metadata.set(keys::APPLICATION, name);
    }

    pub fn set_date_written(&mut self, date: &str) {
        self.metadata.set(keys::DATE_WRITTEN, date);
    }

    pub fn set_description(&mut self, description: &str) {
        self.metadata.set(keys::DESCRIPTION, description);
    }

    pub fn set_dcc_fps(&mut self, fps: f64) {
        self.metadata.set(keys::DCC_FPS, fps.to_string());
    }

    /// Sample writes satisfied by an already stored payload.
    pub fn dedup_count(&self) -> usize {
        self.writer.as_ref().map_or(0, |w| w.dedup_count())
    }

    /// Finalize the file.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        if !self.metadata.contains(keys::ALEMBIC_VERSION) {
            self.metadata
                .set(keys::ALEMBIC_VERSION, library_version_string());
        }
        let time_samplings = self.ctx.lock().time_samplings.clone();
        writer.close(&time_samplings, &self.metadata)
    }
}

impl Drop for OArchive {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!(error = %e, "failed to close archive on drop");
        }
    }
}
