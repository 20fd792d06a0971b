//! Backend reader traits implemented over an Ogawa file.
//!
//! Handles are created lazily and shared through weak handle caches, so
//! two lookups of the same child return the same live handle.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::format::{root, CURRENT_VERSION, DATA_KEY_SIZE, LIBRARY_VERSION};
use super::read_util::{
    read_indexed_metadata, read_object_headers, read_property_headers,
    read_time_samplings_and_max, ParsedPropertyHeader,
};
use super::reader::{IData, IGroup, IStreams};
use crate::core::{
    check_index, ArchiveReader, ArraySample, ArraySampleKey, ArrayPropertyReader, CachePos,
    CompoundPropertyReader, HandleCache, MetaData, ObjectHeader, ObjectReader, PropertyHeader,
    PropertyReader, PropertyType, ReadArraySampleCache, SampleDigest, ScalarPropertyReader,
    TimeSampling,
};
use crate::util::{Dimensions, Error, Result};

/// State shared by every handle of one archive.
struct ArchiveContext {
    streams: Arc<IStreams>,
    time_samplings: Vec<Arc<TimeSampling>>,
    indexed_metadata: Vec<MetaData>,
    cache: Arc<ReadArraySampleCache>,
}

pub struct OgawaArchiveReader {
    name: String,
    ctx: Arc<ArchiveContext>,
    archive_version: i32,
    library_version: i32,
    max_samples: Vec<u32>,
    metadata: MetaData,
    top_group: IGroup,
    top: HandleCache<OgawaObject>,
}

impl OgawaArchiveReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, true, Arc::new(ReadArraySampleCache::default()))
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        use_mmap: bool,
        cache: Arc<ReadArraySampleCache>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let streams = Arc::new(IStreams::open(path, use_mmap)?);
        if !streams.is_frozen() {
            return Err(Error::invalid("archive was never closed"));
        }
        if streams.version() != CURRENT_VERSION {
            return Err(Error::UnsupportedVersion(streams.version()));
        }

        let root_group = IGroup::new(Arc::clone(&streams), streams.root_pos()?)?;
        if root_group.num_children() < root::COUNT {
            return Err(Error::invalid(format!(
                "archive root has {} children",
                root_group.num_children()
            )));
        }

        let archive_version = read_i32(&root_group.data(root::VERSION)?)?;
        let library_version = read_i32(&root_group.data(root::LIBRARY_VERSION)?)?;
        if library_version > LIBRARY_VERSION {
            debug!(library_version, "archive written by a newer library");
        }

        let metadata = MetaData::deserialize(&root_group.data(root::ARCHIVE_METADATA)?.read_string()?);
        let (time_samplings, max_samples) =
            read_time_samplings_and_max(&root_group.data(root::TIME_SAMPLINGS)?)?;
        let indexed_metadata = read_indexed_metadata(&root_group.data(root::INDEXED_METADATA)?)?;
        let top_group = root_group.group(root::TOP_OBJECT)?;

        debug!(
            path = %path.display(),
            time_samplings = time_samplings.len(),
            indexed_metadata = indexed_metadata.len(),
            "opened ogawa archive"
        );

        Ok(Self {
            name: path.to_string_lossy().into_owned(),
            ctx: Arc::new(ArchiveContext {
                streams,
                time_samplings: time_samplings.into_iter().map(Arc::new).collect(),
                indexed_metadata,
                cache,
            }),
            archive_version,
            library_version,
            max_samples,
            metadata,
            top_group,
            top: HandleCache::new(1),
        })
    }

    pub fn archive_version(&self) -> i32 {
        self.archive_version
    }

    pub fn library_version(&self) -> i32 {
        self.library_version
    }
}

fn read_i32(data: &IData) -> Result<i32> {
    let bytes = data.read_all()?;
    let word: [u8; 4] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::invalid(format!("expected 4-byte version, got {}", bytes.len())))?;
    Ok(i32::from_le_bytes(word))
}

impl ArchiveReader for OgawaArchiveReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn engine(&self) -> &'static str {
        "ogawa"
    }

    fn num_time_samplings(&self) -> usize {
        self.ctx.time_samplings.len()
    }

    fn time_sampling(&self, index: usize) -> Option<Arc<TimeSampling>> {
        self.ctx.time_samplings.get(index).cloned()
    }

    fn max_num_samples_for_time_sampling(&self, index: usize) -> Option<usize> {
        self.max_samples.get(index).map(|&n| n as usize)
    }

    fn archive_metadata(&self) -> &MetaData {
        &self.metadata
    }

    fn top(&self) -> Result<Arc<dyn ObjectReader>> {
        let top = self.top.get_or_try_insert_with(0, || {
            let header = ObjectHeader::top(self.metadata.clone());
            OgawaObject::new(Arc::clone(&self.ctx), header, self.top_group.clone()).map(Arc::new)
        })?;
        Ok(top)
    }
}

// ============================================================================
// Objects
// ============================================================================

struct OgawaObject {
    ctx: Arc<ArchiveContext>,
    header: ObjectHeader,
    group: IGroup,
    child_headers: Vec<ObjectHeader>,
    properties_hash: SampleDigest,
    children_hash: SampleDigest,
    children: HandleCache<OgawaObject>,
    properties: HandleCache<OgawaCompound>,
}

impl OgawaObject {
    fn new(ctx: Arc<ArchiveContext>, header: ObjectHeader, group: IGroup) -> Result<Self> {
        let n = group.num_children();
        if n < 2 {
            return Err(Error::invalid(format!(
                "object '{}' group has {n} children",
                header.full_name
            )));
        }
        let (child_headers, properties_hash, children_hash) =
            read_object_headers(&group.data(n - 1)?, &header.full_name, &ctx.indexed_metadata)?;
        if child_headers.len() as u64 != n - 2 {
            return Err(Error::invalid(format!(
                "object '{}' lists {} headers for {} child groups",
                header.full_name,
                child_headers.len(),
                n - 2
            )));
        }
        Ok(Self {
            children: HandleCache::new(child_headers.len()),
            properties: HandleCache::new(1),
            ctx,
            header,
            group,
            child_headers,
            properties_hash,
            children_hash,
        })
    }
}

impl ObjectReader for OgawaObject {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn num_children(&self) -> usize {
        self.child_headers.len()
    }

    fn child_header(&self, index: usize) -> Option<&ObjectHeader> {
        self.child_headers.get(index)
    }

    fn child(&self, index: usize) -> Result<Arc<dyn ObjectReader>> {
        check_index(index, self.child_headers.len())?;
        let child = self.children.get_or_try_insert_with(index, || {
            let group = self.group.group(index as u64 + 1)?;
            let header = self.child_headers[index].clone();
            OgawaObject::new(Arc::clone(&self.ctx), header, group).map(Arc::new)
        })?;
        Ok(child)
    }

    fn properties(&self) -> Result<Arc<dyn CompoundPropertyReader>> {
        let props = self.properties.get_or_try_insert_with(0, || {
            let header = PropertyHeader::compound("").with_meta_data(self.header.meta_data.clone());
            OgawaCompound::new(Arc::clone(&self.ctx), header, self.group.group(0)?).map(Arc::new)
        })?;
        Ok(props)
    }

    fn properties_hash(&self) -> Option<SampleDigest> {
        Some(self.properties_hash)
    }

    fn children_hash(&self) -> Option<SampleDigest> {
        Some(self.children_hash)
    }
}

// ============================================================================
// Properties
// ============================================================================

struct OgawaCompound {
    ctx: Arc<ArchiveContext>,
    header: PropertyHeader,
    group: IGroup,
    headers: Vec<ParsedPropertyHeader>,
    compounds: HandleCache<OgawaCompound>,
    leaves: HandleCache<OgawaLeaf>,
}

impl OgawaCompound {
    fn new(ctx: Arc<ArchiveContext>, header: PropertyHeader, group: IGroup) -> Result<Self> {
        let n = group.num_children();
        let headers = if n == 0 {
            Vec::new()
        } else {
            read_property_headers(&group.data(n - 1)?, &ctx.indexed_metadata)?
        };
        if n > 0 && headers.len() as u64 != n - 1 {
            return Err(Error::invalid(format!(
                "compound '{}' lists {} headers for {} child groups",
                header.name,
                headers.len(),
                n - 1
            )));
        }
        Ok(Self {
            compounds: HandleCache::new(headers.len()),
            leaves: HandleCache::new(headers.len()),
            ctx,
            header,
            group,
            headers,
        })
    }

    fn leaf(&self, index: usize) -> Result<Arc<OgawaLeaf>> {
        self.leaves.get_or_try_insert_with(index, || {
            let info = self.headers[index].clone();
            let group = self.group.group(index as u64)?;
            OgawaLeaf::new(&self.ctx, info, group).map(Arc::new)
        })
    }
}

impl CompoundPropertyReader for OgawaCompound {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn num_properties(&self) -> usize {
        self.headers.len()
    }

    fn property_header(&self, index: usize) -> Option<&PropertyHeader> {
        self.headers.get(index).map(|h| &h.header)
    }

    fn property(&self, index: usize) -> Result<PropertyReader> {
        check_index(index, self.headers.len())?;
        Ok(match self.headers[index].header.property_type {
            PropertyType::Compound => {
                let compound = self.compounds.get_or_try_insert_with(index, || {
                    let header = self.headers[index].header.clone();
                    let group = self.group.group(index as u64)?;
                    OgawaCompound::new(Arc::clone(&self.ctx), header, group).map(Arc::new)
                })?;
                PropertyReader::Compound(compound)
            }
            PropertyType::Scalar => PropertyReader::Scalar(self.leaf(index)?),
            PropertyType::Array => PropertyReader::Array(self.leaf(index)?),
        })
    }
}

/// Scalar or array property. Scalars store one data child per sample;
/// arrays store a payload child followed by a dimensions child.
struct OgawaLeaf {
    info: ParsedPropertyHeader,
    group: IGroup,
    time_sampling: Arc<TimeSampling>,
    cache: Arc<ReadArraySampleCache>,
}

impl OgawaLeaf {
    fn new(ctx: &ArchiveContext, info: ParsedPropertyHeader, group: IGroup) -> Result<Self> {
        let ts_index = info.header.time_sampling_index as usize;
        let time_sampling = ctx
            .time_samplings
            .get(ts_index)
            .cloned()
            .ok_or_else(|| {
                Error::invalid(format!(
                    "property '{}' uses unknown time sampling {ts_index}",
                    info.header.name
                ))
            })?;
        let stride = if info.header.is_array() { 2 } else { 1 };
        if group.num_children() != u64::from(info.num_samples) * stride {
            return Err(Error::invalid(format!(
                "property '{}' has {} sample blocks for {} samples",
                info.header.name,
                group.num_children(),
                info.num_samples
            )));
        }
        Ok(Self {
            info,
            group,
            time_sampling,
            cache: Arc::clone(&ctx.cache),
        })
    }

    fn stride(&self) -> u64 {
        if self.info.header.is_array() {
            2
        } else {
            1
        }
    }

    fn sample_block(&self, index: usize) -> Result<IData> {
        check_index(index, self.info.num_samples as usize)?;
        let data = self.group.data(index as u64 * self.stride())?;
        if data.size() < DATA_KEY_SIZE as u64 {
            return Err(Error::invalid(format!(
                "sample {index} of '{}' is missing its key",
                self.info.header.name
            )));
        }
        Ok(data)
    }

    fn payload(&self, index: usize) -> Result<Vec<u8>> {
        let data = self.sample_block(index)?;
        data.read_range(DATA_KEY_SIZE as u64, (data.size() - DATA_KEY_SIZE as u64) as usize)
    }

    fn key(&self, index: usize) -> Result<ArraySampleKey> {
        let data = self.sample_block(index)?;
        let mut digest = [0u8; DATA_KEY_SIZE];
        digest.copy_from_slice(&data.read_range(0, DATA_KEY_SIZE)?);
        Ok(ArraySampleKey {
            digest,
            num_bytes: data.size() - DATA_KEY_SIZE as u64,
            data_type: self.info.header.data_type,
        })
    }

    fn dimensions(&self, index: usize) -> Result<Dimensions> {
        check_index(index, self.info.num_samples as usize)?;
        let data = self.group.data(index as u64 * 2 + 1)?;
        Ok(Dimensions::from_le_bytes(&data.read_all()?))
    }
}

impl ScalarPropertyReader for OgawaLeaf {
    fn header(&self) -> &PropertyHeader {
        &self.info.header
    }

    fn time_sampling(&self) -> Arc<TimeSampling> {
        Arc::clone(&self.time_sampling)
    }

    fn num_samples(&self) -> usize {
        self.info.num_samples as usize
    }

    fn is_constant(&self) -> bool {
        self.info.is_constant()
    }

    fn sample(&self, index: usize) -> Result<Vec<u8>> {
        self.payload(index)
    }

    fn sample_key(&self, index: usize) -> Result<ArraySampleKey> {
        self.key(index)
    }
}

impl ArrayPropertyReader for OgawaLeaf {
    fn header(&self) -> &PropertyHeader {
        &self.info.header
    }

    fn time_sampling(&self) -> Arc<TimeSampling> {
        Arc::clone(&self.time_sampling)
    }

    fn num_samples(&self) -> usize {
        self.info.num_samples as usize
    }

    fn is_constant(&self) -> bool {
        self.info.is_constant()
    }

    fn sample(&self, index: usize) -> Result<ArraySample> {
        let block = self.sample_block(index)?;
        let pos = CachePos {
            data_pos: block.pos(),
        };
        let data = match self.cache.get(pos) {
            Some(data) => data,
            None => self.cache.insert(pos, self.payload(index)?),
        };
        Ok(ArraySample::new(
            data,
            self.dimensions(index)?,
            self.info.header.data_type,
        ))
    }

    fn sample_key(&self, index: usize) -> Result<ArraySampleKey> {
        self.key(index)
    }

    fn sample_dimensions(&self, index: usize) -> Result<Dimensions> {
        self.dimensions(index)
    }
}
