//! Legacy archive reader. The document is parsed once and the hierarchy
//! served from memory.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::document::*;
use crate::core::{
    check_index, from_hex, ArchiveReader, ArraySample, ArraySampleKey, ArrayPropertyReader,
    CompoundPropertyReader, MetaData, ObjectHeader, ObjectReader, PropertyHeader, PropertyReader,
    SampleDigest, ScalarPropertyReader, TimeSampling,
};
use crate::util::{DataType, Dimensions, Error, PlainOldDataType, Result};

struct Dataset {
    digest: SampleDigest,
    data: Arc<Vec<u8>>,
}

/// Datasets and time samplings shared by all leaves.
struct Tables {
    datasets: Vec<Dataset>,
    time_samplings: Vec<Arc<TimeSampling>>,
}

pub struct LegacyArchiveReader {
    name: String,
    metadata: MetaData,
    time_samplings: Vec<Arc<TimeSampling>>,
    max_samples: Vec<u32>,
    top: Arc<LegacyObject>,
}

impl LegacyArchiveReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let body = bytes.strip_prefix(LEGACY_MAGIC).ok_or(Error::InvalidMagic)?;
        let document: LegacyDocument = serde_json::from_slice(body)?;
        let reader = Self::from_document(path.to_string_lossy().into_owned(), document)?;
        debug!(path = %path.display(), "opened legacy archive");
        Ok(reader)
    }

    pub fn from_document(name: String, document: LegacyDocument) -> Result<Self> {
        if document.version != LEGACY_VERSION {
            return Err(Error::UnsupportedVersion(document.version as u16));
        }

        let mut time_samplings = Vec::with_capacity(document.time_samplings.len());
        let mut max_samples = Vec::with_capacity(document.time_samplings.len());
        for ts in document.time_samplings {
            time_samplings.push(Arc::new(TimeSampling::decode(ts.time_per_cycle, ts.times)?));
            max_samples.push(ts.max_samples);
        }
        if time_samplings.is_empty() {
            time_samplings.push(Arc::new(TimeSampling::identity()));
            max_samples.push(0);
        }

        let datasets = document
            .datasets
            .into_iter()
            .map(|ds| {
                let digest = from_hex(&ds.digest)
                    .ok_or_else(|| Error::invalid(format!("bad dataset digest '{}'", ds.digest)))?;
                Ok(Dataset {
                    digest,
                    data: Arc::new(ds.data),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let tables = Arc::new(Tables {
            datasets,
            time_samplings: time_samplings.clone(),
        });
        let metadata = MetaData::deserialize(&document.archive_metadata);
        let top_header = ObjectHeader::top(metadata.clone());
        let top = Arc::new(LegacyObject::build(&tables, top_header, &document.top)?);

        Ok(Self {
            name,
            metadata,
            time_samplings,
            max_samples,
            top,
        })
    }
}

impl ArchiveReader for LegacyArchiveReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn engine(&self) -> &'static str {
        "legacy"
    }

    fn num_time_samplings(&self) -> usize {
        self.time_samplings.len()
    }

    fn time_sampling(&self, index: usize) -> Option<Arc<TimeSampling>> {
        self.time_samplings.get(index).cloned()
    }

    fn max_num_samples_for_time_sampling(&self, index: usize) -> Option<usize> {
        self.max_samples.get(index).map(|&n| n as usize)
    }

    fn archive_metadata(&self) -> &MetaData {
        &self.metadata
    }

    fn top(&self) -> Result<Arc<dyn ObjectReader>> {
        Ok(self.top.clone())
    }
}

struct LegacyObject {
    header: ObjectHeader,
    child_headers: Vec<ObjectHeader>,
    children: Vec<Arc<LegacyObject>>,
    properties: Arc<LegacyCompound>,
    properties_hash: Option<SampleDigest>,
    children_hash: Option<SampleDigest>,
}

impl LegacyObject {
    fn build(tables: &Arc<Tables>, header: ObjectHeader, group: &LegacyGroup) -> Result<Self> {
        let mut children = Vec::with_capacity(group.children.len());
        for child in &group.children {
            let md = MetaData::deserialize(&child.metadata);
            let child_header = ObjectHeader::child_of(&header.full_name, &child.name, md);
            children.push(Arc::new(LegacyObject::build(tables, child_header, child)?));
        }
        let top = PropertyHeader::compound("").with_meta_data(header.meta_data.clone());
        let properties = Arc::new(LegacyCompound::build(tables, top, &group.properties)?);
        Ok(Self {
            child_headers: children.iter().map(|c| c.header.clone()).collect(),
            children,
            properties,
            properties_hash: from_hex(&group.properties_hash),
            children_hash: from_hex(&group.children_hash),
            header,
        })
    }
}

impl ObjectReader for LegacyObject {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn num_children(&self) -> usize {
        self.children.len()
    }

    fn child_header(&self, index: usize) -> Option<&ObjectHeader> {
        self.child_headers.get(index)
    }

    fn child(&self, index: usize) -> Result<Arc<dyn ObjectReader>> {
        check_index(index, self.children.len())?;
        Ok(self.children[index].clone())
    }

    fn properties(&self) -> Result<Arc<dyn CompoundPropertyReader>> {
        Ok(self.properties.clone())
    }

    fn properties_hash(&self) -> Option<SampleDigest> {
        self.properties_hash
    }

    fn children_hash(&self) -> Option<SampleDigest> {
        self.children_hash
    }
}

struct LegacyCompound {
    header: PropertyHeader,
    headers: Vec<PropertyHeader>,
    properties: Vec<PropertyReader>,
}

impl LegacyCompound {
    fn build(tables: &Arc<Tables>, header: PropertyHeader, props: &[LegacyProperty]) -> Result<Self> {
        let mut properties = Vec::with_capacity(props.len());
        for prop in props {
            let reader = match prop {
                LegacyProperty::Compound {
                    name,
                    metadata,
                    properties,
                } => {
                    let h = PropertyHeader::compound(name.as_str())
                        .with_meta_data(MetaData::deserialize(metadata));
                    PropertyReader::Compound(Arc::new(LegacyCompound::build(tables, h, properties)?))
                }
                LegacyProperty::Scalar {
                    name,
                    metadata,
                    pod,
                    extent,
                    time_sampling,
                    samples,
                } => {
                    let h = PropertyHeader::scalar(name.as_str(), data_type(pod, *extent)?)
                        .with_time_sampling(*time_sampling)
                        .with_meta_data(MetaData::deserialize(metadata));
                    let samples = samples.iter().map(|&id| (id, None)).collect();
                    PropertyReader::Scalar(Arc::new(LegacyLeaf::build(tables, h, samples)?))
                }
                LegacyProperty::Array {
                    name,
                    metadata,
                    pod,
                    extent,
                    time_sampling,
                    samples,
                } => {
                    let h = PropertyHeader::array(name.as_str(), data_type(pod, *extent)?)
                        .with_time_sampling(*time_sampling)
                        .with_meta_data(MetaData::deserialize(metadata));
                    let samples = samples
                        .iter()
                        .map(|s| (s.dataset, Some(Dimensions::from_slice(&s.dims))))
                        .collect();
                    PropertyReader::Array(Arc::new(LegacyLeaf::build(tables, h, samples)?))
                }
            };
            properties.push(reader);
        }
        Ok(Self {
            headers: properties.iter().map(|p| p.header().clone()).collect(),
            header,
            properties,
        })
    }
}

fn data_type(pod: &str, extent: u8) -> Result<DataType> {
    let dt = DataType::new(PlainOldDataType::from_name(pod), extent);
    dt.validate()?;
    Ok(dt)
}

impl CompoundPropertyReader for LegacyCompound {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn num_properties(&self) -> usize {
        self.properties.len()
    }

    fn property_header(&self, index: usize) -> Option<&PropertyHeader> {
        self.headers.get(index)
    }

    fn property(&self, index: usize) -> Result<PropertyReader> {
        check_index(index, self.properties.len())?;
        Ok(self.properties[index].clone())
    }
}

struct LegacyLeaf {
    header: PropertyHeader,
    tables: Arc<Tables>,
    time_sampling: Arc<TimeSampling>,
    /// Dataset id and, for arrays, the sample shape.
    samples: Vec<(usize, Option<Dimensions>)>,
    constant: bool,
}

impl LegacyLeaf {
    fn build(
        tables: &Arc<Tables>,
        header: PropertyHeader,
        samples: Vec<(usize, Option<Dimensions>)>,
    ) -> Result<Self> {
        let ts_index = header.time_sampling_index as usize;
        let time_sampling = tables
            .time_samplings
            .get(ts_index)
            .cloned()
            .ok_or_else(|| {
                Error::invalid(format!(
                    "property '{}' uses unknown time sampling {ts_index}",
                    header.name
                ))
            })?;
        if let Some(&(id, _)) = samples.iter().find(|(id, _)| *id >= tables.datasets.len()) {
            return Err(Error::invalid(format!(
                "property '{}' refers to missing dataset {id}",
                header.name
            )));
        }

        let key_of = |id: usize| {
            let ds = &tables.datasets[id];
            (ds.digest, ds.data.len())
        };
        let constant = match samples.first() {
            Some(&(first, _)) => samples.iter().all(|&(id, _)| key_of(id) == key_of(first)),
            None => true,
        };

        Ok(Self {
            header,
            tables: Arc::clone(tables),
            time_sampling,
            samples,
            constant,
        })
    }

    fn dataset(&self, index: usize) -> Result<&Dataset> {
        check_index(index, self.samples.len())?;
        Ok(&self.tables.datasets[self.samples[index].0])
    }

    fn key(&self, index: usize) -> Result<ArraySampleKey> {
        let ds = self.dataset(index)?;
        Ok(ArraySampleKey {
            digest: ds.digest,
            num_bytes: ds.data.len() as u64,
            data_type: self.header.data_type,
        })
    }
}

impl ScalarPropertyReader for LegacyLeaf {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn time_sampling(&self) -> Arc<TimeSampling> {
        Arc::clone(&self.time_sampling)
    }

    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn is_constant(&self) -> bool {
        self.constant
    }

    fn sample(&self, index: usize) -> Result<Vec<u8>> {
        Ok(self.dataset(index)?.data.as_ref().clone())
    }

    fn sample_key(&self, index: usize) -> Result<ArraySampleKey> {
        self.key(index)
    }
}

impl ArrayPropertyReader for LegacyLeaf {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn time_sampling(&self) -> Arc<TimeSampling> {
        Arc::clone(&self.time_sampling)
    }

    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn is_constant(&self) -> bool {
        self.constant
    }

    fn sample(&self, index: usize) -> Result<ArraySample> {
        let ds = self.dataset(index)?;
        Ok(ArraySample::new(
            Arc::clone(&ds.data),
            self.sample_dimensions(index)?,
            self.header.data_type,
        ))
    }

    fn sample_key(&self, index: usize) -> Result<ArraySampleKey> {
        self.key(index)
    }

    fn sample_dimensions(&self, index: usize) -> Result<Dimensions> {
        check_index(index, self.samples.len())?;
        Ok(self.samples[index].1.clone().unwrap_or_default())
    }
}
