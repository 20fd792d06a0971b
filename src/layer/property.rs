use std::sync::Arc;

use super::archive::LayerContext;
use super::merge::{Backing, MergeTable};
use crate::core::{
    check_index, ArraySample, ArraySampleKey, ArrayPropertyReader, CompoundPropertyReader,
    HandleCache, PropertyHeader, PropertyReader, ScalarPropertyReader, TimeSampling,
};
use crate::util::{Dimensions, Error, Result};

/// Merged view of same-named compounds from several inputs.
pub(crate) struct LayeredCompound {
    ctx: Arc<LayerContext>,
    header: PropertyHeader,
    /// (input archive, compound) in layer order.
    sources: Vec<(usize, Arc<dyn CompoundPropertyReader>)>,
    table: MergeTable<PropertyHeader>,
    /// Winning headers with time sampling indices in the merged table.
    headers: Vec<PropertyHeader>,
    compounds: HandleCache<LayeredCompound>,
}

impl LayeredCompound {
    pub fn new(
        ctx: Arc<LayerContext>,
        header: PropertyHeader,
        sources: Vec<(usize, Arc<dyn CompoundPropertyReader>)>,
    ) -> Result<Self> {
        let mut table = MergeTable::new(ctx.options.strict);
        for (source, (_, reader)) in sources.iter().enumerate() {
            for index in 0..reader.num_properties() {
                if let Some(child) = reader.property_header(index) {
                    table.add(Backing { source, index }, child)?;
                }
            }
        }
        let headers = table
            .iter()
            .map(|slot| {
                let mut h = slot.header.clone();
                if !h.is_compound() {
                    let input = sources[slot.last().source].0;
                    h.time_sampling_index = ctx.remap_time_sampling(input, h.time_sampling_index)?;
                }
                Ok(h)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            compounds: HandleCache::new(headers.len()),
            ctx,
            header,
            sources,
            table,
            headers,
        })
    }

    fn backing(&self, b: Backing) -> Result<(usize, PropertyReader)> {
        let (input, reader) = &self.sources[b.source];
        Ok((*input, reader.property(b.index)?))
    }
}

impl CompoundPropertyReader for LayeredCompound {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn num_properties(&self) -> usize {
        self.headers.len()
    }

    fn property_header(&self, index: usize) -> Option<&PropertyHeader> {
        self.headers.get(index)
    }

    fn property_index(&self, name: &str) -> Option<usize> {
        self.table.position(name)
    }

    fn property(&self, index: usize) -> Result<PropertyReader> {
        check_index(index, self.headers.len())?;
        let slot = self.table.get(index).ok_or(Error::OutOfRange {
            index,
            count: self.table.len(),
        })?;
        let header = self.headers[index].clone();

        if header.is_compound() {
            let compound = self.compounds.get_or_try_insert_with(index, || {
                let sources = slot
                    .backings
                    .iter()
                    .map(|&b| match self.backing(b)? {
                        (input, PropertyReader::Compound(c)) => Ok((input, c)),
                        (_, other) => Err(Error::invalid(format!(
                            "layered compound '{}' backed by a {} property",
                            header.name,
                            other.header().property_type
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                LayeredCompound::new(Arc::clone(&self.ctx), header.clone(), sources).map(Arc::new)
            })?;
            return Ok(PropertyReader::Compound(compound));
        }

        match self.backing(slot.last())?.1 {
            PropertyReader::Scalar(inner) => {
                Ok(PropertyReader::Scalar(Arc::new(LayeredLeaf { header, inner })))
            }
            PropertyReader::Array(inner) => {
                Ok(PropertyReader::Array(Arc::new(LayeredLeaf { header, inner })))
            }
            PropertyReader::Compound(_) => Err(Error::invalid(format!(
                "layered leaf '{}' backed by a compound",
                header.name
            ))),
        }
    }
}

/// Leaf property of one input, presented with a merged time sampling index.
struct LayeredLeaf<R: ?Sized> {
    header: PropertyHeader,
    inner: Arc<R>,
}

impl ScalarPropertyReader for LayeredLeaf<dyn ScalarPropertyReader> {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn time_sampling(&self) -> Arc<TimeSampling> {
        self.inner.time_sampling()
    }

    fn num_samples(&self) -> usize {
        self.inner.num_samples()
    }

    fn is_constant(&self) -> bool {
        self.inner.is_constant()
    }

    fn sample(&self, index: usize) -> Result<Vec<u8>> {
        self.inner.sample(index)
    }

    fn sample_key(&self, index: usize) -> Result<ArraySampleKey> {
        self.inner.sample_key(index)
    }
}

impl ArrayPropertyReader for LayeredLeaf<dyn ArrayPropertyReader> {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn time_sampling(&self) -> Arc<TimeSampling> {
        self.inner.time_sampling()
    }

    fn num_samples(&self) -> usize {
        self.inner.num_samples()
    }

    fn is_constant(&self) -> bool {
        self.inner.is_constant()
    }

    fn sample(&self, index: usize) -> Result<ArraySample> {
        self.inner.sample(index)
    }

    fn sample_key(&self, index: usize) -> Result<ArraySampleKey> {
        self.inner.sample_key(index)
    }

    fn sample_dimensions(&self, index: usize) -> Result<Dimensions> {
        self.inner.sample_dimensions(index)
    }
}
