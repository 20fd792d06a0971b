//! Layered archive: several input archives presented as one.

use std::sync::Arc;

use tracing::debug;

use super::object::LayeredObject;
use super::LayerOptions;
use crate::core::{ArchiveReader, HandleCache, MetaData, ObjectHeader, ObjectReader, TimeSampling};
use crate::util::{Error, Result};

/// State shared by every node of one layered tree.
pub(crate) struct LayerContext {
    pub options: LayerOptions,
    /// Per input: local time sampling index -> merged index.
    pub ts_remap: Vec<Vec<u32>>,
}

impl LayerContext {
    pub fn remap_time_sampling(&self, input: usize, index: u32) -> Result<u32> {
        self.ts_remap
            .get(input)
            .and_then(|table| table.get(index as usize))
            .copied()
            .ok_or(Error::InvalidIndex(i64::from(index)))
    }
}

pub struct LayeredArchive {
    name: String,
    inputs: Vec<Arc<dyn ArchiveReader>>,
    ctx: Arc<LayerContext>,
    time_samplings: Vec<Arc<TimeSampling>>,
    max_samples: Vec<Option<usize>>,
    metadata: MetaData,
    top: HandleCache<LayeredObject>,
}

impl LayeredArchive {
    /// Merge `inputs`; later inputs take precedence.
    pub fn new(inputs: Vec<Arc<dyn ArchiveReader>>, options: LayerOptions) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::other("layering needs at least one input archive"));
        }

        let mut time_samplings: Vec<Arc<TimeSampling>> = vec![Arc::new(TimeSampling::identity())];
        let mut max_samples: Vec<Option<usize>> = vec![None];
        let mut ts_remap = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let mut remap = Vec::with_capacity(input.num_time_samplings());
            for i in 0..input.num_time_samplings() {
                let ts = input
                    .time_sampling(i)
                    .ok_or(Error::InvalidIndex(i as i64))?;
                let merged = match time_samplings.iter().position(|t| **t == *ts) {
                    Some(m) => m,
                    None => {
                        time_samplings.push(ts);
                        max_samples.push(None);
                        time_samplings.len() - 1
                    }
                };
                if let Some(n) = input.max_num_samples_for_time_sampling(i) {
                    let slot = &mut max_samples[merged];
                    *slot = Some(slot.map_or(n, |m| m.max(n)));
                }
                remap.push(merged as u32);
            }
            ts_remap.push(remap);
        }

        let mut metadata = inputs[0].archive_metadata().clone();
        for input in &inputs[1..] {
            metadata.append_only_unique(input.archive_metadata());
        }

        let name = inputs
            .iter()
            .map(|i| i.name())
            .collect::<Vec<_>>()
            .join("+");
        debug!(
            archive = %name,
            inputs = inputs.len(),
            time_samplings = time_samplings.len(),
            strict = options.strict,
            "layered archives"
        );

        Ok(Self {
            name,
            inputs,
            ctx: Arc::new(LayerContext { options, ts_remap }),
            time_samplings,
            max_samples,
            metadata,
            top: HandleCache::new(1),
        })
    }

    pub fn inputs(&self) -> &[Arc<dyn ArchiveReader>] {
        &self.inputs
    }
}

impl ArchiveReader for LayeredArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn engine(&self) -> &'static str {
        "layered"
    }

    fn num_time_samplings(&self) -> usize {
        self.time_samplings.len()
    }

    fn time_sampling(&self, index: usize) -> Option<Arc<TimeSampling>> {
        self.time_samplings.get(index).cloned()
    }

    fn max_num_samples_for_time_sampling(&self, index: usize) -> Option<usize> {
        self.max_samples.get(index).copied().flatten()
    }

    fn archive_metadata(&self) -> &MetaData {
        &self.metadata
    }

    fn top(&self) -> Result<Arc<dyn ObjectReader>> {
        let top = self.top.get_or_try_insert_with(0, || {
            let sources = self
                .inputs
                .iter()
                .enumerate()
                .map(|(i, input)| Ok((i, input.top()?)))
                .collect::<Result<Vec<_>>>()?;
            let header = ObjectHeader::top(self.metadata.clone());
            LayeredObject::new(Arc::clone(&self.ctx), header, sources).map(Arc::new)
        })?;
        Ok(top)
    }
}
