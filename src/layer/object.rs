use std::sync::Arc;

use super::archive::LayerContext;
use super::merge::{Backing, MergeTable};
use super::property::LayeredCompound;
use crate::core::{
    check_index, CompoundPropertyReader, HandleCache, ObjectHeader, ObjectReader, PropertyHeader,
    SampleDigest,
};
use crate::util::{Error, Result};

/// Merged view of same-named objects from several inputs.
pub(crate) struct LayeredObject {
    ctx: Arc<LayerContext>,
    header: ObjectHeader,
    /// (input archive, object) in layer order.
    sources: Vec<(usize, Arc<dyn ObjectReader>)>,
    table: MergeTable<ObjectHeader>,
    child_headers: Vec<ObjectHeader>,
    children: HandleCache<LayeredObject>,
    properties: HandleCache<LayeredCompound>,
}

impl LayeredObject {
    pub fn new(
        ctx: Arc<LayerContext>,
        header: ObjectHeader,
        sources: Vec<(usize, Arc<dyn ObjectReader>)>,
    ) -> Result<Self> {
        let mut table = MergeTable::new(ctx.options.strict);
        for (source, (_, reader)) in sources.iter().enumerate() {
            for index in 0..reader.num_children() {
                if let Some(child) = reader.child_header(index) {
                    table.add(Backing { source, index }, child)?;
                }
            }
        }
        let child_headers: Vec<ObjectHeader> = table
            .iter()
            .map(|slot| {
                ObjectHeader::child_of(
                    &header.full_name,
                    &slot.header.name,
                    slot.merged_meta_data.clone(),
                )
            })
            .collect();
        Ok(Self {
            children: HandleCache::new(child_headers.len()),
            properties: HandleCache::new(1),
            ctx,
            header,
            sources,
            table,
            child_headers,
        })
    }
}

impl ObjectReader for LayeredObject {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn num_children(&self) -> usize {
        self.child_headers.len()
    }

    fn child_header(&self, index: usize) -> Option<&ObjectHeader> {
        self.child_headers.get(index)
    }

    fn child_index(&self, name: &str) -> Option<usize> {
        self.table.position(name)
    }

    fn child(&self, index: usize) -> Result<Arc<dyn ObjectReader>> {
        check_index(index, self.child_headers.len())?;
        let child = self.children.get_or_try_insert_with(index, || {
            let slot = self
                .table
                .get(index)
                .ok_or(Error::OutOfRange {
                    index,
                    count: self.table.len(),
                })?;
            let sources = slot
                .backings
                .iter()
                .map(|b| {
                    let (input, reader) = &self.sources[b.source];
                    Ok((*input, reader.child(b.index)?))
                })
                .collect::<Result<Vec<_>>>()?;
            LayeredObject::new(
                Arc::clone(&self.ctx),
                self.child_headers[index].clone(),
                sources,
            )
            .map(Arc::new)
        })?;
        Ok(child)
    }

    fn properties(&self) -> Result<Arc<dyn CompoundPropertyReader>> {
        let props = self.properties.get_or_try_insert_with(0, || {
            let sources = self
                .sources
                .iter()
                .map(|(input, reader)| Ok((*input, reader.properties()?)))
                .collect::<Result<Vec<_>>>()?;
            let header = PropertyHeader::compound("").with_meta_data(self.header.meta_data.clone());
            LayeredCompound::new(Arc::clone(&self.ctx), header, sources).map(Arc::new)
        })?;
        Ok(props)
    }

    fn properties_hash(&self) -> Option<SampleDigest> {
        match self.sources.as_slice() {
            [(_, only)] => only.properties_hash(),
            _ => None,
        }
    }

    fn children_hash(&self) -> Option<SampleDigest> {
        match self.sources.as_slice() {
            [(_, only)] => only.children_hash(),
            _ => None,
        }
    }
}
