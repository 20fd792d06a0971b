//! Ogawa archive writer.
//!
//! Samples stream to disk as they are set, each block prefixed with its
//! 16-byte digest and shared across the archive when keys match. The
//! hierarchy itself (groups and header blocks) is written bottom-up at
//! close, after which the file header is patched with the root position
//! and the frozen flag.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::format::*;
use super::stream::OStream;
use super::write_util::{
    encode_object_header, encode_property_header, encode_time_samplings, LeafStats,
    MetaDataTable,
};
use crate::core::write_tree::{
    CompoundNode, LeafNode, ObjectNode, PropertyNode, SampleStore, SharedTree, TreeDigests,
    WriteTree, TOP,
};
use crate::core::{ArchiveWriter, ArraySampleKey, MetaData, ObjectWriter, TimeSampling};
use crate::util::{Dimensions, Result};

/// Sample storage that appends keyed data blocks to the output stream.
pub struct OgawaStore {
    stream: OStream,
    dedup: bool,
    written: HashMap<ArraySampleKey, u64>,
    hits: usize,
}

impl OgawaStore {
    pub fn new(stream: OStream, dedup: bool) -> Self {
        Self {
            stream,
            dedup,
            written: HashMap::new(),
            hits: 0,
        }
    }
}

impl SampleStore for OgawaStore {
    /// Data offset of the stored block.
    type Ref = u64;

    fn store(&mut self, key: &ArraySampleKey, data: &[u8]) -> Result<u64> {
        if self.dedup {
            if let Some(&offset) = self.written.get(key) {
                self.hits += 1;
                return Ok(offset);
            }
        }
        let pos = self.stream.write_keyed(&key.digest, data)?;
        let offset = make_data_offset(pos);
        if self.dedup {
            self.written.insert(*key, offset);
        }
        Ok(offset)
    }

    fn dedup_count(&self) -> usize {
        self.hits
    }
}

pub struct OgawaArchiveWriter {
    name: String,
    tree: SharedTree<OgawaStore>,
    top: Arc<dyn ObjectWriter>,
}

impl OgawaArchiveWriter {
    pub fn create(path: impl AsRef<Path>, dedup: bool) -> Result<Self> {
        let path = path.as_ref();
        let stream = OStream::create(path)?;
        let tree = WriteTree::shared(OgawaStore::new(stream, dedup));
        let top = WriteTree::top_writer(&tree);
        debug!(path = %path.display(), dedup, "created ogawa archive");
        Ok(Self {
            name: path.to_string_lossy().into_owned(),
            tree,
            top,
        })
    }
}

impl ArchiveWriter for OgawaArchiveWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn engine(&self) -> &'static str {
        "ogawa"
    }

    fn top(&self) -> Arc<dyn ObjectWriter> {
        Arc::clone(&self.top)
    }

    fn dedup_count(&self) -> usize {
        self.tree.lock().store.dedup_count()
    }

    fn close(self: Box<Self>, time_samplings: &[TimeSampling], archive_metadata: &MetaData) -> Result<()> {
        let mut guard = self.tree.lock();
        guard.mark_closed();
        let digests = guard.digests(time_samplings);
        let max_samples = guard.max_samples(time_samplings.len());

        let WriteTree {
            store,
            objects,
            compounds,
            leaves,
            ..
        } = &mut *guard;

        let mut layout = Layout {
            out: &mut store.stream,
            objects,
            compounds,
            leaves,
            digests: &digests,
            table: MetaDataTable::new(),
            dims: HashMap::new(),
        };
        let top = layout.write_object(TOP)?;
        let Layout { out, table, .. } = layout;

        let version = out.write_data(&ARCHIVE_FORMAT_VERSION.to_le_bytes())?;
        let library = out.write_data(&LIBRARY_VERSION.to_le_bytes())?;
        let md = out.write_data(archive_metadata.serialize().as_bytes())?;
        let ts = out.write_data(&encode_time_samplings(time_samplings, &max_samples))?;
        let indexed = out.write_data(&table.encode())?;
        let root = out.write_group(&[version, library, top, md, ts, indexed])?;
        out.finalize(extract_offset(root))?;

        info!(
            archive = %self.name,
            objects = objects.len(),
            properties = leaves.len(),
            dedup_hits = store.hits,
            "closed ogawa archive"
        );
        Ok(())
    }
}

/// Bottom-up writer of the hierarchy.
struct Layout<'a> {
    out: &'a mut OStream,
    objects: &'a [ObjectNode],
    compounds: &'a [CompoundNode],
    leaves: &'a [LeafNode<u64>],
    digests: &'a TreeDigests,
    table: MetaDataTable,
    /// Dimension blocks already written, by encoded bytes.
    dims: HashMap<Vec<u8>, u64>,
}

impl Layout<'_> {
    fn write_object(&mut self, id: usize) -> Result<u64> {
        let objects = self.objects;
        let node = &objects[id];

        let mut children = Vec::with_capacity(node.children.len() + 2);
        children.push(self.write_compound(node.properties)?);

        let mut headers = Vec::new();
        for &child in &node.children {
            children.push(self.write_object(child)?);
            encode_object_header(&mut headers, &objects[child].header, &mut self.table);
        }
        let digests = &self.digests.objects[id];
        headers.extend_from_slice(&digests.properties);
        headers.extend_from_slice(&digests.children);
        children.push(self.out.write_data(&headers)?);

        self.out.write_group(&children)
    }

    fn write_compound(&mut self, id: usize) -> Result<u64> {
        let compounds = self.compounds;
        let leaves = self.leaves;
        let node = &compounds[id];

        let mut children = Vec::with_capacity(node.children.len() + 1);
        let mut headers = Vec::new();
        for &child in &node.children {
            match child {
                PropertyNode::Compound(c) => {
                    children.push(self.write_compound(c)?);
                    encode_property_header(&mut headers, &compounds[c].header, None, &mut self.table);
                }
                PropertyNode::Leaf(l) => {
                    let (group, stats) = self.write_leaf(&leaves[l])?;
                    children.push(group);
                    encode_property_header(&mut headers, &leaves[l].header, Some(stats), &mut self.table);
                }
            }
        }
        children.push(self.out.write_data(&headers)?);

        self.out.write_group(&children)
    }

    fn write_leaf(&mut self, leaf: &LeafNode<u64>) -> Result<(u64, LeafStats)> {
        let is_array = leaf.header.is_array();
        let mut children = Vec::with_capacity(leaf.samples.len() * if is_array { 2 } else { 1 });
        for slot in &leaf.samples {
            children.push(slot.data);
            if is_array {
                let dims = slot.dims.clone().unwrap_or_default();
                children.push(self.dims_block(&dims)?);
            }
        }

        let is_homogenous = match leaf.samples.first() {
            Some(first) if is_array => {
                let points = first.dims.as_ref().map(Dimensions::num_points);
                leaf.samples
                    .iter()
                    .all(|s| s.dims.as_ref().map(Dimensions::num_points) == points)
            }
            _ => true,
        };
        let stats = LeafStats {
            num_samples: leaf.samples.len() as u32,
            first_changed_index: leaf.first_changed_index(),
            last_changed_index: leaf.last_changed_index(),
            is_homogenous,
        };
        Ok((self.out.write_group(&children)?, stats))
    }

    fn dims_block(&mut self, dims: &Dimensions) -> Result<u64> {
        let bytes = dims.to_le_bytes();
        if let Some(&offset) = self.dims.get(&bytes) {
            return Ok(offset);
        }
        let offset = self.out.write_data(&bytes)?;
        self.dims.insert(bytes, offset);
        Ok(offset)
    }
}
