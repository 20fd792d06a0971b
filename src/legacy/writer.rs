//! Legacy archive writer.
//!
//! Payloads are collected into the dataset table as they are set; the
//! whole document is serialized in one go at close.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::document::*;
use crate::core::write_tree::{PropertyNode, SampleStore, SharedTree, TreeDigests, WriteTree, TOP};
use crate::core::{to_hex, ArchiveWriter, ArraySampleKey, MetaData, ObjectWriter, TimeSampling};
use crate::util::{Error, Result};

/// Sample storage backed by the in-memory dataset table.
pub struct LegacyStore {
    file: Option<File>,
    dedup: bool,
    datasets: Vec<LegacyDataset>,
    index: HashMap<ArraySampleKey, usize>,
    hits: usize,
}

impl SampleStore for LegacyStore {
    /// Dataset position.
    type Ref = usize;

    fn store(&mut self, key: &ArraySampleKey, data: &[u8]) -> Result<usize> {
        if self.dedup {
            if let Some(&id) = self.index.get(key) {
                self.hits += 1;
                return Ok(id);
            }
        }
        self.datasets.push(LegacyDataset {
            digest: key.digest_hex(),
            data: data.to_vec(),
        });
        let id = self.datasets.len() - 1;
        if self.dedup {
            self.index.insert(*key, id);
        }
        Ok(id)
    }

    fn dedup_count(&self) -> usize {
        self.hits
    }
}

pub struct LegacyArchiveWriter {
    name: String,
    tree: SharedTree<LegacyStore>,
    top: Arc<dyn ObjectWriter>,
}

impl LegacyArchiveWriter {
    pub fn create(path: impl AsRef<Path>, dedup: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let store = LegacyStore {
            file: Some(file),
            dedup,
            datasets: Vec::new(),
            index: HashMap::new(),
            hits: 0,
        };
        let tree = WriteTree::shared(store);
        let top = WriteTree::top_writer(&tree);
        debug!(path = %path.display(), dedup, "created legacy archive");
        Ok(Self {
            name: path.to_string_lossy().into_owned(),
            tree,
            top,
        })
    }
}

impl ArchiveWriter for LegacyArchiveWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn engine(&self) -> &'static str {
        "legacy"
    }

    fn top(&self) -> Arc<dyn ObjectWriter> {
        Arc::clone(&self.top)
    }

    fn dedup_count(&self) -> usize {
        self.tree.lock().store.dedup_count()
    }

    fn close(self: Box<Self>, time_samplings: &[TimeSampling], archive_metadata: &MetaData) -> Result<()> {
        let mut tree = self.tree.lock();
        tree.mark_closed();
        let digests = tree.digests(time_samplings);
        let max_samples = tree.max_samples(time_samplings.len());

        let top = build_group(&tree, &digests, TOP);
        let file = tree.store.file.take().ok_or(Error::Frozen)?;
        let document = LegacyDocument {
            version: LEGACY_VERSION,
            archive_metadata: archive_metadata.serialize(),
            time_samplings: time_samplings
                .iter()
                .zip(max_samples)
                .map(|(ts, max_samples)| {
                    let (time_per_cycle, times) = ts.encode();
                    LegacyTimeSampling {
                        time_per_cycle,
                        times,
                        max_samples,
                    }
                })
                .collect(),
            datasets: std::mem::take(&mut tree.store.datasets),
            top,
        };

        let mut out = BufWriter::new(file);
        out.write_all(LEGACY_MAGIC)?;
        serde_json::to_writer(&mut out, &document)?;
        out.flush()?;
        out.get_ref().sync_all()?;

        info!(
            archive = %self.name,
            objects = tree.objects.len(),
            datasets = document.datasets.len(),
            dedup_hits = tree.store.hits,
            "closed legacy archive"
        );
        Ok(())
    }
}

fn build_group(tree: &WriteTree<LegacyStore>, digests: &TreeDigests, id: usize) -> LegacyGroup {
    let node = &tree.objects[id];
    let object_digests = &digests.objects[id];
    LegacyGroup {
        name: node.header.name.clone(),
        metadata: node.header.meta_data.serialize(),
        properties: build_properties(tree, node.properties),
        children: node
            .children
            .iter()
            .map(|&child| build_group(tree, digests, child))
            .collect(),
        properties_hash: to_hex(&object_digests.properties),
        children_hash: to_hex(&object_digests.children),
    }
}

fn build_properties(tree: &WriteTree<LegacyStore>, compound: usize) -> Vec<LegacyProperty> {
    tree.compounds[compound]
        .children
        .iter()
        .map(|&child| match child {
            PropertyNode::Compound(c) => {
                let header = &tree.compounds[c].header;
                LegacyProperty::Compound {
                    name: header.name.clone(),
                    metadata: header.meta_data.serialize(),
                    properties: build_properties(tree, c),
                }
            }
            PropertyNode::Leaf(l) => {
                let leaf = &tree.leaves[l];
                let h = &leaf.header;
                let name = h.name.clone();
                let metadata = h.meta_data.serialize();
                let pod = h.data_type.pod.name().to_string();
                let extent = h.data_type.extent;
                let time_sampling = h.time_sampling_index;
                if h.is_array() {
                    LegacyProperty::Array {
                        name,
                        metadata,
                        pod,
                        extent,
                        time_sampling,
                        samples: leaf
                            .samples
                            .iter()
                            .map(|s| LegacyArraySample {
                                dataset: s.data,
                                dims: s
                                    .dims
                                    .as_ref()
                                    .map(|d| d.sizes().to_vec())
                                    .unwrap_or_default(),
                            })
                            .collect(),
                    }
                } else {
                    LegacyProperty::Scalar {
                        name,
                        metadata,
                        pod,
                        extent,
                        time_sampling,
                        samples: leaf.samples.iter().map(|s| s.data).collect(),
                    }
                }
            }
        })
        .collect()
}
