//! In-memory write tree shared by the storage engines.
//!
//! Objects, compounds and leaf properties live in index arenas behind one
//! lock. Handles handed to callers carry an arena id plus a copy of their
//! header. Sample payloads go straight to the engine's [`SampleStore`] as
//! they are set; only the returned references are kept here. At close the
//! engine walks the tree bottom-up and lays out the hierarchy.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

use crate::core::key::DigestBuilder;
use crate::core::traits::{
    ArrayPropertyWriter, CompoundPropertyWriter, ObjectWriter, ScalarPropertyWriter,
};
use crate::core::{
    ArraySampleKey, MetaData, ObjectHeader, PropertyHeader, SampleDigest, TimeSampling,
};
use crate::util::{Dimensions, Error, Result};

/// Physical sample storage of an engine.
pub trait SampleStore: Send + 'static {
    /// Reference to a stored payload (file offset, dataset id, ...).
    type Ref: Clone + Send + Sync + 'static;

    /// Store `data` under `key`, returning a reference to it. Engines with
    /// dedup enabled return the existing reference for a known key.
    fn store(&mut self, key: &ArraySampleKey, data: &[u8]) -> Result<Self::Ref>;

    fn dedup_count(&self) -> usize;
}

/// One sample index of a leaf property.
#[derive(Clone, Debug)]
pub struct SampleSlot<R> {
    pub data: R,
    pub key: ArraySampleKey,
    /// Present for array properties.
    pub dims: Option<Dimensions>,
}

pub struct LeafNode<R> {
    pub header: PropertyHeader,
    pub samples: Vec<SampleSlot<R>>,
}

impl<R> LeafNode<R> {
    pub fn is_constant(&self) -> bool {
        match self.samples.first() {
            Some(first) => self.samples.iter().all(|s| s.key == first.key),
            None => true,
        }
    }

    /// First index whose key differs from the previous one (0 when constant).
    pub fn first_changed_index(&self) -> u32 {
        self.changed_indices().next().unwrap_or(0)
    }

    /// Last index whose key differs from the previous one (0 when constant).
    pub fn last_changed_index(&self) -> u32 {
        self.changed_indices().last().unwrap_or(0)
    }

    fn changed_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.samples
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0].key != w[1].key)
            .map(|(i, _)| i as u32 + 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyNode {
    Compound(usize),
    Leaf(usize),
}

pub struct CompoundNode {
    pub header: PropertyHeader,
    pub children: Vec<PropertyNode>,
    /// Human-readable location for error messages.
    label: String,
}

pub struct ObjectNode {
    pub header: ObjectHeader,
    pub children: Vec<usize>,
    pub properties: usize,
}

/// Per-object digests computed at close.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectDigests {
    pub properties: SampleDigest,
    pub children: SampleDigest,
    /// Fold of name, metadata and both digests above.
    pub full: SampleDigest,
}

/// Digests of every node, indexed like the arenas.
pub struct TreeDigests {
    pub leaves: Vec<SampleDigest>,
    pub compounds: Vec<SampleDigest>,
    pub objects: Vec<ObjectDigests>,
}

impl TreeDigests {
    pub fn property(&self, node: PropertyNode) -> SampleDigest {
        match node {
            PropertyNode::Compound(i) => self.compounds[i],
            PropertyNode::Leaf(i) => self.leaves[i],
        }
    }
}

pub struct WriteTree<S: SampleStore> {
    pub store: S,
    pub objects: Vec<ObjectNode>,
    pub compounds: Vec<CompoundNode>,
    pub leaves: Vec<LeafNode<S::Ref>>,
    closed: bool,
}

pub type SharedTree<S> = Arc<Mutex<WriteTree<S>>>;

/// Object id of the top object.
pub const TOP: usize = 0;

impl<S: SampleStore> WriteTree<S> {
    /// New tree with the top object already in place.
    pub fn new(store: S) -> Self {
        let mut tree = Self {
            store,
            objects: Vec::new(),
            compounds: Vec::new(),
            leaves: Vec::new(),
            closed: false,
        };
        tree.add_object(ObjectHeader::top(MetaData::new()));
        tree
    }

    pub fn shared(store: S) -> SharedTree<S> {
        Arc::new(Mutex::new(Self::new(store)))
    }

    /// Handle to the top object.
    pub fn top_writer(tree: &SharedTree<S>) -> Arc<dyn ObjectWriter> {
        let header = tree.lock().objects[TOP].header.clone();
        Arc::new(TreeObject {
            tree: Arc::clone(tree),
            id: TOP,
            header,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reject all further writes.
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Frozen)
        } else {
            Ok(())
        }
    }

    fn add_object(&mut self, header: ObjectHeader) -> usize {
        let properties = self.compounds.len();
        self.compounds.push(CompoundNode {
            header: PropertyHeader::compound(""),
            children: Vec::new(),
            label: header.full_name.clone(),
        });
        self.objects.push(ObjectNode {
            header,
            children: Vec::new(),
            properties,
        });
        self.objects.len() - 1
    }

    pub fn property_header(&self, node: PropertyNode) -> &PropertyHeader {
        match node {
            PropertyNode::Compound(i) => &self.compounds[i].header,
            PropertyNode::Leaf(i) => &self.leaves[i].header,
        }
    }

    fn check_property_name(&self, compound: usize, name: &str) -> Result<()> {
        let node = &self.compounds[compound];
        if node
            .children
            .iter()
            .any(|&c| self.property_header(c).name == name)
        {
            return Err(Error::DuplicateName {
                parent: node.label.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Sample count per time sampling index across all leaves.
    pub fn max_samples(&self, num_time_samplings: usize) -> Vec<u32> {
        let mut max = vec![0u32; num_time_samplings];
        for leaf in &self.leaves {
            if let Some(slot) = max.get_mut(leaf.header.time_sampling_index as usize) {
                *slot = (*slot).max(leaf.samples.len() as u32);
            }
        }
        max
    }

    /// Digests for every node. Children always have larger ids than their
    /// parents, so one reverse sweep per arena suffices.
    pub fn digests(&self, time_samplings: &[TimeSampling]) -> TreeDigests {
        let leaves: Vec<SampleDigest> = self
            .leaves
            .iter()
            .map(|leaf| leaf_digest(leaf, time_samplings))
            .collect();

        let mut compounds = vec![[0u8; 16]; self.compounds.len()];
        for id in (0..self.compounds.len()).rev() {
            let node = &self.compounds[id];
            let mut b = DigestBuilder::new();
            b.update_str(&node.header.name);
            b.update_str(&node.header.meta_data.serialize());
            for &child in &node.children {
                let d = match child {
                    PropertyNode::Compound(i) => compounds[i],
                    PropertyNode::Leaf(i) => leaves[i],
                };
                b.update(&d);
            }
            compounds[id] = b.finish();
        }

        let mut objects = vec![ObjectDigests::default(); self.objects.len()];
        for id in (0..self.objects.len()).rev() {
            let node = &self.objects[id];
            let properties = compounds[node.properties];
            let children = if node.children.is_empty() {
                [0u8; 16]
            } else {
                let mut b = DigestBuilder::new();
                for &c in &node.children {
                    b.update(&objects[c].full);
                }
                b.finish()
            };
            let mut b = DigestBuilder::new();
            b.update(&children);
            b.update(&properties);
            b.update_str(&node.header.meta_data.serialize());
            b.update_str(&node.header.name);
            objects[id] = ObjectDigests {
                properties,
                children,
                full: b.finish(),
            };
        }

        TreeDigests {
            leaves,
            compounds,
            objects,
        }
    }
}

fn leaf_digest<R>(leaf: &LeafNode<R>, time_samplings: &[TimeSampling]) -> SampleDigest {
    let h = &leaf.header;
    let mut b = DigestBuilder::new();
    b.update_str(&h.name);
    b.update_str(&h.meta_data.serialize());
    b.update(&[h.property_type.as_u8(), h.data_type.pod.as_u8(), h.data_type.extent]);
    if let Some(ts) = time_samplings.get(h.time_sampling_index as usize) {
        let (tpc, times) = ts.encode();
        b.update_f64(tpc);
        for t in times {
            b.update_f64(t);
        }
    }
    for s in &leaf.samples {
        b.update(&s.key.digest);
    }
    b.finish()
}

// ============================================================================
// Handles
// ============================================================================

struct TreeObject<S: SampleStore> {
    tree: SharedTree<S>,
    id: usize,
    header: ObjectHeader,
}

impl<S: SampleStore> ObjectWriter for TreeObject<S> {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn create_child(&self, name: &str, meta_data: MetaData) -> Result<Arc<dyn ObjectWriter>> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::invalid(format!("invalid object name '{name}'")));
        }
        let mut tree = self.tree.lock();
        tree.check_open()?;
        let taken = tree.objects[self.id]
            .children
            .iter()
            .any(|&c| tree.objects[c].header.name == name);
        if taken {
            return Err(Error::DuplicateName {
                parent: self.header.full_name.clone(),
                name: name.to_string(),
            });
        }

        let header = ObjectHeader::child_of(&self.header.full_name, name, meta_data);
        let id = tree.add_object(header.clone());
        tree.objects[self.id].children.push(id);
        trace!(object = %header.full_name, "created object");

        Ok(Arc::new(TreeObject {
            tree: Arc::clone(&self.tree),
            id,
            header,
        }))
    }

    fn num_children(&self) -> usize {
        self.tree.lock().objects[self.id].children.len()
    }

    fn properties(&self) -> Arc<dyn CompoundPropertyWriter> {
        let id = self.tree.lock().objects[self.id].properties;
        Arc::new(TreeCompound {
            tree: Arc::clone(&self.tree),
            id,
            header: PropertyHeader::compound("").with_meta_data(self.header.meta_data.clone()),
        })
    }
}

struct TreeCompound<S: SampleStore> {
    tree: SharedTree<S>,
    id: usize,
    header: PropertyHeader,
}

impl<S: SampleStore> TreeCompound<S> {
    fn add_leaf(&self, header: PropertyHeader) -> Result<usize> {
        header.validate()?;
        let mut tree = self.tree.lock();
        tree.check_open()?;
        tree.check_property_name(self.id, &header.name)?;
        let leaf = tree.leaves.len();
        tree.leaves.push(LeafNode {
            header,
            samples: Vec::new(),
        });
        tree.compounds[self.id].children.push(PropertyNode::Leaf(leaf));
        Ok(leaf)
    }
}

impl<S: SampleStore> CompoundPropertyWriter for TreeCompound<S> {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn num_properties(&self) -> usize {
        self.tree.lock().compounds[self.id].children.len()
    }

    fn create_scalar(&self, header: PropertyHeader) -> Result<Arc<dyn ScalarPropertyWriter>> {
        let id = self.add_leaf(header.clone())?;
        Ok(Arc::new(TreeLeaf {
            tree: Arc::clone(&self.tree),
            id,
            header,
        }))
    }

    fn create_array(&self, header: PropertyHeader) -> Result<Arc<dyn ArrayPropertyWriter>> {
        let id = self.add_leaf(header.clone())?;
        Ok(Arc::new(TreeLeaf {
            tree: Arc::clone(&self.tree),
            id,
            header,
        }))
    }

    fn create_compound(
        &self,
        name: &str,
        meta_data: MetaData,
    ) -> Result<Arc<dyn CompoundPropertyWriter>> {
        let mut tree = self.tree.lock();
        tree.check_open()?;
        tree.check_property_name(self.id, name)?;
        let header = PropertyHeader::compound(name).with_meta_data(meta_data);
        let label = format!("{}.{}", tree.compounds[self.id].label, name);
        let id = tree.compounds.len();
        tree.compounds.push(CompoundNode {
            header: header.clone(),
            children: Vec::new(),
            label,
        });
        tree.compounds[self.id].children.push(PropertyNode::Compound(id));
        Ok(Arc::new(TreeCompound {
            tree: Arc::clone(&self.tree),
            id,
            header,
        }))
    }
}

/// Scalar and array leaves share one handle type.
struct TreeLeaf<S: SampleStore> {
    tree: SharedTree<S>,
    id: usize,
    header: PropertyHeader,
}

impl<S: SampleStore> TreeLeaf<S> {
    fn push(&self, key: ArraySampleKey, data: &[u8], dims: Option<Dimensions>) -> Result<()> {
        let mut guard = self.tree.lock();
        let tree = &mut *guard;
        tree.check_open()?;
        let data = tree.store.store(&key, data)?;
        let leaf = &mut tree.leaves[self.id];
        trace!(property = %self.header.name, index = leaf.samples.len(), ?key, "set sample");
        leaf.samples.push(SampleSlot { data, key, dims });
        Ok(())
    }

    fn repeat(&self) -> Result<()> {
        let mut tree = self.tree.lock();
        tree.check_open()?;
        let leaf = &mut tree.leaves[self.id];
        let prev = leaf
            .samples
            .last()
            .cloned()
            .ok_or_else(|| Error::NoPreviousSample(self.header.name.clone()))?;
        trace!(property = %self.header.name, index = leaf.samples.len(), "set from previous");
        leaf.samples.push(prev);
        Ok(())
    }

    fn count(&self) -> usize {
        self.tree.lock().leaves[self.id].samples.len()
    }
}

impl<S: SampleStore> ScalarPropertyWriter for TreeLeaf<S> {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn set_sample(&self, key: ArraySampleKey, data: &[u8]) -> Result<()> {
        self.push(key, data, None)
    }

    fn set_from_previous(&self) -> Result<()> {
        self.repeat()
    }

    fn num_samples(&self) -> usize {
        self.count()
    }
}

impl<S: SampleStore> ArrayPropertyWriter for TreeLeaf<S> {
    fn header(&self) -> &PropertyHeader {
        &self.header
    }

    fn set_sample(&self, key: ArraySampleKey, data: &[u8], dims: &Dimensions) -> Result<()> {
        self.push(key, data, Some(dims.clone()))
    }

    fn set_from_previous(&self) -> Result<()> {
        self.repeat()
    }

    fn num_samples(&self) -> usize {
        self.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::DataType;
    use std::collections::HashMap;

    /// Keeps payloads in memory, dedups by key.
    #[derive(Default)]
    struct MemStore {
        blobs: Vec<Vec<u8>>,
        index: HashMap<ArraySampleKey, usize>,
        hits: usize,
    }

    impl SampleStore for MemStore {
        type Ref = usize;

        fn store(&mut self, key: &ArraySampleKey, data: &[u8]) -> Result<usize> {
            if let Some(&id) = self.index.get(key) {
                self.hits += 1;
                return Ok(id);
            }
            self.blobs.push(data.to_vec());
            self.index.insert(*key, self.blobs.len() - 1);
            Ok(self.blobs.len() - 1)
        }

        fn dedup_count(&self) -> usize {
            self.hits
        }
    }

    fn key(data: &[u8]) -> ArraySampleKey {
        ArraySampleKey::from_data(data, DataType::UINT8)
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let tree = WriteTree::shared(MemStore::default());
        let top = WriteTree::top_writer(&tree);
        let a = top.create_child("a", MetaData::new()).unwrap();
        assert_eq!(a.header().full_name, "/a");
        let err = top.create_child("a", MetaData::new()).err().unwrap();
        assert!(matches!(err, Error::DuplicateName { .. }));

        let props = a.properties();
        props.create_scalar(PropertyHeader::scalar("x", DataType::UINT8)).unwrap();
        assert!(matches!(
            props.create_compound("x", MetaData::new()).err().unwrap(),
            Error::DuplicateName { .. }
        ));
        assert_eq!(top.num_children(), 1);
    }

    #[test]
    fn test_samples_and_dedup() {
        let tree = WriteTree::shared(MemStore::default());
        let top = WriteTree::top_writer(&tree);
        let props = top.properties();
        let x = props.create_scalar(PropertyHeader::scalar("x", DataType::UINT8)).unwrap();
        assert!(matches!(x.set_from_previous(), Err(Error::NoPreviousSample(_))));

        x.set_sample(key(&[1]), &[1]).unwrap();
        x.set_from_previous().unwrap();
        x.set_sample(key(&[2]), &[2]).unwrap();
        x.set_sample(key(&[1]), &[1]).unwrap();
        assert_eq!(x.num_samples(), 4);

        let guard = tree.lock();
        assert_eq!(guard.store.blobs.len(), 2);
        assert_eq!(guard.store.dedup_count(), 1);
        let leaf = &guard.leaves[0];
        assert!(!leaf.is_constant());
        assert_eq!(leaf.first_changed_index(), 2);
        assert_eq!(leaf.last_changed_index(), 3);
    }

    #[test]
    fn test_closed_tree_is_frozen() {
        let tree = WriteTree::shared(MemStore::default());
        let top = WriteTree::top_writer(&tree);
        tree.lock().mark_closed();
        assert!(matches!(top.create_child("a", MetaData::new()), Err(Error::Frozen)));
    }

    #[test]
    fn test_digests_track_content() {
        let build = |value: u8| {
            let tree = WriteTree::shared(MemStore::default());
            let top = WriteTree::top_writer(&tree);
            let a = top.create_child("a", MetaData::new()).unwrap();
            let x = a
                .properties()
                .create_scalar(PropertyHeader::scalar("x", DataType::UINT8))
                .unwrap();
            x.set_sample(key(&[value]), &[value]).unwrap();
            let guard = tree.lock();
            guard.digests(&[TimeSampling::identity()])
        };
        let d1 = build(1);
        let d2 = build(1);
        let d3 = build(2);
        assert_eq!(d1.objects[TOP].children, d2.objects[TOP].children);
        assert_ne!(d1.objects[TOP].children, d3.objects[TOP].children);
        assert_eq!(d1.objects[1].children, [0u8; 16]);
    }
}
