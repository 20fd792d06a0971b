//! Merge slot table for one level of a layered tree.
//!
//! Slots live in an arena and keep their id for the table's lifetime. The
//! enumeration order is a separate list of live ids, so pruning a name only
//! drops its id from that list.

use std::collections::HashMap;

use tracing::warn;

use crate::core::{MetaData, ObjectHeader, PropertyHeader};
use crate::util::{Error, Result};

/// One contributor to a slot: child `index` of source `source`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backing {
    pub source: usize,
    pub index: usize,
}

/// Header types that can be merged by name.
pub trait Mergeable: Clone {
    fn name(&self) -> &str;

    fn meta_data(&self) -> &MetaData;

    fn is_compound(&self) -> bool;

    /// Shape label used in conflict reports.
    fn kind(&self) -> &'static str;
}

impl Mergeable for ObjectHeader {
    fn name(&self) -> &str {
        &self.name
    }

    fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    fn is_compound(&self) -> bool {
        true
    }

    fn kind(&self) -> &'static str {
        "object"
    }
}

impl Mergeable for PropertyHeader {
    fn name(&self) -> &str {
        &self.name
    }

    fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    fn is_compound(&self) -> bool {
        PropertyHeader::is_compound(self)
    }

    fn kind(&self) -> &'static str {
        self.property_type.name()
    }
}

#[derive(Clone, Debug)]
pub struct MergeSlot<H> {
    /// Header of the winning contributor.
    pub header: H,
    /// Additive metadata union over the contributors since the last replace.
    pub merged_meta_data: MetaData,
    pub backings: Vec<Backing>,
    pub winning: Backing,
}

impl<H> MergeSlot<H> {
    /// Contributor leaf properties resolve to.
    pub fn last(&self) -> Backing {
        self.backings.last().copied().unwrap_or(self.winning)
    }
}

#[derive(Clone, Debug)]
pub struct MergeTable<H> {
    slots: Vec<MergeSlot<H>>,
    live: Vec<usize>,
    by_name: HashMap<String, usize>,
    strict: bool,
}

impl<H: Mergeable> MergeTable<H> {
    pub fn new(strict: bool) -> Self {
        Self {
            slots: Vec::new(),
            live: Vec::new(),
            by_name: HashMap::new(),
            strict,
        }
    }

    /// Feed one child header. Sources must be fed in layer order, children
    /// of each source in their original order.
    pub fn add(&mut self, backing: Backing, header: &H) -> Result<()> {
        let md = header.meta_data();
        let prune = md.is_prune();
        let replace = md.is_replace();

        let Some(&id) = self.by_name.get(header.name()) else {
            if !prune {
                self.slots.push(MergeSlot {
                    header: header.clone(),
                    merged_meta_data: md.clone(),
                    backings: vec![backing],
                    winning: backing,
                });
                let id = self.slots.len() - 1;
                self.live.push(id);
                self.by_name.insert(header.name().to_string(), id);
            }
            return Ok(());
        };

        if prune {
            self.by_name.remove(header.name());
            self.live.retain(|&l| l != id);
            return Ok(());
        }

        let strict = self.strict;
        let slot = &mut self.slots[id];
        if slot.header.is_compound() && header.is_compound() {
            if replace {
                slot.backings.clear();
                slot.merged_meta_data = MetaData::new();
            }
            slot.backings.push(backing);
            slot.merged_meta_data.append_only_unique(md);
            if !md.is_empty() {
                slot.winning = backing;
                slot.header = header.clone();
            }
        } else {
            if slot.header.kind() != header.kind() {
                if strict {
                    return Err(Error::LayerConflict {
                        name: header.name().to_string(),
                        previous: slot.header.kind().to_string(),
                        current: header.kind().to_string(),
                    });
                }
                warn!(
                    name = header.name(),
                    previous = slot.header.kind(),
                    current = header.kind(),
                    "layer overrides property type"
                );
            }
            slot.backings = vec![backing];
            slot.winning = backing;
            slot.header = header.clone();
            slot.merged_meta_data = md.clone();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Slot at enumeration position `index`.
    pub fn get(&self, index: usize) -> Option<&MergeSlot<H>> {
        self.live.get(index).map(|&id| &self.slots[id])
    }

    /// Enumeration position of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        let id = *self.by_name.get(name)?;
        self.live.iter().position(|&l| l == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergeSlot<H>> + '_ {
        self.live.iter().map(move |&id| &self.slots[id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::DataType;

    fn md(pairs: &[(&str, &str)]) -> MetaData {
        pairs.iter().copied().collect()
    }

    fn obj(name: &str, pairs: &[(&str, &str)]) -> ObjectHeader {
        ObjectHeader::child_of("/", name, md(pairs))
    }

    fn at(source: usize, index: usize) -> Backing {
        Backing { source, index }
    }

    fn names<H: Mergeable>(table: &MergeTable<H>) -> Vec<String> {
        table.iter().map(|s| s.header.name().to_string()).collect()
    }

    #[test]
    fn test_prune_removes_and_rehomes() {
        let mut table = MergeTable::new(false);
        table.add(at(0, 0), &obj("a", &[])).unwrap();
        table.add(at(0, 1), &obj("b", &[])).unwrap();
        table.add(at(1, 0), &obj("a", &[("prune", "1")])).unwrap();
        assert_eq!(names(&table), vec!["b"]);
        assert_eq!(table.position("b"), Some(0));
        assert_eq!(table.position("a"), None);

        // re-adding after a prune starts a fresh slot at the end
        table.add(at(2, 0), &obj("a", &[])).unwrap();
        assert_eq!(names(&table), vec!["b", "a"]);
        assert_eq!(table.get(1).unwrap().backings, vec![at(2, 0)]);
    }

    #[test]
    fn test_prune_of_unseen_name_is_skipped() {
        let mut table = MergeTable::new(false);
        table.add(at(0, 0), &obj("a", &[("prune", "1")])).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_replace_clears_earlier_backings() {
        let mut table = MergeTable::new(false);
        table.add(at(0, 0), &obj("p", &[("k", "1")])).unwrap();
        table.add(at(1, 0), &obj("p", &[("replace", "1")])).unwrap();
        table.add(at(2, 0), &obj("p", &[])).unwrap();
        let slot = table.get(0).unwrap();
        assert_eq!(slot.backings, vec![at(1, 0), at(2, 0)]);
        assert_eq!(slot.winning, at(1, 0));
        assert!(!slot.merged_meta_data.contains("k"));
        assert!(slot.merged_meta_data.is_replace());
    }

    #[test]
    fn test_empty_metadata_keeps_winner() {
        let mut table = MergeTable::new(false);
        table.add(at(0, 0), &obj("p", &[("schema", "X")])).unwrap();
        table.add(at(1, 0), &obj("p", &[])).unwrap();
        let slot = table.get(0).unwrap();
        assert_eq!(slot.winning, at(0, 0));
        assert_eq!(slot.backings.len(), 2);
        assert_eq!(slot.header.meta_data.schema(), "X");
    }

    #[test]
    fn test_metadata_union_is_additive() {
        let mut table = MergeTable::new(false);
        table.add(at(0, 0), &obj("p", &[("a", "1")])).unwrap();
        table.add(at(1, 0), &obj("p", &[("a", "2"), ("b", "3")])).unwrap();
        let merged = &table.get(0).unwrap().merged_meta_data;
        assert_eq!(merged.get("a"), "1");
        assert_eq!(merged.get("b"), "3");
    }

    #[test]
    fn test_leaf_override() {
        let mut table = MergeTable::new(false);
        table.add(at(0, 0), &PropertyHeader::scalar("x", DataType::INT32)).unwrap();
        table.add(at(1, 3), &PropertyHeader::array("x", DataType::INT32)).unwrap();
        let slot = table.get(0).unwrap();
        assert_eq!(slot.backings, vec![at(1, 3)]);
        assert!(slot.header.is_array());
    }

    #[test]
    fn test_compound_over_leaf_replaces_backings() {
        let mut table = MergeTable::new(false);
        table.add(at(0, 0), &PropertyHeader::scalar("x", DataType::INT32)).unwrap();
        table.add(at(1, 0), &PropertyHeader::compound("x")).unwrap();
        table.add(at(2, 0), &PropertyHeader::compound("x")).unwrap();
        let slot = table.get(0).unwrap();
        assert!(slot.header.is_compound());
        assert_eq!(slot.backings, vec![at(1, 0), at(2, 0)]);
    }

    #[test]
    fn test_strict_mode_rejects_type_change() {
        let mut table = MergeTable::new(true);
        table.add(at(0, 0), &PropertyHeader::compound("x")).unwrap();
        let err = table
            .add(at(1, 0), &PropertyHeader::scalar("x", DataType::FLOAT32))
            .unwrap_err();
        assert!(matches!(err, Error::LayerConflict { .. }));
        // same shape passes even in strict mode
        let mut table = MergeTable::new(true);
        table.add(at(0, 0), &PropertyHeader::scalar("y", DataType::FLOAT32)).unwrap();
        table.add(at(1, 0), &PropertyHeader::scalar("y", DataType::FLOAT64)).unwrap();
        assert_eq!(table.get(0).unwrap().header.data_type, DataType::FLOAT64);
    }
}
