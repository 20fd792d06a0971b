//! Object handles of the high-level API, including instancing.
//!
//! An instance is a child object whose only content is a string scalar
//! named [`INSTANCE_SOURCE`] holding the full path of its target. Readers
//! resolve it transparently: the instance presents the target's properties
//! and children under its own path.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::property::{decode_strings, encode_strings, ICompoundProperty, OCompoundProperty};
use super::write_context::{is_within, WriteContext};
use crate::core::{
    join_path, ArchiveReader, ArraySampleKey, MetaData, ObjectHeader, ObjectReader, ObjectWriter,
    PropertyHeader, SampleDigest,
};
use crate::util::{DataType, Error, Result};

/// Property naming the target of an instance object.
pub const INSTANCE_SOURCE: &str = ".instanceSource";

/// Target path stored on `reader`, if it is an instance.
pub(crate) fn instance_target(reader: &dyn ObjectReader) -> Result<Option<String>> {
    let props = reader.properties()?;
    let Some(prop) = props.property_by_name(INSTANCE_SOURCE)? else {
        return Ok(None);
    };
    let scalar = prop
        .as_scalar()
        .filter(|p| p.header().data_type == DataType::STRING)
        .ok_or_else(|| Error::malformed(INSTANCE_SOURCE, "expected a string scalar"))?;
    if scalar.num_samples() == 0 {
        return Err(Error::malformed(INSTANCE_SOURCE, "no target path"));
    }
    let target = decode_strings(&scalar.sample(0)?)?
        .into_iter()
        .next()
        .filter(|t| t.starts_with('/'))
        .ok_or_else(|| Error::malformed(INSTANCE_SOURCE, "target is not an absolute path"))?;
    Ok(Some(target))
}

/// Error when `target` contains any object in `hops`.
fn check_cycle(hops: &[String], instance: &str, target: &str) -> Result<()> {
    if hops.iter().any(|hop| is_within(hop, target)) {
        return Err(Error::CyclicInstance {
            instance: instance.to_string(),
            target: target.to_string(),
        });
    }
    Ok(())
}

/// Follow instance links from `reader` to a concrete object, appending the
/// physical path of every instance passed through to `hops`.
fn follow_instances(
    archive: &dyn ArchiveReader,
    mut reader: Arc<dyn ObjectReader>,
    hops: &mut Vec<String>,
) -> Result<Arc<dyn ObjectReader>> {
    while let Some(target) = instance_target(reader.as_ref())? {
        let physical = reader.header().full_name.clone();
        hops.push(physical.clone());
        check_cycle(hops, &physical, &target)?;
        reader = resolve_path(archive, &target, hops)?;
    }
    Ok(reader)
}

/// Walk child names from the top object, resolving instances met on the way.
fn resolve_path(
    archive: &dyn ArchiveReader,
    path: &str,
    hops: &mut Vec<String>,
) -> Result<Arc<dyn ObjectReader>> {
    let mut current = archive.top()?;
    for part in path.split('/').filter(|p| !p.is_empty()) {
        let child = current
            .child_by_name(part)?
            .ok_or_else(|| Error::ObjectNotFound(path.to_string()))?;
        current = follow_instances(archive, child, hops)?;
    }
    Ok(current)
}

// ============================================================================
// IObject
// ============================================================================

/// Input object.
///
/// The header reports the logical path: below an instance, names are
/// re-rooted under the instance even though the data comes from the target.
#[derive(Clone)]
pub struct IObject {
    archive: Arc<dyn ArchiveReader>,
    reader: Arc<dyn ObjectReader>,
    header: ObjectHeader,
    instance_source: Option<String>,
    instance_descendant: bool,
    /// Physical paths of the instances resolved above this object.
    hops: Arc<[String]>,
}

impl IObject {
    pub(crate) fn top(archive: Arc<dyn ArchiveReader>) -> Result<Self> {
        let reader = archive.top()?;
        Ok(Self {
            header: reader.header().clone(),
            archive,
            reader,
            instance_source: None,
            instance_descendant: false,
            hops: Arc::from(Vec::new()),
        })
    }

    /// Backend handle of the data this object presents.
    pub fn reader(&self) -> &Arc<dyn ObjectReader> {
        &self.reader
    }

    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn full_name(&self) -> &str {
        &self.header.full_name
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.header.meta_data
    }

    pub fn matches_schema(&self, schema: &str) -> bool {
        self.header.meta_data.matches_schema(schema)
    }

    pub fn is_top(&self) -> bool {
        self.header.full_name == "/"
    }

    /// Full name of the parent, `None` for the top object.
    pub fn parent_full_name(&self) -> Option<&str> {
        if self.is_top() {
            return None;
        }
        match self.header.full_name.rfind('/') {
            Some(0) => Some("/"),
            Some(i) => Some(&self.header.full_name[..i]),
            None => None,
        }
    }

    pub fn num_children(&self) -> usize {
        self.reader.num_children()
    }

    /// Logical header of child `index`.
    pub fn child_header(&self, index: usize) -> Option<ObjectHeader> {
        self.reader.child_header(index).map(|h| {
            ObjectHeader::child_of(&self.header.full_name, &h.name, h.meta_data.clone())
        })
    }

    /// Child at `index`; `OutOfRange` past the end. Instances resolve to
    /// their final target through any chain of instances, with
    /// `ObjectNotFound` for a dangling path and `CyclicInstance` for a target
    /// containing the instance or any instance resolved above it.
    pub fn child(&self, index: usize) -> Result<IObject> {
        let child = self.reader.child(index)?;
        self.wrap_child(child)
    }

    pub fn try_child_by_name(&self, name: &str) -> Result<Option<IObject>> {
        match self.reader.child_index(name) {
            Some(i) => self.child(i).map(Some),
            None => Ok(None),
        }
    }

    /// `None` when absent. Failures are logged and reported as absent.
    pub fn child_by_name(&self, name: &str) -> Option<IObject> {
        match self.try_child_by_name(name) {
            Ok(child) => child,
            Err(e) => {
                warn!(object = self.full_name(), child = name, error = %e, "child lookup failed");
                None
            }
        }
    }

    pub fn children(&self) -> impl Iterator<Item = Result<IObject>> + '_ {
        (0..self.num_children()).map(move |i| self.child(i))
    }

    pub fn properties(&self) -> Result<ICompoundProperty> {
        Ok(ICompoundProperty::new(self.reader.properties()?))
    }

    pub fn is_instance_root(&self) -> bool {
        self.instance_source.is_some()
    }

    /// True for instances and everything reached through one.
    pub fn is_instance_descendant(&self) -> bool {
        self.instance_descendant
    }

    pub fn instance_source_path(&self) -> Option<&str> {
        self.instance_source.as_deref()
    }

    pub fn is_child_instance(&self, index: usize) -> bool {
        self.reader
            .child(index)
            .and_then(|c| instance_target(c.as_ref()))
            .is_ok_and(|t| t.is_some())
    }

    pub fn properties_hash(&self) -> Option<SampleDigest> {
        self.reader.properties_hash()
    }

    pub fn children_hash(&self) -> Option<SampleDigest> {
        self.reader.children_hash()
    }

    fn wrap_child(&self, child: Arc<dyn ObjectReader>) -> Result<IObject> {
        let physical = child.header().full_name.clone();
        let header = ObjectHeader::child_of(
            &self.header.full_name,
            &child.header().name,
            child.header().meta_data.clone(),
        );
        match instance_target(child.as_ref())? {
            Some(target) => {
                let mut hops = self.hops.to_vec();
                hops.push(physical.clone());
                check_cycle(&hops, &physical, &target)?;
                let resolved = resolve_path(self.archive.as_ref(), &target, &mut hops)?;
                debug!(
                    instance = %header.full_name,
                    target = %target,
                    resolved = %resolved.header().full_name,
                    "resolved instance"
                );
                Ok(IObject {
                    archive: Arc::clone(&self.archive),
                    reader: resolved,
                    header,
                    instance_source: Some(target),
                    instance_descendant: true,
                    hops: Arc::from(hops),
                })
            }
            None => Ok(IObject {
                archive: Arc::clone(&self.archive),
                reader: child,
                header,
                instance_source: None,
                instance_descendant: self.instance_descendant,
                hops: Arc::clone(&self.hops),
            }),
        }
    }
}

impl std::fmt::Debug for IObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IObject")
            .field("full_name", &self.header.full_name)
            .field("instance_source", &self.instance_source)
            .finish()
    }
}

// ============================================================================
// OObject
// ============================================================================

/// Output object.
#[derive(Clone)]
pub struct OObject {
    writer: Arc<dyn ObjectWriter>,
    ctx: Arc<Mutex<WriteContext>>,
}

impl OObject {
    pub(crate) fn new(writer: Arc<dyn ObjectWriter>, ctx: Arc<Mutex<WriteContext>>) -> Self {
        Self { writer, ctx }
    }

    pub fn header(&self) -> &ObjectHeader {
        self.writer.header()
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn full_name(&self) -> &str {
        &self.header().full_name
    }

    pub fn num_children(&self) -> usize {
        self.writer.num_children()
    }

    /// Append a child; `DuplicateName` on a sibling collision.
    pub fn create_child(&self, name: &str, meta_data: MetaData) -> Result<OObject> {
        let writer = self.writer.create_child(name, meta_data)?;
        self.ctx.lock().objects.insert(writer.header().full_name.clone());
        Ok(OObject::new(writer, Arc::clone(&self.ctx)))
    }

    pub fn properties(&self) -> OCompoundProperty {
        OCompoundProperty::new(self.writer.properties(), Arc::clone(&self.ctx))
    }

    /// Add a child named `name` that instances `target`.
    pub fn add_child_instance(&self, target: &OObject, name: &str) -> Result<()> {
        self.add_child_instance_at(target.full_name(), name)
    }

    /// Add a child named `name` that instances the object at `target_path`,
    /// which must already be written.
    pub fn add_child_instance_at(&self, target_path: &str, name: &str) -> Result<()> {
        let mut ctx = self.ctx.lock();
        if !ctx.objects.contains(target_path) {
            return Err(Error::ObjectNotFound(target_path.to_string()));
        }
        let instance_path = join_path(self.full_name(), name);
        if ctx.reaches(target_path, self.full_name()) {
            return Err(Error::CyclicInstance {
                instance: instance_path,
                target: target_path.to_string(),
            });
        }

        let child = self.writer.create_child(name, MetaData::new())?;
        let data = encode_strings(&[target_path])?;
        let source = child
            .properties()
            .create_scalar(PropertyHeader::scalar(INSTANCE_SOURCE, DataType::STRING))?;
        source.set_sample(ArraySampleKey::from_data(&data, DataType::STRING), &data)?;

        debug!(instance = %instance_path, target = target_path, "added instance");
        ctx.objects.insert(instance_path.clone());
        ctx.instances.push((instance_path, target_path.to_string()));
        Ok(())
    }
}
