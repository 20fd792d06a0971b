//! Storage backend contract.
//!
//! These traits sit between the storage engines (and the layering engine)
//! and the high-level `abc` API. Readers hand out `Arc` handles and are
//! `Send + Sync`; writers use interior locking so handles can be shared.

use std::sync::Arc;

use crate::core::{
    ArraySample, ArraySampleKey, MetaData, ObjectHeader, PropertyHeader, SampleDigest,
    TimeSampling,
};
use crate::util::{Dimensions, Error, Result};

// ============================================================================
// Archive Traits
// ============================================================================

/// Reader interface for an archive.
pub trait ArchiveReader: Send + Sync {
    /// Path or synthetic name of the archive.
    fn name(&self) -> &str;

    /// Engine identifier, e.g. `"ogawa"`.
    fn engine(&self) -> &'static str;

    fn num_time_samplings(&self) -> usize;

    fn time_sampling(&self, index: usize) -> Option<Arc<TimeSampling>>;

    /// Largest sample count of any property using time sampling `index`.
    fn max_num_samples_for_time_sampling(&self, _index: usize) -> Option<usize> {
        None
    }

    fn archive_metadata(&self) -> &MetaData;

    fn top(&self) -> Result<Arc<dyn ObjectReader>>;
}

/// Writer interface for an archive.
pub trait ArchiveWriter: Send {
    fn name(&self) -> &str;

    fn engine(&self) -> &'static str;

    /// The top object, created with the archive.
    fn top(&self) -> Arc<dyn ObjectWriter>;

    /// Sample writes satisfied by an already stored payload.
    fn dedup_count(&self) -> usize;

    /// Flush everything and finalize the file.
    fn close(
        self: Box<Self>,
        time_samplings: &[TimeSampling],
        archive_metadata: &MetaData,
    ) -> Result<()>;
}

// ============================================================================
// Object Traits
// ============================================================================

/// Reader interface for an object in the hierarchy.
pub trait ObjectReader: Send + Sync {
    fn header(&self) -> &ObjectHeader;

    fn num_children(&self) -> usize;

    fn child_header(&self, index: usize) -> Option<&ObjectHeader>;

    fn child_index(&self, name: &str) -> Option<usize> {
        (0..self.num_children())
            .find(|&i| self.child_header(i).is_some_and(|h| h.name == name))
    }

    /// Child at `index`; `OutOfRange` past the end.
    fn child(&self, index: usize) -> Result<Arc<dyn ObjectReader>>;

    fn child_by_name(&self, name: &str) -> Result<Option<Arc<dyn ObjectReader>>> {
        match self.child_index(name) {
            Some(i) => self.child(i).map(Some),
            None => Ok(None),
        }
    }

    /// The object's single top compound property.
    fn properties(&self) -> Result<Arc<dyn CompoundPropertyReader>>;

    /// Digest of all properties below this object.
    fn properties_hash(&self) -> Option<SampleDigest> {
        None
    }

    /// Digest of all child objects.
    fn children_hash(&self) -> Option<SampleDigest> {
        None
    }
}

/// Writer interface for an object.
pub trait ObjectWriter: Send + Sync {
    fn header(&self) -> &ObjectHeader;

    /// Append a child; `DuplicateName` on a sibling collision.
    fn create_child(&self, name: &str, meta_data: MetaData) -> Result<Arc<dyn ObjectWriter>>;

    fn num_children(&self) -> usize;

    fn properties(&self) -> Arc<dyn CompoundPropertyWriter>;
}

// ============================================================================
// Property Traits
// ============================================================================

/// A property reader of any shape.
#[derive(Clone)]
pub enum PropertyReader {
    Scalar(Arc<dyn ScalarPropertyReader>),
    Array(Arc<dyn ArrayPropertyReader>),
    Compound(Arc<dyn CompoundPropertyReader>),
}

impl PropertyReader {
    pub fn header(&self) -> &PropertyHeader {
        match self {
            Self::Scalar(p) => p.header(),
            Self::Array(p) => p.header(),
            Self::Compound(p) => p.header(),
        }
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn as_scalar(&self) -> Option<&Arc<dyn ScalarPropertyReader>> {
        match self {
            Self::Scalar(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arc<dyn ArrayPropertyReader>> {
        match self {
            Self::Array(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Arc<dyn CompoundPropertyReader>> {
        match self {
            Self::Compound(p) => Some(p),
            _ => None,
        }
    }
}

/// Reader for compound properties.
pub trait CompoundPropertyReader: Send + Sync {
    fn header(&self) -> &PropertyHeader;

    fn num_properties(&self) -> usize;

    fn property_header(&self, index: usize) -> Option<&PropertyHeader>;

    fn property_index(&self, name: &str) -> Option<usize> {
        (0..self.num_properties())
            .find(|&i| self.property_header(i).is_some_and(|h| h.name == name))
    }

    fn property_header_by_name(&self, name: &str) -> Option<&PropertyHeader> {
        self.property_index(name)
            .and_then(|i| self.property_header(i))
    }

    /// Property at `index`; `OutOfRange` past the end.
    fn property(&self, index: usize) -> Result<PropertyReader>;

    fn property_by_name(&self, name: &str) -> Result<Option<PropertyReader>> {
        match self.property_index(name) {
            Some(i) => self.property(i).map(Some),
            None => Ok(None),
        }
    }
}

/// Reader for scalar properties: `extent` PODs per sample.
pub trait ScalarPropertyReader: Send + Sync {
    fn header(&self) -> &PropertyHeader;

    fn time_sampling(&self) -> Arc<TimeSampling>;

    fn num_samples(&self) -> usize;

    /// True when every sample key equals the first.
    fn is_constant(&self) -> bool;

    /// Raw payload of sample `index`.
    fn sample(&self, index: usize) -> Result<Vec<u8>>;

    fn sample_key(&self, index: usize) -> Result<ArraySampleKey>;
}

/// Reader for array properties: variable-length arrays of `extent`-wide elements.
pub trait ArrayPropertyReader: Send + Sync {
    fn header(&self) -> &PropertyHeader;

    fn time_sampling(&self) -> Arc<TimeSampling>;

    fn num_samples(&self) -> usize;

    fn is_constant(&self) -> bool;

    fn sample(&self, index: usize) -> Result<ArraySample>;

    fn sample_key(&self, index: usize) -> Result<ArraySampleKey>;

    fn sample_dimensions(&self, index: usize) -> Result<Dimensions> {
        self.sample(index).map(|s| s.dimensions)
    }
}

// ============================================================================
// Property Writer Traits
// ============================================================================

/// Writer for compound properties.
pub trait CompoundPropertyWriter: Send + Sync {
    fn header(&self) -> &PropertyHeader;

    fn num_properties(&self) -> usize;

    /// Create a scalar or array property from a validated header.
    fn create_scalar(&self, header: PropertyHeader) -> Result<Arc<dyn ScalarPropertyWriter>>;

    fn create_array(&self, header: PropertyHeader) -> Result<Arc<dyn ArrayPropertyWriter>>;

    fn create_compound(&self, name: &str, meta_data: MetaData)
        -> Result<Arc<dyn CompoundPropertyWriter>>;
}

/// Writer for scalar properties.
pub trait ScalarPropertyWriter: Send + Sync {
    fn header(&self) -> &PropertyHeader;

    /// Append `data` at the next index.
    fn set_sample(&self, key: ArraySampleKey, data: &[u8]) -> Result<()>;

    /// Append a reference to the previous sample.
    fn set_from_previous(&self) -> Result<()>;

    fn num_samples(&self) -> usize;
}

/// Writer for array properties.
pub trait ArrayPropertyWriter: Send + Sync {
    fn header(&self) -> &PropertyHeader;

    fn set_sample(&self, key: ArraySampleKey, data: &[u8], dims: &Dimensions) -> Result<()>;

    fn set_from_previous(&self) -> Result<()>;

    fn num_samples(&self) -> usize;
}

/// Bounds check shared by all positional lookups.
#[inline]
pub fn check_index(index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(Error::OutOfRange { index, count })
    }
}
