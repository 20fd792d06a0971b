//! Object and property headers.

use crate::util::{DataType, Error, Result};
use super::MetaData;
use std::fmt;

/// Identity of an object in the hierarchy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectHeader {
    /// Name, unique among siblings.
    pub name: String,
    /// Path from the top object, e.g. `/a/b`. The top object is `/`.
    pub full_name: String,
    pub meta_data: MetaData,
}

impl ObjectHeader {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            meta_data: MetaData::new(),
        }
    }

    pub fn with_meta_data(
        name: impl Into<String>,
        full_name: impl Into<String>,
        meta_data: MetaData,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            meta_data,
        }
    }

    /// Header of the implicit top object (`ABC`, full name `/`).
    pub fn top(meta_data: MetaData) -> Self {
        Self::with_meta_data("ABC", "/", meta_data)
    }

    /// Header for a child named `name` below `parent_full_name`.
    pub fn child_of(parent_full_name: &str, name: &str, meta_data: MetaData) -> Self {
        Self::with_meta_data(name, join_path(parent_full_name, name), meta_data)
    }

    pub fn schema(&self) -> &str {
        self.meta_data.schema()
    }
}

/// Join a full object path with a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Property shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PropertyType {
    #[default]
    Scalar,
    Array,
    Compound,
}

impl PropertyType {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Compound => 0,
            Self::Scalar => 1,
            Self::Array => 2,
        }
    }

    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Compound),
            1 => Ok(Self::Scalar),
            2 => Ok(Self::Array),
            _ => Err(Error::invalid(format!("unknown property type tag {v}"))),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Array => "array",
            Self::Compound => "compound",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity and type of a property.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyHeader {
    pub name: String,
    pub property_type: PropertyType,
    /// [`DataType::UNKNOWN`] for compounds.
    pub data_type: DataType,
    /// Index into the archive's time sampling table; 0 for compounds.
    pub time_sampling_index: u32,
    pub meta_data: MetaData,
}

impl PropertyHeader {
    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            property_type: PropertyType::Scalar,
            data_type,
            time_sampling_index: 0,
            meta_data: MetaData::new(),
        }
    }

    pub fn array(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            property_type: PropertyType::Array,
            data_type,
            time_sampling_index: 0,
            meta_data: MetaData::new(),
        }
    }

    pub fn compound(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property_type: PropertyType::Compound,
            data_type: DataType::UNKNOWN,
            time_sampling_index: 0,
            meta_data: MetaData::new(),
        }
    }

    pub fn with_time_sampling(mut self, index: u32) -> Self {
        self.time_sampling_index = index;
        self
    }

    pub fn with_meta_data(mut self, meta_data: MetaData) -> Self {
        self.meta_data = meta_data;
        self
    }

    pub fn is_scalar(&self) -> bool {
        self.property_type == PropertyType::Scalar
    }

    pub fn is_array(&self) -> bool {
        self.property_type == PropertyType::Array
    }

    pub fn is_compound(&self) -> bool {
        self.property_type == PropertyType::Compound
    }

    /// Leaf properties need a concrete data type with extent >= 1.
    pub fn validate(&self) -> Result<()> {
        if self.is_compound() {
            Ok(())
        } else {
            self.data_type.validate()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_header_paths() {
        let top = ObjectHeader::top(MetaData::new());
        assert_eq!(top.full_name, "/");
        let a = ObjectHeader::child_of(&top.full_name, "a", MetaData::new());
        assert_eq!(a.full_name, "/a");
        let b = ObjectHeader::child_of(&a.full_name, "b", MetaData::new());
        assert_eq!(b.full_name, "/a/b");
    }

    #[test]
    fn test_property_header() {
        let header = PropertyHeader::array("P", DataType::VEC3F).with_time_sampling(1);
        assert!(header.is_array());
        assert_eq!(header.time_sampling_index, 1);
        assert!(header.validate().is_ok());
        assert!(PropertyHeader::compound("c").validate().is_ok());
        let bad = PropertyHeader::scalar("x", DataType::new(crate::util::PlainOldDataType::Int32, 0));
        assert!(matches!(bad.validate(), Err(Error::InvalidDataType(_))));
    }

    #[test]
    fn test_property_type_tags() {
        for t in [PropertyType::Scalar, PropertyType::Array, PropertyType::Compound] {
            assert_eq!(PropertyType::from_u8(t.as_u8()).unwrap(), t);
        }
        assert!(PropertyType::from_u8(9).is_err());
    }
}
