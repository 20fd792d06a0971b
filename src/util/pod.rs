//! Plain Old Data types: the element kinds a property sample is made of.

use bytemuck::{Pod, Zeroable};
use half::f16;
use std::fmt;

/// Element type of a property value.
///
/// Numeric kinds have a fixed byte width. `String` and `Wstring` are stored
/// as NUL-terminated UTF-8 and have no fixed element size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PlainOldDataType {
    Boolean = 0,
    Uint8 = 1,
    Int8 = 2,
    Uint16 = 3,
    Int16 = 4,
    Uint32 = 5,
    Int32 = 6,
    Uint64 = 7,
    Int64 = 8,
    Float16 = 9,
    Float32 = 10,
    Float64 = 11,
    String = 12,
    Wstring = 13,
    /// Tag of compound properties and of anything unrecognised on read.
    #[default]
    Unknown = 127,
}

impl PlainOldDataType {
    /// Byte width of a single element, `None` for strings and Unknown.
    #[inline]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Uint8 | Self::Int8 => Some(1),
            Self::Uint16 | Self::Int16 | Self::Float16 => Some(2),
            Self::Uint32 | Self::Int32 | Self::Float32 => Some(4),
            Self::Uint64 | Self::Int64 | Self::Float64 => Some(8),
            Self::String | Self::Wstring | Self::Unknown => None,
        }
    }

    /// Byte width of a single element, 0 for variable-size kinds.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self.fixed_size() {
            Some(n) => n,
            None => 0,
        }
    }

    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "bool_t",
            Self::Uint8 => "uint8_t",
            Self::Int8 => "int8_t",
            Self::Uint16 => "uint16_t",
            Self::Int16 => "int16_t",
            Self::Uint32 => "uint32_t",
            Self::Int32 => "int32_t",
            Self::Uint64 => "uint64_t",
            Self::Int64 => "int64_t",
            Self::Float16 => "float16_t",
            Self::Float32 => "float32_t",
            Self::Float64 => "float64_t",
            Self::String => "string",
            Self::Wstring => "wstring",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "bool_t" => Self::Boolean,
            "uint8_t" => Self::Uint8,
            "int8_t" => Self::Int8,
            "uint16_t" => Self::Uint16,
            "int16_t" => Self::Int16,
            "uint32_t" => Self::Uint32,
            "int32_t" => Self::Int32,
            "uint64_t" => Self::Uint64,
            "int64_t" => Self::Int64,
            "float16_t" => Self::Float16,
            "float32_t" => Self::Float32,
            "float64_t" => Self::Float64,
            "string" => Self::String,
            "wstring" => Self::Wstring,
            _ => Self::Unknown,
        }
    }

    /// Inverse of [`as_u8`](Self::as_u8); tags past `Wstring` read as `Unknown`.
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Boolean,
            1 => Self::Uint8,
            2 => Self::Int8,
            3 => Self::Uint16,
            4 => Self::Int16,
            5 => Self::Uint32,
            6 => Self::Int32,
            7 => Self::Uint64,
            8 => Self::Int64,
            9 => Self::Float16,
            10 => Self::Float32,
            11 => Self::Float64,
            12 => Self::String,
            13 => Self::Wstring,
            _ => Self::Unknown,
        }
    }

    /// Tag stored in Ogawa property info words.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PlainOldDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Rust types that map one-to-one onto a fixed-size POD kind.
pub trait AlembicPod: Pod + Zeroable + Copy + Default {
    const POD_TYPE: PlainOldDataType;
}

macro_rules! impl_alembic_pod {
    ($($t:ty => $pod:ident),* $(,)?) => {
        $(impl AlembicPod for $t {
            const POD_TYPE: PlainOldDataType = PlainOldDataType::$pod;
        })*
    };
}

impl_alembic_pod! {
    u8 => Uint8,
    i8 => Int8,
    u16 => Uint16,
    i16 => Int16,
    u32 => Uint32,
    i32 => Int32,
    u64 => Uint64,
    i64 => Int64,
    f16 => Float16,
    f32 => Float32,
    f64 => Float64,
}

/// `bool_t` element: one byte, any non-zero value reads as true.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Bool(u8);

impl Bool {
    #[inline]
    pub const fn new(v: bool) -> Self {
        Self(v as u8)
    }

    #[inline]
    pub const fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Bool {
    #[inline]
    fn from(v: bool) -> Self {
        Self::new(v)
    }
}

impl From<Bool> for bool {
    #[inline]
    fn from(v: Bool) -> Self {
        v.get()
    }
}

impl fmt::Debug for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl AlembicPod for Bool {
    const POD_TYPE: PlainOldDataType = PlainOldDataType::Boolean;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_sizes() {
        assert_eq!(PlainOldDataType::Boolean.num_bytes(), 1);
        assert_eq!(PlainOldDataType::Int32.num_bytes(), 4);
        assert_eq!(PlainOldDataType::Float16.num_bytes(), 2);
        assert_eq!(PlainOldDataType::Float64.num_bytes(), 8);
        assert_eq!(PlainOldDataType::String.fixed_size(), None);
        assert_eq!(PlainOldDataType::Unknown.num_bytes(), 0);
    }

    #[test]
    fn test_tag_and_name_roundtrip() {
        for i in 0..=PlainOldDataType::Wstring.as_u8() {
            let pod = PlainOldDataType::from_u8(i);
            assert_ne!(pod, PlainOldDataType::Unknown);
            assert_eq!(pod.as_u8(), i);
            assert_eq!(PlainOldDataType::from_name(pod.name()), pod);
        }
        assert_eq!(PlainOldDataType::from_u8(14), PlainOldDataType::Unknown);
        assert_eq!(PlainOldDataType::from_u8(200), PlainOldDataType::Unknown);
        assert_eq!(PlainOldDataType::from_name("half"), PlainOldDataType::Unknown);
    }

    #[test]
    fn test_bool_type() {
        assert!(Bool::new(true).get());
        assert!(!Bool::from(false).get());
        let raw: Bool = bytemuck::cast(7u8);
        assert!(bool::from(raw));
        assert_eq!(std::mem::size_of::<Bool>(), 1);
        assert_eq!(Bool::POD_TYPE, PlainOldDataType::Boolean);
    }
}
