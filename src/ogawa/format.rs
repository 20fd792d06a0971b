//! Ogawa container constants and offset helpers.
//!
//! ```text
//! +------------------+
//! | Magic: "Ogawa"   |  5 bytes
//! | Frozen flag      |  1 byte (0x00 while writing, 0xFF once closed)
//! | Version          |  2 bytes (u16 LE)
//! | Root group pos   |  8 bytes (u64 LE)
//! +------------------+
//! | data blocks      |  u64 size + bytes
//! | groups           |  u64 count + u64 child offsets
//! +------------------+
//! ```

pub const OGAWA_MAGIC: &[u8; 5] = b"Ogawa";

pub const HEADER_SIZE: usize = 16;

pub const FROZEN_OFFSET: usize = 5;

pub const VERSION_OFFSET: usize = 6;

pub const ROOT_POS_OFFSET: usize = 8;

pub const CURRENT_VERSION: u16 = 1;

pub const FROZEN_FLAG: u8 = 0xFF;

pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// Child offsets with the MSB set point at data; clear means group.
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

pub const OFFSET_MASK: u64 = !TYPE_FLAG_MASK;

/// Size of the digest prefix on every sample block.
pub const DATA_KEY_SIZE: usize = 16;

/// Trailing digests on an object's child header block.
pub const OBJECT_DIGESTS_SIZE: usize = 32;

/// Value stored in root child 0.
pub const ARCHIVE_FORMAT_VERSION: i32 = 1;

/// Value stored in root child 1 (major * 10000 + minor * 100 + patch).
pub const LIBRARY_VERSION: i32 = 10000;

/// Children of the archive root group.
pub mod root {
    pub const VERSION: u64 = 0;
    pub const LIBRARY_VERSION: u64 = 1;
    pub const TOP_OBJECT: u64 = 2;
    pub const ARCHIVE_METADATA: u64 = 3;
    pub const TIME_SAMPLINGS: u64 = 4;
    pub const INDEXED_METADATA: u64 = 5;
    pub const COUNT: u64 = 6;
}

/// Metadata index byte meaning "stored inline".
pub const INLINE_METADATA: u8 = 0xFF;

/// Largest indexed metadata table (index 0 is the empty entry).
pub const MAX_INDEXED_METADATA: usize = 255;

#[inline]
pub const fn is_group_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) == 0
}

#[inline]
pub const fn is_data_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) != 0
}

#[inline]
pub const fn extract_offset(offset: u64) -> u64 {
    offset & OFFSET_MASK
}

#[inline]
pub const fn make_group_offset(pos: u64) -> u64 {
    pos & OFFSET_MASK
}

#[inline]
pub const fn make_data_offset(pos: u64) -> u64 {
    pos | TYPE_FLAG_MASK
}

/// Position 0 marks an empty group or empty data block.
#[inline]
pub const fn is_empty_offset(offset: u64) -> bool {
    extract_offset(offset) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets() {
        let group = make_group_offset(0x1234);
        assert!(is_group_offset(group));
        assert_eq!(extract_offset(group), 0x1234);

        let data = make_data_offset(0x5678);
        assert!(is_data_offset(data));
        assert_eq!(data, 0x8000_0000_0000_5678);
        assert_eq!(extract_offset(data), 0x5678);
    }

    #[test]
    fn test_empty_offset() {
        assert!(is_empty_offset(0));
        assert!(is_empty_offset(TYPE_FLAG_MASK));
        assert!(!is_empty_offset(0x100));
    }
}
