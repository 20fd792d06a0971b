//! Serialization of the header blocks stored inside Ogawa data blocks.

use std::collections::HashMap;

use super::format::{INLINE_METADATA, LIBRARY_VERSION, MAX_INDEXED_METADATA};
use crate::core::{MetaData, ObjectHeader, PropertyHeader, PropertyType, TimeSampling};

/// Bit layout of the leading `u32` of each property header record.
pub(crate) mod info {
    pub const TYPE_MASK: u32 = 0x0003;
    pub const SIZE_HINT_MASK: u32 = 0x000c;
    pub const POD_MASK: u32 = 0x00f0;
    pub const HAS_TIME_SAMPLING: u32 = 0x0100;
    pub const EXPLICIT_CHANGES: u32 = 0x0200;
    pub const HOMOGENOUS: u32 = 0x0400;
    pub const ALL_SAME: u32 = 0x0800;
    pub const EXTENT_MASK: u32 = 0xff000;
    pub const METADATA_MASK: u32 = 0xff00000;
}

/// Write value with size hint (1, 2, or 4 bytes).
pub(crate) fn write_with_hint(buf: &mut Vec<u8>, value: u32, hint: u32) {
    match hint {
        0 => buf.push(value as u8),
        1 => buf.extend_from_slice(&(value as u16).to_le_bytes()),
        _ => buf.extend_from_slice(&value.to_le_bytes()),
    }
}

fn size_hint(max_value: u32) -> u32 {
    if max_value < 256 {
        0
    } else if max_value < 65536 {
        1
    } else {
        2
    }
}

/// Deduplicating table of short metadata strings.
///
/// Index 0 is the empty entry; entries that do not fit are stored inline.
#[derive(Default)]
pub(crate) struct MetaDataTable {
    entries: Vec<String>,
    index: HashMap<String, u8>,
}

impl MetaDataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `md`, or [`INLINE_METADATA`] when it must be stored inline.
    pub fn index_of(&mut self, md: &MetaData) -> u8 {
        let serialized = md.serialize();
        if serialized.is_empty() {
            return 0;
        }
        if let Some(&idx) = self.index.get(&serialized) {
            return idx;
        }
        if self.entries.len() + 1 >= MAX_INDEXED_METADATA || serialized.len() > 255 {
            return INLINE_METADATA;
        }
        self.entries.push(serialized.clone());
        let idx = self.entries.len() as u8;
        self.index.insert(serialized, idx);
        idx
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for entry in &self.entries {
            buf.push(entry.len() as u8);
            buf.extend_from_slice(entry.as_bytes());
        }
        buf
    }
}

/// Time sampling table: per entry `max_sample u32, tpc f64, count u32, times`.
pub(crate) fn encode_time_samplings(samplings: &[TimeSampling], max_samples: &[u32]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (i, ts) in samplings.iter().enumerate() {
        let (tpc, times) = ts.encode();
        buf.extend_from_slice(&max_samples.get(i).copied().unwrap_or(0).to_le_bytes());
        buf.extend_from_slice(&tpc.to_le_bytes());
        buf.extend_from_slice(&(times.len() as u32).to_le_bytes());
        for t in times {
            buf.extend_from_slice(&t.to_le_bytes());
        }
    }
    buf
}

/// One child object record.
pub(crate) fn encode_object_header(buf: &mut Vec<u8>, header: &ObjectHeader, table: &mut MetaDataTable) {
    buf.extend_from_slice(&(header.name.len() as u32).to_le_bytes());
    buf.extend_from_slice(header.name.as_bytes());
    let idx = table.index_of(&header.meta_data);
    buf.push(idx);
    if idx == INLINE_METADATA {
        let text = header.meta_data.serialize();
        buf.extend_from_slice(&(text.len() as u32).to_le_bytes());
        buf.extend_from_slice(text.as_bytes());
    }
}

/// Sample bookkeeping written alongside a leaf property header.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LeafStats {
    pub num_samples: u32,
    pub first_changed_index: u32,
    pub last_changed_index: u32,
    pub is_homogenous: bool,
}

/// One property header record; `stats` is `None` for compounds.
pub(crate) fn encode_property_header(
    buf: &mut Vec<u8>,
    header: &PropertyHeader,
    stats: Option<LeafStats>,
    table: &mut MetaDataTable,
) {
    let md_text = header.meta_data.serialize();
    let md_index = table.index_of(&header.meta_data);
    let stats = stats.unwrap_or_default();

    let max_value = (header.name.len() as u32)
        .max(md_text.len() as u32)
        .max(stats.num_samples)
        .max(header.time_sampling_index);
    let hint = size_hint(max_value);

    let mut word = u32::from(header.property_type.as_u8()) | (hint << 2);
    let is_leaf = header.property_type != PropertyType::Compound;
    let default_changes = stats.first_changed_index == 1
        && stats.last_changed_index == stats.num_samples.saturating_sub(1);
    let all_same = stats.first_changed_index == 0 && stats.last_changed_index == 0;

    if is_leaf {
        word |= (u32::from(header.data_type.pod.as_u8()) << 4) & info::POD_MASK;
        word |= u32::from(header.data_type.extent) << 12;
        if stats.is_homogenous {
            word |= info::HOMOGENOUS;
        }
        if header.time_sampling_index != 0 {
            word |= info::HAS_TIME_SAMPLING;
        }
        if all_same {
            word |= info::ALL_SAME;
        } else if !default_changes {
            word |= info::EXPLICIT_CHANGES;
        }
    }
    word |= u32::from(md_index) << 20;
    buf.extend_from_slice(&word.to_le_bytes());

    if is_leaf {
        write_with_hint(buf, stats.num_samples, hint);
        if word & info::EXPLICIT_CHANGES != 0 {
            write_with_hint(buf, stats.first_changed_index, hint);
            write_with_hint(buf, stats.last_changed_index, hint);
        }
        if word & info::HAS_TIME_SAMPLING != 0 {
            write_with_hint(buf, header.time_sampling_index, hint);
        }
    }

    write_with_hint(buf, header.name.len() as u32, hint);
    buf.extend_from_slice(header.name.as_bytes());
    if md_index == INLINE_METADATA {
        write_with_hint(buf, md_text.len() as u32, hint);
        buf.extend_from_slice(md_text.as_bytes());
    }
}

/// Human-readable library version recorded in `_ai_AlembicVersion`.
pub fn library_version_string() -> String {
    let major = LIBRARY_VERSION / 10000;
    let minor = (LIBRARY_VERSION / 100) % 100;
    let patch = LIBRARY_VERSION % 100;
    let date = option_env!("ALEMBIC_CORE_BUILD_DATE").unwrap_or("unknown");
    format!("alembic-core {major}.{minor}.{patch} (built {date})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::DataType;

    #[test]
    fn test_metadata_table_dedups() {
        let mut table = MetaDataTable::new();
        let mut md = MetaData::new();
        assert_eq!(table.index_of(&md), 0);
        md.set("schema", "Xform");
        assert_eq!(table.index_of(&md), 1);
        assert_eq!(table.index_of(&md.clone()), 1);

        let mut long = MetaData::new();
        long.set("k", "v".repeat(300));
        assert_eq!(table.index_of(&long), INLINE_METADATA);
        assert_eq!(table.encode()[0] as usize, "schema=Xform".len());
    }

    #[test]
    fn test_hint_widths() {
        let mut buf = Vec::new();
        write_with_hint(&mut buf, 5, 0);
        write_with_hint(&mut buf, 300, 1);
        write_with_hint(&mut buf, 70000, 2);
        assert_eq!(buf.len(), 1 + 2 + 4);
        assert_eq!(size_hint(255), 0);
        assert_eq!(size_hint(256), 1);
        assert_eq!(size_hint(65536), 2);
    }

    #[test]
    fn test_constant_leaf_sets_all_same() {
        let mut table = MetaDataTable::new();
        let mut buf = Vec::new();
        let header = PropertyHeader::scalar("x", DataType::FLOAT32);
        let stats = LeafStats {
            num_samples: 4,
            ..Default::default()
        };
        encode_property_header(&mut buf, &header, Some(stats), &mut table);
        let word = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_ne!(word & info::ALL_SAME, 0);
        assert_eq!(word & info::EXPLICIT_CHANGES, 0);
        assert_eq!(word & info::TYPE_MASK, 1);
    }
}
