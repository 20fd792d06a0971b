//! Parsing of the header blocks stored inside Ogawa data blocks.

use byteorder::{LittleEndian, ReadBytesExt};

use super::format::INLINE_METADATA;
use super::reader::IData;
use super::write_util::info;
use crate::core::{MetaData, ObjectHeader, PropertyHeader, PropertyType, SampleDigest, TimeSampling};
use crate::util::{DataType, Error, PlainOldDataType, Result};

/// Little-endian reader over a header block.
pub(crate) struct HeaderCursor<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> HeaderCursor<'a> {
    pub fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn truncated(&self) -> Error {
        Error::invalid(format!("{} truncated", self.what))
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.buf.read_u8().map_err(|_| self.truncated())
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.buf
            .read_u16::<LittleEndian>()
            .map_err(|_| self.truncated())
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.buf
            .read_u32::<LittleEndian>()
            .map_err(|_| self.truncated())
    }

    pub fn f64(&mut self) -> Result<f64> {
        self.buf
            .read_f64::<LittleEndian>()
            .map_err(|_| self.truncated())
    }

    /// `u8`, `u16` or `u32` depending on the size hint.
    pub fn hinted(&mut self, hint: u32) -> Result<u32> {
        match hint {
            0 => self.u8().map(u32::from),
            1 => self.u16().map(u32::from),
            2 => self.u32(),
            _ => Err(Error::invalid(format!("{}: bad size hint {hint}", self.what))),
        }
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.buf.len() {
            return Err(self.truncated());
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn string(&mut self, len: usize) -> Result<String> {
        let bytes = self.bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| Error::InvalidMetadata(format!("{}: {e}", self.what)))
    }
}

/// Time samplings with their max sample counts.
pub fn read_time_samplings_and_max(data: &IData) -> Result<(Vec<TimeSampling>, Vec<u32>)> {
    let buf = data.read_all()?;
    let mut cur = HeaderCursor::new(&buf, "time sampling table");
    let mut samplings = Vec::new();
    let mut max_samples = Vec::new();

    while !cur.is_empty() {
        max_samples.push(cur.u32()?);
        let tpc = cur.f64()?;
        let count = cur.u32()? as usize;
        if count == 0 {
            return Err(Error::invalid("time sampling without stored times"));
        }
        let times = (0..count).map(|_| cur.f64()).collect::<Result<Vec<_>>>()?;
        samplings.push(TimeSampling::decode(tpc, times)?);
    }

    if samplings.is_empty() {
        samplings.push(TimeSampling::identity());
        max_samples.push(0);
    }
    Ok((samplings, max_samples))
}

/// Indexed metadata table; entry 0 is always empty.
pub fn read_indexed_metadata(data: &IData) -> Result<Vec<MetaData>> {
    let buf = data.read_all()?;
    let mut cur = HeaderCursor::new(&buf, "indexed metadata");
    let mut table = vec![MetaData::new()];
    while !cur.is_empty() {
        let len = cur.u8()? as usize;
        let text = cur.string(len)?;
        table.push(MetaData::deserialize(&text));
    }
    Ok(table)
}

fn indexed(table: &[MetaData], index: usize) -> Result<MetaData> {
    table
        .get(index)
        .cloned()
        .ok_or_else(|| Error::InvalidMetadata(format!("metadata index {index} not in table")))
}

/// Child object headers plus the trailing `(properties, children)` digests.
pub fn read_object_headers(
    data: &IData,
    parent_full_name: &str,
    table: &[MetaData],
) -> Result<(Vec<ObjectHeader>, SampleDigest, SampleDigest)> {
    let buf = data.read_all()?;
    if buf.len() < 32 {
        return Err(Error::invalid("object header block missing digests"));
    }
    let (records, digests) = buf.split_at(buf.len() - 32);
    let mut properties = [0u8; 16];
    let mut children = [0u8; 16];
    properties.copy_from_slice(&digests[..16]);
    children.copy_from_slice(&digests[16..]);

    let mut cur = HeaderCursor::new(records, "object headers");
    let mut headers = Vec::new();
    while !cur.is_empty() {
        let name_len = cur.u32()? as usize;
        if name_len == 0 {
            return Err(Error::invalid("object header with empty name"));
        }
        let name = cur.string(name_len)?;
        let md_index = cur.u8()?;
        let meta_data = if md_index == INLINE_METADATA {
            let len = cur.u32()? as usize;
            MetaData::deserialize(&cur.string(len)?)
        } else {
            indexed(table, md_index as usize)?
        };
        headers.push(ObjectHeader::child_of(parent_full_name, &name, meta_data));
    }
    Ok((headers, properties, children))
}

/// A property header plus its stored sample bookkeeping.
#[derive(Clone, Debug)]
pub struct ParsedPropertyHeader {
    pub header: PropertyHeader,
    pub num_samples: u32,
    pub first_changed_index: u32,
    pub last_changed_index: u32,
    pub is_homogenous: bool,
}

impl ParsedPropertyHeader {
    pub fn is_constant(&self) -> bool {
        self.first_changed_index == 0 && self.last_changed_index == 0
    }
}

pub fn read_property_headers(data: &IData, table: &[MetaData]) -> Result<Vec<ParsedPropertyHeader>> {
    let buf = data.read_all()?;
    let mut cur = HeaderCursor::new(&buf, "property headers");
    let mut headers = Vec::new();

    while !cur.is_empty() {
        let word = cur.u32()?;
        let hint = (word & info::SIZE_HINT_MASK) >> 2;
        let property_type = match word & info::TYPE_MASK {
            0 => PropertyType::Compound,
            1 => PropertyType::Scalar,
            _ => PropertyType::Array,
        };

        let mut data_type = DataType::UNKNOWN;
        let mut time_sampling_index = 0;
        let mut num_samples = 0;
        let mut first_changed_index = 0;
        let mut last_changed_index = 0;
        let mut is_homogenous = false;

        if property_type != PropertyType::Compound {
            let pod = PlainOldDataType::from_u8(((word & info::POD_MASK) >> 4) as u8);
            let extent = ((word & info::EXTENT_MASK) >> 12) as u8;
            data_type = DataType::new(pod, extent);
            is_homogenous = word & info::HOMOGENOUS != 0;

            num_samples = cur.hinted(hint)?;
            if word & info::EXPLICIT_CHANGES != 0 {
                first_changed_index = cur.hinted(hint)?;
                last_changed_index = cur.hinted(hint)?;
            } else if word & info::ALL_SAME != 0 {
                first_changed_index = 0;
                last_changed_index = 0;
            } else {
                first_changed_index = 1;
                last_changed_index = num_samples.saturating_sub(1);
            }
            if word & info::HAS_TIME_SAMPLING != 0 {
                time_sampling_index = cur.hinted(hint)?;
            }
        }

        let name_len = cur.hinted(hint)? as usize;
        let name = cur.string(name_len)?;

        let md_index = (word & info::METADATA_MASK) >> 20;
        let meta_data = if md_index == u32::from(INLINE_METADATA) {
            let len = cur.hinted(hint)? as usize;
            MetaData::deserialize(&cur.string(len)?)
        } else {
            indexed(table, md_index as usize)?
        };

        let header = PropertyHeader {
            name,
            property_type,
            data_type,
            time_sampling_index,
            meta_data,
        };
        headers.push(ParsedPropertyHeader {
            header,
            num_samples,
            first_changed_index,
            last_changed_index,
            is_homogenous,
        });
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_reads_little_endian() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0, 0, 0, 0, 0, 0, 0xF0, 0x3F];
        let mut cur = HeaderCursor::new(&bytes, "test");
        assert_eq!(cur.u32().unwrap(), 0x0403_0201);
        assert_eq!(cur.f64().unwrap(), 1.0);
        assert!(cur.is_empty());
        assert!(cur.u8().is_err());
    }

    #[test]
    fn test_cursor_hinted_widths() {
        let bytes = [7, 0x34, 0x12, 1, 0, 0, 0];
        let mut cur = HeaderCursor::new(&bytes, "test");
        assert_eq!(cur.hinted(0).unwrap(), 7);
        assert_eq!(cur.hinted(1).unwrap(), 0x1234);
        assert_eq!(cur.hinted(2).unwrap(), 1);
        assert!(cur.hinted(3).is_err());
    }
}
