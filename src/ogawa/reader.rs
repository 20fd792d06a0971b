//! Ogawa container reader: memory-mapped or buffered file access plus
//! group/data views.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;

use super::format::*;
use crate::util::{Error, Result};

/// Random-access view of an Ogawa file.
pub struct IStreams {
    inner: StreamsInner,
    version: u16,
    frozen: bool,
    size: u64,
}

enum StreamsInner {
    Mmap(Mmap),
    File(Mutex<File>),
}

impl IStreams {
    pub fn open(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(size));
        }

        let inner = if use_mmap {
            // Safety: mapped read-only; the archive is not modified while open.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
            StreamsInner::Mmap(mmap)
        } else {
            StreamsInner::File(Mutex::new(file))
        };

        let mut streams = Self {
            inner,
            version: 0,
            frozen: false,
            size,
        };
        let mut header = [0u8; HEADER_SIZE];
        streams.read_into(0, &mut header)?;
        let (version, frozen) = parse_header(&header)?;
        streams.version = version;
        streams.frozen = frozen;
        Ok(streams)
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn root_pos(&self) -> Result<u64> {
        self.read_u64(ROOT_POS_OFFSET as u64)
    }

    /// End of `len` bytes at `pos`; `UnexpectedEof` past the end of the file.
    fn checked_end(&self, pos: u64, len: u64) -> Result<u64> {
        pos.checked_add(len)
            .filter(|&end| end <= self.size)
            .ok_or(Error::UnexpectedEof(pos))
    }

    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        self.checked_end(pos, len as u64)?;
        let mut buf = vec![0u8; len];
        self.read_into(pos, &mut buf)?;
        Ok(buf)
    }

    pub fn read_into(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = self.checked_end(pos, buf.len() as u64)?;

        match &self.inner {
            StreamsInner::Mmap(mmap) => {
                buf.copy_from_slice(&mmap[pos as usize..end as usize]);
            }
            StreamsInner::File(file) => {
                let mut f = file.lock();
                f.seek(SeekFrom::Start(pos))?;
                f.read_exact(buf)?;
            }
        }
        Ok(())
    }

    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(pos, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// Validate magic and return `(version, frozen)`.
pub(crate) fn parse_header(data: &[u8]) -> Result<(u16, bool)> {
    if data.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof(data.len() as u64));
    }
    if &data[0..5] != OGAWA_MAGIC {
        return Err(Error::InvalidMagic);
    }
    let frozen = data[FROZEN_OFFSET] == FROZEN_FLAG;
    let version = u16::from_le_bytes([data[VERSION_OFFSET], data[VERSION_OFFSET + 1]]);
    Ok((version, frozen))
}

/// A group: an ordered list of child offsets.
#[derive(Clone)]
pub struct IGroup {
    streams: Arc<IStreams>,
    pos: u64,
    child_offsets: Vec<u64>,
}

impl IGroup {
    pub fn new(streams: Arc<IStreams>, pos: u64) -> Result<Self> {
        let child_offsets = if pos == 0 {
            Vec::new()
        } else {
            let count = streams.read_u64(pos)?;
            if count > streams.size().saturating_sub(pos + 8) / 8 {
                return Err(Error::invalid(format!(
                    "group at {pos} claims {count} children"
                )));
            }
            let raw = streams.read_bytes(pos + 8, count as usize * 8)?;
            raw.chunks_exact(8)
                .map(|c| {
                    let mut word = [0u8; 8];
                    word.copy_from_slice(c);
                    u64::from_le_bytes(word)
                })
                .collect()
        };
        Ok(Self {
            streams,
            pos,
            child_offsets,
        })
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn num_children(&self) -> u64 {
        self.child_offsets.len() as u64
    }

    pub fn child_offset(&self, index: u64) -> Result<u64> {
        self.child_offsets
            .get(index as usize)
            .copied()
            .ok_or(Error::OutOfRange {
                index: index as usize,
                count: self.child_offsets.len(),
            })
    }

    pub fn group(&self, index: u64) -> Result<IGroup> {
        let offset = self.child_offset(index)?;
        if !is_group_offset(offset) {
            return Err(Error::mismatch("group", "data"));
        }
        IGroup::new(Arc::clone(&self.streams), extract_offset(offset))
    }

    pub fn data(&self, index: u64) -> Result<IData> {
        let offset = self.child_offset(index)?;
        if !is_data_offset(offset) {
            return Err(Error::mismatch("data", "group"));
        }
        IData::new(Arc::clone(&self.streams), extract_offset(offset))
    }
}

/// A data block: `u64` size followed by bytes.
pub struct IData {
    streams: Arc<IStreams>,
    pos: u64,
    size: u64,
}

impl IData {
    pub fn new(streams: Arc<IStreams>, pos: u64) -> Result<Self> {
        let size = if pos == 0 { 0 } else { streams.read_u64(pos)? };
        if pos != 0 {
            // read_u64 succeeded, so pos + 8 fits
            streams.checked_end(pos + 8, size).map_err(|_| {
                Error::invalid(format!("data block at {pos} claims {size} bytes"))
            })?;
        }
        Ok(Self { streams, pos, size })
    }

    /// Block position; stable identity for caching.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.read_range(0, self.size as usize)
    }

    /// Read `len` bytes starting `offset` bytes into the payload.
    pub fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let end = offset.checked_add(len as u64).filter(|&end| end <= self.size);
        if end.is_none() {
            return Err(Error::UnexpectedEof(self.pos + 8));
        }
        self.streams.read_bytes(self.pos + 8 + offset, len)
    }

    pub fn read_string(&self) -> Result<String> {
        Ok(String::from_utf8(self.read_all()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parsing() {
        let mut header = [0u8; 16];
        header[0..5].copy_from_slice(OGAWA_MAGIC);
        header[FROZEN_OFFSET] = FROZEN_FLAG;
        header[VERSION_OFFSET] = 1;

        let (version, frozen) = parse_header(&header).unwrap();
        assert_eq!(version, 1);
        assert!(frozen);
    }

    #[test]
    fn test_invalid_magic() {
        assert!(matches!(parse_header(&[0u8; 16]), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_oversized_block_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0..5].copy_from_slice(OGAWA_MAGIC);
        bytes[FROZEN_OFFSET] = FROZEN_FLAG;
        let block = bytes.len() as u64;
        bytes.extend_from_slice(&(u64::MAX - 64).to_le_bytes());
        bytes.extend_from_slice(b"abcd");
        std::fs::write(file.path(), &bytes).unwrap();

        let streams = Arc::new(IStreams::open(file.path(), false).unwrap());
        assert!(IData::new(Arc::clone(&streams), block).is_err());
        assert!(streams.read_bytes(block, usize::MAX).is_err());
        assert!(streams.read_bytes(u64::MAX - 2, 4).is_err());
        assert!(IGroup::new(streams, block).is_err());
    }

    #[test]
    fn test_short_file_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"Oga").unwrap();
        assert!(matches!(
            IStreams::open(file.path(), true),
            Err(Error::UnexpectedEof(3))
        ));
    }
}
