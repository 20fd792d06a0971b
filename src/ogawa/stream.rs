//! Ogawa output stream with position tracking.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use crate::util::Result;

pub struct OStream {
    writer: BufWriter<File>,
    pos: u64,
}

impl OStream {
    /// Create the file and write an unfrozen header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut stream = Self {
            writer: BufWriter::with_capacity(2 * 1024 * 1024, file),
            pos: 0,
        };
        stream.write_bytes(OGAWA_MAGIC)?;
        stream.write_u8(NOT_FROZEN_FLAG)?;
        stream.write_u16(CURRENT_VERSION)?;
        stream.write_u64(0)?;
        stream.writer.flush()?;
        Ok(stream)
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.pos += 2;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    /// Data block; returns its data offset. Empty payloads are not written.
    pub fn write_data(&mut self, data: &[u8]) -> Result<u64> {
        if data.is_empty() {
            return Ok(make_data_offset(0));
        }
        let pos = self.pos;
        self.write_u64(data.len() as u64)?;
        self.write_bytes(data)?;
        Ok(make_data_offset(pos))
    }

    /// Sample block: digest prefix + payload. Returns the raw position.
    pub fn write_keyed(&mut self, digest: &[u8; DATA_KEY_SIZE], data: &[u8]) -> Result<u64> {
        let pos = self.pos;
        self.write_u64((DATA_KEY_SIZE + data.len()) as u64)?;
        self.write_bytes(digest)?;
        self.write_bytes(data)?;
        Ok(pos)
    }

    /// Group of child offsets; returns its group offset.
    pub fn write_group(&mut self, children: &[u64]) -> Result<u64> {
        if children.is_empty() {
            return Ok(make_group_offset(0));
        }
        let pos = self.pos;
        self.write_u64(children.len() as u64)?;
        for &child in children {
            self.write_u64(child)?;
        }
        Ok(make_group_offset(pos))
    }

    /// Set the frozen flag and root position, then flush.
    pub fn finalize(&mut self, root_pos: u64) -> Result<()> {
        self.writer.flush()?;
        let end = self.pos;
        self.writer.seek(SeekFrom::Start(FROZEN_OFFSET as u64))?;
        self.writer.write_u8(FROZEN_FLAG)?;
        self.writer.seek(SeekFrom::Start(ROOT_POS_OFFSET as u64))?;
        self.writer.write_u64::<LittleEndian>(root_pos)?;
        self.writer.flush()?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}
