//! Little-endian cursor over record bytes
//!
//! Wraps `byteorder` so that running off the end of a record becomes a
//! format error carrying the position, instead of a bare I/O error.

use crate::core::error::{DbpfError, Result};
use crate::core::pointer::Pointer;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

pub struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader {
            cursor: Cursor::new(bytes),
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn eof(&self, needed: usize) -> DbpfError {
        DbpfError::UnexpectedEof {
            position: self.position(),
            needed: needed - self.remaining().min(needed),
        }
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.eof(1))
    }

    pub fn u16(&mut self) -> Result<u16> {
        let pos = self.position();
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.rewind_eof(pos, 2))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let pos = self.position();
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.rewind_eof(pos, 4))
    }

    pub fn i32(&mut self) -> Result<i32> {
        let pos = self.position();
        self.cursor
            .read_i32::<LittleEndian>()
            .map_err(|_| self.rewind_eof(pos, 4))
    }

    pub fn i64(&mut self) -> Result<i64> {
        let pos = self.position();
        self.cursor
            .read_i64::<LittleEndian>()
            .map_err(|_| self.rewind_eof(pos, 8))
    }

    pub fn f32(&mut self) -> Result<f32> {
        let pos = self.position();
        self.cursor
            .read_f32::<LittleEndian>()
            .map_err(|_| self.rewind_eof(pos, 4))
    }

    /// Borrow the next `n` bytes
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(self.eof(n));
        }
        let start = self.position();
        let slice = &self.cursor.get_ref()[start..start + n];
        self.cursor.set_position((start + n) as u64);
        Ok(slice)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    /// Everything that has not been read yet
    pub fn rest(&mut self) -> &'a [u8] {
        let n = self.remaining();
        let start = self.position();
        self.cursor.set_position((start + n) as u64);
        &self.cursor.get_ref()[start..]
    }

    /// Pointer stored as `address` followed by `type` when the address is non-zero
    pub fn pointer(&mut self) -> Result<Option<Pointer>> {
        let address = self.u32()?;
        if address == 0 {
            return Ok(None);
        }
        let type_id = self.u32()?;
        Ok(Some(Pointer::new(type_id, address)))
    }

    /// Guard a count read from the stream against the bytes actually left
    pub fn count(&mut self, item_size: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        if count.saturating_mul(item_size) > self.remaining() {
            return Err(DbpfError::malformed(format!(
                "count {} of {}-byte items at {} exceeds the {} bytes left",
                count,
                item_size,
                self.position() - 4,
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn rewind_eof(&mut self, pos: usize, needed: usize) -> DbpfError {
        self.cursor.set_position(pos as u64);
        self.eof(needed)
    }
}

/// Growable little-endian output buffer
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, value: u8) -> Result<()> {
        self.buf.write_u8(value)?;
        Ok(())
    }

    pub fn u16(&mut self, value: u16) -> Result<()> {
        self.buf.write_u16::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn u32(&mut self, value: u32) -> Result<()> {
        self.buf.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn i32(&mut self, value: i32) -> Result<()> {
        self.buf.write_i32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn i64(&mut self, value: i64) -> Result<()> {
        self.buf.write_i64::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn f32(&mut self, value: f32) -> Result<()> {
        self.buf.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn pointer(&mut self, pointer: Option<&Pointer>) -> Result<()> {
        match pointer {
            Some(pointer) if pointer.address != 0 => {
                self.u32(pointer.address)?;
                self.u32(pointer.type_id)
            }
            _ => self.u32(0),
        }
    }

    /// Patch a u32 previously written at `offset`
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
