// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use bytes::Buf;

use crate::error::{DsAirError, Result};

/// Little-endian cursor over a record subbody. Every read is bounds-checked
/// and reports the record name on truncation.
pub struct SubbodyReader<'a> {
    record: &'static str,
    buf: &'a [u8],
}

impl<'a> SubbodyReader<'a> {
    pub fn new(record: &'static str, buf: &'a [u8]) -> Self {
        Self { record, buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(DsAirError::Truncated {
                record: self.record,
                needed: n,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// A `u8` length followed by that many UTF-8 bytes.
    pub fn read_utf(&mut self, field: &'static str) -> Result<String> {
        let len = self.read_u8()? as usize;
        self.read_text(len, field)
    }

    /// Exactly `len` bytes of UTF-8.
    pub fn read_text(&mut self, len: usize, field: &'static str) -> Result<String> {
        let raw = self.read_bytes(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DsAirError::InvalidText { field })
    }

    /// Everything left, decoded lossily as ASCII/UTF-8.
    pub fn read_rest_lossy(&mut self) -> String {
        let rest = self.buf;
        self.buf = &[];
        String::from_utf8_lossy(rest).into_owned()
    }
}
