//! Little-endian primitive reads over any `Read`, with truncation reported
//! against the field being read.

use std::io::{self, Read};

use crate::error::MapError;

pub(crate) struct ByteReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// The underlying stream, positioned right after the last read.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn read_array<const N: usize>(&mut self, context: &str) -> Result<[u8; N], MapError> {
        let mut buf = [0u8; N];
        self.fill(&mut buf, context)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self, context: &str) -> Result<u8, MapError> {
        Ok(self.read_array::<1>(context)?[0])
    }

    pub fn read_i8(&mut self, context: &str) -> Result<i8, MapError> {
        Ok(i8::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_u16(&mut self, context: &str) -> Result<u16, MapError> {
        Ok(u16::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_i16(&mut self, context: &str) -> Result<i16, MapError> {
        Ok(i16::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_i32(&mut self, context: &str) -> Result<i32, MapError> {
        Ok(i32::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_f32(&mut self, context: &str) -> Result<f32, MapError> {
        Ok(f32::from_le_bytes(self.read_array(context)?))
    }

    /// Read `count` little-endian `i16` values and widen them.
    pub fn read_i16_run(&mut self, count: usize, context: &str) -> Result<Vec<i32>, MapError> {
        let mut raw = vec![0u8; count * 2];
        self.fill(&mut raw, context)?;
        Ok(raw
            .chunks_exact(2)
            .map(|pair| i32::from(i16::from_le_bytes([pair[0], pair[1]])))
            .collect())
    }

    /// A `u16` length followed by that many bytes. Non-UTF-8 bytes are
    /// replaced rather than rejected; older editors wrote Latin-1.
    pub fn read_lstring(&mut self, context: &str) -> Result<String, MapError> {
        let len = self.read_u16(context)?;
        let mut raw = vec![0u8; usize::from(len)];
        self.fill(&mut raw, context)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    pub fn skip(&mut self, count: u64, context: &str) -> Result<(), MapError> {
        let copied = io::copy(&mut (&mut self.inner).take(count), &mut io::sink())
            .map_err(|err| map_io(err, context))?;
        self.position += copied;
        if copied != count {
            return Err(MapError::truncated(context));
        }
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8], context: &str) -> Result<(), MapError> {
        self.inner
            .read_exact(buf)
            .map_err(|err| map_io(err, context))?;
        self.position += buf.len() as u64;
        Ok(())
    }
}

fn map_io(err: io::Error, context: &str) -> MapError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => MapError::truncated(context),
        _ => MapError::Resource(format!("I/O error while reading {context}: {err}")),
    }
}
