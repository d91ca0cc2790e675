use std::io::{self, Read, Write};

use super::{StoreReader, StoreWriter};
use crate::error::{ParamErr, Result};

/// A `StoreWriter` over any `io::Write`, integers are written in big-endian.
#[derive(Debug)]
pub struct BinaryWriter<W: Write> {
    inner: W,
}

impl<W: Write> BinaryWriter<W> {
    /// Creates a new `BinaryWriter`.
    ///
    /// # Arguments
    /// * `inner` - The underlying writer.
    ///
    /// # Returns
    /// A new `BinaryWriter` instance.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> StoreWriter for BinaryWriter<W> {
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }
}

/// A `StoreReader` over any `io::Read`, the counterpart of `BinaryWriter`.
#[derive(Debug)]
pub struct BinaryReader<R: Read> {
    inner: R,
}

impl<R: Read> BinaryReader<R> {
    /// Creates a new `BinaryReader`.
    ///
    /// # Arguments
    /// * `inner` - The underlying reader.
    ///
    /// # Returns
    /// A new `BinaryReader` instance.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> StoreReader for BinaryReader<R> {
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u64()?;

        let mut buf = Vec::new();
        (&mut self.inner).take(len).read_to_end(&mut buf)?;

        if (buf.len() as u64) < len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        String::from_utf8(buf).map_err(|e| ParamErr::format(format!("invalid name: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_u64(0x0102).unwrap();
        writer.write_u8(9).unwrap();

        let bytes = writer.into_inner().unwrap();
        assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 1, 2, 9]);
    }

    #[test]
    fn strings_and_values_round_trip() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_str("dense").unwrap();
        writer.write_values(&[1.5f32, -2.]).unwrap();
        let bytes = writer.into_inner().unwrap();

        let mut reader = BinaryReader::new(bytes.as_slice());
        assert_eq!(reader.read_string().unwrap(), "dense");
        assert_eq!(reader.read_values::<f32>(2).unwrap(), [1.5, -2.]);
        assert!(matches!(reader.read_u8(), Err(ParamErr::Io(_))));
    }

    #[test]
    fn truncated_strings_are_io_errors() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_u64(10).unwrap();
        writer.write_bytes(b"abc").unwrap();
        let bytes = writer.into_inner().unwrap();

        let mut reader = BinaryReader::new(bytes.as_slice());
        assert!(matches!(reader.read_string(), Err(ParamErr::Io(_))));
    }

    #[test]
    fn huge_value_counts_fail_on_missing_bytes() {
        let bytes = [0u8; 16];
        let mut reader = BinaryReader::new(bytes.as_slice());
        assert!(matches!(reader.read_values::<f64>(usize::MAX / 16), Err(ParamErr::Io(_))));
    }

    #[test]
    fn invalid_utf8_is_a_format_error() {
        let mut writer = BinaryWriter::new(Vec::new());
        writer.write_u64(2).unwrap();
        writer.write_bytes(&[0xff, 0xfe]).unwrap();
        let bytes = writer.into_inner().unwrap();

        let mut reader = BinaryReader::new(bytes.as_slice());
        assert!(matches!(reader.read_string(), Err(ParamErr::Format(_))));
    }
}
