//! Persisting parameter trees into byte streams and reading them back.

mod binary;
mod layout;

pub use binary::{BinaryReader, BinaryWriter};
pub(crate) use layout::{
    Skeleton, check_depth, read_header, read_values, write_header, write_layout, write_values,
};

use crate::{error::Result, precision::Precision};

/// The format identifier every persisted tree starts with.
pub const MAGIC: u64 = u64::from_be_bytes(*b"PARAMTRE");

/// The current version of the persisted format.
pub const VERSION: u8 = 1;

/// The sink a parameter tree is serialized into.
pub trait StoreWriter {
    fn write_u8(&mut self, value: u8) -> Result<()>;

    fn write_u64(&mut self, value: u64) -> Result<()>;

    /// Writes the raw bytes as they are.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Writes a length prefixed utf-8 string.
    fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_u64(s.len() as u64)?;
        self.write_bytes(s.as_bytes())
    }

    /// Writes the values with the platform's byte order.
    fn write_values<T: Precision>(&mut self, values: &[T]) -> Result<()>
    where
        Self: Sized,
    {
        self.write_bytes(bytemuck::cast_slice(values))
    }
}

/// The source a parameter tree is reconstituted from.
pub trait StoreReader {
    fn read_u8(&mut self) -> Result<u8>;

    fn read_u64(&mut self) -> Result<u64>;

    /// Fills `buf` entirely, failing if the source ends before.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Reads a string written by `StoreWriter::write_str`.
    fn read_string(&mut self) -> Result<String>;

    /// Reads `n` values with the platform's byte order.
    ///
    /// # Arguments
    /// * `n` - The amount of values to read.
    ///
    /// # Returns
    /// The values, or an `Io` error if the source ends before `n` values were read.
    fn read_values<T: Precision>(&mut self, n: usize) -> Result<Vec<T>>
    where
        Self: Sized,
    {
        // Grows in chunks so a corrupted count fails on the missing bytes first.
        const CHUNK: usize = 1 << 16;

        let mut values = Vec::new();

        while values.len() < n {
            let start = values.len();
            values.resize(start + (n - start).min(CHUNK), T::default());
            self.read_bytes(bytemuck::cast_slice_mut(&mut values[start..]))?;
        }

        Ok(values)
    }
}
