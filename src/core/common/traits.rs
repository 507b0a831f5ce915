//! Serialization traits used by the shard store's on-disk representation.

use std::io::{Read, Write};

use crate::core::common::error::StoreError;

/// Serializes a value of type `T` into a byte stream.
pub trait DataSerializer<T> {
    /// # Errors
    /// Returns [`StoreError::Io`] if the writer fails.
    fn serialize<W: Write>(value: &T, writer: &mut W) -> Result<(), StoreError>;
}

/// Deserializes a value of type `T` from a byte stream.
pub trait DataDeserializer<T> {
    /// # Errors
    /// Returns [`StoreError::Io`] if the reader fails or the stream is truncated.
    fn deserialize<R: Read>(reader: &mut R) -> Result<T, StoreError>;
}

/// Length-prefixed byte strings are the on-disk unit the shard store's
/// key-value file reads and writes: a 4-byte big-endian length, then the
/// raw bytes.
impl DataSerializer<Vec<u8>> for Vec<u8> {
    fn serialize<W: Write>(value: &Vec<u8>, writer: &mut W) -> Result<(), StoreError> {
        let len = u32::try_from(value.len())
            .map_err(|_| StoreError::Internal("value too large to serialize".into()))?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(value)?;
        Ok(())
    }
}

impl DataDeserializer<Vec<u8>> for Vec<u8> {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, StoreError> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}
