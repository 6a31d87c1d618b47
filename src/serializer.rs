//! Item Serializers
//!
//! Byte encodings for keys and values stored in collections. A serializer
//! with a constant size lets dictionaries keep keys in a fixed-width side
//! channel.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Endianness;
use crate::error::{Result, StreamKvError};

/// Encode/decode one item type
pub trait ItemSerializer<T>: Send + Sync {
    /// Byte length of every encoding, when fixed
    fn constant_size(&self) -> Option<usize> {
        None
    }

    fn serialize(&self, item: &T) -> Result<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

impl<T, S: ItemSerializer<T> + ?Sized> ItemSerializer<T> for Arc<S> {
    fn constant_size(&self) -> Option<usize> {
        (**self).constant_size()
    }

    fn serialize(&self, item: &T) -> Result<Vec<u8>> {
        (**self).serialize(item)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        (**self).deserialize(bytes)
    }
}

// =============================================================================
// Bincode
// =============================================================================

/// Any serde type via bincode
pub struct BincodeSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> ItemSerializer<T> for BincodeSerializer<T> {
    fn serialize(&self, item: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(item)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// =============================================================================
// Raw Bytes & Strings
// =============================================================================

/// Fixed-size byte arrays, stored verbatim
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteArraySerializer<const N: usize>;

impl<const N: usize> ItemSerializer<[u8; N]> for ByteArraySerializer<N> {
    fn constant_size(&self) -> Option<usize> {
        Some(N)
    }

    fn serialize(&self, item: &[u8; N]) -> Result<Vec<u8>> {
        Ok(item.to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<[u8; N]> {
        bytes.try_into().map_err(|_| {
            StreamKvError::Serialization(format!("Expected {} bytes, got {}", N, bytes.len()))
        })
    }
}

/// Variable-length byte vectors, stored verbatim
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesSerializer;

impl ItemSerializer<Vec<u8>> for BytesSerializer {
    fn serialize(&self, item: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(item.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 strings
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerializer;

impl ItemSerializer<String> for StringSerializer {
    fn serialize(&self, item: &String) -> Result<Vec<u8>> {
        Ok(item.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StreamKvError::Serialization(format!("Invalid UTF-8: {}", e)))
    }
}

// =============================================================================
// Integers
// =============================================================================

/// Fixed-width integers in a chosen byte order
#[derive(Debug, Clone, Copy)]
pub struct IntegerSerializer<T> {
    endianness: Endianness,
    _marker: PhantomData<fn() -> T>,
}

impl<T> IntegerSerializer<T> {
    pub fn new(endianness: Endianness) -> Self {
        Self {
            endianness,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for IntegerSerializer<T> {
    fn default() -> Self {
        Self::new(Endianness::default())
    }
}

macro_rules! impl_integer_serializer {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ItemSerializer<$ty> for IntegerSerializer<$ty> {
                fn constant_size(&self) -> Option<usize> {
                    Some(std::mem::size_of::<$ty>())
                }

                fn serialize(&self, item: &$ty) -> Result<Vec<u8>> {
                    Ok(match self.endianness {
                        Endianness::Little => item.to_le_bytes().to_vec(),
                        Endianness::Big => item.to_be_bytes().to_vec(),
                    })
                }

                fn deserialize(&self, bytes: &[u8]) -> Result<$ty> {
                    let buf = bytes.try_into().map_err(|_| {
                        StreamKvError::Serialization(format!(
                            "Expected {} bytes for {}, got {}",
                            std::mem::size_of::<$ty>(),
                            stringify!($ty),
                            bytes.len()
                        ))
                    })?;
                    Ok(match self.endianness {
                        Endianness::Little => <$ty>::from_le_bytes(buf),
                        Endianness::Big => <$ty>::from_be_bytes(buf),
                    })
                }
            }
        )*
    };
}

impl_integer_serializer!(u8, u16, u32, u64, i16, i32, i64);
