//! Typed sample buffers.
//!
//! A [`SampleBuffer`] is what callers hand to the writer and what the iterator
//! decodes segments into. Its variant is its runtime element kind, so type
//! validation against a channel is a tag comparison. On the wire, samples are
//! little-endian.

use crate::error::{Result, ValidationError};
use crate::telem::{DataType, ElementKind};

/// A contiguous run of samples of a single scalar type.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    /// `i8` samples.
    Int8(Vec<i8>),
    /// `i16` samples.
    Int16(Vec<i16>),
    /// `i32` samples.
    Int32(Vec<i32>),
    /// `i64` samples (also used for timestamps).
    Int64(Vec<i64>),
    /// `u8` samples.
    Uint8(Vec<u8>),
    /// `u16` samples.
    Uint16(Vec<u16>),
    /// `u32` samples.
    Uint32(Vec<u32>),
    /// `u64` samples.
    Uint64(Vec<u64>),
    /// `f32` samples.
    Float32(Vec<f32>),
    /// `f64` samples.
    Float64(Vec<f64>),
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for SampleBuffer {
                fn from(v: Vec<$ty>) -> Self {
                    SampleBuffer::$variant(v)
                }
            }
        )*
    };
}

impl_from_vec! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
}

macro_rules! encode_le {
    ($values:expr) => {
        $values.iter().flat_map(|v| v.to_le_bytes()).collect()
    };
}

macro_rules! decode_le {
    ($data:expr, $ty:ty) => {
        $data
            .chunks_exact(std::mem::size_of::<$ty>())
            .map(|chunk| {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(chunk);
                <$ty>::from_le_bytes(raw)
            })
            .collect()
    };
}

impl SampleBuffer {
    /// Returns the runtime element kind of the buffer.
    pub fn element(&self) -> ElementKind {
        match self {
            SampleBuffer::Int8(_) => ElementKind::I8,
            SampleBuffer::Int16(_) => ElementKind::I16,
            SampleBuffer::Int32(_) => ElementKind::I32,
            SampleBuffer::Int64(_) => ElementKind::I64,
            SampleBuffer::Uint8(_) => ElementKind::U8,
            SampleBuffer::Uint16(_) => ElementKind::U16,
            SampleBuffer::Uint32(_) => ElementKind::U32,
            SampleBuffer::Uint64(_) => ElementKind::U64,
            SampleBuffer::Float32(_) => ElementKind::F32,
            SampleBuffer::Float64(_) => ElementKind::F64,
        }
    }

    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::Int8(v) => v.len(),
            SampleBuffer::Int16(v) => v.len(),
            SampleBuffer::Int32(v) => v.len(),
            SampleBuffer::Int64(v) => v.len(),
            SampleBuffer::Uint8(v) => v.len(),
            SampleBuffer::Uint16(v) => v.len(),
            SampleBuffer::Uint32(v) => v.len(),
            SampleBuffer::Uint64(v) => v.len(),
            SampleBuffer::Float32(v) => v.len(),
            SampleBuffer::Float64(v) => v.len(),
        }
    }

    /// Returns true if the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the samples as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SampleBuffer::Int8(v) => encode_le!(v),
            SampleBuffer::Int16(v) => encode_le!(v),
            SampleBuffer::Int32(v) => encode_le!(v),
            SampleBuffer::Int64(v) => encode_le!(v),
            SampleBuffer::Uint8(v) => v.clone(),
            SampleBuffer::Uint16(v) => encode_le!(v),
            SampleBuffer::Uint32(v) => encode_le!(v),
            SampleBuffer::Uint64(v) => encode_le!(v),
            SampleBuffer::Float32(v) => encode_le!(v),
            SampleBuffer::Float64(v) => encode_le!(v),
        }
    }

    /// Decodes little-endian bytes as samples of the given data type.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if `data` is not a whole number of samples.
    pub fn from_bytes(data_type: DataType, data: &[u8]) -> Result<Self> {
        let density = data_type.density().value() as usize;
        if data.len() % density != 0 {
            return Err(ValidationError::new(
                "data",
                format!(
                    "{} bytes is not a multiple of the {} sample width {}",
                    data.len(),
                    data_type,
                    density
                ),
            )
            .into());
        }

        Ok(match data_type.element() {
            ElementKind::I8 => SampleBuffer::Int8(decode_le!(data, i8)),
            ElementKind::I16 => SampleBuffer::Int16(decode_le!(data, i16)),
            ElementKind::I32 => SampleBuffer::Int32(decode_le!(data, i32)),
            ElementKind::I64 => SampleBuffer::Int64(decode_le!(data, i64)),
            ElementKind::U8 => SampleBuffer::Uint8(data.to_vec()),
            ElementKind::U16 => SampleBuffer::Uint16(decode_le!(data, u16)),
            ElementKind::U32 => SampleBuffer::Uint32(decode_le!(data, u32)),
            ElementKind::U64 => SampleBuffer::Uint64(decode_le!(data, u64)),
            ElementKind::F32 => SampleBuffer::Float32(decode_le!(data, f32)),
            ElementKind::F64 => SampleBuffer::Float64(decode_le!(data, f64)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_matches_variant() {
        assert_eq!(SampleBuffer::from(vec![1.0f64]).element(), ElementKind::F64);
        assert_eq!(SampleBuffer::from(vec![1u16, 2]).element(), ElementKind::U16);
        assert_eq!(SampleBuffer::from(vec![1i64]).element(), DataType::TimeStamp.element());
    }

    #[test]
    fn test_bytes_are_little_endian() {
        let buf = SampleBuffer::from(vec![1u16, 0x0203]);
        assert_eq!(buf.to_bytes(), vec![0x01, 0x00, 0x03, 0x02]);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_float64() {
        let samples: Vec<f64> = (0..25).map(f64::from).collect();
        let bytes = SampleBuffer::from(samples.clone()).to_bytes();
        assert_eq!(bytes.len(), 25 * 8);

        let decoded = SampleBuffer::from_bytes(DataType::Float64, &bytes).unwrap();
        assert_eq!(decoded, SampleBuffer::Float64(samples));
    }

    #[test]
    fn test_decode_rejects_partial_sample() {
        let result = SampleBuffer::from_bytes(DataType::Int32, &[0, 1, 2]);
        assert!(result.is_err());
        assert!(SampleBuffer::from_bytes(DataType::Int32, &[]).unwrap().is_empty());
    }
}
