//! Vector element widths and the persisted type tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric type of the stored vector components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u32)]
pub enum DataType {
    #[default]
    Float32 = 0,
    Float64 = 1,
}

impl DataType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DataType::Float32),
            1 => Some(DataType::Float64),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Float32 => "FLOAT32",
            DataType::Float64 => "FLOAT64",
        }
    }

    /// Display name for a raw tag, `Unknown` when the tag is not recognized.
    pub fn name_of(tag: u32) -> &'static str {
        DataType::from_tag(tag).map_or("Unknown", |t| t.as_str())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index algorithm kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Algorithm {
    BruteForce = 0,
    #[default]
    Hnsw = 1,
    Tiered = 2,
}

impl Algorithm {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Algorithm::BruteForce),
            1 => Some(Algorithm::Hnsw),
            2 => Some(Algorithm::Tiered),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::BruteForce => "BruteForce",
            Algorithm::Hnsw => "HNSW",
            Algorithm::Tiered => "Tiered",
        }
    }

    /// Display name for a raw tag, `Unknown` when the tag is not recognized.
    pub fn name_of(tag: u32) -> &'static str {
        Algorithm::from_tag(tag).map_or("Unknown", |a| a.as_str())
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A numeric width vectors can be stored in.
///
/// Distances are always accumulated in `f64`; the element type only decides
/// the storage width and the persisted data-type tag.
pub trait VectorElement:
    Copy + Default + PartialOrd + fmt::Debug + Send + Sync + 'static
{
    /// Data-type tag written to persisted images.
    const DATA_TYPE: DataType;

    /// Encoded width in bytes.
    const BYTES: usize;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;

    fn write_le(self, out: &mut Vec<u8>);

    /// Decode from exactly `Self::BYTES` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

impl VectorElement for f32 {
    const DATA_TYPE: DataType = DataType::Float32;
    const BYTES: usize = 4;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[..4]);
        f32::from_le_bytes(buf)
    }
}

impl VectorElement for f64 {
    const DATA_TYPE: DataType = DataType::Float64;
    const BYTES: usize = 8;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_roundtrip() {
        for dt in [DataType::Float32, DataType::Float64] {
            assert_eq!(DataType::from_tag(dt.tag()), Some(dt));
        }
        for algo in [Algorithm::BruteForce, Algorithm::Hnsw, Algorithm::Tiered] {
            assert_eq!(Algorithm::from_tag(algo.tag()), Some(algo));
        }
    }

    #[test]
    fn test_unknown_tag_names() {
        assert_eq!(Algorithm::name_of(42), "Unknown");
        assert_eq!(DataType::name_of(42), "Unknown");
        assert_eq!(Algorithm::name_of(1), "HNSW");
        assert_eq!(DataType::name_of(1), "FLOAT64");
    }

    #[test]
    fn test_element_codec() {
        let mut out = Vec::new();
        1.5f32.write_le(&mut out);
        (-2.25f64).write_le(&mut out);
        assert_eq!(out.len(), f32::BYTES + f64::BYTES);
        assert_eq!(f32::read_le(&out[..4]), 1.5);
        assert_eq!(f64::read_le(&out[4..]), -2.25);
    }
}
