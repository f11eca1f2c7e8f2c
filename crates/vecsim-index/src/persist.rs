//! Versioned on-disk image of an HNSW graph.
//!
//! All fields are fixed-width little endian, written in this order:
//!
//! | field                          | width                 |
//! |--------------------------------|-----------------------|
//! | encoding version               | u32                   |
//! | algorithm tag                  | u32                   |
//! | data type tag                  | u32                   |
//! | dim                            | u64                   |
//! | metric tag                     | u32                   |
//! | block size, capacity           | u64 each              |
//! | M, ef_construction, ef_runtime | u64 each              |
//! | epsilon (version 4+)           | f64                   |
//! | multi                          | u8                    |
//! | level seed, level counter      | u64 each              |
//! | entry point (`u32::MAX`: none) | u32                   |
//! | max level, node count          | u64 each              |
//! | nodes                          | see below             |
//! | vectors                        | count * dim elements  |
//! | label map                      | see below             |
//!
//! Each node is `label u64, deleted u8, layers u32`, then per layer the
//! out list and the incoming list, each as `len u32` followed by `u32` ids.
//! The label map is `labels u64`, then per label `label u64, len u32, ids`.
//!
//! The header is validated before anything is allocated; the payload is
//! checked with `check_integrity` before the graph is returned.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use vecsim_types::{
    Algorithm, DataType, Label, LogContext, Metric, VectorElement, INVALID_ID,
};

use crate::error::IndexError;
use crate::hnsw::{HnswConfig, HnswIndex, Links, Node};

/// Oldest encoding this build can read. Version 3 images carry no epsilon.
pub const MIN_SUPPORTED_VERSION: u32 = 3;

/// Encoding written by `save`.
pub const CURRENT_VERSION: u32 = 4;

/// Upper bound on speculative pre-allocation from untrusted counts.
const MAX_PREALLOC: usize = 1 << 16;

/// Largest dimension accepted from an image header.
pub const MAX_DIM: usize = 1 << 20;

/// Classified failure while loading an image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot open file {path}: {source}")]
    CannotOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot load index: deprecated encoding version: {0}")]
    DeprecatedVersion(u32),

    #[error("Cannot load index: bad encoding version: {0}")]
    BadVersion(u32),

    #[error("Cannot load index: Expected HNSW file but got algorithm type: {0} (corrupted file?)")]
    WrongAlgorithm(&'static str),

    #[error("Cannot load index: bad index data type: {0} (corrupted file?)")]
    BadDataType(&'static str),

    #[error("Cannot load index: unexpected end of file")]
    UnexpectedEof,

    #[error("Cannot load index: inconsistent graph: {0}")]
    InconsistentGraph(String),

    #[error("Cannot load index: read failed: {0}")]
    Io(io::Error),
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> Self {
        if err.kind() == ErrorKind::UnexpectedEof {
            LoadError::UnexpectedEof
        } else {
            LoadError::Io(err)
        }
    }
}

/// Validated header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub algorithm: Algorithm,
    pub data_type: DataType,
    pub dim: usize,
}

struct Writer<W: Write> {
    inner: W,
}

impl<W: Write> Writer<W> {
    fn u8(&mut self, v: u8) -> io::Result<()> {
        self.inner.write_all(&[v])
    }

    fn u32(&mut self, v: u32) -> io::Result<()> {
        self.inner.write_all(&v.to_le_bytes())
    }

    fn u64(&mut self, v: u64) -> io::Result<()> {
        self.inner.write_all(&v.to_le_bytes())
    }

    fn f64(&mut self, v: f64) -> io::Result<()> {
        self.inner.write_all(&v.to_le_bytes())
    }

    fn ids(&mut self, ids: &[u32]) -> io::Result<()> {
        self.u32(ids.len() as u32)?;
        ids.iter().try_for_each(|&id| self.u32(id))
    }
}

struct Reader<R: Read> {
    inner: R,
}

impl<R: Read> Reader<R> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], LoadError> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.bytes::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, LoadError> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }

    fn u64(&mut self) -> Result<u64, LoadError> {
        Ok(u64::from_le_bytes(self.bytes()?))
    }

    fn usize(&mut self) -> Result<usize, LoadError> {
        let v = self.u64()?;
        usize::try_from(v)
            .map_err(|_| LoadError::InconsistentGraph(format!("value {} out of range", v)))
    }

    fn f64(&mut self) -> Result<f64, LoadError> {
        Ok(f64::from_le_bytes(self.bytes()?))
    }

    fn ids(&mut self) -> Result<Vec<u32>, LoadError> {
        let len = self.u32()? as usize;
        let mut ids = Vec::with_capacity(len.min(MAX_PREALLOC));
        for _ in 0..len {
            ids.push(self.u32()?);
        }
        Ok(ids)
    }

    fn element<T: VectorElement>(&mut self, scratch: &mut [u8]) -> Result<T, LoadError> {
        self.inner.read_exact(scratch)?;
        Ok(T::read_le(scratch))
    }
}

/// Read and validate the four header fields for an HNSW image of `T`.
pub fn read_header<T: VectorElement, R: Read>(reader: &mut R) -> Result<Header, LoadError> {
    let mut r = Reader { inner: reader };
    let version = r.u32()?;
    if version < MIN_SUPPORTED_VERSION {
        return Err(LoadError::DeprecatedVersion(version));
    }
    if version > CURRENT_VERSION {
        return Err(LoadError::BadVersion(version));
    }

    let algorithm_tag = r.u32()?;
    let algorithm = match Algorithm::from_tag(algorithm_tag) {
        Some(Algorithm::Hnsw) => Algorithm::Hnsw,
        _ => return Err(LoadError::WrongAlgorithm(Algorithm::name_of(algorithm_tag))),
    };

    let type_tag = r.u32()?;
    let data_type = match DataType::from_tag(type_tag) {
        Some(dt) if dt == T::DATA_TYPE => dt,
        _ => return Err(LoadError::BadDataType(DataType::name_of(type_tag))),
    };

    let dim = r.usize()?;
    if dim == 0 {
        return Err(LoadError::InconsistentGraph("dimension is zero".to_string()));
    }
    if dim > MAX_DIM {
        return Err(LoadError::InconsistentGraph(format!(
            "dimension {} exceeds {}",
            dim, MAX_DIM
        )));
    }
    Ok(Header {
        version,
        algorithm,
        data_type,
        dim,
    })
}

impl<T: VectorElement> HnswIndex<T> {
    /// Write the current image to `path`, replacing any existing file.
    ///
    /// The caller must ensure no job mutates the graph meanwhile.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        self.save_to(&mut out)?;
        out.flush()?;
        info!(path = ?path, nodes = self.nodes.len(), "Saved HNSW index");
        Ok(())
    }

    pub fn save_to<W: Write>(&self, out: &mut W) -> Result<(), IndexError> {
        self.write_versioned(out, CURRENT_VERSION)?;
        Ok(())
    }

    pub(crate) fn write_versioned<W: Write>(&self, out: &mut W, version: u32) -> io::Result<()> {
        let c = &self.config;
        let mut w = Writer { inner: out };

        w.u32(version)?;
        w.u32(Algorithm::Hnsw.tag())?;
        w.u32(T::DATA_TYPE.tag())?;
        w.u64(c.dim as u64)?;

        w.u32(c.metric.tag())?;
        w.u64(c.block_size as u64)?;
        w.u64(self.capacity as u64)?;
        w.u64(c.m as u64)?;
        w.u64(c.ef_construction as u64)?;
        w.u64(c.ef_runtime as u64)?;
        if version >= 4 {
            w.f64(c.epsilon)?;
        }
        w.u8(c.multi as u8)?;
        w.u64(c.level_seed)?;
        w.u64(self.level_counter)?;
        w.u32(self.entry_point.unwrap_or(INVALID_ID))?;
        w.u64(self.max_level as u64)?;
        w.u64(self.nodes.len() as u64)?;

        for node in &self.nodes {
            w.u64(node.label)?;
            w.u8(node.deleted as u8)?;
            w.u32(node.levels.len() as u32)?;
            for links in &node.levels {
                w.ids(&links.out)?;
                w.ids(&links.incoming)?;
            }
        }

        let mut buf = Vec::with_capacity(c.dim * T::BYTES);
        for chunk in self.vectors.chunks(c.dim) {
            buf.clear();
            chunk.iter().for_each(|v| v.write_le(&mut buf));
            w.inner.write_all(&buf)?;
        }

        let mut labels: Vec<(&Label, &Vec<u32>)> = self.labels.iter().collect();
        labels.sort_by_key(|(label, _)| **label);
        w.u64(labels.len() as u64)?;
        for (label, ids) in labels {
            w.u64(*label)?;
            w.ids(ids)?;
        }
        Ok(())
    }

    /// Load an image written by `save`.
    pub fn load(path: impl AsRef<Path>, log: LogContext) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::CannotOpen {
            path: path.display().to_string(),
            source,
        })?;
        let index = Self::load_from(&mut BufReader::new(file), log)?;
        info!(path = ?path, nodes = index.nodes.len(), "Loaded HNSW index");
        Ok(index)
    }

    pub fn load_from<R: Read>(reader: &mut R, log: LogContext) -> Result<Self, IndexError> {
        let header = read_header::<T, _>(reader)?;
        debug!(version = header.version, dim = header.dim, "Read HNSW header");
        Ok(Self::read_payload(reader, header, log)?)
    }

    fn read_payload<R: Read>(
        reader: &mut R,
        header: Header,
        log: LogContext,
    ) -> Result<Self, LoadError> {
        let mut r = Reader { inner: reader };
        let bad = LoadError::InconsistentGraph;

        let metric_tag = r.u32()?;
        let metric = Metric::from_tag(metric_tag)
            .ok_or_else(|| bad(format!("unknown metric tag {}", metric_tag)))?;
        let block_size = r.usize()?;
        let capacity = r.usize()?;
        let m = r.usize()?;
        let ef_construction = r.usize()?;
        let ef_runtime = r.usize()?;
        let defaults = HnswConfig::new(header.dim, metric);
        let epsilon = if header.version >= 4 {
            r.f64()?
        } else {
            defaults.epsilon
        };
        let multi = r.u8()? != 0;
        let level_seed = r.u64()?;
        let level_counter = r.u64()?;
        let entry = r.u32()?;
        let max_level = r.usize()?;
        let count = r.usize()?;

        let config = HnswConfig {
            multi,
            block_size,
            m,
            ef_construction,
            ef_runtime,
            epsilon,
            level_seed,
            ..defaults
        };
        config
            .validate()
            .map_err(|e| bad(format!("invalid parameters: {}", e)))?;
        if count > capacity || count >= INVALID_ID as usize {
            return Err(bad(format!("{} nodes for capacity {}", count, capacity)));
        }

        let mut index = HnswIndex::new(config, log).map_err(|e| bad(e.to_string()))?;
        index.nodes.reserve(count.min(MAX_PREALLOC));
        for serial in 0..count {
            let label = r.u64()?;
            let deleted = r.u8()? != 0;
            let layers = r.u32()? as usize;
            if layers == 0 {
                return Err(bad(format!("node {} has no layers", serial)));
            }
            let mut node = Node::new(label, 0, serial as u64);
            node.deleted = deleted;
            node.levels.clear();
            for _ in 0..layers {
                let out = r.ids()?;
                let incoming = r.ids()?;
                node.levels.push(Links { out, incoming });
            }
            index.nodes.push(node);
        }

        let elements = count
            .checked_mul(header.dim)
            .filter(|n| n.checked_mul(T::BYTES).is_some())
            .ok_or_else(|| bad(format!("{} nodes of dim {} overflow", count, header.dim)))?;
        let mut scratch = vec![0u8; T::BYTES];
        index.vectors.reserve(elements.min(MAX_PREALLOC));
        for _ in 0..elements {
            index.vectors.push(r.element::<T>(&mut scratch)?);
        }

        let label_count = r.usize()?;
        let mut labels = HashMap::with_capacity(label_count.min(MAX_PREALLOC));
        for _ in 0..label_count {
            let label = r.u64()?;
            let ids = r.ids()?;
            if labels.insert(label, ids).is_some() {
                return Err(bad(format!("label {} listed twice", label)));
            }
        }

        index.labels = labels;
        index.entry_point = (entry != INVALID_ID).then_some(entry);
        index.max_level = max_level;
        index.capacity = capacity;
        index.level_counter = level_counter;
        index.next_generation = count as u64;
        index.marked_deleted = index.nodes.iter().filter(|n| n.deleted).count();

        index.check_integrity().map_err(|e| match e {
            IndexError::Integrity(msg) => bad(msg),
            other => bad(other.to_string()),
        })?;
        Ok(index)
    }
}
