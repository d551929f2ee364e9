// Index module
// Exact nearest-neighbour search over a fixed set of row-major vectors

pub mod codec;


use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Vector {row} has dimension {actual}, expected {expected}")]
    RaggedVectors {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Index dimension must be greater than zero")]
    ZeroDimension,

    #[error("Query has dimension {actual}, index has {expected}")]
    QueryDimension { expected: usize, actual: usize },

    #[error("Not an index file (magic {0:?})")]
    BadMagic([u8; 4]),

    #[error("Unsupported index format version {0}")]
    UnsupportedVersion(u32),

    #[error("Index header declares {count} x {dimension} values, which does not fit in memory")]
    Oversized { count: u64, dimension: u32 },

    #[error("Index file has trailing bytes after {0} vectors")]
    TrailingBytes(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One search hit: the slot (row) it came from and its squared L2 distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub slot: usize,
    pub distance: f32,
}

impl Neighbor {
    fn rank(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.slot.cmp(&other.slot))
    }
}

/// Flat index: every query is compared against every stored vector.
///
/// Slot `i` holds the `i`-th vector it was built from. There is no insert or
/// delete; a changed corpus means a new index.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Build from vectors that must all share `dimension`
    #[inline]
    pub fn from_vectors(dimension: usize, vectors: &[Vec<f32>]) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for (row, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::RaggedVectors {
                    row,
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Self { dimension, data })
    }

    /// Build from an already flattened row-major buffer
    #[inline]
    pub fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        let remainder = data.len() % dimension;
        if remainder != 0 {
            return Err(IndexError::RaggedVectors {
                row: data.len() / dimension,
                expected: dimension,
                actual: remainder,
            });
        }
        Ok(Self { dimension, data })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn vector(&self, slot: usize) -> Option<&[f32]> {
        let start = slot.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    #[inline]
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// The `min(k, len)` nearest slots, ascending by distance then slot
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::QueryDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, row)| Neighbor {
                slot,
                distance: squared_l2(row, query),
            })
            .collect();

        let k = k.min(neighbors.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, Neighbor::rank);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(Neighbor::rank);

        Ok(neighbors)
    }
}

#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
