//! Exact (brute-force) L2 nearest-neighbor index
//!
//! Vectors are stored row-major in one contiguous buffer. Ids are the
//! insertion positions, so the id space is always dense.
//!
//! Binary layout (all little-endian):
//! `b"FL2I"` | version: u32 | dims: u64 | count: u64 | count * dims f32

use crate::error::RagError;
use crate::Result;
use std::cmp::Ordering;

const MAGIC: &[u8; 4] = b"FL2I";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dims: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors; ids continue from the current length.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: bad.len(),
            });
        }

        self.data.reserve(vectors.len() * self.dims);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Up to `k` nearest ids by ascending Euclidean distance.
    ///
    /// Ties are broken by ascending id so results are fully deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Result<(Vec<f32>, Vec<usize>)> {
        if query.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut scored: Vec<(f32, usize)> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(id, row)| (squared_l2(query, row), id))
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, compare_hits);
            scored.truncate(k);
        }
        scored.sort_by(compare_hits);

        Ok(scored
            .into_iter()
            .map(|(squared, id)| (squared.sqrt(), id))
            .unzip())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dims as u64).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for &x in &self.data {
            bytes.extend_from_slice(&x.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(RagError::IndexCorrupt("bad index header".to_string()));
        }

        let version = u32::from_le_bytes(read_array(&bytes[4..8]));
        if version != FORMAT_VERSION {
            return Err(RagError::IndexCorrupt(format!(
                "unsupported index format version {}",
                version
            )));
        }

        let dims = u64::from_le_bytes(read_array(&bytes[8..16])) as usize;
        let count = u64::from_le_bytes(read_array(&bytes[16..24])) as usize;

        let expected_payload = dims
            .checked_mul(count)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| RagError::IndexCorrupt("index header overflows".to_string()))?;

        let payload = &bytes[HEADER_LEN..];
        if payload.len() != expected_payload {
            return Err(RagError::IndexCorrupt(format!(
                "expected {} payload bytes, found {}",
                expected_payload,
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(read_array(chunk)))
            .collect();

        Ok(Self { dims, data })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn compare_hits(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&slice[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatL2Index {
        let mut index = FlatL2Index::new(2);
        index
            .add(&[
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![5.0, 5.0],
                vec![0.0, 1.0],
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_distance_then_id() {
        let index = sample();
        let (distances, ids) = index.search(&[0.0, 0.0], 3).unwrap();

        assert_eq!(ids, vec![0, 1, 3]);
        assert_eq!(distances, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = sample();
        let (distances, ids) = index.search(&[5.0, 5.0], 10).unwrap();

        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], 2);
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_empty_index_and_zero_k() {
        let index = FlatL2Index::new(3);
        let (distances, ids) = index.search(&[1.0, 2.0, 3.0], 5).unwrap();
        assert!(distances.is_empty() && ids.is_empty());

        let (_, ids) = sample().search(&[0.0, 0.0], 0).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_dimension_checks() {
        let mut index = sample();
        assert!(matches!(
            index.search(&[0.0], 1),
            Err(RagError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(index.add(&[vec![1.0, 2.0, 3.0]]).is_err());
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_bytes_roundtrip_preserves_search() {
        let index = sample();
        let restored = FlatL2Index::from_bytes(&index.to_bytes()).unwrap();

        assert_eq!(restored, index);
        assert_eq!(
            restored.search(&[0.4, 0.7], 4).unwrap(),
            index.search(&[0.4, 0.7], 4).unwrap()
        );
    }

    #[test]
    fn test_truncated_bytes_are_corrupt() {
        let bytes = sample().to_bytes();
        let err = FlatL2Index::from_bytes(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, RagError::IndexCorrupt(_)));

        let err = FlatL2Index::from_bytes(b"nope").unwrap_err();
        assert!(matches!(err, RagError::IndexCorrupt(_)));
    }
}
