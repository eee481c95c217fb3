//! Exhaustive inner-product index and its on-disk blob format.
//!
//! Blob layout (little endian): magic `DSVI`, `u32` version, `u32` dimension,
//! `u64` vector count, then `count * dimension` `f32` values row by row.

use docsearch_core::error::{Error, Result};
use docsearch_core::traits::VectorIndex;
use docsearch_core::types::{Method, SearchHit};

const MAGIC: &[u8; 4] = b"DSVI";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, data: Vec::new() }
    }

    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(Error::InvalidInput(format!("vector dimension {} != index dimension {}", bad.len(), self.dim)));
        }
        self.data.reserve(vectors.len() * self.dim);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    pub fn vector(&self, i: usize) -> Option<&[f32]> {
        let start = i.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// A copy keeping only the rows whose position satisfies `keep`.
    pub fn retain_rows(&self, mut keep: impl FnMut(usize) -> bool) -> Self {
        let data = self
            .data
            .chunks_exact(self.dim.max(1))
            .enumerate()
            .filter(|(i, _)| keep(*i))
            .flat_map(|(_, row)| row.iter().copied())
            .collect();
        Self { dim: self.dim, data }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dim as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for x in &self.data {
            out.extend_from_slice(&x.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let corrupt = |what: &str| Error::Storage(format!("corrupt vector blob: {what}"));
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(corrupt("bad header"));
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        if word(4) != VERSION {
            return Err(corrupt("unsupported version"));
        }
        let dim = word(8) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);
        let count = usize::try_from(u64::from_le_bytes(count_bytes)).map_err(|_| corrupt("count overflow"))?;
        let expected = count.checked_mul(dim).and_then(|n| n.checked_mul(4)).ok_or_else(|| corrupt("size overflow"))?;
        let body = &bytes[HEADER_LEN..];
        if body.len() != expected {
            return Err(corrupt("length mismatch"));
        }
        let data = body.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        Ok(Self { dim, data })
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    /// Top `k` rows by inner product; equal scores keep insertion order.
    fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query_vec.len() != self.dim {
            return Err(Error::InvalidInput(format!("query dimension {} != index dimension {}", query_vec.len(), self.dim)));
        }
        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim.max(1))
            .enumerate()
            .map(|(i, row)| (i, row.iter().zip(query_vec).map(|(a, b)| a * b).sum()))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored.into_iter().map(|(index, score)| SearchHit { index, score, method: Method::Semantic }).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip_and_corruption() {
        let mut idx = FlatIndex::new(3);
        idx.add(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.5]]).unwrap();
        let bytes = idx.to_bytes();
        assert_eq!(FlatIndex::from_bytes(&bytes).unwrap(), idx);
        assert!(FlatIndex::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(FlatIndex::from_bytes(b"nope").is_err());
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let mut idx = FlatIndex::new(2);
        assert!(idx.add(&[vec![1.0]]).is_err());
        assert!(idx.search_vec(&[1.0, 2.0, 3.0], 1).is_err());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut idx = FlatIndex::new(2);
        idx.add(&[vec![0.5, 0.5], vec![1.0, 0.0], vec![0.5, 0.5]]).unwrap();
        let hits = idx.search_vec(&[1.0, 1.0], 3).unwrap();
        assert_eq!(hits.iter().map(|h| h.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(idx.search_vec(&[1.0, 0.0], 10).unwrap().len(), 3);
    }
}
