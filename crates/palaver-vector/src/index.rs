//! Append-only flat vector index with exact nearest-neighbor search.
//!
//! Each index holds a flat f32 buffer of unit vectors plus a parallel
//! record list mapping position -> content reference. Every mutation
//! rewrites both files in full (binary vector file + JSON sidecar map),
//! each through a temp-file-then-rename so a crash mid-write cannot leave
//! a torn pair on disk. Search is an O(n) Euclidean scan, which is the
//! deliberate design: correctness and simplicity over throughput.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use palaver_core::error::PalaverError;

/// On-disk representation of the vector buffer.
#[derive(Serialize, Deserialize)]
struct VectorFile {
    dim: u32,
    vectors: Vec<f32>,
}

/// Append-only exact-search index over unit vectors.
///
/// Invariant: `vectors.len() == records.len() * dim` at all times. Entries
/// are never mutated or removed; stale entries for deleted content are
/// filtered by callers at query time.
pub struct FlatIndex<R> {
    dim: usize,
    vectors: Vec<f32>,
    records: Vec<R>,
    vec_path: PathBuf,
    map_path: PathBuf,
}

impl<R> FlatIndex<R>
where
    R: Serialize + DeserializeOwned + Clone,
{
    /// Open an index, loading existing files when both are present and
    /// starting empty otherwise.
    pub fn open(dim: usize, vec_path: PathBuf, map_path: PathBuf) -> Result<Self, PalaverError> {
        if vec_path.exists() && map_path.exists() {
            let index = Self::load(dim, vec_path, map_path)?;
            info!(
                vectors = index.len(),
                path = %index.vec_path.display(),
                "Loaded existing vector index"
            );
            Ok(index)
        } else {
            debug!(path = %vec_path.display(), "Creating new vector index");
            Ok(Self {
                dim,
                vectors: Vec::new(),
                records: Vec::new(),
                vec_path,
                map_path,
            })
        }
    }

    fn load(dim: usize, vec_path: PathBuf, map_path: PathBuf) -> Result<Self, PalaverError> {
        let bytes = std::fs::read(&vec_path)?;
        let (file, _): (VectorFile, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| PalaverError::Index(format!("Corrupt vector file: {}", e)))?;

        if file.dim as usize != dim {
            return Err(PalaverError::Index(format!(
                "Vector file dimension {} does not match configured {}",
                file.dim, dim
            )));
        }

        let map_bytes = std::fs::read(&map_path)?;
        let records: Vec<R> = serde_json::from_slice(&map_bytes)
            .map_err(|e| PalaverError::Index(format!("Corrupt id map: {}", e)))?;

        if file.vectors.len() != records.len() * dim {
            return Err(PalaverError::Index(format!(
                "Vector count {} does not match id map length {}",
                file.vectors.len() / dim.max(1),
                records.len()
            )));
        }

        Ok(Self {
            dim,
            vectors: file.vectors,
            records,
            vec_path,
            map_path,
        })
    }

    /// Number of vectors currently stored.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Vector dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Record at a given position, if present.
    pub fn record(&self, position: usize) -> Option<&R> {
        self.records.get(position)
    }

    /// Append vectors with their corresponding records, then persist the
    /// whole index synchronously before returning.
    ///
    /// A persistence failure is surfaced, but the in-memory append is not
    /// rolled back; durability of that write is best-effort.
    pub fn add(&mut self, vectors: &[Vec<f32>], records: Vec<R>) -> Result<(), PalaverError> {
        if vectors.len() != records.len() {
            return Err(PalaverError::Index(format!(
                "Vector count {} does not match record count {}",
                vectors.len(),
                records.len()
            )));
        }
        for vector in vectors {
            if vector.len() != self.dim {
                return Err(PalaverError::Index(format!(
                    "Vector has dimension {}, index expects {}",
                    vector.len(),
                    self.dim
                )));
            }
        }

        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }
        self.records.extend(records);

        self.persist()
    }

    /// Exact nearest-neighbor scan. Returns up to `k` results ordered by
    /// ascending Euclidean distance; `k` is clamped to the vector count.
    /// An empty index yields an empty result, never an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(R, f32)>, PalaverError> {
        if query.len() != self.dim {
            return Err(PalaverError::Index(format!(
                "Query has dimension {}, index expects {}",
                query.len(),
                self.dim
            )));
        }
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let row = &self.vectors[i * self.dim..(i + 1) * self.dim];
                (i, euclidean(query, row))
            })
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k.min(self.records.len()));

        Ok(scored
            .into_iter()
            .map(|(i, dist)| (self.records[i].clone(), dist))
            .collect())
    }

    /// Write the vector file and the sidecar id map to disk, each via a
    /// temp file renamed into place.
    pub fn persist(&self) -> Result<(), PalaverError> {
        let file = VectorFile {
            dim: self.dim as u32,
            vectors: self.vectors.clone(),
        };
        let encoded = bincode::serde::encode_to_vec(&file, bincode::config::standard())
            .map_err(|e| PalaverError::Index(format!("Failed to encode vectors: {}", e)))?;
        write_atomic(&self.vec_path, &encoded)?;

        let map = serde_json::to_vec(&self.records)
            .map_err(|e| PalaverError::Index(format!("Failed to encode id map: {}", e)))?;
        write_atomic(&self.map_path, &map)?;

        Ok(())
    }
}

/// Write bytes to `path` through a sibling temp file and an atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PalaverError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        warn!(path = %path.display(), error = %e, "Atomic rename failed");
        return Err(PalaverError::Index(format!(
            "Failed to replace {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_index(dir: &tempfile::TempDir) -> FlatIndex<Uuid> {
        FlatIndex::open(
            4,
            dir.path().join("test.vec"),
            dir.path().join("test.map.json"),
        )
        .unwrap()
    }

    fn unit(values: [f32; 4]) -> Vec<f32> {
        let mut v = values.to_vec();
        crate::embedding::normalize(&mut v);
        v
    }

    #[test]
    fn test_add_maintains_length_invariant() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = temp_index(&dir);

        for i in 0..5 {
            index
                .add(&[unit([i as f32 + 1.0, 0.0, 0.0, 0.0])], vec![Uuid::new_v4()])
                .unwrap();
            assert_eq!(index.len(), i + 1);
        }
    }

    #[test]
    fn test_add_rejects_mismatched_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = temp_index(&dir);

        let result = index.add(&[unit([1.0, 0.0, 0.0, 0.0])], vec![Uuid::new_v4(), Uuid::new_v4()]);
        assert!(result.is_err());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_add_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = temp_index(&dir);

        let result = index.add(&[vec![1.0, 0.0]], vec![Uuid::new_v4()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_search_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = temp_index(&dir);
        let hits = index.search(&unit([1.0, 0.0, 0.0, 0.0]), 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_clamps_k() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = temp_index(&dir);

        for _ in 0..3 {
            index
                .add(&[unit([1.0, 0.0, 0.0, 0.0])], vec![Uuid::new_v4()])
                .unwrap();
        }

        let hits = index.search(&unit([1.0, 0.0, 0.0, 0.0]), 10).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = temp_index(&dir);

        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        index.add(&[unit([1.0, 0.0, 0.0, 0.0])], vec![near]).unwrap();
        index.add(&[unit([0.0, 1.0, 0.0, 0.0])], vec![far]).unwrap();

        let hits = index.search(&unit([1.0, 0.1, 0.0, 0.0]), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, near);
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn test_search_rejects_wrong_query_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let index = temp_index(&dir);
        assert!(index.search(&[1.0, 0.0], 5).is_err());
    }

    #[test]
    fn test_persist_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vec_path = dir.path().join("rt.vec");
        let map_path = dir.path().join("rt.map.json");

        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        {
            let mut index: FlatIndex<Uuid> =
                FlatIndex::open(4, vec_path.clone(), map_path.clone()).unwrap();
            for (i, id) in ids.iter().enumerate() {
                index
                    .add(&[unit([1.0, i as f32, 0.0, 0.0])], vec![*id])
                    .unwrap();
            }
        }

        let reloaded: FlatIndex<Uuid> = FlatIndex::open(4, vec_path, map_path).unwrap();
        assert_eq!(reloaded.len(), 4);
        // Position i still identifies the id contributed by the i-th add.
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(reloaded.record(i), Some(id));
        }

        // Search still works against the reloaded data.
        let hits = reloaded.search(&unit([1.0, 3.0, 0.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].0, ids[3]);
    }

    #[test]
    fn test_open_with_missing_sidecar_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let vec_path = dir.path().join("orphan.vec");
        std::fs::write(&vec_path, b"not a real index").unwrap();

        // Only one of the two files exists, so the index starts empty.
        let index: FlatIndex<Uuid> =
            FlatIndex::open(4, vec_path, dir.path().join("orphan.map.json")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_load_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let vec_path = dir.path().join("dim.vec");
        let map_path = dir.path().join("dim.map.json");

        {
            let mut index: FlatIndex<Uuid> =
                FlatIndex::open(4, vec_path.clone(), map_path.clone()).unwrap();
            index
                .add(&[unit([1.0, 0.0, 0.0, 0.0])], vec![Uuid::new_v4()])
                .unwrap();
        }

        let result: Result<FlatIndex<Uuid>, _> = FlatIndex::open(8, vec_path, map_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_record_appends_again() {
        // Re-indexing the same content id is intentionally not idempotent:
        // a second add produces a second independent entry.
        let dir = tempfile::tempdir().unwrap();
        let mut index = temp_index(&dir);

        let id = Uuid::new_v4();
        index.add(&[unit([1.0, 0.0, 0.0, 0.0])], vec![id]).unwrap();
        index.add(&[unit([1.0, 0.0, 0.0, 0.0])], vec![id]).unwrap();

        assert_eq!(index.len(), 2);
        let hits = index.search(&unit([1.0, 0.0, 0.0, 0.0]), 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, id);
        assert_eq!(hits[1].0, id);
    }

    #[test]
    fn test_batch_add_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = temp_index(&dir);

        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        index
            .add(
                &[
                    unit([1.0, 0.0, 0.0, 0.0]),
                    unit([0.0, 1.0, 0.0, 0.0]),
                    unit([0.0, 0.0, 1.0, 0.0]),
                ],
                ids.clone(),
            )
            .unwrap();

        for (i, id) in ids.iter().enumerate() {
            assert_eq!(index.record(i), Some(id));
        }
    }
}
