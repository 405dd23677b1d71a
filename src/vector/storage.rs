//! File-backed vector store with memory-mapped loading.
//!
//! The whole index is held in memory once loaded: ranked search needs
//! random access to every vector, and decoding a memory-mapped file
//! sequentially is far faster than row-oriented database access for that
//! pattern.
//!
//! # Storage Format
//!
//! Little-endian, no padding:
//! - Header (4 bytes): record count as `u32`
//! - Records: `i64 id`, `i64 timestamp_ms`, `D × f32 vector`
//!
//! # Write Strategy
//!
//! - First write and removals rewrite the whole file through a temporary
//!   sibling that is renamed into place.
//! - Appends rewrite only the header count and write new records at the end.
//!
//! The store is single-writer. Wrap it in
//! [`SharedVectorStore`](crate::vector::SharedVectorStore) to share it
//! between tasks.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use memmap2::Mmap;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::vector::similarity::{similarities, top_n};
use crate::vector::types::{VectorDimension, VectorError, VectorRecord};

/// Size of the storage header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Bytes per record excluding the vector payload (id + timestamp).
const RECORD_PREFIX_SIZE: usize = 16;

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Records encoded per write buffer during full rewrites.
const WRITE_BATCH_SIZE: usize = 1_000;

/// Errors specific to vector store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(
        "Corrupt vector store '{path}': {reason}\nSuggestion: Delete the file and re-index; the store is never repaired automatically"
    )]
    Corrupted { path: PathBuf, reason: String },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

/// Byte length of one encoded record for `dimension`.
pub fn record_size(dimension: VectorDimension) -> usize {
    RECORD_PREFIX_SIZE + dimension.get() * BYTES_PER_F32
}

/// Vector store backed by a single binary file.
///
/// Keeps an insertion-ordered cache of every record plus the id sequence
/// of the most recent ranked query for paging.
#[derive(Debug)]
pub struct FileVectorStore {
    /// Path to the storage file.
    path: PathBuf,

    /// Vector dimension (all records share it).
    dimension: VectorDimension,

    /// Working set, authoritative once populated.
    cache: IndexMap<i64, VectorRecord>,

    /// Ranked ids of the last query.
    cached_ids: Option<Vec<i64>>,
}

impl FileVectorStore {
    /// Creates a store for the file at `path`.
    ///
    /// Nothing is read or written until the first operation.
    pub fn new(path: impl AsRef<Path>, dimension: VectorDimension) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            dimension,
            cache: IndexMap::new(),
            cached_ids: None,
        }
    }

    /// Creates a store from the `[store]` configuration section.
    pub fn from_config(config: &StoreConfig) -> Result<Self, VectorError> {
        Ok(Self::new(&config.path, config.vector_dimension()?))
    }

    /// Checks if the storage file exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Number of records in the in-memory cache.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Returns every record, loading the file on first use.
    ///
    /// A missing file yields an empty result.
    pub fn get(&mut self) -> Result<Vec<VectorRecord>, StoreError> {
        self.ensure_loaded()?;
        Ok(self.cached_records())
    }

    /// Returns the records for `ids` in the order requested.
    ///
    /// Unknown ids are skipped.
    pub fn get_by_ids(&mut self, ids: &[i64]) -> Result<Vec<VectorRecord>, StoreError> {
        self.ensure_loaded()?;
        Ok(self.cached_by_ids(ids))
    }

    /// Appends records whose ids are not already stored.
    ///
    /// Re-adding a known id is a no-op for that record. All vectors are
    /// validated before anything is written, and a corrupt header aborts
    /// the call with the file untouched.
    pub fn add(&mut self, records: Vec<VectorRecord>) -> Result<(), StoreError> {
        for record in &records {
            self.dimension.validate_vector(&record.vector)?;
        }

        self.ensure_loaded()?;

        let mut fresh: IndexMap<i64, VectorRecord> = IndexMap::with_capacity(records.len());
        for record in records {
            if !self.cache.contains_key(&record.id) && !fresh.contains_key(&record.id) {
                fresh.insert(record.id, record);
            }
        }
        if fresh.is_empty() {
            return Ok(());
        }
        let fresh: Vec<VectorRecord> = fresh.into_values().collect();

        if self.exists() {
            self.append(&fresh)?;
        } else {
            self.write_all(fresh.iter())?;
        }

        tracing::debug!(
            added = fresh.len(),
            total = self.cache.len() + fresh.len(),
            path = %self.path.display(),
            "appended vectors"
        );
        for record in fresh {
            self.cache.insert(record.id, record);
        }
        Ok(())
    }

    /// Removes records by id and rewrites the file if anything changed.
    ///
    /// Returns the number of records removed.
    pub fn remove(&mut self, ids: &[i64]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.ensure_loaded()?;

        let mut removed = Vec::new();
        for id in ids {
            if let Some(record) = self.cache.shift_remove(id) {
                removed.push(record);
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.write_all(self.cache.values()) {
            // restore so the cache keeps mirroring the untouched file
            for record in removed {
                self.cache.insert(record.id, record);
            }
            return Err(e);
        }

        tracing::info!(removed = removed.len(), "removed stale vectors");
        Ok(removed.len())
    }

    /// Drops the in-memory cache and the last query result.
    ///
    /// The file is untouched; the next read reloads it.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.cached_ids = None;
    }

    /// Ranks stored vectors against `vector` and caches the result for paging.
    ///
    /// # Arguments
    /// * `vector` - Query vector, expected L2-normalized
    /// * `top_k` - Maximum number of ids to return
    /// * `threshold` - Minimum similarity (inclusive)
    /// * `filter_ids` - Restricts candidates when non-empty
    ///
    /// # Returns
    /// Ids ordered by descending similarity; ties keep insertion order.
    pub fn query(
        &mut self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
        filter_ids: Option<&[i64]>,
    ) -> Result<Vec<i64>, StoreError> {
        self.cached_ids = None;
        self.dimension.validate_vector(vector)?;
        self.ensure_loaded()?;

        let results = self.rank(vector, top_k, threshold, filter_ids)?;
        self.record_query(&results);
        Ok(results)
    }

    /// Ranks the cached records without loading or touching the query cache.
    pub(crate) fn rank(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
        filter_ids: Option<&[i64]>,
    ) -> Result<Vec<i64>, StoreError> {
        self.dimension.validate_vector(vector)?;

        let filter: Option<std::collections::HashSet<i64>> = filter_ids
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.iter().copied().collect());

        let candidates: Vec<&VectorRecord> = self
            .cache
            .values()
            .filter(|record| filter.as_ref().is_none_or(|f| f.contains(&record.id)))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let vectors: Vec<&[f32]> = candidates.iter().map(|r| r.vector.as_slice()).collect();
        let scores = similarities(vector, &vectors);
        Ok(top_n(&scores, top_k, threshold)
            .into_iter()
            .map(|idx| candidates[idx].id)
            .collect())
    }

    /// Replaces the last query result; an empty result clears it.
    pub(crate) fn record_query(&mut self, ids: &[i64]) {
        self.cached_ids = (!ids.is_empty()).then(|| ids.to_vec());
    }

    /// Copies of the cached records, in insertion order.
    pub(crate) fn cached_records(&self) -> Vec<VectorRecord> {
        self.cache.values().cloned().collect()
    }

    /// Cached records for `ids`, in the order requested.
    pub(crate) fn cached_by_ids(&self, ids: &[i64]) -> Vec<VectorRecord> {
        ids.iter()
            .filter_map(|id| self.cache.get(id).cloned())
            .collect()
    }

    /// True when the next read has to decode the file first.
    pub(crate) fn needs_load(&self) -> bool {
        self.cache.is_empty() && self.exists()
    }

    /// Returns ids `[start, end)` of the last query, clamped to its length.
    ///
    /// Ids removed since the query are skipped.
    pub fn query_page(&self, start: usize, end: usize) -> Vec<i64> {
        let Some(ids) = self.cached_ids.as_ref() else {
            return Vec::new();
        };
        let end = end.min(ids.len());
        if start >= end {
            return Vec::new();
        }
        ids[start..end]
            .iter()
            .copied()
            .filter(|id| self.cache.contains_key(id))
            .collect()
    }

    /// Number of ids held from the last query.
    #[must_use]
    pub fn last_query_len(&self) -> usize {
        self.cached_ids.as_ref().map_or(0, Vec::len)
    }

    /// Returns the size of the storage file in bytes.
    pub fn file_size(&self) -> Result<u64, io::Error> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    // Private helper methods

    pub(crate) fn ensure_loaded(&mut self) -> Result<(), StoreError> {
        if self.needs_load() {
            self.load()?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), StoreError> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        if (file_len as usize) < HEADER_SIZE {
            return Err(self.corrupted(format!(
                "file too small to contain header ({file_len} bytes)"
            )));
        }

        // Safety: the store is single-writer and the map is dropped before
        // this method returns, so the file is not mutated while mapped.
        let mmap = unsafe { Mmap::map(&file)? };
        let records = self.decode(&mmap)?;

        self.cache = records.into_iter().map(|r| (r.id, r)).collect();
        tracing::debug!(
            records = self.cache.len(),
            path = %self.path.display(),
            "loaded vector store"
        );
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<VectorRecord>, StoreError> {
        let count = read_u32(&bytes[..HEADER_SIZE]) as usize;
        let dimension = self.dimension.get();
        let entry_size = record_size(self.dimension);

        let required = count
            .checked_mul(entry_size)
            .and_then(|body| body.checked_add(HEADER_SIZE));
        match required {
            Some(required) if required <= bytes.len() => {}
            _ => {
                tracing::error!(count, file_size = bytes.len(), "vector store header exceeds file size");
                return Err(self.corrupted(format!(
                    "header count {count} needs more than the {} bytes present",
                    bytes.len()
                )));
            }
        }

        let mut records = Vec::with_capacity(count);
        let mut offset = HEADER_SIZE;
        for _ in 0..count {
            let entry = &bytes[offset..offset + entry_size];
            let id = read_i64(&entry[0..8]);
            let timestamp = read_i64(&entry[8..16]);
            let vector = entry[RECORD_PREFIX_SIZE..]
                .chunks_exact(BYTES_PER_F32)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect::<Vec<_>>();
            debug_assert_eq!(vector.len(), dimension);

            records.push(VectorRecord {
                id,
                timestamp,
                vector,
            });
            offset += entry_size;
        }
        Ok(records)
    }

    /// Writes a complete file (header + records) and swaps it into place.
    fn write_all<'a>(
        &self,
        records: impl ExactSizeIterator<Item = &'a VectorRecord>,
    ) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let count = u32::try_from(records.len()).map_err(|_| {
            StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record count exceeds u32 header capacity",
            ))
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        temp.write_all(&count.to_le_bytes())?;

        let entry_size = record_size(self.dimension);
        let mut buffer = Vec::with_capacity(WRITE_BATCH_SIZE.min(count as usize) * entry_size);
        let mut in_buffer = 0;
        for record in records {
            encode_record(record, &mut buffer);
            in_buffer += 1;
            if in_buffer == WRITE_BATCH_SIZE {
                temp.write_all(&buffer)?;
                buffer.clear();
                in_buffer = 0;
            }
        }
        if !buffer.is_empty() {
            temp.write_all(&buffer)?;
        }

        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    /// Appends records to an existing file after validating its header.
    fn append(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let file_len = file.metadata()?.len();

        let mut header = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        if let Err(e) = file.read_exact(&mut header) {
            return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
                self.corrupted("failed to read header count (file too small)".to_string())
            } else {
                StoreError::Io(e)
            });
        }
        let existing = u64::from(u32::from_le_bytes(header));

        // Same rule as decode: the header may never claim more than the body holds.
        let required = existing
            .checked_mul(record_size(self.dimension) as u64)
            .and_then(|body| body.checked_add(HEADER_SIZE as u64));
        let fits = required.is_some_and(|required| required <= file_len);
        if !fits || existing != self.cache.len() as u64 {
            tracing::error!(
                count = existing,
                cached = self.cache.len(),
                file_size = file_len,
                "refusing to append to corrupt vector store"
            );
            return Err(self.corrupted(format!(
                "header count {existing} does not match the {} records of a {file_len} byte file",
                self.cache.len()
            )));
        }

        let new_count = u32::try_from(existing + records.len() as u64).map_err(|_| {
            StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record count exceeds u32 header capacity",
            ))
        })?;

        let mut buffer = Vec::with_capacity(records.len() * record_size(self.dimension));
        for record in records {
            encode_record(record, &mut buffer);
        }

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&new_count.to_le_bytes())?;
        file.seek(SeekFrom::End(0))?;
        file.write_all(&buffer)?;
        file.sync_data()?;
        Ok(())
    }

    fn corrupted(&self, reason: String) -> StoreError {
        StoreError::Corrupted {
            path: self.path.clone(),
            reason,
        }
    }
}

fn encode_record(record: &VectorRecord, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&record.id.to_le_bytes());
    buffer.extend_from_slice(&record.timestamp.to_le_bytes());
    for &value in &record.vector {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    i64::from_le_bytes(raw)
}
