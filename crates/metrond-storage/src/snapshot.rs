//! Snapshot file I/O: a JSON array of metrics, schema-identical to the
//! wire form. The file is advisory; writes overwrite in place.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use metrond_common::metric::Metric;

use crate::StorageError;

/// Writes the batch to `path`, creating or truncating the file.
pub fn save(path: &str, metrics: &[Metric]) -> Result<(), StorageError> {
    let file = File::create(path).map_err(StorageError::SnapshotIo)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, metrics)?;
    Ok(())
}

/// Reads a snapshot back. A missing file is not an error: there is simply
/// nothing to restore, and `None` is returned.
pub fn load(path: &str) -> Result<Option<Vec<Metric>>, StorageError> {
    if !Path::new(path).exists() {
        return Ok(None);
    }
    let file = File::open(path).map_err(StorageError::SnapshotIo)?;
    let reader = BufReader::new(file);
    let metrics = serde_json::from_reader(reader)?;
    Ok(Some(metrics))
}
