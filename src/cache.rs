use crate::errors::CacheError;
use crate::models::{RawCandle, Timeframe};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One persisted chunk row. The `row` column keeps the ordinal the row had
/// within its chunk when written.
#[derive(Debug, Serialize, Deserialize)]
struct ChunkRecord {
    row: u64,
    timestamp: String,
    open: f64,
    close: f64,
    high: f64,
    low: f64,
}

/// Chunked on-disk candle storage: one directory per timeframe, one CSV file
/// per chunk, named by sequence index. Chunks are written once and never
/// mutated.
pub struct CandleCache {
    root: PathBuf,
}

impl CandleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn timeframe_dir(&self, timeframe: Timeframe) -> PathBuf {
        self.root.join(timeframe.as_str())
    }

    pub fn chunk_path(&self, timeframe: Timeframe, sequence_index: u32) -> PathBuf {
        self.timeframe_dir(timeframe)
            .join(format!("ohlc_{}.csv", sequence_index))
    }

    pub fn has_chunks(&self, timeframe: Timeframe) -> bool {
        self.chunk_path(timeframe, 0).exists()
    }

    /// Loads chunks 0,1,2,… in index order and concatenates their rows,
    /// stopping at the first missing index. Errors with `CacheError::Miss`
    /// when chunk 0 is absent.
    pub fn load(&self, timeframe: Timeframe) -> Result<Vec<RawCandle>, CacheError> {
        let mut rows = Vec::new();
        let mut index = 0u32;

        loop {
            let path = self.chunk_path(timeframe, index);
            if !path.exists() {
                if index == 0 {
                    return Err(CacheError::Miss(timeframe));
                }
                break;
            }
            rows.extend(read_chunk(&path)?);
            index += 1;
        }

        debug!(
            "Loaded {} rows from {} chunk(s) for {}",
            rows.len(),
            index,
            timeframe
        );
        Ok(rows)
    }

    /// Writes one chunk atomically: a temp file in the target directory,
    /// then a rename. Directory creation is a no-op when the directory is
    /// already present. Callers choose non-colliding sequence indices.
    pub fn persist(
        &self,
        timeframe: Timeframe,
        rows: &[RawCandle],
        sequence_index: u32,
    ) -> Result<(), CacheError> {
        let dir = self.timeframe_dir(timeframe);
        fs::create_dir_all(&dir)?;

        let target = self.chunk_path(timeframe, sequence_index);
        let staging = dir.join(format!("ohlc_{}.csv.tmp", sequence_index));
        write_chunk(&staging, rows)?;
        fs::rename(&staging, &target)?;

        info!("Persisted {} rows to {}", rows.len(), target.display());
        Ok(())
    }
}

fn read_chunk(path: &Path) -> Result<Vec<RawCandle>, CacheError> {
    let corrupt = |source| CacheError::Corrupt {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(corrupt)?;
    let mut rows = Vec::new();
    for record in reader.deserialize::<ChunkRecord>() {
        let record = record.map_err(corrupt)?;
        rows.push(RawCandle {
            timestamp: record.timestamp,
            open: record.open,
            close: record.close,
            high: record.high,
            low: record.low,
        });
    }
    Ok(rows)
}

fn write_chunk(path: &Path, rows: &[RawCandle]) -> Result<(), CacheError> {
    let failed = |source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(failed)?;
    for (row, candle) in rows.iter().enumerate() {
        writer
            .serialize(ChunkRecord {
                row: row as u64,
                timestamp: candle.timestamp.clone(),
                open: candle.open,
                close: candle.close,
                high: candle.high,
                low: candle.low,
            })
            .map_err(failed)?;
    }
    writer.flush().map_err(CacheError::Io)?;
    Ok(())
}
