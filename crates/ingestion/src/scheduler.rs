//! Parallel block conversion feeding the bulk loader.
//!
//! Work is split into bands (one row of block windows). Each band task opens
//! its own readers, decodes the band's rows once per raster, then converts
//! and emits every window of the band as its own batch. Tasks run on a
//! rayon pool inside `spawn_blocking`; batches reach the loader through a
//! bounded channel in completion order.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use h3_grid::{
    BlockLayout, ColumnSpec, GeoTiffReader, GridBatch, GridRow, GridValue, HexCell,
    RasterConverter,
};
use rayon::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{IngestionError, Result};

/// One raster contributing one column.
#[derive(Debug, Clone)]
pub struct RasterSource {
    pub column: ColumnSpec,
    pub path: PathBuf,
}

/// A set of aligned rasters to convert block by block.
#[derive(Debug, Clone)]
pub struct RasterJob {
    pub sources: Vec<RasterSource>,
    pub layout: BlockLayout,
    pub converter: RasterConverter,
    /// Nodata override applied when each raster is reopened.
    pub nodata: Option<f64>,
}

impl RasterJob {
    pub fn columns(&self) -> Vec<ColumnSpec> {
        self.sources.iter().map(|s| s.column.clone()).collect()
    }
}

/// Dispatches block conversions to a fixed-size worker pool.
#[derive(Debug, Clone, Copy)]
pub struct BlockScheduler {
    workers: usize,
    channel_capacity: usize,
}

impl BlockScheduler {
    pub fn new(workers: usize, channel_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Start converting `job`. Must be called inside a tokio runtime.
    pub fn spawn(&self, job: RasterJob) -> BlockStream {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let workers = self.workers;
        let handle = tokio::task::spawn_blocking(move || run_job(job, workers, tx, flag));
        BlockStream {
            rx,
            cancel,
            handle: Some(handle),
            cancelled: false,
        }
    }
}

/// Converted batches, in completion order.
pub struct BlockStream {
    rx: mpsc::Receiver<GridBatch>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
    cancelled: bool,
}

impl BlockStream {
    /// Next non-empty batch; `None` once every band finished or failed.
    pub async fn next(&mut self) -> Option<GridBatch> {
        self.rx.recv().await
    }

    /// Stop outstanding and queued work.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.cancel.store(true, Ordering::SeqCst);
        self.rx.close();
    }

    /// Wait for the workers and return the first conversion error.
    ///
    /// Call after `next` returned `None` or after `cancel`.
    pub async fn finish(mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| IngestionError::Task(e.to_string()))??;
        }
        if self.cancelled {
            return Err(IngestionError::Cancelled);
        }
        Ok(())
    }
}

impl Drop for BlockStream {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

fn run_job(
    job: RasterJob,
    workers: usize,
    tx: mpsc::Sender<GridBatch>,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("h3-convert-{i}"))
        .build()
        .map_err(|e| IngestionError::Task(e.to_string()))?;

    let columns = job.columns();
    pool.install(|| {
        (0..job.layout.bands())
            .into_par_iter()
            .try_for_each(|band| {
                let result = convert_band(&job, &columns, band, &tx, &cancel);
                if let Err(e) = &result {
                    warn!(band, error = %e, "Block conversion failed, cancelling");
                    cancel.store(true, Ordering::SeqCst);
                }
                result
            })
    })
}

fn convert_band(
    job: &RasterJob,
    columns: &[ColumnSpec],
    band: usize,
    tx: &mpsc::Sender<GridBatch>,
    cancel: &AtomicBool,
) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        return Ok(());
    }
    let (row_off, rows) = job.layout.band_rows(band);
    let mut rasters = Vec::with_capacity(job.sources.len());
    for source in &job.sources {
        let mut reader = GeoTiffReader::open_with_nodata(&source.path, job.nodata)?;
        let data = reader.read_rows(row_off, rows)?;
        rasters.push((reader.into_descriptor(), data));
    }

    for window in job.layout.band_windows(band) {
        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut per_column = Vec::with_capacity(rasters.len());
        for (descriptor, data) in &rasters {
            per_column.push(job.converter.convert_window(data, &window, descriptor)?);
        }
        let batch = join_columns(columns, per_column);
        if batch.is_empty() {
            debug!(band, col_off = window.col_off, "Window produced no cells");
            continue;
        }
        debug!(band, col_off = window.col_off, rows = batch.len(), "Window converted");
        if tx.blocking_send(batch).is_err() {
            // Receiver closed: the run was cancelled.
            return Ok(());
        }
    }
    Ok(())
}

/// Outer join of per-column cell values on the cell id.
///
/// A cell present in any column becomes one row; columns without a value
/// for it are NULL.
pub fn join_columns(
    columns: &[ColumnSpec],
    per_column: Vec<Vec<(HexCell, GridValue)>>,
) -> GridBatch {
    let width = columns.len();
    let mut rows: BTreeMap<HexCell, Vec<Option<GridValue>>> = BTreeMap::new();
    for (idx, cells) in per_column.into_iter().enumerate() {
        for (cell, value) in cells {
            rows.entry(cell).or_insert_with(|| vec![None; width])[idx] = Some(value);
        }
    }
    let mut batch = GridBatch::new(columns.to_vec());
    batch.rows = rows
        .into_iter()
        .map(|(cell, values)| GridRow { cell, values })
        .collect();
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use h3_grid::{cell, DataType};

    fn cell_at(lat: f64, lng: f64) -> HexCell {
        HexCell::from_coords(lat, lng, cell::resolution(6).unwrap()).unwrap()
    }

    #[test]
    fn test_join_is_outer() {
        let a = cell_at(10.0, 10.0);
        let b = cell_at(20.0, 20.0);
        let c = cell_at(30.0, 30.0);
        let columns = vec![
            ColumnSpec::new("cropA", DataType::F32),
            ColumnSpec::new("cropB", DataType::F32),
        ];
        let batch = join_columns(
            &columns,
            vec![
                vec![(a, GridValue::F32(1.0)), (b, GridValue::F32(2.0))],
                vec![(b, GridValue::F32(3.0)), (c, GridValue::F32(4.0))],
            ],
        );
        assert_eq!(batch.len(), 3);
        let row = |cell| batch.rows.iter().find(|r| r.cell == cell).unwrap();
        assert_eq!(row(a).values, vec![Some(GridValue::F32(1.0)), None]);
        assert_eq!(
            row(b).values,
            vec![Some(GridValue::F32(2.0)), Some(GridValue::F32(3.0))]
        );
        assert_eq!(row(c).values, vec![None, Some(GridValue::F32(4.0))]);
    }

    #[test]
    fn test_join_of_nothing_is_empty() {
        let columns = vec![ColumnSpec::new("cropA", DataType::F32)];
        assert!(join_columns(&columns, vec![vec![]]).is_empty());
    }

    #[test]
    fn test_scheduler_clamps_pool_size() {
        let scheduler = BlockScheduler::new(0, 0);
        assert_eq!(scheduler.workers, 1);
        assert_eq!(scheduler.channel_capacity, 1);
    }
}
