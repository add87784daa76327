//! Tile-by-tile smoothing with resumable completion markers.

use crate::error::{HmmError, Result};
use crate::io::{RasterRead, RasterWrite};
use crate::markers::{MarkerStamp, TileMarkers};
use crate::output::OutputPolicy;
use crate::smoother::SmoothingMethod;
use crate::tiling::{Tile, TileGrid};
use crate::transition::TransitionModel;
use log::{debug, info};
use ndarray::{s, Array2, Array4};
use rayon::prelude::*;

/// Tile counts from one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tiles_total: usize,
    /// Already marked complete by an earlier run.
    pub tiles_skipped: usize,
    /// No data in any step or label; marked complete without writing.
    pub tiles_empty: usize,
    pub tiles_processed: usize,
}

pub struct TileScheduler {
    tile_size: usize,
    method: SmoothingMethod,
    markers: TileMarkers,
    pool: rayon::ThreadPool,
}

impl TileScheduler {
    /// `n_jobs <= 0` uses every available core.
    pub fn new(
        tile_size: usize,
        n_jobs: i32,
        method: SmoothingMethod,
        markers: TileMarkers,
    ) -> Result<Self> {
        if tile_size == 0 {
            return Err(HmmError::InvalidTileSize(tile_size));
        }

        let num_threads = if n_jobs <= 0 { 0 } else { n_jobs as usize };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?;
        debug!("Worker pool with {} threads", pool.current_num_threads());

        Ok(Self {
            tile_size,
            method,
            markers,
            pool,
        })
    }

    pub fn markers(&self) -> &TileMarkers {
        &self.markers
    }

    pub fn run<R: RasterRead, W: RasterWrite>(
        &self,
        images: &[R],
        outputs: &mut [W],
        model: &TransitionModel,
        policy: &OutputPolicy,
    ) -> Result<RunSummary> {
        let first = images.first().ok_or(HmmError::NoInputImages)?;
        if outputs.len() != images.len() {
            return Err(HmmError::OutputCount {
                expected: images.len(),
                got: outputs.len(),
            });
        }

        let shape = first.shape();
        let grid = TileGrid::new(shape.rows, shape.cols, self.tile_size);
        let stamp = MarkerStamp::for_stack(self.tile_size, first.file_name());
        let mut summary = RunSummary {
            tiles_total: grid.total_tiles,
            ..Default::default()
        };

        for (tile_idx, tile) in grid.iter() {
            if self.markers.is_complete(&tile, &stamp)? {
                debug!(
                    "Tile {} ({}, {}) already complete, skipping",
                    tile_idx, tile.row_offset, tile.col_offset
                );
                summary.tiles_skipped += 1;
                continue;
            }

            let Some(stack) = load_tile(images, &tile, shape.bands)? else {
                debug!(
                    "Tile {} ({}, {}) has no data, marking complete",
                    tile_idx, tile.row_offset, tile.col_offset
                );
                self.markers.mark_complete(&tile, &stamp)?;
                summary.tiles_empty += 1;
                continue;
            };

            let result = self.smooth_tile(&stack, model)?;

            policy.write(&result, outputs, &tile)?;
            for out_rst in outputs.iter_mut() {
                out_rst.flush()?;
            }
            self.markers.mark_complete(&tile, &stamp)?;
            summary.tiles_processed += 1;

            info!(
                "Tile {}/{} done ({} pixels at row {}, col {})",
                tile_idx + 1,
                grid.total_tiles,
                tile.n_pixels(),
                tile.row_offset,
                tile.col_offset
            );
        }

        Ok(summary)
    }

    /// Smooths every pixel of a `steps x labels x rows x cols` stack on the
    /// worker pool. The first failing pixel fails the whole tile.
    pub fn smooth_tile(&self, stack: &Array4<f32>, model: &TransitionModel) -> Result<Array4<f32>> {
        let (_, _, n_rows, n_cols) = stack.dim();
        let n_samples = n_rows * n_cols;
        let method = self.method;

        let beliefs: Vec<Array2<f32>> = self.pool.install(|| {
            (0..n_samples)
                .into_par_iter()
                .map(|n_sample| {
                    let (r, c) = (n_sample / n_cols, n_sample % n_cols);
                    method.smooth(stack.slice(s![.., .., r, c]), model)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut result = Array4::<f32>::zeros(stack.raw_dim());
        for (n_sample, belief) in beliefs.iter().enumerate() {
            let (r, c) = (n_sample / n_cols, n_sample % n_cols);
            result.slice_mut(s![.., .., r, c]).assign(belief);
        }

        Ok(result)
    }
}

/// Reads `tile` from every step and band into a `steps x labels x rows x cols`
/// stack. Non-finite values become 0. Returns `None` when the whole stack
/// is zero.
pub fn load_tile<R: RasterRead>(
    images: &[R],
    tile: &Tile,
    n_labels: usize,
) -> Result<Option<Array4<f32>>> {
    let mut stack = Array4::<f32>::zeros((images.len(), n_labels, tile.n_rows, tile.n_cols));
    let mut block_max = 0.0_f32;

    for (step, image) in images.iter().enumerate() {
        for band in 0..n_labels {
            let mut layer = image.read_window(tile, band + 1)?;
            layer.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
            block_max = layer.iter().fold(block_max, |acc, &v| acc.max(v));
            stack.slice_mut(s![step, band, .., ..]).assign(&layer);
        }
    }

    if block_max == 0.0 {
        return Ok(None);
    }
    Ok(Some(stack))
}
