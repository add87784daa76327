//! In-memory rasters behind the same window interface as [`GdalRaster`].
//!
//! [`GdalRaster`]: crate::io::GdalRaster

use crate::error::Result;
use crate::io::{check_data_dims, check_window, RasterRead, RasterShape, RasterWrite};
use crate::tiling::Tile;
use ndarray::{s, Array2, Array3};

#[derive(Debug, Clone)]
pub struct MemoryRaster {
    name: String,
    /// `bands x rows x cols`
    data: Array3<f32>,
    flushes: usize,
}

impl MemoryRaster {
    pub fn new(name: impl Into<String>, data: Array3<f32>) -> Self {
        Self {
            name: name.into(),
            data,
            flushes: 0,
        }
    }

    /// A zero-filled raster of the given shape.
    pub fn zeros(name: impl Into<String>, shape: RasterShape) -> Self {
        Self::new(name, Array3::zeros((shape.bands, shape.rows, shape.cols)))
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl RasterRead for MemoryRaster {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> RasterShape {
        let (bands, rows, cols) = self.data.dim();
        RasterShape::new(bands, rows, cols)
    }

    fn read_window(&self, tile: &Tile, band: usize) -> Result<Array2<f32>> {
        check_window(&self.name, RasterRead::shape(self), tile, band)?;
        Ok(self
            .data
            .slice(s![
                band - 1,
                tile.row_offset..tile.row_end(),
                tile.col_offset..tile.col_end()
            ])
            .to_owned())
    }
}

impl RasterWrite for MemoryRaster {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn write_probabilities(&mut self, tile: &Tile, band: usize, data: &Array2<f32>) -> Result<()> {
        check_window(&self.name, RasterRead::shape(self), tile, band)?;
        check_data_dims(&self.name, tile, data)?;
        self.data
            .slice_mut(s![
                band - 1,
                tile.row_offset..tile.row_end(),
                tile.col_offset..tile.col_end()
            ])
            .assign(data);
        Ok(())
    }

    fn write_classes(&mut self, tile: &Tile, band: usize, data: &Array2<u8>) -> Result<()> {
        let as_float = data.mapv(f32::from);
        self.write_probabilities(tile, band, &as_float)
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
