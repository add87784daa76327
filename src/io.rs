use crate::error::{HmmError, Result};
use crate::tiling::Tile;
use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags, Metadata};
use log::{debug, info};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to the input file stem to name its smoothed output.
pub const OUTPUT_SUFFIX: &str = "_hmm";

/// Band count and extent of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterShape {
    pub bands: usize,
    pub rows: usize,
    pub cols: usize,
}

impl RasterShape {
    pub fn new(bands: usize, rows: usize, cols: usize) -> Self {
        Self { bands, rows, cols }
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.bands, self.rows, self.cols)
    }
}

/// Window reads from one time step of the input stack.
pub trait RasterRead {
    fn file_name(&self) -> &str;

    fn shape(&self) -> RasterShape;

    /// Reads `tile` from a 1-based band as an `n_rows x n_cols` array.
    fn read_window(&self, tile: &Tile, band: usize) -> Result<Array2<f32>>;
}

/// Window writes to one time step of the output set.
pub trait RasterWrite {
    fn file_name(&self) -> &str;

    fn write_probabilities(&mut self, tile: &Tile, band: usize, data: &Array2<f32>) -> Result<()>;

    fn write_classes(&mut self, tile: &Tile, band: usize, data: &Array2<u8>) -> Result<()>;

    /// Pushes buffered writes to storage.
    fn flush(&mut self) -> Result<()>;
}

/// Rejects windows or bands that fall outside `shape`.
pub(crate) fn check_window(name: &str, shape: RasterShape, tile: &Tile, band: usize) -> Result<()> {
    if band == 0 || band > shape.bands {
        return Err(HmmError::BandOutOfRange {
            name: name.to_string(),
            band,
            bands: shape.bands,
        });
    }
    if tile.row_end() > shape.rows || tile.col_end() > shape.cols {
        return Err(HmmError::WindowOutOfBounds {
            name: name.to_string(),
            row: tile.row_offset,
            col: tile.col_offset,
            rows: tile.n_rows,
            cols: tile.n_cols,
        });
    }
    Ok(())
}

pub(crate) fn check_data_dims<T>(name: &str, tile: &Tile, data: &Array2<T>) -> Result<()> {
    if data.dim() != (tile.n_rows, tile.n_cols) {
        return Err(HmmError::WindowOutOfBounds {
            name: name.to_string(),
            row: tile.row_offset,
            col: tile.col_offset,
            rows: data.nrows(),
            cols: data.ncols(),
        });
    }
    Ok(())
}

/// Band layout of an output raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// One float32 band per class label.
    Probabilities { n_labels: usize },
    /// A single byte band of class codes.
    ClassCodes,
}

impl OutputKind {
    pub fn n_bands(&self) -> usize {
        match self {
            OutputKind::Probabilities { n_labels } => *n_labels,
            OutputKind::ClassCodes => 1,
        }
    }
}

/// GTiff creation options for output rasters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationOptions {
    pub compression: String,
    pub block_size: Option<usize>,
}

impl Default for CreationOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
            block_size: None,
        }
    }
}

impl CreationOptions {
    pub fn validate(&self) -> Result<()> {
        let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
        if !valid_types.contains(&self.compression.as_str()) {
            return Err(HmmError::InvalidCompression(self.compression.clone()));
        }
        if let Some(block_size) = self.block_size {
            if block_size == 0 || block_size % 16 != 0 {
                return Err(HmmError::InvalidBlockSize(block_size));
            }
        }
        Ok(())
    }

    pub fn to_strings(&self) -> Vec<String> {
        let mut opts = vec![format!("COMPRESS={}", self.compression)];
        if let Some(block_size) = self.block_size {
            opts.push("TILED=YES".to_string());
            opts.push(format!("BLOCKXSIZE={}", block_size));
            opts.push(format!("BLOCKYSIZE={}", block_size));
        }
        opts.push("BIGTIFF=IF_SAFER".to_string());
        opts
    }
}

/// `<dir>/<stem>_hmm.<ext>`, where `dir` is `out_dir` or the input's directory.
pub fn output_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    let dir = match out_dir {
        Some(d) => d.to_path_buf(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, OUTPUT_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, OUTPUT_SUFFIX),
    };
    dir.join(name)
}

/// Removes stale `.ovr` and `.aux.xml` sidecars of `path`.
pub fn remove_sidecars(path: &Path) -> Result<()> {
    for suffix in [".ovr", ".aux.xml"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.is_file() {
            debug!("Removing stale sidecar {}", sidecar.display());
            fs::remove_file(&sidecar)?;
        }
    }
    Ok(())
}

/// A GDAL dataset accessed by window.
pub struct GdalRaster {
    dataset: Dataset,
    name: String,
    shape: RasterShape,
}

impl GdalRaster {
    /// Opens a raster read-only.
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening raster: {}", path.display());
        let dataset = Dataset::open(path)?;
        Self::from_dataset(dataset, path)
    }

    /// Reopens an existing output raster for update.
    pub fn open_update(path: &Path) -> Result<Self> {
        debug!("Reopening raster for update: {}", path.display());
        let dataset = Dataset::open_ex(
            path,
            DatasetOptions {
                open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
                ..Default::default()
            },
        )?;
        Self::from_dataset(dataset, path)
    }

    /// Creates a GTiff with the geometry and georeferencing of `template`.
    pub fn create(
        path: &Path,
        template: &GdalRaster,
        kind: OutputKind,
        options: &CreationOptions,
    ) -> Result<Self> {
        info!("Creating output raster: {}", path.display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;

        let mut gdal_options = CslStringList::new();
        for opt in options.to_strings() {
            gdal_options.add_string(&opt)?;
        }

        let shape = template.shape;
        let mut dataset = match kind {
            OutputKind::Probabilities { n_labels } => driver
                .create_with_band_type_with_options::<f32, _>(
                    path,
                    shape.cols,
                    shape.rows,
                    n_labels,
                    &gdal_options,
                )?,
            OutputKind::ClassCodes => driver.create_with_band_type_with_options::<u8, _>(
                path,
                shape.cols,
                shape.rows,
                1,
                &gdal_options,
            )?,
        };

        if let Ok(geotransform) = template.dataset.geo_transform() {
            dataset.set_geo_transform(&geotransform)?;
        }
        let projection = template.dataset.projection();
        if !projection.is_empty() {
            dataset.set_projection(&projection)?;
        }

        for band_index in 1..=kind.n_bands() {
            let mut raster_band = dataset.rasterband(band_index)?;
            let description = match kind {
                OutputKind::Probabilities { .. } => format!("class_{:02}", band_index - 1),
                OutputKind::ClassCodes => "class_code".to_string(),
            };
            raster_band.set_description(&description)?;
        }

        Self::from_dataset(dataset, path)
    }

    fn from_dataset(dataset: Dataset, path: &Path) -> Result<Self> {
        let (cols, rows) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        Ok(Self {
            dataset,
            name: path.display().to_string(),
            shape: RasterShape::new(bands, rows, cols),
        })
    }
}

impl RasterRead for GdalRaster {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> RasterShape {
        self.shape
    }

    fn read_window(&self, tile: &Tile, band: usize) -> Result<Array2<f32>> {
        check_window(&self.name, self.shape, tile, band)?;
        let rasterband = self.dataset.rasterband(band)?;

        let buffer = rasterband.read_as::<f32>(
            (tile.col_offset as isize, tile.row_offset as isize),
            (tile.n_cols, tile.n_rows),
            (tile.n_cols, tile.n_rows),
            None,
        )?;

        let data_vec: Vec<f32> = buffer.into_iter().collect();
        let data = Array2::from_shape_vec((tile.n_rows, tile.n_cols), data_vec)?;

        Ok(data)
    }
}

impl RasterWrite for GdalRaster {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn write_probabilities(&mut self, tile: &Tile, band: usize, data: &Array2<f32>) -> Result<()> {
        check_window(&self.name, self.shape, tile, band)?;
        check_data_dims(&self.name, tile, data)?;

        let mut raster_band = self.dataset.rasterband(band)?;
        let mut buffer = Buffer::new((tile.n_cols, tile.n_rows), data.iter().copied().collect());
        raster_band.write(
            (tile.col_offset as isize, tile.row_offset as isize),
            (tile.n_cols, tile.n_rows),
            &mut buffer,
        )?;
        Ok(())
    }

    fn write_classes(&mut self, tile: &Tile, band: usize, data: &Array2<u8>) -> Result<()> {
        check_window(&self.name, self.shape, tile, band)?;
        check_data_dims(&self.name, tile, data)?;

        let mut raster_band = self.dataset.rasterband(band)?;
        let mut buffer = Buffer::new((tile.n_cols, tile.n_rows), data.iter().copied().collect());
        raster_band.write(
            (tile.col_offset as isize, tile.row_offset as isize),
            (tile.n_cols, tile.n_rows),
            &mut buffer,
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.dataset.flush_cache()?;
        Ok(())
    }
}
