//! Run configuration and the fit entry points that wire rasters, the
//! transition model, the tile scheduler and the output policy together.

use crate::error::{HmmError, Result};
use crate::io::{
    output_path, remove_sidecars, CreationOptions, GdalRaster, RasterRead, RasterShape,
    RasterWrite,
};
use crate::markers::TileMarkers;
use crate::output::OutputPolicy;
use crate::scheduler::{RunSummary, TileScheduler};
use crate::smoother::SmoothingMethod;
use crate::transition::{TransitionModel, TransitionSpec};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TILE_SIZE: usize = 256;

/// Options for one smoothing run.
///
/// ```
/// use geotiff_hmm_smooth::{HmmConfig, TransitionSpec};
///
/// let config = HmmConfig::new()
///     .with_transition(TransitionSpec::Prior(0.05))
///     .with_tile_size(512)
///     .with_assign_class(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct HmmConfig {
    method: SmoothingMethod,
    transition: TransitionSpec,
    n_jobs: i32,
    tile_size: usize,
    assign_class: bool,
    class_list: Option<Vec<u8>>,
    out_dir: Option<PathBuf>,
    creation: CreationOptions,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HmmConfig {
    /// Defaults: forward-backward, prior 0.1, all cores, 256-pixel tiles,
    /// probability output next to the inputs.
    pub fn new() -> Self {
        Self {
            method: SmoothingMethod::ForwardBackward,
            transition: TransitionSpec::default(),
            n_jobs: 0,
            tile_size: DEFAULT_TILE_SIZE,
            assign_class: false,
            class_list: None,
            out_dir: None,
            creation: CreationOptions::default(),
        }
    }

    pub fn with_method(mut self, method: SmoothingMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_transition(mut self, transition: TransitionSpec) -> Self {
        self.transition = transition;
        self
    }

    /// Worker threads; `<= 0` means all cores.
    pub fn with_n_jobs(mut self, n_jobs: i32) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_tile_size(mut self, tile_size: usize) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_assign_class(mut self, assign_class: bool) -> Self {
        self.assign_class = assign_class;
        self
    }

    pub fn with_class_list(mut self, class_list: Option<Vec<u8>>) -> Self {
        self.class_list = class_list;
        self
    }

    pub fn with_out_dir(mut self, out_dir: Option<PathBuf>) -> Self {
        self.out_dir = out_dir;
        self
    }

    pub fn with_creation(mut self, creation: CreationOptions) -> Self {
        self.creation = creation;
        self
    }

    pub fn method(&self) -> SmoothingMethod {
        self.method
    }

    pub fn transition(&self) -> &TransitionSpec {
        &self.transition
    }

    pub fn n_jobs(&self) -> i32 {
        self.n_jobs
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn out_dir(&self) -> Option<&Path> {
        self.out_dir.as_deref()
    }

    pub fn output_policy(&self) -> OutputPolicy {
        if self.assign_class {
            OutputPolicy::classes(self.class_list.clone())
        } else {
            OutputPolicy::probabilities()
        }
    }

    /// Checks everything that does not depend on the rasters.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(HmmError::InvalidTileSize(self.tile_size));
        }
        if let TransitionSpec::Prior(p) = self.transition {
            if !(p > 0.0 && p < 1.0) {
                return Err(HmmError::InvalidTransitionPrior(p));
            }
        }
        self.creation.validate()
    }
}

/// Band count and extent shared by every image of the stack.
pub fn stack_shape<R: RasterRead>(images: &[R]) -> Result<RasterShape> {
    let first = images.first().ok_or(HmmError::NoInputImages)?;
    let shape = first.shape();
    if shape.bands == 0 || shape.rows == 0 || shape.cols == 0 {
        return Err(HmmError::InvalidDimensions(shape.bands, shape.rows, shape.cols));
    }

    for image in &images[1..] {
        let found = image.shape();
        if found != shape {
            return Err(HmmError::GeometryMismatch {
                name: image.file_name().to_string(),
                expected: shape.as_tuple(),
                found: found.as_tuple(),
            });
        }
    }

    Ok(shape)
}

/// Hidden Markov smoothing of a class-probability image stack.
pub struct HmmModel {
    config: HmmConfig,
}

impl HmmModel {
    pub fn new(config: HmmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HmmConfig {
        &self.config
    }

    /// Smooths the GeoTIFF stack at `images`, one image per time step in
    /// time order, writing `<stem>_hmm.<ext>` per step.
    ///
    /// Existing outputs are reopened and tiles already marked complete are
    /// skipped, so an interrupted run can simply be repeated.
    pub fn fit(&self, images: &[PathBuf]) -> Result<RunSummary> {
        if images.is_empty() {
            return Err(HmmError::NoInputImages);
        }
        self.config.validate()?;

        info!("Opening {} input images", images.len());
        let image_infos = images
            .iter()
            .map(|path| GdalRaster::open(path))
            .collect::<Result<Vec<_>>>()?;
        let shape = stack_shape(&image_infos)?;

        let policy = self.config.output_policy();
        policy.validate(shape.bands)?;
        let kind = policy.output_kind(shape.bands);

        let out_dir = match self.config.out_dir() {
            Some(dir) => {
                if !dir.is_dir() {
                    info!("Creating output directory: {}", dir.display());
                    fs::create_dir_all(dir)?;
                }
                dir.to_path_buf()
            }
            None => match images[0].parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };

        let mut o_infos = Vec::with_capacity(images.len());
        for (path, image_info) in images.iter().zip(&image_infos) {
            let out_name = output_path(path, self.config.out_dir());
            remove_sidecars(&out_name)?;

            let o_info = if out_name.is_file() {
                warn!("Reopening existing output: {}", out_name.display());
                let o_info = GdalRaster::open_update(&out_name)?;
                let expected = RasterShape::new(kind.n_bands(), shape.rows, shape.cols);
                if RasterRead::shape(&o_info) != expected {
                    return Err(HmmError::GeometryMismatch {
                        name: out_name.display().to_string(),
                        expected: expected.as_tuple(),
                        found: RasterRead::shape(&o_info).as_tuple(),
                    });
                }
                o_info
            } else {
                GdalRaster::create(&out_name, image_info, kind, &self.config.creation)?
            };
            o_infos.push(o_info);
        }

        let summary = self.fit_stack(&image_infos, &mut o_infos, &out_dir)?;
        self.close(image_infos, o_infos)?;
        Ok(summary)
    }

    /// Smooths already-opened rasters. Completion markers live in `marker_dir`.
    pub fn fit_stack<R: RasterRead, W: RasterWrite>(
        &self,
        images: &[R],
        outputs: &mut [W],
        marker_dir: &Path,
    ) -> Result<RunSummary> {
        self.config.validate()?;
        let shape = stack_shape(images)?;

        let policy = self.config.output_policy();
        policy.validate(shape.bands)?;

        info!(
            "Stack: {} steps, {} labels, {}x{} pixels",
            images.len(),
            shape.bands,
            shape.rows,
            shape.cols
        );

        let model = TransitionModel::build(shape.bands, &self.config.transition)?;
        let scheduler = TileScheduler::new(
            self.config.tile_size,
            self.config.n_jobs,
            self.config.method,
            TileMarkers::new(marker_dir),
        )?;

        info!(
            "Smoothing with {} (tile size {}, {})",
            self.config.method,
            self.config.tile_size,
            if policy.assign_class() { "class codes" } else { "probabilities" }
        );
        let summary = scheduler.run(images, outputs, &model, &policy)?;

        info!(
            "{} tiles: {} processed, {} empty, {} already complete",
            summary.tiles_total, summary.tiles_processed, summary.tiles_empty, summary.tiles_skipped
        );
        Ok(summary)
    }

    fn close(&self, image_infos: Vec<GdalRaster>, o_infos: Vec<GdalRaster>) -> Result<()> {
        drop(image_infos);
        for mut o_info in o_infos {
            o_info.flush()?;
        }
        Ok(())
    }
}
