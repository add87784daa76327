// Library exports for testing and reuse

pub mod cli;
pub mod error;
pub mod io;
pub mod markers;
pub mod memory;
pub mod model;
pub mod output;
pub mod scheduler;
pub mod smoother;
pub mod tiling;
pub mod transition;

// Re-export commonly used types
pub use error::{HmmError, Result};
pub use io::{CreationOptions, GdalRaster, OutputKind, RasterRead, RasterShape, RasterWrite};
pub use markers::{MarkerStamp, TileMarkers};
pub use memory::MemoryRaster;
pub use model::{HmmConfig, HmmModel};
pub use output::OutputPolicy;
pub use scheduler::{RunSummary, TileScheduler};
pub use smoother::{forward_backward, normalize, SmoothingMethod};
pub use tiling::{Tile, TileGrid};
pub use transition::{TransitionModel, TransitionSpec};
