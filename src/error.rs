use thiserror::Error;

#[derive(Error, Debug)]
pub enum HmmError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("The fit method cannot be executed without data")]
    NoInputImages,

    #[error("Input raster has invalid dimensions: {0} bands, {1}x{2}")]
    InvalidDimensions(usize, usize, usize),

    #[error("Raster {name} has geometry {found:?} (bands, rows, cols), expected {expected:?}")]
    GeometryMismatch {
        name: String,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("Invalid transition prior: {0} (must be in (0, 1))")]
    InvalidTransitionPrior(f64),

    #[error("Transition matrix must be {expected}x{expected}, got {rows}x{cols}")]
    TransitionShape {
        expected: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Invalid transition matrix file: {0}")]
    TransitionParse(String),

    #[error("Class list has {got} entries but the stack has {expected} labels")]
    ClassListLength { expected: usize, got: usize },

    #[error("Time series must have at least one step and {expected_labels} labels, got {steps}x{labels}")]
    TimeSeriesShape {
        expected_labels: usize,
        steps: usize,
        labels: usize,
    },

    #[error("Smoothing method '{0}' is not implemented")]
    MethodNotImplemented(&'static str),

    #[error("Invalid tile size: {0} (must be positive)")]
    InvalidTileSize(usize),

    #[error("Invalid block size: {0} (must be multiple of 16)")]
    InvalidBlockSize(usize),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Window ({row}, {col}) {rows}x{cols} is outside raster {name}")]
    WindowOutOfBounds {
        name: String,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Band {band} is outside raster {name} ({bands} bands)")]
    BandOutOfRange {
        name: String,
        band: usize,
        bands: usize,
    },

    #[error("Completion marker {path} belongs to another run ({found}), expected {expected}; remove stale markers or rerun with the original tile size")]
    MarkerMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Expected {expected} output rasters, got {got}")]
    OutputCount { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, HmmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            HmmError::NoInputImages.to_string(),
            "The fit method cannot be executed without data"
        );
        assert_eq!(
            HmmError::ClassListLength { expected: 3, got: 2 }.to_string(),
            "Class list has 2 entries but the stack has 3 labels"
        );
        assert_eq!(
            HmmError::MethodNotImplemented("viterbi").to_string(),
            "Smoothing method 'viterbi' is not implemented"
        );
    }
}
