use crate::error::Result;
use crate::io::CreationOptions;
use crate::model::{HmmConfig, DEFAULT_TILE_SIZE};
use crate::smoother::SmoothingMethod;
use crate::transition::TransitionSpec;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hmm-smooth")]
#[command(about = "Temporally smooth a stack of class probability rasters with a Hidden Markov Model")]
#[command(version)]
#[command(author = "Huimori Project")]
pub struct Args {
    /// Class probability GeoTIFFs in time order (one band per class)
    #[arg(required = true, value_name = "FILE")]
    pub images: Vec<PathBuf>,

    /// Smoothing method
    #[arg(short, long, value_enum, default_value_t = SmoothingMethod::ForwardBackward)]
    pub method: SmoothingMethod,

    /// Probability of switching to any other class between steps
    #[arg(short = 'p', long, value_name = "P", default_value_t = 0.1)]
    pub transition_prior: f64,

    /// Text file with an explicit LxL transition matrix (overrides --transition-prior)
    #[arg(long, value_name = "FILE")]
    pub transition_matrix: Option<PathBuf>,

    /// Number of worker threads (0 or negative: all available)
    #[arg(short, long, value_name = "N", default_value_t = 0, allow_negative_numbers = true)]
    pub jobs: i32,

    /// Tile edge length in pixels
    #[arg(short, long, value_name = "PIXELS", default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: usize,

    /// Write the most likely class instead of per-class probabilities
    #[arg(short, long)]
    pub assign_class: bool,

    /// Class codes written for each label index, e.g. 1,2,5 (with --assign-class)
    #[arg(long, value_name = "CODES", value_delimiter = ',', requires = "assign_class")]
    pub class_list: Option<Vec<u8>>,

    /// Output directory (default: next to each input)
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Compression: DEFLATE, LZW, ZSTD, or NONE
    #[arg(long, value_name = "TYPE", default_value = "DEFLATE")]
    pub compress: String,

    /// Internal GeoTIFF block size (multiple of 16); untiled when omitted
    #[arg(long, value_name = "PIXELS")]
    pub block_size: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn to_config(&self) -> Result<HmmConfig> {
        let transition = match &self.transition_matrix {
            Some(path) => TransitionSpec::from_file(path)?,
            None => TransitionSpec::Prior(self.transition_prior),
        };

        Ok(HmmConfig::new()
            .with_method(self.method)
            .with_transition(transition)
            .with_n_jobs(self.jobs)
            .with_tile_size(self.tile_size)
            .with_assign_class(self.assign_class)
            .with_class_list(self.class_list.clone())
            .with_out_dir(self.out_dir.clone())
            .with_creation(CreationOptions {
                compression: self.compress.to_uppercase(),
                block_size: self.block_size,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["hmm-smooth", "a.tif", "b.tif"]).unwrap();
        assert_eq!(args.images.len(), 2);
        assert_eq!(args.method, SmoothingMethod::ForwardBackward);
        assert_eq!(args.jobs, 0);
        assert_eq!(args.tile_size, DEFAULT_TILE_SIZE);

        let config = args.to_config().unwrap();
        assert!(config.validate().is_ok());
        assert!(matches!(config.transition(), TransitionSpec::Prior(p) if (*p - 0.1).abs() < 1e-12));
    }

    #[test]
    fn test_class_options() {
        let args = Args::try_parse_from([
            "hmm-smooth",
            "--assign-class",
            "--class-list",
            "1,2,5",
            "--method",
            "viterbi",
            "-j",
            "-1",
            "a.tif",
        ])
        .unwrap();
        assert_eq!(args.class_list, Some(vec![1, 2, 5]));
        assert_eq!(args.method, SmoothingMethod::Viterbi);
        assert_eq!(args.jobs, -1);

        let policy = args.to_config().unwrap().output_policy();
        assert_eq!(policy.class_list(), Some(&[1u8, 2, 5][..]));
    }

    #[test]
    fn test_class_list_requires_assign_class() {
        assert!(Args::try_parse_from(["hmm-smooth", "--class-list", "1,2", "a.tif"]).is_err());
    }

    #[test]
    fn test_images_required() {
        assert!(Args::try_parse_from(["hmm-smooth"]).is_err());
    }
}
