use clap::Parser;
use env_logger::Env;
use geotiff_hmm_smooth::cli::Args;
use geotiff_hmm_smooth::{HmmModel, Result};
use log::info;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== HMM Class Probability Smoother ===");

    let config = args.to_config()?;
    if config.n_jobs() > 0 {
        info!("Using {} threads", config.n_jobs());
    } else {
        info!("Using all available threads");
    }

    let model = HmmModel::new(config);
    let summary = model.fit(&args.images)?;

    info!(
        "Processed {} of {} tiles ({} skipped as complete)",
        summary.tiles_processed, summary.tiles_total, summary.tiles_skipped
    );
    info!("=== Done! ===");
    Ok(())
}
