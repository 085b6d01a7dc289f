//! harvest_once - harvest a single local video file
//!
//! Runs the same pipeline as harvestd against one file, without any queue or
//! vault involvement. Useful for tuning a configuration before pointing the
//! worker at a backlog.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use dataset_harvester::harvest::{build_adapters, HarvestService};
use dataset_harvester::ingest::FileSource;
use dataset_harvester::{DatasetSink, HarvestConfig};

#[derive(Parser, Debug)]
#[command(name = "harvest_once", about = "Harvest one video into a dataset")]
struct Args {
    /// Video file to harvest.
    video: String,
    /// Override the configured dataset root.
    #[arg(long)]
    dataset_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = HarvestConfig::load()?;
    if let Some(root) = args.dataset_root {
        config.dataset.root = root;
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown signal received");
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    let adapters = build_adapters(&config)?;
    let mut service = HarvestService::new(adapters, &config)?;
    service.warm_up()?;

    let mut source = FileSource::open(&args.video)?;
    let mut sink = DatasetSink::new(config.sink_config());
    sink.initialize()?;

    let summary = service.process_video(&mut source, &mut sink, &stop)?;
    sink.write_manifest(&service.canonical_names())?;

    log::info!(
        "done: {} frames seen, {} inferred, {} accepted in {:.1}s",
        summary.frames_seen,
        summary.frames_inferred,
        summary.accepted,
        summary.elapsed.as_secs_f64()
    );
    log::info!("dataset written to {}", sink.result_dir().display());
    Ok(())
}
