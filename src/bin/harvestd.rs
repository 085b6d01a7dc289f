//! harvestd - queue-driven dataset harvesting worker
//!
//! The worker:
//! 1. Pops recording references from the work queue
//! 2. Fetches each recording from the media vault
//! 3. Harvests it through the detection/acceptance pipeline
//! 4. Exports accepted frames as cropped, labeled training examples
//! 5. Optionally uploads the dataset and deletes the source recording
//!
//! An empty queue is idled through, not treated as completion; SIGINT stops
//! the worker between frames.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;

use dataset_harvester::collab::{
    DatasetUploader, LocalVault, MediaVault, NoopUploader, SpoolQueue, WorkItem, WorkQueue,
};
use dataset_harvester::harvest::{build_adapters, HarvestService};
use dataset_harvester::ingest::file::has_supported_extension;
use dataset_harvester::ingest::FileSource;
use dataset_harvester::{DatasetSink, HarvestConfig};

#[derive(Parser, Debug)]
#[command(name = "harvestd", about = "Queue-driven dataset harvesting worker")]
struct Args {
    /// Spool file with pending work items (overrides the config).
    #[arg(long)]
    spool: Option<PathBuf>,
    /// Stop after this many processed items; 0 runs until shutdown.
    #[arg(long, default_value_t = 0)]
    max_items: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = HarvestConfig::load()?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown signal received");
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    let spool_path = args
        .spool
        .clone()
        .or_else(|| config.queue.spool_path.clone())
        .ok_or_else(|| anyhow!("no spool file configured (set queue.spool_path or --spool)"))?;
    let mut queue = SpoolQueue::new(spool_path);
    let vault = LocalVault::new(config.queue.media_dir.clone());
    let uploader = NoopUploader;

    let adapters = build_adapters(&config)?;
    let mut service = HarvestService::new(adapters, &config)?;
    service.warm_up()?;

    log::info!(
        "harvestd running. dataset root {}",
        config.dataset.root.display()
    );

    let idle_wait = Duration::from_secs(config.queue.idle_wait_secs);
    let scratch_dir = std::env::temp_dir();
    let mut processed = 0u64;

    while !stop.load(Ordering::SeqCst) {
        if args.max_items > 0 && processed >= args.max_items {
            break;
        }
        let item = match queue.pop() {
            Ok(Some(item)) => item,
            Ok(None) => {
                thread::sleep(idle_wait);
                continue;
            }
            Err(e) => {
                log::error!("queue error: {:#}", e);
                thread::sleep(idle_wait);
                continue;
            }
        };
        processed += 1;

        if let Err(e) = harvest_item(&item, &mut service, &config, &vault, &uploader, &scratch_dir, &stop) {
            log::error!("item '{}' failed: {:#}", item.media_key, e);
        }
    }

    log::info!("harvestd stopped after {} items", processed);
    Ok(())
}

fn harvest_item(
    item: &WorkItem,
    service: &mut HarvestService,
    config: &HarvestConfig,
    vault: &LocalVault,
    uploader: &NoopUploader,
    scratch_dir: &std::path::Path,
    stop: &AtomicBool,
) -> Result<()> {
    let is_stub = item.media_key.starts_with("stub://");
    if !is_stub && !has_supported_extension(&item.media_key) {
        log::warn!("skipping '{}': not a supported video file", item.media_key);
        return Ok(());
    }

    let video_path = if is_stub {
        PathBuf::from(&item.media_key)
    } else {
        vault.fetch(item, scratch_dir)?
    };
    let path_str = video_path
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF8 media path"))?;

    let mut source = FileSource::open(path_str)?;
    let mut sink = DatasetSink::new(config.sink_config());
    sink.initialize()?;

    let summary = service.process_video(&mut source, &mut sink, stop)?;
    sink.write_manifest(&service.canonical_names())?;
    log::info!(
        "'{}': {} accepted of {} inferred frames",
        item.media_key,
        summary.accepted,
        summary.frames_inferred
    );

    // Post-harvest steps are best effort; a failure here must not lose the
    // already-exported dataset.
    if config.queue.upload_after_harvest {
        if let Err(e) = uploader.upload(sink.result_dir()) {
            log::error!("upload failed for '{}': {:#}", item.media_key, e);
        }
    }
    if config.queue.delete_after_harvest && !is_stub {
        if let Err(e) = vault.delete(item) {
            log::error!("vault delete failed for '{}': {:#}", item.media_key, e);
        }
    }
    Ok(())
}
