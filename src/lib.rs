//! Automated dataset harvesting from recorded video.
//!
//! The pipeline walks a video at a reduced sampling rate, runs one or more
//! object detectors per sampled frame, reconciles their class vocabularies,
//! fuses and deduplicates the detections, and exports frames that pass the
//! configured acceptance policy as cropped, YOLO-labeled training examples.
//!
//! Stages, in frame order:
//! 1. [`ingest`] decodes frames from a local video file.
//! 2. [`sampler`] picks which frames get inference and enforces the
//!    post-acceptance cooldown.
//! 3. [`detect`] adapters run the models; [`classmap`] and [`fusion`]
//!    merge their outputs into one canonical detection set.
//! 4. [`predicate`] decides whether the frame is worth keeping.
//! 5. [`crop`] tightens the frame around the detections and rewrites the
//!    labels; [`export`] writes the image/label pair to the dataset.
//!
//! [`harvest::HarvestService`] ties the stages together for one video;
//! [`collab`] supplies the queue/vault/uploader seams the worker binary
//! plugs real services into.

pub mod classmap;
pub mod collab;
pub mod config;
pub mod crop;
pub mod detect;
pub mod export;
pub mod frame;
pub mod fusion;
pub mod harvest;
pub mod ingest;
pub mod predicate;
pub mod sampler;

pub use classmap::ClassMap;
pub use config::HarvestConfig;
pub use export::{DatasetSink, ExportFormat, SinkConfig};
pub use frame::Frame;
pub use harvest::{HarvestService, HarvestSummary};
pub use predicate::AcceptancePolicy;
