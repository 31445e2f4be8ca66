// src/lib.rs
// Library surface shared by the three stage binaries and the integration tests.

pub mod config;
pub mod documents;
pub mod registry;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod text;

// Stage 1: registry probing (feeds + headless pages)
pub mod browserless;
pub mod harvest;

// Stage 2: article download and extraction
pub mod refine;

// Stage 3: classification and reporting
pub mod analyze;
pub mod report;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{Analyst, AnalystSummary};
pub use crate::config::{EngineSelection, PipelineConfig};
pub use crate::documents::{Classification, ClassificationRecord, RawDocument};
pub use crate::harvest::{HarvestSummary, Harvester};
pub use crate::refine::{RefineSummary, Refiner};
pub use crate::store::{ContentAddress, DocumentStore, JsonDirStore, MemoryStore};
