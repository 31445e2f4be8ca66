// src/config/mod.rs
pub mod engine;
pub mod pipeline;

pub use engine::EngineSelection;
pub use pipeline::PipelineConfig;
