// Field-selection-to-time-series pipeline stages

pub mod extract;
pub mod geometry;
pub mod interpolate;
pub mod orchestrator;
pub mod reshape;
pub mod types;
