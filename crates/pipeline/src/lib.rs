//! The analysis pipeline: analyzer selection and execution over a lead,
//! score and issue deltas against the previous run, lead status mapping,
//! trend snapshots, and cross-lead benchmarks.

pub mod analyzer;
pub mod benchmark;
pub mod engine;
pub mod screenshot;
pub mod select;
pub mod testing;

pub use analyzer::{
    Analyzer, AnalyzerOutcome, AnalyzerRegistry, ESHOP_DETECTION_CATEGORY,
};
pub use benchmark::{BenchmarkConfig, BenchmarkService, CalculateBenchmarksHandler};
pub use engine::{AnalysisEngine, AnalyzeLeadHandler, EngineConfig};
pub use screenshot::{NoopScreenshotCapture, ScreenshotCapture, TakeScreenshotHandler};
pub use select::select_analyzers;
