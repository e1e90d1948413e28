//! Viseme analysis: framing, formant estimation, vowel classification, smoothing

pub mod analyzer;
pub mod classifier;
pub mod lpc;

pub use analyzer::{AnalyzerState, FormantMethod, VisemeAnalysis, VisemeAnalyzer};
pub use classifier::{base_params, classify, mouth_params};
