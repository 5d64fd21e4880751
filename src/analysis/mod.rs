mod client;
#[cfg(test)]
mod tests;

pub use client::{AnalysisClient, PredictionService};
