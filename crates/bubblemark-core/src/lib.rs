//! bubblemark-core: Bubble detection, decision policy, and scoring.
//!
//! This crate defines the data model, the single-sheet evaluation pipeline
//! (grid mapping, fill analysis, mode policy, question resolution, scoring),
//! and the batch engine that the rest of bubblemark builds on.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod grid;
pub mod model;
pub mod parser;
pub mod policy;
pub mod report;
pub mod resolver;
pub mod results;
pub mod scoring;
pub mod sheet;
pub mod statistics;
pub mod traits;

#[cfg(test)]
mod testutil;
