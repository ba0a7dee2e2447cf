//! Sleuth core library: turns a model-written stock investigation into a
//! reasoning graph and reveals it node by node.
//!
//! The main entry point is [`pipeline::InvestigationSession`], which runs
//! Quotes → Reasoning → Normalize → Classify → Build → Reveal for one
//! ticker and date range.

pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
pub mod investigate;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod quote;
pub mod render;
pub mod reveal;
pub mod types;
