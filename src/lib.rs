//! Grading-event bridge between a learning platform and an external records
//! service: assessor queue bookkeeping, resit grade carry-forward, and
//! delivery with a deduplicated outbox for failures.

pub mod assessor_queue;
pub mod carry_forward;
pub mod cli;
pub mod config;
pub mod context;
pub mod delivery;
pub mod error;
pub mod ingest;
pub mod model;
pub mod outbox;
pub mod overrides;
pub mod payload;
pub mod pipeline;
pub mod store;
pub mod ui;

#[cfg(test)]
mod fixtures;
