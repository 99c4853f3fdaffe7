//! # Policy Simulator Core
//!
//! Shared, WASM-safe logic for the Living Policy Simulator: record models,
//! identifier generation, the storage traits, and the [`hybrid::HybridStore`]
//! that routes every call between a remote relational store and a
//! same-device key/value store.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Native backends (SQLite, Supabase) live in the `policy-sim` crate and
//! plug in through the traits in [`store`].

pub mod hybrid;
pub mod ids;
pub mod models;
pub mod store;

pub use hybrid::{Backing, HybridStore, Outcome, SyncStatus};
pub use models::{
    AnalysisResult, AnalysisRow, SimulationResult, SimulationRow, SimulationStatus, UploadStatus,
    UploadedFile,
};
