//! # Living Policy Simulator backend
//!
//! Turns policy documents into structured analyses with an LLM, runs
//! lever-driven outcome simulations, and keeps every result in a
//! hybrid store: the user's Supabase account when signed in, this device's
//! SQLite database otherwise (or whenever the remote side fails).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐
//! │ Extract  │──▶│   LLM    │──▶│  Workflow   │
//! │ PDF/DOCX │   │ prompts  │   │             │
//! └──────────┘   └──────────┘   └─────┬──────┘
//!                                     ▼
//!                            ┌─────────────────┐
//!                            │   HybridStore   │
//!                            └───┬─────────┬───┘
//!                                ▼         ▼
//!                         ┌──────────┐ ┌──────────┐
//!                         │ Supabase │ │  SQLite  │
//!                         │ (remote) │ │ (local)  │
//!                         └──────────┘ └──────────┘
//! ```
//!
//! The store itself, its record types, and the storage traits live in the
//! `policy-sim-core` crate; this crate supplies the native backends, the
//! workflow, the CLI and the HTTP API.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Process-wide collaborators built from config |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_storage`] | SQLite local key/value storage |
//! | [`supabase`] | Supabase remote store and session probe |
//! | [`llm`] | LLM client abstraction |
//! | [`prompts`] | Extraction/simulation prompts, lever resolution |
//! | [`object_storage`] | S3-compatible document storage (SigV4) |
//! | [`extract`] | Plain-text extraction from documents |
//! | [`workflow`] | Upload → analyze → simulate |
//! | [`server`] | JSON HTTP API |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod context;
pub mod db;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod object_storage;
pub mod prompts;
pub mod server;
pub mod sqlite_storage;
pub mod supabase;
pub mod workflow;
