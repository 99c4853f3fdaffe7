//! Storage abstractions for the policy simulator.
//!
//! Three traits describe the collaborators the [`HybridStore`](crate::hybrid::HybridStore)
//! routes between:
//!
//! | Trait | Models | Native implementation |
//! |-------|--------|-----------------------|
//! | [`LocalStorage`] | Same-device string key/value storage | SQLite (`SqliteLocalStorage`) |
//! | [`RemoteStore`] | Authenticated relational tables | Supabase PostgREST (`SupabaseClient`) |
//! | [`SessionProbe`] | "Who is signed in right now?" | Supabase GoTrue (`SupabaseClient`) |
//!
//! In-memory implementations of all three live in [`memory`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes. Errors
//! are plain `anyhow` errors; the hybrid store is what turns them into
//! fallbacks.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AnalysisRow, SimulationRow};

/// An authenticated identity, as returned by a [`SessionProbe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Stable user identifier, written as `user_id` on remote rows.
    pub user_id: String,
}

/// Same-device, unstructured string key/value storage.
///
/// Values are opaque strings; the hybrid store keeps JSON documents in them.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// The authenticated relational store.
///
/// Every call runs as the current session; row-level security on the
/// backend scopes what each call can see.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All simulation rows owned by `user_id`, newest `created_at` first.
    async fn list_simulations(&self, user_id: &str) -> Result<Vec<SimulationRow>>;

    /// Insert or replace a simulation row, conflict target `id`.
    async fn upsert_simulation(&self, row: &SimulationRow) -> Result<()>;

    /// Delete the simulation row with `id`. Deleting an absent row is not an error.
    async fn delete_simulation(&self, id: &str) -> Result<()>;

    /// Append an analysis row. Never overwrites.
    async fn insert_analysis(&self, row: &AnalysisRow) -> Result<()>;

    /// All analysis rows owned by `user_id`, newest first.
    async fn list_analyses(&self, user_id: &str) -> Result<Vec<AnalysisRow>>;
}

/// Probe for the current authenticated session.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// `Ok(None)` is guest mode; `Err` means the probe itself failed.
    async fn current_session(&self) -> Result<Option<Session>>;
}
