//! In-memory storage backends for tests, demos, and WASM targets.
//!
//! - [`InMemoryLocalStorage`]: `HashMap` behind `RwLock`.
//! - [`InMemoryRemoteStore`]: row tables behind `RwLock`, with per-call
//!   counters and a failure switch so callers can assert routing.
//! - [`StaticSession`]: a session probe whose answer is set by hand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{AnalysisRow, SimulationRow};

use super::{LocalStorage, RemoteStore, Session, SessionProbe};

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

/// In-memory key/value storage.
#[derive(Default)]
pub struct InMemoryLocalStorage {
    items: RwLock<HashMap<String, String>>,
    failing: AtomicBool,
}

impl InMemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every call returns an I/O-style error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("local storage unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStorage for InMemoryLocalStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.check()?;
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.remove(key);
        Ok(())
    }
}

/// In-memory stand-in for the remote relational store.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    simulations: RwLock<Vec<SimulationRow>>,
    analyses: RwLock<Vec<AnalysisRow>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every call fails as if the network were down. Calls are
    /// still counted.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of read calls received (lists).
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write calls received (upserts, deletes, inserts).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of all simulation rows, regardless of owner.
    pub fn simulation_rows(&self) -> Vec<SimulationRow> {
        self.simulations
            .read()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Snapshot of all analysis rows, regardless of owner.
    pub fn analysis_rows(&self) -> Vec<AnalysisRow> {
        self.analyses
            .read()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    fn read(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    fn write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("remote store unreachable");
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn list_simulations(&self, user_id: &str) -> Result<Vec<SimulationRow>> {
        self.read()?;
        let rows = self.simulations.read().map_err(|_| poisoned())?;
        let mut owned: Vec<SimulationRow> = rows
            .iter()
            .filter(|r| r.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn upsert_simulation(&self, row: &SimulationRow) -> Result<()> {
        self.write()?;
        let mut rows = self.simulations.write().map_err(|_| poisoned())?;
        match rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
        Ok(())
    }

    async fn delete_simulation(&self, id: &str) -> Result<()> {
        self.write()?;
        let mut rows = self.simulations.write().map_err(|_| poisoned())?;
        rows.retain(|r| r.id != id);
        Ok(())
    }

    async fn insert_analysis(&self, row: &AnalysisRow) -> Result<()> {
        self.write()?;
        let mut rows = self.analyses.write().map_err(|_| poisoned())?;
        rows.push(row.clone());
        Ok(())
    }

    async fn list_analyses(&self, user_id: &str) -> Result<Vec<AnalysisRow>> {
        self.read()?;
        let rows = self.analyses.read().map_err(|_| poisoned())?;
        let mut owned: Vec<AnalysisRow> = rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}

/// A [`SessionProbe`] with a fixed answer.
#[derive(Default)]
pub struct StaticSession {
    session: RwLock<Option<Session>>,
    failing: AtomicBool,
    probes: AtomicUsize,
}

impl StaticSession {
    /// Guest mode: no session.
    pub fn guest() -> Self {
        Self::default()
    }

    /// Signed in as `user_id`.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            session: RwLock::new(Some(Session {
                user_id: user_id.into(),
            })),
            ..Self::default()
        }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        if let Ok(mut s) = self.session.write() {
            *s = Some(Session {
                user_id: user_id.into(),
            });
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut s) = self.session.write() {
            *s = None;
        }
    }

    /// When set, the probe itself errors (e.g. expired refresh token).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProbe for StaticSession {
    async fn current_session(&self) -> Result<Option<Session>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("session probe failed");
        }
        let session = self.session.read().map_err(|_| poisoned())?;
        Ok(session.clone())
    }
}
