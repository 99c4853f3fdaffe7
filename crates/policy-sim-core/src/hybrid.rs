//! Hybrid result store: one CRUD surface over a remote and a local backend.
//!
//! Every call resolves its backing store afresh via
//! [`HybridStore::resolve_backing_store`]:
//!
//! 1. No remote configured → local.
//! 2. Remote configured and a session is signed in → remote.
//! 3. Remote configured, no session (guest mode) → local.
//! 4. Session probe or remote call fails → log, serve this call locally.
//!
//! There is no reconciliation between the two sides. Records written locally
//! in guest or fallback mode stay local; remote records are never mirrored.
//!
//! No operation returns an error. Each returns an [`Outcome`] whose
//! [`SyncStatus`] says where the call was served and whether it degraded,
//! so a caller can surface a sync warning without having to handle failure.
//!
//! Local collections are updated with a plain read-modify-write cycle and no
//! cross-call locking: two concurrent writers to the same collection can lose
//! an update.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{
    now_iso, AnalysisResult, AnalysisRow, SimulationResult, SimulationRow, UploadedFile,
};
use crate::store::{LocalStorage, RemoteStore, Session, SessionProbe};

/// Local key holding the JSON array of uploaded files.
pub const UPLOADS_KEY: &str = "lps.uploads";
/// Local key holding the JSON array of simulation results.
pub const SIMULATIONS_KEY: &str = "lps.simulations";
/// Prefix of the per-file local analysis keys.
pub const ANALYSIS_KEY_PREFIX: &str = "lps.analysis.";

/// Local key for the cached analysis of `file_name`.
pub fn analysis_key(file_name: &str) -> String {
    format!("{}{}", ANALYSIS_KEY_PREFIX, file_name)
}

/// Why a call was routed to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalReason {
    /// Remote connection parameters are absent.
    Unconfigured,
    /// Remote configured, nobody signed in.
    Guest,
    /// The session probe itself failed.
    ProbeFailed(String),
}

/// The backing store resolved for a single call.
pub enum Backing<'a> {
    Local(LocalReason),
    Remote {
        store: &'a dyn RemoteStore,
        session: Session,
    },
}

/// Where a call was served, and whether it degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "backing", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Routed locally by policy (unconfigured or guest).
    Local,
    /// Served by the remote store.
    Remote,
    /// The remote side failed; served locally or answered empty.
    Degraded { operation: String, reason: String },
    /// The local store itself failed; the value is empty or absent.
    LocalFailed { operation: String, reason: String },
}

impl SyncStatus {
    /// True when a remote write may have been lost or a read is incomplete.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            SyncStatus::Degraded { .. } | SyncStatus::LocalFailed { .. }
        )
    }

    /// Human-readable reason, if degraded.
    pub fn reason(&self) -> Option<&str> {
        match self {
            SyncStatus::Degraded { reason, .. } | SyncStatus::LocalFailed { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }

    fn degraded(operation: &str, err: &anyhow::Error) -> Self {
        SyncStatus::Degraded {
            operation: operation.to_string(),
            reason: format!("{:#}", err),
        }
    }

    fn for_local(reason: &LocalReason, operation: &str) -> Self {
        match reason {
            LocalReason::Unconfigured | LocalReason::Guest => SyncStatus::Local,
            LocalReason::ProbeFailed(msg) => SyncStatus::Degraded {
                operation: operation.to_string(),
                reason: msg.clone(),
            },
        }
    }
}

/// The value of a store call plus where it was served.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub sync: SyncStatus,
}

impl<T> Outcome<T> {
    pub fn new(value: T, sync: SyncStatus) -> Self {
        Self { value, sync }
    }

    /// Discard the sync status.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn is_degraded(&self) -> bool {
        self.sync.is_degraded()
    }
}

struct RemoteHandle {
    store: Arc<dyn RemoteStore>,
    sessions: Arc<dyn SessionProbe>,
}

/// Routes simulation, analysis, and upload records between a remote
/// authenticated store and a local key/value store.
///
/// Construct once per process and share it; it holds no per-call state.
///
/// ```rust
/// use std::sync::Arc;
/// use policy_sim_core::hybrid::HybridStore;
/// use policy_sim_core::store::memory::{InMemoryLocalStorage, InMemoryRemoteStore, StaticSession};
///
/// let local_only = HybridStore::new(Arc::new(InMemoryLocalStorage::new()));
/// assert!(!local_only.is_remote_configured());
///
/// let hybrid = HybridStore::new(Arc::new(InMemoryLocalStorage::new())).with_remote(
///     Arc::new(InMemoryRemoteStore::new()),
///     Arc::new(StaticSession::guest()),
/// );
/// assert!(hybrid.is_remote_configured());
/// ```
pub struct HybridStore {
    local: Arc<dyn LocalStorage>,
    remote: Option<RemoteHandle>,
}

impl HybridStore {
    /// A store with only the local backend (remote unconfigured).
    pub fn new(local: Arc<dyn LocalStorage>) -> Self {
        Self {
            local,
            remote: None,
        }
    }

    /// Attach a configured remote store and its session probe.
    pub fn with_remote(
        mut self,
        store: Arc<dyn RemoteStore>,
        sessions: Arc<dyn SessionProbe>,
    ) -> Self {
        self.remote = Some(RemoteHandle { store, sessions });
        self
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Decide which backing store serves this call. Never cached.
    pub async fn resolve_backing_store(&self, operation: &str) -> Backing<'_> {
        let Some(remote) = &self.remote else {
            debug!(operation, "remote store not configured; using local store");
            return Backing::Local(LocalReason::Unconfigured);
        };

        match remote.sessions.current_session().await {
            Ok(Some(session)) => {
                debug!(operation, user_id = %session.user_id, "using remote store");
                Backing::Remote {
                    store: remote.store.as_ref(),
                    session,
                }
            }
            Ok(None) => {
                debug!(operation, "guest mode; using local store");
                Backing::Local(LocalReason::Guest)
            }
            Err(e) => {
                warn!(operation, error = %format!("{:#}", e), "session probe failed; falling back to local store");
                Backing::Local(LocalReason::ProbeFailed(format!("{:#}", e)))
            }
        }
    }

    // ============ Simulations ============

    /// All simulations visible to the current backing store.
    ///
    /// Remote: rows owned by the signed-in user, newest first. Local: the
    /// stored collection as-is (most recent saves first).
    pub async fn list_simulations(&self) -> Outcome<Vec<SimulationResult>> {
        const OP: &str = "list_simulations";
        match self.resolve_backing_store(OP).await {
            Backing::Remote { store, session } => {
                match store.list_simulations(&session.user_id).await {
                    Ok(rows) => Outcome::new(
                        rows.into_iter().map(SimulationResult::from).collect(),
                        SyncStatus::Remote,
                    ),
                    Err(e) => {
                        warn_fallback(OP, &e);
                        self.local_list(SIMULATIONS_KEY, OP, SyncStatus::degraded(OP, &e))
                            .await
                    }
                }
            }
            Backing::Local(reason) => {
                self.local_list(SIMULATIONS_KEY, OP, SyncStatus::for_local(&reason, OP))
                    .await
            }
        }
    }

    /// Insert or replace a simulation by `id`.
    ///
    /// A failed remote upsert is performed locally instead, so the record is
    /// never lost; the outcome reports the degradation.
    pub async fn save_simulation(&self, result: &SimulationResult) -> Outcome<()> {
        const OP: &str = "save_simulation";
        let sync = match self.resolve_backing_store(OP).await {
            Backing::Remote { store, session } => {
                let row = SimulationRow::for_upsert(result, &session.user_id, now_iso());
                match store.upsert_simulation(&row).await {
                    Ok(()) => return Outcome::new((), SyncStatus::Remote),
                    Err(e) => {
                        warn_fallback(OP, &e);
                        SyncStatus::degraded(OP, &e)
                    }
                }
            }
            Backing::Local(reason) => SyncStatus::for_local(&reason, OP),
        };

        match self.local_upsert_simulation(result).await {
            Ok(()) => Outcome::new((), sync),
            Err(e) => local_failed(OP, &e, ()),
        }
    }

    /// Delete a simulation by `id`. Absent ids are a no-op.
    pub async fn delete_simulation(&self, id: &str) -> Outcome<()> {
        const OP: &str = "delete_simulation";
        let sync = match self.resolve_backing_store(OP).await {
            Backing::Remote { store, .. } => match store.delete_simulation(id).await {
                Ok(()) => return Outcome::new((), SyncStatus::Remote),
                Err(e) => {
                    warn_fallback(OP, &e);
                    SyncStatus::degraded(OP, &e)
                }
            },
            Backing::Local(reason) => SyncStatus::for_local(&reason, OP),
        };

        let result = async {
            let mut sims: Vec<SimulationResult> = self.read_collection(SIMULATIONS_KEY, OP).await?;
            let before = sims.len();
            sims.retain(|s| s.id != id);
            if sims.len() != before {
                self.write_collection(SIMULATIONS_KEY, &sims).await?;
            }
            Ok::<_, anyhow::Error>(())
        }
        .await;

        match result {
            Ok(()) => Outcome::new((), sync),
            Err(e) => local_failed(OP, &e, ()),
        }
    }

    async fn local_upsert_simulation(&self, result: &SimulationResult) -> Result<()> {
        let mut sims: Vec<SimulationResult> = self
            .read_collection(SIMULATIONS_KEY, "save_simulation")
            .await?;
        match sims.iter().position(|s| s.id == result.id) {
            Some(i) => sims[i] = result.clone(),
            None => sims.insert(0, result.clone()),
        }
        self.write_collection(SIMULATIONS_KEY, &sims).await
    }

    // ============ Uploads (local only) ============

    /// All uploaded files, most recent first.
    pub async fn list_uploads(&self) -> Outcome<Vec<UploadedFile>> {
        self.local_list(UPLOADS_KEY, "list_uploads", SyncStatus::Local)
            .await
    }

    /// Record an upload. A file whose display name is already present is
    /// silently ignored; the value reports whether the record was stored.
    pub async fn save_upload(&self, file: &UploadedFile) -> Outcome<bool> {
        const OP: &str = "save_upload";
        let result = async {
            let mut uploads: Vec<UploadedFile> = self.read_collection(UPLOADS_KEY, OP).await?;
            if uploads.iter().any(|u| u.name == file.name) {
                debug!(name = %file.name, "upload with this name already recorded; ignoring");
                return Ok(false);
            }
            uploads.insert(0, file.clone());
            self.write_collection(UPLOADS_KEY, &uploads).await?;
            Ok::<_, anyhow::Error>(true)
        }
        .await;

        match result {
            Ok(stored) => Outcome::new(stored, SyncStatus::Local),
            Err(e) => local_failed(OP, &e, false),
        }
    }

    /// Remove an upload record by id. Absent ids are a no-op.
    pub async fn delete_upload(&self, id: i64) -> Outcome<()> {
        const OP: &str = "delete_upload";
        let result = async {
            let mut uploads: Vec<UploadedFile> = self.read_collection(UPLOADS_KEY, OP).await?;
            let before = uploads.len();
            uploads.retain(|u| u.id != id);
            if uploads.len() != before {
                self.write_collection(UPLOADS_KEY, &uploads).await?;
            }
            Ok::<_, anyhow::Error>(())
        }
        .await;

        match result {
            Ok(()) => Outcome::new((), SyncStatus::Local),
            Err(e) => local_failed(OP, &e, ()),
        }
    }

    // ============ Analyses ============

    /// Cache an analysis locally (overwriting any entry for the same file
    /// name), then append it remotely when signed in.
    ///
    /// A remote failure does not roll back the local write.
    pub async fn save_analysis(&self, result: &AnalysisResult) -> Outcome<()> {
        const OP: &str = "save_analysis";
        let local = match serde_json::to_string(result) {
            Ok(json) => self
                .local
                .set_item(&analysis_key(&result.file_name), &json)
                .await
                .with_context(|| format!("writing local analysis for {}", result.file_name)),
            Err(e) => Err(e.into()),
        };

        let sync = match self.resolve_backing_store(OP).await {
            Backing::Remote { store, session } => {
                let row = AnalysisRow::for_insert(result, &session.user_id);
                match store.insert_analysis(&row).await {
                    Ok(()) => SyncStatus::Remote,
                    Err(e) => {
                        warn!(operation = OP, error = %format!("{:#}", e), "remote analysis insert failed; kept local copy only");
                        SyncStatus::degraded(OP, &e)
                    }
                }
            }
            Backing::Local(reason) => SyncStatus::for_local(&reason, OP),
        };

        match local {
            Ok(()) => Outcome::new((), sync),
            Err(e) => local_failed(OP, &e, ()),
        }
    }

    /// Remote analysis history for the signed-in user.
    ///
    /// Empty when unconfigured, in guest mode, or on failure. Locally cached
    /// analyses are not included; use [`get_analysis`](Self::get_analysis).
    pub async fn list_analyses(&self) -> Outcome<Vec<AnalysisResult>> {
        const OP: &str = "list_analyses";
        match self.resolve_backing_store(OP).await {
            Backing::Remote { store, session } => {
                match store.list_analyses(&session.user_id).await {
                    Ok(rows) => Outcome::new(
                        rows.into_iter().map(AnalysisResult::from).collect(),
                        SyncStatus::Remote,
                    ),
                    Err(e) => {
                        warn!(operation = OP, error = %format!("{:#}", e), "remote analysis listing failed; returning empty");
                        Outcome::new(Vec::new(), SyncStatus::degraded(OP, &e))
                    }
                }
            }
            Backing::Local(reason) => Outcome::new(Vec::new(), SyncStatus::for_local(&reason, OP)),
        }
    }

    /// The locally cached analysis for exactly `file_name`.
    pub async fn get_analysis(&self, file_name: &str) -> Outcome<Option<AnalysisResult>> {
        const OP: &str = "get_analysis";
        match self.local.get_item(&analysis_key(file_name)).await {
            Ok(Some(raw)) => match serde_json::from_str::<AnalysisResult>(&raw) {
                Ok(analysis) => Outcome::new(Some(analysis), SyncStatus::Local),
                Err(e) => {
                    warn!(operation = OP, file_name, error = %e, "corrupt local analysis; treating as absent");
                    Outcome::new(None, SyncStatus::Local)
                }
            },
            Ok(None) => Outcome::new(None, SyncStatus::Local),
            Err(e) => local_failed(OP, &e, None),
        }
    }

    // ============ Local collection helpers ============

    async fn local_list<T: DeserializeOwned>(
        &self,
        key: &str,
        operation: &str,
        sync: SyncStatus,
    ) -> Outcome<Vec<T>> {
        match self.read_collection(key, operation).await {
            Ok(items) => Outcome::new(items, sync),
            Err(e) => local_failed(operation, &e, Vec::new()),
        }
    }

    /// Decode a JSON array stored under `key`.
    ///
    /// Absent keys and undecodable contents read as empty; only a storage
    /// failure is an error.
    async fn read_collection<T: DeserializeOwned>(
        &self,
        key: &str,
        operation: &str,
    ) -> Result<Vec<T>> {
        let raw = self
            .local
            .get_item(key)
            .await
            .with_context(|| format!("reading local key {}", key))?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!(operation, key, error = %e, "corrupt local collection; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn write_collection<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.local
            .set_item(key, &json)
            .await
            .with_context(|| format!("writing local key {}", key))
    }
}

fn warn_fallback(operation: &str, err: &anyhow::Error) {
    warn!(operation, error = %format!("{:#}", err), "remote store call failed; falling back to local store");
}

fn local_failed<T>(operation: &str, err: &anyhow::Error, empty: T) -> Outcome<T> {
    warn!(operation, error = %format!("{:#}", err), "local store call failed");
    Outcome::new(
        empty,
        SyncStatus::LocalFailed {
            operation: operation.to_string(),
            reason: format!("{:#}", err),
        },
    )
}
