//! Process-wide collaborators, built once from [`Config`].

use anyhow::Result;
use policy_sim_core::hybrid::HybridStore;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::{create_client, DisabledClient, LlmClient};
use crate::object_storage::ObjectStorage;
use crate::sqlite_storage::SqliteLocalStorage;
use crate::supabase::SupabaseClient;
use crate::workflow::Workflow;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<HybridStore>,
    pub objects: Option<Arc<ObjectStorage>>,
    pub workflow: Arc<Workflow>,
}

impl AppContext {
    /// Open the local database and construct the remote, LLM and object
    /// storage clients.
    ///
    /// A missing LLM key or AWS credentials do not fail construction: the
    /// affected operations fail when used instead.
    pub async fn from_config(config: Config) -> Result<Self> {
        let local = Arc::new(SqliteLocalStorage::open(&config).await?);
        let mut store = HybridStore::new(local);

        if config.remote.is_configured() {
            let client = Arc::new(SupabaseClient::from_config(&config.remote)?);
            store = store.with_remote(client.clone(), client);
            debug!("remote store configured");
        }

        let llm: Arc<dyn LlmClient> = match create_client(&config.llm) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "LLM client unavailable");
                Arc::new(DisabledClient::because(format!("LLM client unavailable: {:#}", e)))
            }
        };

        let objects = match &config.storage {
            Some(storage) => match ObjectStorage::from_config(storage) {
                Ok(objects) => Some(Arc::new(objects)),
                Err(e) => {
                    warn!(error = %e, "object storage unavailable");
                    None
                }
            },
            None => None,
        };

        Ok(Self::new(config, Arc::new(store), llm, objects))
    }

    /// Assemble a context from already-built collaborators.
    pub fn new(
        config: Config,
        store: Arc<HybridStore>,
        llm: Arc<dyn LlmClient>,
        objects: Option<Arc<ObjectStorage>>,
    ) -> Self {
        let workflow = Arc::new(Workflow::new(
            store.clone(),
            llm,
            objects.clone(),
            config.ids.scheme,
            config.llm.max_document_chars,
        ));
        Self {
            config,
            store,
            objects,
            workflow,
        }
    }
}
