//! Document → analysis → simulation workflow.
//!
//! [`Workflow`] ties the collaborators together: object storage for the
//! uploaded bytes, the LLM for extraction and forecasting, and the
//! [`HybridStore`] for every record it produces. All of them are injected,
//! so tests can swap in in-memory stores and scripted LLM clients.

use anyhow::{bail, Context, Result};
use policy_sim_core::hybrid::{HybridStore, Outcome};
use policy_sim_core::ids::{self, IdScheme};
use policy_sim_core::models::{
    now_iso, AnalysisResult, SimulationResult, SimulationStatus, UploadStatus, UploadedFile,
};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::extract::{detect_content_type, extract_text};
use crate::llm::LlmClient;
use crate::object_storage::ObjectStorage;
use crate::prompts::{self, levers_from_analysis, resolve_levers};

/// Result of registering an upload.
#[derive(Debug, Clone, Serialize)]
pub struct Uploaded {
    pub file: UploadedFile,
    /// `false` when a file with the same name was already registered.
    pub created: bool,
}

pub struct Workflow {
    store: Arc<HybridStore>,
    llm: Arc<dyn LlmClient>,
    objects: Option<Arc<ObjectStorage>>,
    id_scheme: IdScheme,
    max_document_chars: usize,
}

impl Workflow {
    pub fn new(
        store: Arc<HybridStore>,
        llm: Arc<dyn LlmClient>,
        objects: Option<Arc<ObjectStorage>>,
        id_scheme: IdScheme,
        max_document_chars: usize,
    ) -> Self {
        Self {
            store,
            llm,
            objects,
            id_scheme,
            max_document_chars,
        }
    }

    pub fn store(&self) -> &HybridStore {
        &self.store
    }

    /// Read a document from disk, push it to object storage when configured,
    /// and record it as an upload.
    ///
    /// A name that is already registered is left alone: nothing is pushed,
    /// so the stored object keeps the first upload's bytes.
    pub async fn upload_document(&self, path: &Path) -> Result<Outcome<Uploaded>> {
        let name = file_name(path)?;

        let existing = self.store.list_uploads().await;
        if let Some(file) = existing.value.into_iter().find(|f| f.name == name) {
            debug!(name, "upload already registered; skipping");
            return Ok(Outcome::new(
                Uploaded {
                    file,
                    created: false,
                },
                existing.sync,
            ));
        }

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let size = bytes.len() as u64;

        let source = match &self.objects {
            Some(objects) => {
                let key = objects.object_key(&name);
                objects
                    .put_object(&key, bytes, detect_content_type(&name))
                    .await?;
                objects.object_url(&key)
            }
            None => path.display().to_string(),
        };

        Ok(self.register_upload(&name, size, &source).await)
    }

    /// Record upload metadata without touching any bytes.
    pub async fn register_upload(
        &self,
        name: &str,
        size_bytes: u64,
        source: &str,
    ) -> Outcome<Uploaded> {
        let file = UploadedFile {
            id: ids::upload_id(),
            name: name.to_string(),
            source: source.to_string(),
            size: human_size(size_bytes),
            status: UploadStatus::Parsed,
        };
        let outcome = self.store.save_upload(&file).await;
        let created = outcome.value;
        if created {
            info!(name, size = %file.size, "registered upload");
        }
        Outcome::new(Uploaded { file, created }, outcome.sync)
    }

    /// Extract a document's policy structure with the LLM and cache it.
    pub async fn analyze_document(&self, path: &Path) -> Result<Outcome<AnalysisResult>> {
        let name = file_name(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.analyze_bytes(&name, &bytes, detect_content_type(&name))
            .await
    }

    /// Analyze a registered upload, reading its bytes from wherever its
    /// `source` points: object storage for `s3://` sources, the filesystem
    /// otherwise.
    pub async fn analyze_upload(&self, name: &str) -> Result<Outcome<AnalysisResult>> {
        let upload = self
            .store
            .list_uploads()
            .await
            .into_value()
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| anyhow::anyhow!("No upload named {}", name))?;

        let bytes = if upload.source.starts_with("s3://") {
            let objects = self.objects.as_ref().ok_or_else(|| {
                anyhow::anyhow!(
                    "{} is stored at {} but object storage is not configured",
                    name,
                    upload.source
                )
            })?;
            let key = objects.key_from_url(&upload.source)?;
            objects.get_object(&key).await?
        } else {
            tokio::fs::read(&upload.source)
                .await
                .with_context(|| format!("Failed to read {}", upload.source))?
        };

        self.analyze_bytes(name, &bytes, detect_content_type(name))
            .await
    }

    pub async fn analyze_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Outcome<AnalysisResult>> {
        let text = extract_text(bytes, content_type)
            .with_context(|| format!("Failed to extract text from {}", file_name))?;
        if text.trim().is_empty() {
            bail!("No text could be extracted from {}", file_name);
        }

        let prompt = prompts::extraction_prompt(file_name, &text, self.max_document_chars);
        let data = self
            .llm
            .complete_json(prompts::EXTRACTION_SYSTEM, &prompt)
            .await
            .with_context(|| format!("Policy extraction failed for {}", file_name))?;

        let result = AnalysisResult {
            file_name: file_name.to_string(),
            data,
            timestamp: now_iso(),
        };
        let outcome = self.store.save_analysis(&result).await;
        info!(file_name, model = self.llm.model_name(), "saved analysis");
        Ok(Outcome::new(result, outcome.sync))
    }

    /// Forecast outcomes for a previously analyzed document.
    ///
    /// `overrides` replace lever defaults and are clamped into each lever's
    /// range; naming an unknown lever is an error.
    pub async fn run_simulation(
        &self,
        file_name: &str,
        overrides: &[(String, f64)],
        scenario_name: Option<&str>,
    ) -> Result<Outcome<SimulationResult>> {
        let analysis = self
            .store
            .get_analysis(file_name)
            .await
            .into_value()
            .ok_or_else(|| {
                anyhow::anyhow!("No analysis found for {}. Run `lps analyze` first.", file_name)
            })?;

        let levers = levers_from_analysis(&analysis.data);
        let values = resolve_levers(&levers, overrides)?;

        let title = analysis
            .data
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or(file_name)
            .to_string();
        let scenario = scenario_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} baseline", title));

        let prompt = prompts::simulation_prompt(&scenario, &analysis.data, &values);
        let outcome = self
            .llm
            .complete_json(prompts::SIMULATION_SYSTEM, &prompt)
            .await
            .with_context(|| format!("Simulation failed for {}", file_name))?;

        let result = SimulationResult {
            id: ids::simulation_id(self.id_scheme),
            policy_id: ids::policy_id(),
            scenario_name: scenario,
            created_at: now_iso(),
            status: SimulationStatus::Completed,
            data: json!({
                "analysisTitle": title,
                "levers": values,
                "outcome": outcome,
            }),
            user_id: None,
        };
        let saved = self.store.save_simulation(&result).await;
        info!(id = %result.id, scenario = %result.scenario_name, "saved simulation");
        Ok(Outcome::new(result, saved.sync))
    }

    /// Re-save a simulation with a new lifecycle status.
    pub async fn set_simulation_status(
        &self,
        id: &str,
        status: SimulationStatus,
    ) -> Result<Outcome<SimulationResult>> {
        let mut result = self
            .store
            .list_simulations()
            .await
            .into_value()
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow::anyhow!("Simulation not found: {}", id))?;

        result.status = status;
        let saved = self.store.save_simulation(&result).await;
        Ok(Outcome::new(result, saved.sync))
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path.display()))
}

/// Human-readable size with one decimal place, e.g. `"2.4 MB"`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use policy_sim_core::store::memory::InMemoryLocalStorage;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Answers extraction prompts with a fixed analysis and simulation
    /// prompts with a fixed forecast, recording every prompt.
    struct ScriptedLlm {
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete_json(&self, system: &str, prompt: &str) -> Result<Value> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if system == prompts::EXTRACTION_SYSTEM {
                Ok(json!({
                    "title": "Clean Air Act",
                    "summary": "Cuts emissions.",
                    "levers": [
                        { "name": "carbon_tax", "min": 0.0, "max": 200.0, "default": 50.0 }
                    ]
                }))
            } else {
                Ok(json!({ "summary": "Emissions fall 12%." }))
            }
        }
    }

    fn workflow() -> (Workflow, Arc<ScriptedLlm>) {
        let store = Arc::new(HybridStore::new(Arc::new(InMemoryLocalStorage::new())));
        let llm = Arc::new(ScriptedLlm::new());
        let wf = Workflow::new(store, llm.clone(), None, IdScheme::Short, 1000);
        (wf, llm)
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(2_516_582), "2.4 MB");
    }

    #[tokio::test]
    async fn test_register_upload_dedups_by_name() {
        let (wf, _) = workflow();
        let first = wf.register_upload("Act.pdf", 2048, "").await.into_value();
        let second = wf.register_upload("Act.pdf", 4096, "").await.into_value();
        assert!(first.created);
        assert!(!second.created);
        let uploads = wf.store().list_uploads().await.into_value();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].size, "2.0 KB");
    }

    #[tokio::test]
    async fn test_analyze_then_simulate() {
        let (wf, llm) = workflow();
        let analysis = wf
            .analyze_bytes("act.txt", b"The carbon tax is set at 50 EUR/t.", "text/plain")
            .await
            .unwrap()
            .into_value();
        assert_eq!(analysis.data["title"], "Clean Air Act");
        assert!(wf.store().get_analysis("act.txt").await.value.is_some());

        let sim = wf
            .run_simulation("act.txt", &[("carbon_tax".to_string(), 500.0)], Some("High tax"))
            .await
            .unwrap()
            .into_value();
        assert_eq!(sim.scenario_name, "High tax");
        assert_eq!(sim.status, SimulationStatus::Completed);
        assert_eq!(sim.data["levers"]["carbon_tax"], 200.0);
        assert_eq!(sim.data["analysisTitle"], "Clean Air Act");
        assert_eq!(sim.data["outcome"]["summary"], "Emissions fall 12%.");

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("carbon tax is set"));
        assert!(prompts[1].contains("\"carbon_tax\": 200.0"));
    }

    #[tokio::test]
    async fn test_simulation_requires_analysis() {
        let (wf, _) = workflow();
        let err = wf.run_simulation("missing.pdf", &[], None).await.unwrap_err();
        assert!(err.to_string().contains("No analysis found"));
    }

    #[tokio::test]
    async fn test_default_scenario_name_uses_title() {
        let (wf, _) = workflow();
        wf.analyze_bytes("act.md", b"# Act", "text/markdown")
            .await
            .unwrap();
        let sim = wf.run_simulation("act.md", &[], None).await.unwrap().into_value();
        assert_eq!(sim.scenario_name, "Clean Air Act baseline");
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected() {
        let (wf, llm) = workflow();
        let err = wf
            .analyze_bytes("blank.txt", b"   \n", "text/plain")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No text"));
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_simulation_status() {
        let (wf, _) = workflow();
        wf.analyze_bytes("act.txt", b"text", "text/plain").await.unwrap();
        let sim = wf.run_simulation("act.txt", &[], None).await.unwrap().into_value();

        let updated = wf
            .set_simulation_status(&sim.id, SimulationStatus::Deployed)
            .await
            .unwrap()
            .into_value();
        assert_eq!(updated.status, SimulationStatus::Deployed);

        let all = wf.store().list_simulations().await.into_value();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, SimulationStatus::Deployed);

        assert!(wf
            .set_simulation_status("nope", SimulationStatus::Draft)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_duplicate_upload_is_not_reread() {
        let (wf, _) = workflow();
        let tmp = tempfile::TempDir::new().unwrap();
        let first = tmp.path().join("one");
        let second = tmp.path().join("two");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        std::fs::write(first.join("Act.md"), "original").unwrap();

        let created = wf
            .upload_document(&first.join("Act.md"))
            .await
            .unwrap()
            .into_value();
        assert!(created.created);

        // The second path does not exist; a duplicate name never touches it.
        let dup = wf
            .upload_document(&second.join("Act.md"))
            .await
            .unwrap()
            .into_value();
        assert!(!dup.created);
        assert_eq!(dup.file.id, created.file.id);
        assert_eq!(dup.file.source, created.file.source);
    }

    #[tokio::test]
    async fn test_analyze_upload_reads_local_source() {
        let (wf, llm) = workflow();
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("act.md");
        std::fs::write(&path, "# Clean Air Act\n\nA carbon tax is set at $50.").unwrap();
        wf.upload_document(&path).await.unwrap();

        let analysis = wf.analyze_upload("act.md").await.unwrap().into_value();
        assert_eq!(analysis.file_name, "act.md");
        assert!(llm.prompts.lock().unwrap()[0].contains("carbon tax is set"));
        assert!(wf.store().get_analysis("act.md").await.into_value().is_some());
    }

    #[tokio::test]
    async fn test_analyze_upload_errors() {
        let (wf, _) = workflow();
        let err = wf.analyze_upload("missing.pdf").await.unwrap_err();
        assert!(err.to_string().contains("No upload named missing.pdf"));

        wf.register_upload("remote.pdf", 10, "s3://b/uploads/remote.pdf")
            .await;
        let err = wf.analyze_upload("remote.pdf").await.unwrap_err();
        assert!(err.to_string().contains("object storage is not configured"));
    }
}
