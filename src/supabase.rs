//! Supabase client: PostgREST tables plus the GoTrue session probe.
//!
//! Implements [`RemoteStore`] over the `simulations` and `analyses` tables
//! and [`SessionProbe`] over `GET /auth/v1/user`.
//!
//! Every request carries the project `apikey` header and a bearer token:
//! the session access token when one is configured, otherwise the anon key.
//! Row-level security on the project scopes rows to the token's user.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use policy_sim_core::models::{AnalysisRow, SimulationRow};
use policy_sim_core::store::{RemoteStore, Session, SessionProbe};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::RemoteConfig;

const SIMULATIONS_TABLE: &str = "simulations";
const ANALYSES_TABLE: &str = "analyses";

pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

impl SupabaseClient {
    /// Build a client from `[remote]`. Fails when the section is unconfigured.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let base_url = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("remote.url is not configured"))?;
        let anon_key = config
            .anon_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("remote.anon_key is not configured"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: config.resolved_access_token(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        req.header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    async fn list_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        user_id: &str,
    ) -> Result<Vec<T>> {
        let user_filter = format!("eq.{}", user_id);
        let resp = self
            .authorized(self.client.get(self.table_url(table)))
            .query(&[
                ("select", "*"),
                ("user_id", user_filter.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await
            .with_context(|| format!("GET {} failed", table))?;
        let resp = check(resp, table).await?;
        let rows = resp
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("Invalid {} rows", table))?;
        debug!(table, count = rows.len(), "listed remote rows");
        Ok(rows)
    }
}

/// Turn a non-2xx PostgREST response into an error carrying its body.
async fn check(resp: Response, table: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("Supabase {} error {}: {}", table, status, body)
}

#[async_trait]
impl RemoteStore for SupabaseClient {
    async fn list_simulations(&self, user_id: &str) -> Result<Vec<SimulationRow>> {
        self.list_rows(SIMULATIONS_TABLE, user_id).await
    }

    async fn upsert_simulation(&self, row: &SimulationRow) -> Result<()> {
        let resp = self
            .authorized(self.client.post(self.table_url(SIMULATIONS_TABLE)))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await
            .context("upsert simulation failed")?;
        check(resp, SIMULATIONS_TABLE).await?;
        Ok(())
    }

    async fn delete_simulation(&self, id: &str) -> Result<()> {
        let id_filter = format!("eq.{}", id);
        let resp = self
            .authorized(self.client.delete(self.table_url(SIMULATIONS_TABLE)))
            .query(&[("id", id_filter.as_str())])
            .send()
            .await
            .context("delete simulation failed")?;
        check(resp, SIMULATIONS_TABLE).await?;
        Ok(())
    }

    async fn insert_analysis(&self, row: &AnalysisRow) -> Result<()> {
        let resp = self
            .authorized(self.client.post(self.table_url(ANALYSES_TABLE)))
            .header("Prefer", "return=minimal")
            .json(&[row])
            .send()
            .await
            .context("insert analysis failed")?;
        check(resp, ANALYSES_TABLE).await?;
        Ok(())
    }

    async fn list_analyses(&self, user_id: &str) -> Result<Vec<AnalysisRow>> {
        self.list_rows(ANALYSES_TABLE, user_id).await
    }
}

#[async_trait]
impl SessionProbe for SupabaseClient {
    async fn current_session(&self) -> Result<Option<Session>> {
        let Some(token) = &self.access_token else {
            return Ok(None);
        };

        let resp = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .context("session probe failed")?;

        match resp.status() {
            s if s.is_success() => {
                let user: AuthUser = resp.json().await.context("Invalid auth user response")?;
                Ok(Some(Session { user_id: user.id }))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("access token rejected; treating as guest");
                Ok(None)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                bail!("Supabase auth error {}: {}", status, body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(url: Option<&str>, key: Option<&str>) -> RemoteConfig {
        RemoteConfig {
            url: url.map(String::from),
            anon_key: key.map(String::from),
            access_token: Some("tok".to_string()),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_requires_url_and_key() {
        assert!(SupabaseClient::from_config(&remote(None, Some("k"))).is_err());
        assert!(SupabaseClient::from_config(&remote(Some("https://p.supabase.co"), None)).is_err());
    }

    #[test]
    fn test_table_url_strips_trailing_slash() {
        let client =
            SupabaseClient::from_config(&remote(Some("https://p.supabase.co/"), Some("k"))).unwrap();
        assert_eq!(
            client.table_url("simulations"),
            "https://p.supabase.co/rest/v1/simulations"
        );
    }
}
