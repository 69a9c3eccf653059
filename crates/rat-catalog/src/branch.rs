//! Nessie v2 branch lifecycle: create, merge, delete ephemeral pipeline
//! branches against the `main` branch.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rat_core::NessieConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::CatalogError;
use crate::retry::retry_on_transient;

fn safe_branch_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap())
}

fn validate_branch_name(name: &str) -> Result<(), CatalogError> {
    if name.is_empty() || !safe_branch_name_re().is_match(name) || name.contains("..") {
        return Err(CatalogError::InvalidBranchName(name.to_string()));
    }
    Ok(())
}

fn encode_branch(name: &str) -> Result<String, CatalogError> {
    validate_branch_name(name)?;
    Ok(utf8_percent_encode(name, NON_ALPHANUMERIC).to_string())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NessieReference {
    pub name: String,
    pub hash: String,
}

/// Thin REST client over the Nessie v2 tree API, scoped to branch lifecycle.
pub struct NessieClient {
    config: NessieConfig,
    http: reqwest::Client,
}

impl NessieClient {
    pub fn new(config: NessieConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub(crate) fn config(&self) -> &NessieConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn get_reference_once(&self, branch_name: &str) -> Result<NessieReference, CatalogError> {
        let encoded = encode_branch(branch_name)?;
        let url = format!("{}/trees/{encoded}", self.config.api_v2_url());
        let resp = self
            .http
            .get(&url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await?;
        handle_response(resp).await
    }

    pub async fn get_reference(&self, branch_name: &str) -> Result<NessieReference, CatalogError> {
        retry_on_transient("get_reference", || self.get_reference_once(branch_name)).await
    }

    /// Create a branch from `from_branch` (default expected to be `main`).
    /// Idempotent: if the branch already exists (409), returns its current hash.
    pub async fn create_branch(&self, branch_name: &str, from_branch: &str) -> Result<String, CatalogError> {
        validate_branch_name(branch_name)?;
        validate_branch_name(from_branch)?;

        retry_on_transient("create_branch", || async {
            let source = self.get_reference(from_branch).await?;
            let url = format!("{}/trees", self.config.api_v2_url());
            let payload = serde_json::json!({
                "type": "BRANCH",
                "name": branch_name,
                "reference": {
                    "type": "BRANCH",
                    "name": from_branch,
                    "hash": source.hash,
                },
            });
            let resp = self
                .http
                .post(&url)
                .json(&payload)
                .timeout(std::time::Duration::from_secs(10))
                .send()
                .await?;

            if resp.status().as_u16() == 409 {
                let existing = self.get_reference(branch_name).await?;
                return Ok(existing.hash);
            }
            let reference: NessieReference = handle_response(resp).await?;
            Ok(reference.hash)
        })
        .await
    }

    pub async fn merge_branch(&self, source: &str, target: &str) -> Result<(), CatalogError> {
        retry_on_transient("merge_branch", || async {
            let source_ref = self.get_reference(source).await?;
            let encoded_target = encode_branch(target)?;
            let url = format!("{}/trees/{encoded_target}/history/merge", self.config.api_v2_url());
            let payload = serde_json::json!({
                "fromRefName": source,
                "fromHash": source_ref.hash,
            });
            let resp = self
                .http
                .post(&url)
                .json(&payload)
                .timeout(std::time::Duration::from_secs(10))
                .send()
                .await?;
            let _: serde_json::Value = handle_response(resp).await?;
            Ok(())
        })
        .await
    }

    /// Delete a branch. Tolerates 404 (already deleted) and is never retried
    /// on its own — a retry here could delete a branch re-created by a racing
    /// caller under the same name.
    pub async fn delete_branch(&self, branch_name: &str) -> Result<(), CatalogError> {
        let reference = match self.get_reference(branch_name).await {
            Ok(r) => r,
            Err(CatalogError::Api { status: 404, .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        let encoded = encode_branch(branch_name)?;
        let url = format!(
            "{}/trees/{encoded}?expected-hash={}",
            self.config.api_v2_url(),
            reference.hash
        );
        let resp = self
            .http
            .delete(&url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await?;
        if resp.status().as_u16() == 404 || resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(CatalogError::Api { status, body })
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, CatalogError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(CatalogError::Api {
            status: status.as_u16(),
            body,
        });
    }
    resp.json::<T>().await.map_err(CatalogError::Request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_branch_names_with_path_traversal() {
        assert!(validate_branch_name("../etc/passwd").is_err());
        assert!(validate_branch_name("feature/foo bar").is_err());
        assert!(validate_branch_name("run-2026-07-28_abcd1234").is_ok());
    }

    #[test]
    fn encodes_branch_name_for_url_path_segment() {
        let encoded = encode_branch("run-2026-07-28").unwrap();
        assert_eq!(encoded, "run-2026-07-28");
    }
}
