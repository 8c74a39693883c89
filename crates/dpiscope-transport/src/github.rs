//! # Published schema history
//!
//! Revisions are commits of the checker repository. The layout and the roster
//! in effect at a revision are read from the raw file host at that commit.

use async_trait::async_trait;
use dpiscope_core::{
    ProbeTarget, RegistryConfig, RegistryError, Revision, RevisionSource, SchemaLayout,
    SchemaRegistry, SchemaSnapshot,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

const USER_AGENT: &str = concat!("dpi-scope/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

/// Client for the JSON APIs (GitHub, RIPEstat). GitHub rejects requests without a user agent.
pub fn api_client() -> Result<reqwest::Client, RegistryError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(fetch)
}

fn fetch(e: reqwest::Error) -> RegistryError {
    RegistryError::Fetch(e.to_string())
}

/// `GET url` decoded as JSON. 404 and 422 become `NotFound(revision)`.
async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    revision: Option<Revision>,
) -> Result<T, RegistryError> {
    let response = client.get(url).send().await.map_err(fetch)?;
    let status = response.status();
    if let Some(rev) = revision {
        if status == StatusCode::NOT_FOUND || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(RegistryError::NotFound(rev));
        }
    }
    if !status.is_success() {
        return Err(RegistryError::Fetch(format!("{} returned HTTP {}", url, status)));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| RegistryError::Invalid(format!("{}: {}", url, e)))
}

/// Latest commit of the configured repository.
pub struct GithubRevisionSource {
    client: reqwest::Client,
    config: Arc<RegistryConfig>,
}

impl GithubRevisionSource {
    pub fn new(client: reqwest::Client, config: Arc<RegistryConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl RevisionSource for GithubRevisionSource {
    async fn latest(&self) -> Result<Revision, RegistryError> {
        let url = format!(
            "{}/repos/{}/commits?per_page=1",
            self.config.api_url.trim_end_matches('/'),
            self.config.repo
        );
        let commits: Vec<CommitRef> = get_json(&self.client, &url, None).await?;
        let head = commits
            .first()
            .ok_or_else(|| RegistryError::Fetch(format!("{} has no commits", self.config.repo)))?;

        let revision = Revision::from_commit_sha(&head.sha)?;
        tracing::debug!("registry: latest revision {}", revision);
        Ok(revision)
    }
}

/// Resolves a revision to the layout and roster committed at it.
///
/// Wrap in `CachingRegistry`: every resolve costs three HTTP round trips.
pub struct GithubRegistry {
    client: reqwest::Client,
    config: Arc<RegistryConfig>,
}

impl GithubRegistry {
    pub fn new(client: reqwest::Client, config: Arc<RegistryConfig>) -> Self {
        Self { client, config }
    }

    fn raw_url(&self, sha: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.raw_url.trim_end_matches('/'),
            self.config.repo,
            sha,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl SchemaRegistry for GithubRegistry {
    async fn resolve(&self, revision: &Revision) -> Result<Arc<SchemaSnapshot>, RegistryError> {
        // The revision is a 32-digit prefix; the API expands it to the full commit.
        let url = format!(
            "{}/repos/{}/commits/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.repo,
            revision.to_hex()
        );
        let commit: CommitRef = get_json(&self.client, &url, Some(*revision)).await?;

        let layout: SchemaLayout = get_json(
            &self.client,
            &self.raw_url(&commit.sha, &self.config.layout_path),
            Some(*revision),
        )
        .await?;
        layout.validate()?;

        let roster: Vec<ProbeTarget> = get_json(
            &self.client,
            &self.raw_url(&commit.sha, &self.config.roster_path),
            Some(*revision),
        )
        .await?;

        tracing::info!(
            "registry: resolved revision {} ({} targets)",
            revision,
            roster.len()
        );
        Ok(Arc::new(SchemaSnapshot::new(*revision, layout, roster)))
    }
}
