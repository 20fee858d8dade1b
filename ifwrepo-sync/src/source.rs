//! Release source adapter: upstream release listings and asset selection.
//!
//! [`ReleaseSource`] is the seam to the upstream API. [`GithubSource`] talks
//! to a GitHub-compatible `GET /repos/<owner>/<name>/releases` endpoint with a
//! blocking `ureq` agent; callers run it on the blocking pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ifwrepo_core::{PlatformTag, Release, SourceConfig};

use crate::error::SyncError;

/// One release as listed upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRelease {
    pub tag_name: String,
    /// `null` for drafts, which are never eligible.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<UpstreamAsset>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamAsset {
    pub name: String,
    pub size: u64,
}

/// Anything that can list the releases of an upstream repository.
///
/// Implementations may block; the orchestrator calls them from
/// `spawn_blocking` under a timeout.
pub trait ReleaseSource: Send + Sync + 'static {
    /// Releases in upstream order, newest first by convention.
    fn fetch_releases(&self, repo: &str) -> Result<Vec<UpstreamRelease>, SyncError>;
}

// ---------------------------------------------------------------------------
// GithubSource
// ---------------------------------------------------------------------------

/// GitHub releases API client.
pub struct GithubSource {
    agent: ureq::Agent,
    api_base: String,
    token: Option<String>,
}

impl GithubSource {
    /// Build a client from config. The bearer token, if any, is read from the
    /// environment variable named by `token_env` once, here.
    pub fn new(config: &SourceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build();
        let token = config
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.trim().is_empty());
        GithubSource {
            agent,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            token,
        }
    }

    /// `<api_base>/repos/<repo>/releases`
    pub fn releases_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/releases", self.api_base, repo)
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

impl ReleaseSource for GithubSource {
    fn fetch_releases(&self, repo: &str) -> Result<Vec<UpstreamRelease>, SyncError> {
        let url = self.releases_url(repo);
        tracing::debug!(%url, "fetching releases");

        let mut request = self
            .agent
            .get(&url)
            .query("per_page", "100")
            .set("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        let fetch_err = |reason: String| SyncError::Fetch {
            repo: repo.to_owned(),
            reason,
        };
        let response = request.call().map_err(|e| fetch_err(e.to_string()))?;
        let body = response
            .into_string()
            .map_err(|e| fetch_err(format!("reading body: {e}")))?;
        serde_json::from_str(&body).map_err(|source| SyncError::MalformedReleases {
            repo: repo.to_owned(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Pick the first asset, in upstream order, whose name contains `platform`
/// and ends with `suffix`.
///
/// Releases are not re-sorted. `Ok(None)` means the platform has no eligible
/// release yet, which is not an error.
pub fn select_asset(
    releases: &[UpstreamRelease],
    platform: &PlatformTag,
    suffix: &str,
) -> Result<Option<Release>, SyncError> {
    for release in releases {
        let Some(published_at) = release.published_at else {
            continue;
        };
        let found = release
            .assets
            .iter()
            .find(|a| a.name.contains(platform.0.as_str()) && a.name.ends_with(suffix));
        if let Some(asset) = found {
            return Ok(Some(Release {
                version: parse_version(&release.tag_name)?,
                published: published_at.date_naive(),
                asset_name: asset.name.clone(),
                asset_size: asset.size,
                commit: release.tag_name.clone(),
            }));
        }
    }
    Ok(None)
}

/// Second `-`-separated segment of a tag: `nightly-1234` → `1234`.
pub fn parse_version(tag: &str) -> Result<String, SyncError> {
    tag.split('-')
        .nth(1)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| SyncError::MalformedTag {
            tag: tag.to_owned(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
