use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{
    BranchOutcome, DirEntry, EntryKind, PullRequest, PutFile, PutOutcome, RemoteTree,
    ResourceClient, TreeNode,
};
use crate::errors::ResourceError;
use crate::throttle::{Throttle, rate_limit_wait};

pub const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server tokens
    "ghr_",        // GitHub App refresh tokens
];

/// Validate that a string looks like a GitHub token based on its prefix.
///
/// Format check only; it says nothing about whether the token is active or scoped.
pub fn is_valid_github_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    GITHUB_TOKEN_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// Connection settings for `GitHubClient`.
#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub api_url: String,
    pub token: Option<String>,
    pub user_agent: String,
    /// Minimum spacing between two API calls.
    pub request_delay: Duration,
    /// Upper bound on a rate-limit pause.
    pub max_rate_limit_wait: Duration,
    pub timeout: Duration,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            token: None,
            user_agent: "hiro".to_string(),
            request_delay: Duration::from_millis(1000),
            max_rate_limit_wait: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
}

/// The contents endpoint answers with an array for directories and an object for files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentItem>),
    Single(ContentItem),
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

/// `ResourceClient` over the GitHub REST API.
///
/// Every request passes through a shared `Throttle`; rate-limit headers on
/// responses feed back into it.
pub struct GitHubClient {
    client: reqwest::Client,
    settings: GitHubSettings,
    throttle: Throttle,
}

impl GitHubClient {
    pub fn new(settings: GitHubSettings) -> Result<Self, ResourceError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(ResourceError::Transport)?;
        let throttle = Throttle::new(settings.request_delay, settings.max_rate_limit_wait);
        Ok(Self {
            client,
            settings: GitHubSettings {
                api_url: settings.api_url.trim_end_matches('/').to_string(),
                ..settings
            },
            throttle,
        })
    }

    fn repo_url(&self, owner_repo: &str, rest: &str) -> String {
        if rest.is_empty() {
            format!("{}/repos/{}", self.settings.api_url, owner_repo)
        } else {
            format!("{}/repos/{}/{}", self.settings.api_url, owner_repo, rest)
        }
    }

    /// Contents endpoint for `path`, each segment percent-encoded (`#`, `?` and `%`
    /// are legal in GitHub file names).
    fn contents_url(&self, owner_repo: &str, path: &str) -> Result<Url, ResourceError> {
        let base = self.repo_url(owner_repo, "contents");
        let invalid = |message: String| ResourceError::Decode {
            what: base.clone(),
            message,
        };
        let mut url = Url::parse(&base).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("API URL cannot carry a path".to_string()))?
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        match &self.settings.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Send through the throttle and record rate-limit headers.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ResourceError> {
        self.throttle.acquire().await;
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(ResourceError::Transport)?;

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        if let Some(wait) = rate_limit_wait(
            header("x-ratelimit-remaining").as_deref(),
            header("x-ratelimit-reset").as_deref(),
            chrono::Utc::now().timestamp(),
        ) {
            self.throttle.pause_for(wait).await;
        }

        tracing::debug!(url = %response.url(), status = response.status().as_u16(), "github response");
        Ok(response)
    }

    /// Map non-success statuses onto `ResourceError`.
    async fn check(response: Response, what: &str) -> Result<Response, ResourceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ApiMessage>()
            .await
            .map(|m| m.message)
            .unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => ResourceError::NotFound {
                path: what.to_string(),
            },
            StatusCode::CONFLICT => ResourceError::Conflict {
                path: what.to_string(),
                message,
            },
            _ => ResourceError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T, ResourceError> {
        response.json::<T>().await.map_err(|e| ResourceError::Decode {
            what: what.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_ref_sha(&self, owner_repo: &str, branch: &str) -> Result<Option<String>, ResourceError> {
        let what = format!("heads/{}", branch);
        let response = self
            .send(self.client.get(self.repo_url(owner_repo, &format!("git/ref/{}", what))))
            .await?;
        match Self::check(response, &what).await {
            Ok(response) => {
                let git_ref: RefResponse = Self::json(response, &what).await?;
                Ok(Some(git_ref.object.sha))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Decode a base64 payload as returned by the contents API (line-wrapped).
pub fn decode_base64_content(encoded: &str, what: &str) -> Result<String, ResourceError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact).map_err(|e| ResourceError::Decode {
        what: what.to_string(),
        message: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|_| ResourceError::Decode {
        what: what.to_string(),
        message: "content is not valid UTF-8".to_string(),
    })
}

#[async_trait]
impl ResourceClient for GitHubClient {
    async fn list_entries(&self, owner_repo: &str, path: &str) -> Result<Vec<DirEntry>, ResourceError> {
        let what = if path.is_empty() { "/" } else { path };
        let response = self
            .send(self.client.get(self.contents_url(owner_repo, path)?))
            .await?;
        let response = Self::check(response, what).await?;
        let items = match Self::json::<ContentsResponse>(response, what).await? {
            ContentsResponse::Listing(items) => items,
            ContentsResponse::Single(item) => vec![item],
        };
        Ok(items
            .into_iter()
            .map(|item| DirEntry {
                name: item.name,
                path: item.path,
                kind: item.kind,
            })
            .collect())
    }

    async fn default_branch(&self, owner_repo: &str) -> Result<String, ResourceError> {
        let response = self.send(self.client.get(self.repo_url(owner_repo, ""))).await?;
        let response = Self::check(response, owner_repo).await?;
        let repo: RepoResponse = Self::json(response, owner_repo).await?;
        Ok(repo.default_branch)
    }

    async fn tree(&self, owner_repo: &str, branch: &str) -> Result<RemoteTree, ResourceError> {
        let response = self
            .send(
                self.client
                    .get(self.repo_url(owner_repo, &format!("git/trees/{}", branch)))
                    .query(&[("recursive", "1")]),
            )
            .await?;
        let response = Self::check(response, branch).await?;
        let tree: TreeResponse = Self::json(response, branch).await?;
        Ok(RemoteTree {
            nodes: tree
                .tree
                .into_iter()
                .map(|item| TreeNode {
                    path: item.path,
                    kind: item.kind,
                })
                .collect(),
            truncated: tree.truncated,
        })
    }

    async fn file_content(&self, owner_repo: &str, path: &str) -> Result<String, ResourceError> {
        let response = self
            .send(self.client.get(self.contents_url(owner_repo, path)?))
            .await?;
        let response = Self::check(response, path).await?;
        let file: FileResponse = Self::json(response, path).await?;
        match (file.content, file.encoding.as_deref()) {
            (Some(content), Some("base64")) => decode_base64_content(&content, path),
            _ => Err(ResourceError::Decode {
                what: path.to_string(),
                message: format!("Could not get content for file: {}", path),
            }),
        }
    }

    async fn revision_marker(
        &self,
        owner_repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>, ResourceError> {
        let response = self
            .send(
                self.client
                    .get(self.contents_url(owner_repo, path)?)
                    .query(&[("ref", branch)]),
            )
            .await?;
        match Self::check(response, path).await {
            Ok(response) => {
                let file: FileResponse = Self::json(response, path).await?;
                Ok(Some(file.sha))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_branch(
        &self,
        owner_repo: &str,
        branch: &str,
        base: &str,
    ) -> Result<BranchOutcome, ResourceError> {
        if self.get_ref_sha(owner_repo, branch).await?.is_some() {
            return Ok(BranchOutcome::AlreadyExists);
        }
        let base_sha = self
            .get_ref_sha(owner_repo, base)
            .await?
            .ok_or_else(|| ResourceError::NotFound {
                path: format!("heads/{}", base),
            })?;

        let body = CreateRefRequest {
            git_ref: format!("refs/heads/{}", branch),
            sha: &base_sha,
        };
        let response = self
            .send(self.client.post(self.repo_url(owner_repo, "git/refs")).json(&body))
            .await?;
        match Self::check(response, branch).await {
            Ok(_) => Ok(BranchOutcome::Created),
            // Lost a race with another creator.
            Err(ResourceError::Api { status: 422, message }) if message.contains("already exists") => {
                Ok(BranchOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    async fn put_file(&self, owner_repo: &str, file: &PutFile<'_>) -> Result<PutOutcome, ResourceError> {
        let body = PutContentsRequest {
            message: file.message,
            content: BASE64.encode(file.content),
            branch: file.branch,
            sha: file.revision,
        };
        let response = self
            .send(self.client.put(self.contents_url(owner_repo, file.path)?).json(&body))
            .await?;
        let status = response.status();
        match Self::check(response, file.path).await {
            Ok(_) if status == StatusCode::CREATED => Ok(PutOutcome::Created),
            Ok(_) => Ok(PutOutcome::Updated),
            // GitHub reports a missing or stale sha as 422.
            Err(ResourceError::Api { status: 422, message }) => Err(ResourceError::Conflict {
                path: file.path.to_string(),
                message,
            }),
            Err(e) => Err(e),
        }
    }

    async fn create_pull_request(
        &self,
        owner_repo: &str,
        pr: &PullRequest<'_>,
    ) -> Result<String, ResourceError> {
        let body = CreatePullRequest {
            title: pr.title,
            head: pr.head,
            base: pr.base,
            body: pr.body,
        };
        let response = self
            .send(self.client.post(self.repo_url(owner_repo, "pulls")).json(&body))
            .await?;
        let response = Self::check(response, "pulls").await?;
        let pull: PullResponse = Self::json(response, "pulls").await?;
        Ok(pull.html_url)
    }
}
