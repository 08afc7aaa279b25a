//! Hosting-API capability layer.
//!
//! | Module   | Responsibility                                              |
//! |----------|-------------------------------------------------------------|
//! | `client` | `GitHubClient`: REST adapter over reqwest, throttled       |
//! | `memory` | `MemoryRepository`: in-memory adapter for tests/dry runs   |
//! | `repo`   | URL parsing and the immutable `RepositoryRef`               |
//!
//! The pipeline only talks to the `ResourceClient` trait, so both adapters are
//! interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ResourceError;

pub mod client;
pub mod memory;
pub mod repo;

pub use client::{GitHubClient, GitHubSettings, is_valid_github_token};
pub use memory::MemoryRepository;
pub use repo::{RepositoryRef, parse_owner_repo_from_url};

/// Kind of a directory entry as reported by the hosting API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[serde(alias = "blob")]
    File,
    #[serde(alias = "dir", alias = "tree")]
    Directory,
    /// Symlinks, submodules and anything else the walker neither reads nor enters.
    #[serde(other)]
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

/// One node of a whole-tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub path: String,
    pub kind: EntryKind,
}

/// Whole-tree listing of a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTree {
    pub nodes: Vec<TreeNode>,
    /// The API returned only part of the tree.
    pub truncated: bool,
}

impl RemoteTree {
    /// Render as an indented listing, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let depth = node.path.matches('/').count();
            let name = node.path.rsplit('/').next().unwrap_or(&node.path);
            let suffix = if node.kind == EntryKind::Directory { "/" } else { "" };
            if depth == 0 {
                out.push_str(&format!("{}{}\n", name, suffix));
            } else {
                out.push_str(&format!("{}├── {}{}\n", " ".repeat(depth * 4), name, suffix));
            }
        }
        if self.truncated {
            out.push_str("[tree truncated by the hosting API]\n");
        }
        out
    }
}

/// Result of a branch-creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchOutcome {
    Created,
    AlreadyExists,
}

/// Result of a file write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutOutcome {
    Created,
    Updated,
}

/// A single file write on a branch.
#[derive(Debug, Clone)]
pub struct PutFile<'a> {
    pub branch: &'a str,
    pub path: &'a str,
    pub content: &'a [u8],
    pub message: &'a str,
    /// Revision marker of the blob being replaced; `None` creates the file.
    pub revision: Option<&'a str>,
}

/// A pull request to open.
#[derive(Debug, Clone)]
pub struct PullRequest<'a> {
    pub title: &'a str,
    pub head: &'a str,
    pub base: &'a str,
    pub body: &'a str,
}

/// Capability interface over a source-hosting REST API.
///
/// Real implementation: `GitHubClient`. Test double: `MemoryRepository`.
/// `owner_repo` is always the `owner/name` slug.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn list_entries(&self, owner_repo: &str, path: &str) -> Result<Vec<DirEntry>, ResourceError>;

    async fn default_branch(&self, owner_repo: &str) -> Result<String, ResourceError>;

    async fn tree(&self, owner_repo: &str, branch: &str) -> Result<RemoteTree, ResourceError>;

    /// Text content of a file on the default branch.
    async fn file_content(&self, owner_repo: &str, path: &str) -> Result<String, ResourceError>;

    /// Current revision marker of `path` on `branch`, or `None` when the file does not exist there.
    async fn revision_marker(
        &self,
        owner_repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>, ResourceError>;

    /// Create `branch` pointing at the head of `base`. Existing branches are left untouched.
    async fn create_branch(
        &self,
        owner_repo: &str,
        branch: &str,
        base: &str,
    ) -> Result<BranchOutcome, ResourceError>;

    async fn put_file(&self, owner_repo: &str, file: &PutFile<'_>) -> Result<PutOutcome, ResourceError>;

    /// Open a pull request and return its URL.
    async fn create_pull_request(
        &self,
        owner_repo: &str,
        pr: &PullRequest<'_>,
    ) -> Result<String, ResourceError>;
}
