use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{
    BranchOutcome, DirEntry, EntryKind, PullRequest, PutFile, PutOutcome, RemoteTree,
    ResourceClient, TreeNode,
};
use crate::errors::ResourceError;

#[derive(Debug, Clone)]
struct Blob {
    content: Vec<u8>,
    revision: String,
}

/// A pull request recorded by `MemoryRepository`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct State {
    /// branch -> path -> blob
    branches: BTreeMap<String, BTreeMap<String, Blob>>,
    failing_reads: HashSet<String>,
    failing_listings: HashSet<String>,
    failing_writes: HashSet<String>,
    fail_branch_creation: bool,
    pull_requests: Vec<RecordedPullRequest>,
    next_revision: u64,
    content_fetches: usize,
    listing_calls: usize,
}

impl State {
    fn revision(&mut self) -> String {
        self.next_revision += 1;
        format!("rev-{}", self.next_revision)
    }
}

/// An in-memory implementation of `ResourceClient`, intended primarily for testing.
///
/// Holds one repository with any number of branches. Directory listings are
/// derived from the file paths of the default branch and sorted by name, like
/// the GitHub contents API. Individual reads, listings and writes can be made to
/// fail to exercise partial-failure handling.
pub struct MemoryRepository {
    slug: String,
    default_branch: String,
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new(slug: &str, default_branch: &str) -> Self {
        let mut state = State::default();
        state
            .branches
            .insert(default_branch.to_string(), BTreeMap::new());
        Self {
            slug: slug.to_string(),
            default_branch: default_branch.to_string(),
            state: RwLock::new(state),
        }
    }

    /// Builder-style variant of [`Self::add_file`].
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.add_file(path, content);
        self
    }

    /// Add or replace a file on the default branch.
    pub fn add_file(&self, path: &str, content: &str) {
        let mut state = self.write();
        let revision = state.revision();
        let branch = self.default_branch.clone();
        state.branches.entry(branch).or_default().insert(
            path.to_string(),
            Blob {
                content: content.as_bytes().to_vec(),
                revision,
            },
        );
    }

    /// Make content fetches of `path` fail.
    pub fn fail_read(&self, path: &str) {
        self.write().failing_reads.insert(path.to_string());
    }

    /// Make listing of directory `path` fail (`""` is the root).
    pub fn fail_listing(&self, path: &str) {
        self.write().failing_listings.insert(path.to_string());
    }

    /// Make writes to `path` (on any branch) fail.
    pub fn fail_write(&self, path: &str) {
        self.write().failing_writes.insert(path.to_string());
    }

    pub fn fail_branch_creation(&self) {
        self.write().fail_branch_creation = true;
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.read().branches.contains_key(branch)
    }

    /// Text content of `path` on `branch`.
    pub fn file_on_branch(&self, branch: &str, path: &str) -> Option<String> {
        self.read()
            .branches
            .get(branch)
            .and_then(|files| files.get(path))
            .map(|blob| String::from_utf8_lossy(&blob.content).into_owned())
    }

    /// All file paths on `branch`, sorted.
    pub fn files_on_branch(&self, branch: &str) -> Vec<String> {
        self.read()
            .branches
            .get(branch)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pull_requests(&self) -> Vec<RecordedPullRequest> {
        self.read().pull_requests.clone()
    }

    /// Number of `file_content` calls served so far.
    pub fn content_fetches(&self) -> usize {
        self.read().content_fetches
    }

    /// Number of `list_entries` calls served so far.
    pub fn listing_calls(&self) -> usize {
        self.read().listing_calls
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check_slug(&self, owner_repo: &str) -> Result<(), ResourceError> {
        if owner_repo == self.slug {
            Ok(())
        } else {
            Err(ResourceError::NotFound {
                path: owner_repo.to_string(),
            })
        }
    }
}

#[async_trait]
impl ResourceClient for MemoryRepository {
    async fn list_entries(&self, owner_repo: &str, path: &str) -> Result<Vec<DirEntry>, ResourceError> {
        self.check_slug(owner_repo)?;
        let mut state = self.write();
        state.listing_calls += 1;
        let dir = path.trim_matches('/');
        if state.failing_listings.contains(dir) {
            return Err(ResourceError::Api {
                status: 500,
                message: format!("listing of '{}' failed", dir),
            });
        }

        let files = state
            .branches
            .get(&self.default_branch)
            .cloned()
            .unwrap_or_default();

        if files.contains_key(dir) {
            let name = dir.rsplit('/').next().unwrap_or(dir).to_string();
            return Ok(vec![DirEntry {
                name,
                path: dir.to_string(),
                kind: EntryKind::File,
            }]);
        }

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let mut children: BTreeMap<String, EntryKind> = BTreeMap::new();
        for file in files.keys() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child_dir, _)) => {
                    children.insert(child_dir.to_string(), EntryKind::Directory);
                }
                None => {
                    children.insert(rest.to_string(), EntryKind::File);
                }
            }
        }

        if children.is_empty() && !dir.is_empty() {
            return Err(ResourceError::NotFound {
                path: dir.to_string(),
            });
        }

        Ok(children
            .into_iter()
            .map(|(name, kind)| DirEntry {
                path: format!("{}{}", prefix, name),
                name,
                kind,
            })
            .collect())
    }

    async fn default_branch(&self, owner_repo: &str) -> Result<String, ResourceError> {
        self.check_slug(owner_repo)?;
        Ok(self.default_branch.clone())
    }

    async fn tree(&self, owner_repo: &str, branch: &str) -> Result<RemoteTree, ResourceError> {
        self.check_slug(owner_repo)?;
        let state = self.read();
        let files = state
            .branches
            .get(branch)
            .ok_or_else(|| ResourceError::NotFound {
                path: branch.to_string(),
            })?;

        let mut nodes: BTreeSet<(String, bool)> = BTreeSet::new();
        for path in files.keys() {
            let mut acc = String::new();
            let segments: Vec<&str> = path.split('/').collect();
            for (i, segment) in segments.iter().enumerate() {
                if !acc.is_empty() {
                    acc.push('/');
                }
                acc.push_str(segment);
                nodes.insert((acc.clone(), i + 1 < segments.len()));
            }
        }

        Ok(RemoteTree {
            nodes: nodes
                .into_iter()
                .map(|(path, is_dir)| TreeNode {
                    path,
                    kind: if is_dir {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    },
                })
                .collect(),
            truncated: false,
        })
    }

    async fn file_content(&self, owner_repo: &str, path: &str) -> Result<String, ResourceError> {
        self.check_slug(owner_repo)?;
        let mut state = self.write();
        state.content_fetches += 1;
        if state.failing_reads.contains(path) {
            return Err(ResourceError::Api {
                status: 500,
                message: format!("could not read '{}'", path),
            });
        }
        let blob = state
            .branches
            .get(&self.default_branch)
            .and_then(|files| files.get(path))
            .ok_or_else(|| ResourceError::NotFound {
                path: path.to_string(),
            })?;
        String::from_utf8(blob.content.clone()).map_err(|e| ResourceError::Decode {
            what: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn revision_marker(
        &self,
        owner_repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>, ResourceError> {
        self.check_slug(owner_repo)?;
        Ok(self
            .read()
            .branches
            .get(branch)
            .and_then(|files| files.get(path))
            .map(|blob| blob.revision.clone()))
    }

    async fn create_branch(
        &self,
        owner_repo: &str,
        branch: &str,
        base: &str,
    ) -> Result<BranchOutcome, ResourceError> {
        self.check_slug(owner_repo)?;
        let mut state = self.write();
        if state.branches.contains_key(branch) {
            return Ok(BranchOutcome::AlreadyExists);
        }
        if state.fail_branch_creation {
            return Err(ResourceError::Api {
                status: 403,
                message: "Resource not accessible by integration".to_string(),
            });
        }
        let base_files = state
            .branches
            .get(base)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound {
                path: format!("heads/{}", base),
            })?;
        state.branches.insert(branch.to_string(), base_files);
        Ok(BranchOutcome::Created)
    }

    async fn put_file(&self, owner_repo: &str, file: &PutFile<'_>) -> Result<PutOutcome, ResourceError> {
        self.check_slug(owner_repo)?;
        let mut state = self.write();
        if state.failing_writes.contains(file.path) {
            return Err(ResourceError::Api {
                status: 500,
                message: format!("write to '{}' failed", file.path),
            });
        }
        let revision = state.revision();
        let files = state
            .branches
            .get_mut(file.branch)
            .ok_or_else(|| ResourceError::NotFound {
                path: format!("heads/{}", file.branch),
            })?;

        let outcome = match (files.get(file.path), file.revision) {
            (None, None) => PutOutcome::Created,
            (Some(current), Some(expected)) if current.revision == expected => PutOutcome::Updated,
            (Some(current), expected) => {
                return Err(ResourceError::Conflict {
                    path: file.path.to_string(),
                    message: format!(
                        "expected revision {:?}, found {}",
                        expected, current.revision
                    ),
                });
            }
            (None, Some(expected)) => {
                return Err(ResourceError::Conflict {
                    path: file.path.to_string(),
                    message: format!("revision {} given for a file that does not exist", expected),
                });
            }
        };

        files.insert(
            file.path.to_string(),
            Blob {
                content: file.content.to_vec(),
                revision,
            },
        );
        Ok(outcome)
    }

    async fn create_pull_request(
        &self,
        owner_repo: &str,
        pr: &PullRequest<'_>,
    ) -> Result<String, ResourceError> {
        self.check_slug(owner_repo)?;
        let mut state = self.write();
        if !state.branches.contains_key(pr.head) {
            return Err(ResourceError::Api {
                status: 422,
                message: format!("head branch '{}' does not exist", pr.head),
            });
        }
        state.pull_requests.push(RecordedPullRequest {
            title: pr.title.to_string(),
            head: pr.head.to_string(),
            base: pr.base.to_string(),
            body: pr.body.to_string(),
        });
        Ok(format!(
            "https://github.com/{}/pull/{}",
            self.slug,
            state.pull_requests.len()
        ))
    }
}
