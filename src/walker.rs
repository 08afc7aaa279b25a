//! Depth-first repository traversal.
//!
//! `walk` lists directories through a `ResourceClient`, fetches every file whose
//! extension is not denylisted and aggregates the contents in discovery order.
//! The traversal keeps an explicit stack of pending listings, so deep trees do not
//! nest futures.

use std::collections::HashSet;

use crate::errors::ResourceError;
use crate::github::{DirEntry, EntryKind, ResourceClient};

/// Extensions skipped by default. Binary assets, lockfiles and environment/CI config.
pub const DEFAULT_SKIP_EXTENSIONS: &[&str] = &[
    ".png",
    ".jpg",
    ".jpeg",
    ".gif",
    ".svg",
    ".ico",
    ".pdf",
    ".avif",
    ".lock",
    ".gitignore",
    ".env",
    ".yml",
    ".yaml",
];

/// Case-insensitive set of file-name suffixes the walker never fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDenylist {
    extensions: Vec<String>,
}

impl Default for ExtensionDenylist {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_EXTENSIONS.iter().copied())
    }
}

impl ExtensionDenylist {
    /// Build a denylist from suffixes. A missing leading dot is added.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self {
            extensions: Vec::new(),
        };
        list.extend(extensions);
        list
    }

    /// Add suffixes on top of the current list.
    pub fn extend<I, S>(&mut self, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for ext in extensions {
            let ext = ext.as_ref().trim().to_lowercase();
            if ext.is_empty() {
                continue;
            }
            let ext = if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            };
            if !self.extensions.contains(&ext) {
                self.extensions.push(ext);
            }
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// One node seen during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Repo-relative path, unique within a walk.
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
    /// Nesting below the walk's start path.
    pub depth: usize,
}

/// A fetched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContext {
    pub path: String,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextPart {
    File(FileContext),
    /// A file whose content could not be fetched.
    FetchError { path: String, name: String, message: String },
}

impl ContextPart {
    fn render(&self) -> String {
        match self {
            ContextPart::File(file) => format!("\n=== File: {} ===\n{}", file.name, file.content),
            ContextPart::FetchError { name, message, .. } => {
                format!("\n=== Error reading file {}: {} ===\n", name, message)
            }
        }
    }
}

/// Everything fetched during one walk, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedContext {
    parts: Vec<ContextPart>,
}

impl AggregatedContext {
    pub fn parts(&self) -> &[ContextPart] {
        &self.parts
    }

    pub fn files(&self) -> impl Iterator<Item = &FileContext> {
        self.parts.iter().filter_map(|part| match part {
            ContextPart::File(file) => Some(file),
            ContextPart::FetchError { .. } => None,
        })
    }

    pub fn file(&self, path: &str) -> Option<&FileContext> {
        self.files().find(|file| file.path == path)
    }

    pub fn fetch_errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts.iter().filter_map(|part| match part {
            ContextPart::FetchError { path, message, .. } => Some((path.as_str(), message.as_str())),
            ContextPart::File(_) => None,
        })
    }

    /// Concatenated text handed to the generator.
    pub fn render(&self) -> String {
        self.parts
            .iter()
            .map(ContextPart::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of a successful walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub context: AggregatedContext,
    /// Paths of successfully fetched files, parallel to `context.files()`.
    pub paths: Vec<String>,
    /// Every node visited, denylisted files included.
    pub entries: Vec<TreeEntry>,
}

impl Discovery {
    /// Indented `├── name` listing of every visited node, in walk order.
    pub fn tree_summary(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&" ".repeat(entry.depth * 4));
            out.push_str("├── ");
            out.push_str(&entry.name);
            out.push('\n');
        }
        out
    }
}

struct Frame {
    entries: std::vec::IntoIter<DirEntry>,
    dir: String,
    depth: usize,
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Walk `owner_repo` depth-first from `start_path` (empty for the root).
///
/// A failed file fetch leaves an error marker in the context and the walk continues.
/// A failed directory listing aborts the walk.
pub async fn walk(
    client: &dyn ResourceClient,
    owner_repo: &str,
    start_path: &str,
    denylist: &ExtensionDenylist,
) -> Result<Discovery, ResourceError> {
    let start = start_path.trim_matches('/');
    let mut discovery = Discovery::default();
    let mut seen = HashSet::new();

    let root = client.list_entries(owner_repo, start).await?;
    let mut stack = vec![Frame {
        entries: root.into_iter(),
        dir: start.to_string(),
        depth: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        let Some(entry) = frame.entries.next() else {
            stack.pop();
            continue;
        };
        let depth = frame.depth;
        // A listing of a single file reports the file itself.
        let path = if entry.path == frame.dir && entry.kind != EntryKind::Directory {
            entry.path.clone()
        } else {
            join_path(&frame.dir, &entry.name)
        };
        if !seen.insert(path.clone()) {
            continue;
        }

        discovery.entries.push(TreeEntry {
            path: path.clone(),
            name: entry.name.clone(),
            kind: entry.kind,
            depth,
        });

        match entry.kind {
            EntryKind::Directory => {
                tracing::debug!(path = %path, "listing directory");
                let children = client.list_entries(owner_repo, &path).await?;
                stack.push(Frame {
                    entries: children.into_iter(),
                    dir: path,
                    depth: depth + 1,
                });
            }
            EntryKind::File if denylist.matches(&entry.name) => {
                tracing::debug!(path = %path, "skipping denylisted file");
            }
            EntryKind::File => match client.file_content(owner_repo, &path).await {
                Ok(content) => {
                    tracing::debug!(path = %path, bytes = content.len(), "added file to context");
                    discovery.context.parts.push(ContextPart::File(FileContext {
                        path: path.clone(),
                        name: entry.name,
                        content,
                    }));
                    discovery.paths.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "failed to read file");
                    discovery.context.parts.push(ContextPart::FetchError {
                        path,
                        name: entry.name,
                        message: e.to_string(),
                    });
                }
            },
            EntryKind::Other => {}
        }
    }

    tracing::info!(
        files = discovery.paths.len(),
        entries = discovery.entries.len(),
        "walk complete"
    );
    Ok(discovery)
}
