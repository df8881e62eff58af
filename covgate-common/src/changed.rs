//! Changed-path resolution.
//!
//! Which files count as "changed" for a run comes from the first non-empty
//! source, in priority order: the caller's explicit list, a git diff against
//! the base branch, then the branch's persisted staged files. The resolved
//! set is normalized, deduplicated, filtered to source-relevant extensions,
//! and attributed to workspaces by prefix.

use crate::git::{GitRunner, diff_name_only, ensure_repository};
use crate::paths::{has_source_extension, normalize_relative_path};
use crate::types::{BranchRecord, TestRunOptions, Workspace, WorkspaceKind};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Where the changed-path set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangedSource {
    Explicit,
    GitDiff,
    StagedFiles,
    Unavailable,
}

impl ChangedSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::GitDiff => "git_diff",
            Self::StagedFiles => "staged_files",
            Self::Unavailable => "unavailable",
        }
    }
}

/// One changed file attributed to a workspace: the project-relative form the
/// caller saw, and the workspace-relative form used for coverage lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub original: String,
    pub relative: String,
}

/// Outcome of changed-path resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedPathResolution {
    pub source: ChangedSource,
    /// Project-relative paths after normalization, deduplication, and the
    /// source-extension filter.
    pub paths: Vec<String>,
    /// Changed files per detected workspace, in the shared attribution.
    pub by_workspace: BTreeMap<WorkspaceKind, Vec<ChangedFile>>,
}

impl ChangedPathResolution {
    pub fn files_for(&self, kind: WorkspaceKind) -> &[ChangedFile] {
        self.by_workspace.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Merge the explicit lists from the options; `changedFiles` entries come
/// before the `changedPaths` alias.
fn explicit_paths(options: &TestRunOptions) -> Vec<String> {
    let mut merged = Vec::new();
    if let Some(files) = &options.changed_files {
        merged.extend(files.iter().cloned());
    }
    if let Some(paths) = &options.changed_paths {
        merged.extend(paths.iter().cloned());
    }
    merged
}

/// Read the persisted staged-file entries: bare strings or `{path}` objects;
/// anything else sanitizes away.
fn staged_paths(record: Option<&BranchRecord>) -> Vec<String> {
    let Some(entries) = record.and_then(|r| r.staged_files.as_array()) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(path) => Some(path.clone()),
            Value::Object(object) => object
                .get("path")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

/// Normalize, drop empties, and deduplicate preserving first-seen order.
fn clean(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    for path in raw {
        let normalized = normalize_relative_path(&path);
        if normalized.is_empty() || !seen.insert(normalized.clone()) {
            continue;
        }
        cleaned.push(normalized);
    }
    cleaned
}

/// Attribute project-relative paths to detected workspaces.
///
/// A `frontend/` or `backend/` prefix routes the file to that workspace
/// (backend prefers the Node workspace over Python when both could apply).
/// A bare path is attributed to the sole Node workspace when exactly one
/// exists; otherwise it is dropped. Files routed to a workspace that was not
/// detected are dropped as well.
pub fn attribute_to_workspaces(
    paths: &[String],
    workspaces: &[Workspace],
) -> BTreeMap<WorkspaceKind, Vec<ChangedFile>> {
    let present: HashSet<WorkspaceKind> = workspaces.iter().map(|w| w.kind).collect();
    let backend_kind = if present.contains(&WorkspaceKind::BackendNode) {
        WorkspaceKind::BackendNode
    } else {
        WorkspaceKind::BackendPython
    };
    let node_kinds: Vec<WorkspaceKind> = workspaces
        .iter()
        .map(|w| w.kind)
        .filter(WorkspaceKind::is_node)
        .collect();
    let sole_node = (node_kinds.len() == 1).then(|| node_kinds[0]);

    let mut by_workspace: BTreeMap<WorkspaceKind, Vec<ChangedFile>> = BTreeMap::new();
    for path in paths {
        let (kind, relative) = if let Some(rest) = path.strip_prefix("frontend/") {
            (WorkspaceKind::FrontendNode, rest.to_string())
        } else if let Some(rest) = path.strip_prefix("backend/") {
            (backend_kind, rest.to_string())
        } else if let Some(kind) = sole_node {
            (kind, path.clone())
        } else {
            debug!("changed path {} has no workspace attribution, dropped", path);
            continue;
        };
        if !present.contains(&kind) {
            debug!("changed path {} maps to undetected workspace, dropped", path);
            continue;
        }
        by_workspace.entry(kind).or_default().push(ChangedFile {
            original: path.clone(),
            relative,
        });
    }
    by_workspace
}

/// Resolve the changed-path set for a run.
///
/// `head_ref` is the branch name diffed against `base_branch` (callers pass
/// `HEAD` when no branch name is known). The git source only wins when the
/// repository is ready and the diff yields at least one path; an empty diff
/// falls through to the staged files.
pub async fn resolve_changed_paths(
    git: &dyn GitRunner,
    project_root: &Path,
    base_branch: &str,
    head_ref: &str,
    options: &TestRunOptions,
    record: Option<&BranchRecord>,
    source_extensions: &[String],
    workspaces: &[Workspace],
) -> ChangedPathResolution {
    let mut source = ChangedSource::Unavailable;
    let mut paths = clean(explicit_paths(options));
    if !paths.is_empty() {
        source = ChangedSource::Explicit;
    }

    if paths.is_empty() && ensure_repository(git, project_root).await {
        if let Some(diffed) = diff_name_only(git, project_root, base_branch, head_ref).await {
            paths = clean(diffed);
            if !paths.is_empty() {
                source = ChangedSource::GitDiff;
            }
        }
    }

    if paths.is_empty() {
        paths = clean(staged_paths(record));
        if !paths.is_empty() {
            source = ChangedSource::StagedFiles;
        }
    }

    paths.retain(|path| has_source_extension(path, source_extensions));
    debug!(
        "changed paths from {}: {} file(s) after extension filter",
        source.as_str(),
        paths.len()
    );

    let by_workspace = attribute_to_workspaces(&paths, workspaces);
    ChangedPathResolution {
        source,
        paths,
        by_workspace,
    }
}
