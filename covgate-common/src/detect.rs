//! Workspace detection.
//!
//! A project root is probed for up to four conventional workspaces. Detection
//! is purely file-based: a `package.json` marks a Node workspace, a
//! `backend/requirements.txt` marks a Python one. The package manifest is
//! only parsed afterwards, to pick the test command; a manifest that fails to
//! parse still yields a workspace with the default command.

use crate::errors::GateError;
use crate::types::{TestCommand, Workspace, WorkspaceKind};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Pick the test command for a Node workspace. A `test:coverage` key under
/// an object-valued `scripts` wins, whatever its value; anything else falls
/// back to `npm test -- --coverage`.
fn node_test_command(workspace_dir: &Path) -> TestCommand {
    let manifest = workspace_dir.join("package.json");
    let has_coverage_script = std::fs::read_to_string(&manifest)
        .ok()
        .and_then(|content| serde_json::from_str::<Value>(&content).ok())
        .and_then(|value| {
            let scripts = value.get("scripts")?.as_object()?;
            Some(scripts.contains_key("test:coverage"))
        })
        .unwrap_or(false);

    if has_coverage_script {
        TestCommand::new("npm", &["run", "test:coverage"])
    } else {
        TestCommand::new("npm", &["test", "--", "--coverage"])
    }
}

fn python_test_command() -> TestCommand {
    TestCommand::new("python3", &["-m", "pytest", "--cov", "--cov-report=json"])
}

/// Detect the testable workspaces under `project_root`, in fixed rank order
/// (root, frontend, backend, backend-python).
///
/// Rules:
/// - `frontend/package.json` yields a frontend Node workspace.
/// - `backend/package.json` yields a backend Node workspace.
/// - A root `package.json` yields a root Node workspace only when neither
///   sub-directory Node workspace exists.
/// - `backend/requirements.txt` yields a Python workspace, independently of
///   the Node checks.
///
/// Returns [`GateError::NoTestableWorkspace`] when nothing matches.
pub fn detect_workspaces(project_root: &Path) -> Result<Vec<Workspace>, GateError> {
    let frontend_dir = project_root.join("frontend");
    let backend_dir = project_root.join("backend");

    let has_frontend_node = frontend_dir.join("package.json").is_file();
    let has_backend_node = backend_dir.join("package.json").is_file();
    let has_root_node =
        !has_frontend_node && !has_backend_node && project_root.join("package.json").is_file();
    let has_backend_python = backend_dir.join("requirements.txt").is_file();

    let mut workspaces = Vec::new();
    if has_root_node {
        workspaces.push(Workspace {
            kind: WorkspaceKind::RootNode,
            directory: project_root.to_path_buf(),
            test_command: Some(node_test_command(project_root)),
        });
    }
    if has_frontend_node {
        workspaces.push(Workspace {
            kind: WorkspaceKind::FrontendNode,
            directory: frontend_dir.clone(),
            test_command: Some(node_test_command(&frontend_dir)),
        });
    }
    if has_backend_node {
        workspaces.push(Workspace {
            kind: WorkspaceKind::BackendNode,
            directory: backend_dir.clone(),
            test_command: Some(node_test_command(&backend_dir)),
        });
    }
    if has_backend_python {
        workspaces.push(Workspace {
            kind: WorkspaceKind::BackendPython,
            directory: backend_dir,
            test_command: Some(python_test_command()),
        });
    }

    if workspaces.is_empty() {
        return Err(GateError::NoTestableWorkspace {
            project_root: project_root.display().to_string(),
        });
    }

    debug!(
        "detected {} workspace(s) under {}: {}",
        workspaces.len(),
        project_root.display(),
        workspaces
            .iter()
            .map(|w| w.kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(workspaces)
}
