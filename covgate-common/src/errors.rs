//! Fatal precondition errors.
//!
//! Only structural preconditions abort a run: a project with no testable
//! workspace markers, or a project record with no filesystem path. Everything
//! else (failing jobs, malformed coverage JSON, unavailable git) is recovered
//! into the structured [`TestRunResult`](crate::orchestrator::TestRunResult).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    /// No recognized workspace markers (package.json / requirements.txt)
    /// were found under the project root.
    #[error(
        "no testable workspace found: expected frontend/package.json, backend/package.json, \
         package.json, or backend/requirements.txt under {project_root}"
    )]
    NoTestableWorkspace { project_root: String },

    /// The project record does not resolve to a filesystem path.
    #[error("project {project_id} has no filesystem path")]
    NoProjectPath { project_id: String },
}

impl GateError {
    /// HTTP-equivalent status for the external API layer. Both fatal cases
    /// are caller mistakes, not server faults.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoTestableWorkspace { .. } | Self::NoProjectPath { .. } => 400,
        }
    }
}
