use covgate_common::ProjectRef;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer().with_target(true))
            .with(filter)
            .init();
    });
}

/// A throwaway project tree with workspace markers and coverage artifacts
/// laid out where detection and parsing expect them.
pub struct ProjectFixture {
    dir: TempDir,
}

#[allow(dead_code)]
impl ProjectFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp project"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn project(&self) -> ProjectRef {
        ProjectRef::new("proj", self.root())
    }

    /// Workspace directory; `""` means the project root itself.
    pub fn dir_of(&self, subdir: &str) -> PathBuf {
        if subdir.is_empty() {
            self.root().to_path_buf()
        } else {
            self.root().join(subdir)
        }
    }

    /// Drop a package.json with a `test:coverage` script into `subdir`.
    pub fn add_node_workspace(&self, subdir: &str) {
        self.write(
            &self.dir_of(subdir).join("package.json"),
            &json!({
                "name": format!("fixture-{}", if subdir.is_empty() { "root" } else { subdir }),
                "scripts": {"test:coverage": "vitest run --coverage"}
            })
            .to_string(),
        );
    }

    /// Package.json without any coverage script, so the fallback command
    /// applies.
    pub fn add_node_workspace_without_script(&self, subdir: &str) {
        self.write(
            &self.dir_of(subdir).join("package.json"),
            &json!({"name": "fixture", "scripts": {"build": "vite build"}}).to_string(),
        );
    }

    pub fn add_python_backend(&self) {
        self.write(
            &self.dir_of("backend").join("requirements.txt"),
            "fastapi\npytest\npytest-cov\n",
        );
    }

    /// Write `coverage/coverage-summary.json` for a workspace. File keys are
    /// workspace-relative; they are stored under the absolute paths Istanbul
    /// reporters emit.
    pub fn write_coverage_summary(&self, subdir: &str, total: Value, files: &[(&str, Value)]) {
        let dir = self.dir_of(subdir);
        let mut map = serde_json::Map::new();
        map.insert("total".to_string(), total);
        for (file, entry) in files {
            let key = dir.join(file).to_string_lossy().to_string();
            map.insert(key, entry.clone());
        }
        self.write(
            &dir.join("coverage").join("coverage-summary.json"),
            &Value::Object(map).to_string(),
        );
    }

    /// Write `coverage/coverage-final.json` with per-file line-hit maps.
    pub fn write_coverage_final(&self, subdir: &str, files: &[(&str, Value)]) {
        let dir = self.dir_of(subdir);
        let mut map = serde_json::Map::new();
        for (file, line_hits) in files {
            let key = dir.join(file).to_string_lossy().to_string();
            map.insert(key.clone(), json!({"path": key, "l": line_hits}));
        }
        self.write(
            &dir.join("coverage").join("coverage-final.json"),
            &Value::Object(map).to_string(),
        );
    }

    /// Write the raw pytest-cov `coverage.json` under `backend/`.
    pub fn write_python_coverage(&self, payload: &Value) {
        self.write(&self.dir_of("backend").join("coverage.json"), &payload.to_string());
    }

    fn write(&self, path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dirs");
        }
        std::fs::write(path, content).expect("write fixture file");
    }
}

/// Istanbul summary entry with every dimension at `pct`.
pub fn metric_entry(pct: f64) -> Value {
    metric_entry_with(pct, pct, pct, pct)
}

#[allow(dead_code)]
pub fn metric_entry_with(lines: f64, statements: f64, functions: f64, branches: f64) -> Value {
    json!({
        "lines": {"total": 100, "covered": lines, "skipped": 0, "pct": lines},
        "statements": {"total": 100, "covered": statements, "skipped": 0, "pct": statements},
        "functions": {"total": 10, "covered": functions / 10.0, "skipped": 0, "pct": functions},
        "branches": {"total": 20, "covered": branches / 5.0, "skipped": 0, "pct": branches}
    })
}
