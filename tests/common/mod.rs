//! Common test utilities for td integration tests.
//!
//! Provides `TestEnv`, an initialized project in a temp directory with its
//! own system-config directory, so tests never read the user's config.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// Session used by [`TestEnv::td`].
pub const IMPLEMENTER: &str = "ses_impl01";
/// A second, uninvolved session.
pub const REVIEWER: &str = "ses_rev001";

pub struct TestEnv {
    pub root: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    /// Create an environment without running `td init`.
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create an environment and initialize the store.
    pub fn init() -> Self {
        let env = Self::new();
        env.td().arg("init").assert().success();
        env
    }

    /// `td` acting as [`IMPLEMENTER`].
    pub fn td(&self) -> Command {
        self.td_as(IMPLEMENTER)
    }

    /// `td` acting as `session`.
    ///
    /// Everything is passed per-command, so tests can run in parallel.
    pub fn td_as(&self, session: &str) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_td"));
        cmd.current_dir(self.root.path());
        cmd.env("TD_WORK_DIR", self.root.path());
        cmd.env("TD_CONFIG_DIR", self.config_dir.path());
        cmd.env("TD_SESSION", session);
        cmd.env_remove("TD_LOG");
        cmd
    }

    pub fn path(&self) -> &std::path::Path {
        self.root.path()
    }

    /// Create an issue as [`IMPLEMENTER`] and return its ID.
    pub fn create(&self, title: &str, extra: &[&str]) -> String {
        self.create_as(IMPLEMENTER, title, extra)
    }

    pub fn create_as(&self, session: &str, title: &str, extra: &[&str]) -> String {
        let output = self
            .td_as(session)
            .args(["create", title, "--json"])
            .args(extra)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "create failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        json["id"].as_str().unwrap().to_string()
    }

    /// Current status of `id` as reported by `show --json`.
    pub fn status(&self, id: &str) -> String {
        self.show(id)["status"].as_str().unwrap().to_string()
    }

    pub fn show(&self, id: &str) -> serde_json::Value {
        let output = self.td().args(["show", id, "--json"]).output().unwrap();
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse JSON-lines stdout.
pub fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}
