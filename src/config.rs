//! Library-level configuration mirroring the external CLI's parameter surface
//! (§6). Parsing argv itself is the caller's job — this crate only consumes
//! an already-built [`RecoveryConfig`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which forge dialect to talk to. Azure DevOps is recognized but
/// unimplemented: the client factory fails fast rather than guessing at a
/// protocol (§9, forge polymorphism).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Server {
    GitHub,
    GitLab,
    AzureDevOps,
}

impl Server {
    /// Infers the dialect from a remote URL's host, per §6 ("inferred from
    /// remote URL's host when host is github.com"). Any other host is left
    /// unresolved — the caller must pass `--server` explicitly.
    pub fn infer_from_host(host: &str) -> Option<Server> {
        match host {
            "github.com" => Some(Server::GitHub),
            "gitlab.com" => Some(Server::GitLab),
            _ => None,
        }
    }
}

/// Verbosity level, mutually exclusive per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    #[default]
    Normal,
    Debug,
    Quiet,
}

/// Top-level configuration the orchestrator runs with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// `--git-dir`, default current directory.
    pub git_dir: PathBuf,
    /// `--server`; `None` means "infer from `git remote get-url origin`".
    pub server: Option<Server>,
    /// `--save`: emit `dangling_objects.json` in the working directory.
    pub save_summary: bool,
    pub verbosity: Verbosity,
    /// Size of the bounded worker pool used to parallelize C3 batch calls (§5).
    pub worker_pool_size: usize,
    /// Forge auth token, when the caller has already resolved one (e.g. via
    /// `--token`). `None` means the orchestrator falls back to the
    /// environment and, for GitHub, the `gh` CLI credential helper (§6).
    pub token: Option<String>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            git_dir: PathBuf::from("."),
            server: None,
            save_summary: false,
            verbosity: Verbosity::Normal,
            worker_pool_size: num_cpus::get().clamp(8, 16),
            token: None,
        }
    }
}

/// Per-forge batching window defaults (§4.3); implementers may adapt but must
/// preserve adaptive bisection on failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchWindows {
    pub commit_metadata: usize,
    pub tree_entries: usize,
    pub blob_classification: usize,
    pub blob_text: usize,
}

impl Default for BatchWindows {
    fn default() -> Self {
        BatchWindows {
            commit_metadata: 200,
            tree_entries: 500,
            blob_classification: 1000,
            blob_text: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_known_hosts_only() {
        assert_eq!(Server::infer_from_host("github.com"), Some(Server::GitHub));
        assert_eq!(Server::infer_from_host("gitlab.com"), Some(Server::GitLab));
        assert_eq!(Server::infer_from_host("dev.azure.com"), None);
    }

    #[test]
    fn default_config_is_unsaved_and_normal() {
        let config = RecoveryConfig::default();
        assert!(!config.save_summary);
        assert_eq!(config.verbosity, Verbosity::Normal);
        assert!(config.worker_pool_size >= 8);
    }
}
