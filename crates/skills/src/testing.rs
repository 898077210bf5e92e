//! Scripted [`GitClient`] for tests that never touches the network.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use {async_trait::async_trait, tokio::sync::Notify};

use crate::{
    error::{Error, Result},
    git::{GitClient, PullStatus},
    parse::MANIFEST_FILE,
};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    Transient,
    Auth,
}

/// Clones write the skill directories registered for the URL. Pulls report
/// `Unchanged` unless [`FakeGit::add_skill`] changed the working copy.
#[derive(Default)]
pub(crate) struct FakeGit {
    repos: Mutex<HashMap<String, Vec<String>>>,
    failures: Mutex<HashMap<String, Failure>>,
    clones_by_dir: Mutex<HashMap<PathBuf, String>>,
    pending: Mutex<HashMap<String, Vec<String>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    pub clones: AtomicUsize,
    pub pulls: AtomicUsize,
}

impl FakeGit {
    /// Register `paths` (relative to the working copy, last segment is the
    /// skill name) as the content of `url`.
    pub fn with_repo(self, url: &str, paths: &[&str]) -> Self {
        self.repos.lock().unwrap_or_else(|e| e.into_inner()).insert(
            url.to_string(),
            paths.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn fail(&self, url: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), failure);
    }

    /// Block every later pull until the returned handle is notified once
    /// per pull.
    pub fn gate_pulls(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&gate));
        gate
    }

    /// Make the next pull of `url` create another skill.
    pub fn add_skill(&self, url: &str, path: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.to_string())
            .or_default()
            .push(path.to_string());
    }

    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    fn check(&self, url: &str) -> Result<()> {
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied();
        match failure {
            Some(Failure::Transient) => Err(Error::git("fetch", format!("unreachable: {url}"))),
            Some(Failure::Auth) => Err(Error::AuthRequired {
                url: url.to_string(),
            }),
            None => Ok(()),
        }
    }
}

pub(crate) fn write_skill(dir: &Path, name: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(
        dir.join(MANIFEST_FILE),
        format!("---\nname: {name}\ndescription: The {name} skill\n---\n\nUse {name} wisely.\n"),
    )
}

fn write_paths(dest: &Path, paths: &[String]) -> Result<()> {
    for path in paths {
        let name = path.rsplit('/').next().unwrap_or(path);
        write_skill(&dest.join(path), name)?;
    }
    Ok(())
}

#[async_trait]
impl GitClient for FakeGit {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        self.check(url)?;
        std::fs::create_dir_all(dest.join(".git"))?;
        let paths = self
            .repos
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .unwrap_or_default();
        write_paths(dest, &paths)?;
        self.clones_by_dir
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(dest.to_path_buf(), url.to_string());
        Ok(())
    }

    async fn pull(&self, repo_dir: &Path) -> Result<PullStatus> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let url = self
            .clones_by_dir
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(repo_dir)
            .cloned()
            .unwrap_or_default();
        self.check(&url)?;
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&url)
            .unwrap_or_default();
        if pending.is_empty() {
            return Ok(PullStatus::Unchanged);
        }
        write_paths(repo_dir, &pending)?;
        Ok(PullStatus::Updated)
    }
}
