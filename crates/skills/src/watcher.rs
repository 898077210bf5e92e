//! Filesystem watcher for the skills root.
//!
//! Emits an event whenever a `SKILL.md` is created, modified or removed by
//! something other than the catalog (an editor, a manual `git pull`).

use std::path::{Component, Path, PathBuf};

use {
    notify_debouncer_full::{
        DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
        notify::{EventKind, RecommendedWatcher, RecursiveMode},
    },
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    parse::MANIFEST_FILE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillWatchEvent {
    /// One or more manifests changed.
    Changed { paths: Vec<PathBuf> },
}

/// Debounced recursive watch over one skills root. Events stop when the
/// watcher is dropped.
pub struct SkillWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl SkillWatcher {
    pub fn start(root: &Path) -> Result<(Self, mpsc::UnboundedReceiver<SkillWatchEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watched_root = root.to_path_buf();

        let mut debouncer = new_debouncer(
            std::time::Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let mut paths = Vec::new();
                    for event in events {
                        if !matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        ) {
                            continue;
                        }
                        for path in &event.paths {
                            if is_manifest_path(&watched_root, path) && !paths.contains(path) {
                                debug!(path = %path.display(), "skill watcher event");
                                paths.push(path.clone());
                            }
                        }
                    }
                    if !paths.is_empty() {
                        let _ = tx.send(SkillWatchEvent::Changed { paths });
                    }
                },
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "skill watcher error");
                    }
                },
            },
        )
        .map_err(|e| Error::external("failed to create skill watcher", e))?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| Error::external("failed to watch skills root", e))?;
        info!(dir = %root.display(), "skill watcher: watching directory");

        Ok((
            Self {
                _debouncer: debouncer,
            },
            rx,
        ))
    }
}

/// A `SKILL.md` under `root` whose path has no hidden component.
fn is_manifest_path(root: &Path, path: &Path) -> bool {
    if path.file_name().and_then(|n| n.to_str()) != Some(MANIFEST_FILE) {
        return false;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    !relative.components().any(|c| match c {
        Component::Normal(s) => s.to_str().is_some_and(|s| s.starts_with('.')),
        _ => false,
    })
}
