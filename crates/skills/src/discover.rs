//! Skill discovery and identifier resolution.
//!
//! Identifiers are `name` for skills directly under the root and
//! `mirror/name` for skills anywhere inside a mirror's working directory.
//! Walks are depth-first with entries sorted by file name, so "first match"
//! is deterministic for a given tree. Hidden entries (`.git`, the sidecar
//! file) are never descended into.

use std::{
    collections::{BTreeSet, HashSet},
    path::{Path, PathBuf},
};

use {
    tracing::{debug, warn},
    walkdir::{DirEntry, WalkDir},
};

use crate::{
    error::{Error, Result},
    parse::{self, MANIFEST_FILE},
    types::{MirrorConfig, Skill, SkillContent},
};

// ── Mirror snapshot ─────────────────────────────────────────────────────────

/// Immutable view of configured mirror directory names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorSnapshot {
    enabled: BTreeSet<String>,
    disabled: BTreeSet<String>,
}

impl MirrorSnapshot {
    pub fn new(
        enabled: impl IntoIterator<Item = String>,
        disabled: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            enabled: enabled.into_iter().collect(),
            disabled: disabled.into_iter().collect(),
        }
    }

    pub fn from_configs(mirrors: &[MirrorConfig]) -> Self {
        let mut snapshot = Self::default();
        for mirror in mirrors {
            if mirror.enabled {
                snapshot.enabled.insert(mirror.name.clone());
            } else {
                snapshot.disabled.insert(mirror.name.clone());
            }
        }
        snapshot
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        !self.is_enabled(name) && self.disabled.contains(name)
    }

    /// Whether `name` is a mirror directory, enabled or not.
    pub fn is_mirror(&self, name: &str) -> bool {
        self.enabled.contains(name) || self.disabled.contains(name)
    }
}

// ── Classification ──────────────────────────────────────────────────────────

/// Where a discovered skill directory sits relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Direct child of the root, outside any mirror.
    Local,
    /// Inside an enabled mirror's working directory.
    Mirrored { mirror: String },
    /// Under a disabled mirror, or nested where no identifier can address it.
    Hidden,
}

/// Classify a skill directory given its path relative to the root.
pub fn classify(relative: &Path, snapshot: &MirrorSnapshot) -> Placement {
    let segments: Vec<&str> = relative
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    let Some(first) = segments.first() else {
        return Placement::Hidden;
    };

    if snapshot.is_enabled(first) {
        Placement::Mirrored {
            mirror: (*first).to_string(),
        }
    } else if snapshot.is_disabled(first) {
        Placement::Hidden
    } else if segments.len() == 1 {
        Placement::Local
    } else {
        Placement::Hidden
    }
}

// ── Identifiers ─────────────────────────────────────────────────────────────

/// A parsed skill identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillId<'a> {
    Local(&'a str),
    Mirrored { mirror: &'a str, name: &'a str },
}

impl<'a> SkillId<'a> {
    pub fn parse(id: &'a str) -> Result<Self> {
        let parts: Vec<&str> = id.split('/').collect();
        match *parts.as_slice() {
            [name] => {
                check_name_segment(id, name)?;
                Ok(Self::Local(name))
            },
            [mirror, name] => {
                if !is_safe_segment(mirror) {
                    return Err(Error::invalid_identifier(id, "invalid mirror segment"));
                }
                check_name_segment(id, name)?;
                Ok(Self::Mirrored { mirror, name })
            },
            _ => Err(Error::invalid_identifier(
                id,
                "identifiers have at most two segments",
            )),
        }
    }

    /// Skill directory base name.
    pub fn name(&self) -> &'a str {
        match self {
            Self::Local(name) | Self::Mirrored { name, .. } => name,
        }
    }

    /// First path segment under the root.
    pub fn top_segment(&self) -> &'a str {
        match self {
            Self::Local(name) => name,
            Self::Mirrored { mirror, .. } => mirror,
        }
    }
}

fn check_name_segment(id: &str, name: &str) -> Result<()> {
    if parse::validate_name(name) {
        Ok(())
    } else {
        Err(Error::invalid_identifier(
            id,
            "skill name must be 1-64 lowercase alphanumeric/hyphen chars",
        ))
    }
}

/// A single directory name that cannot escape its parent or hide itself.
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.starts_with('.')
        && !segment.contains(['/', '\\', '\0'])
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

// ── Resolver ────────────────────────────────────────────────────────────────

/// Filesystem-backed skill resolver rooted at the skills directory.
#[derive(Debug, Clone)]
pub struct SkillResolver {
    root: PathBuf,
}

impl SkillResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every visible skill under the root, in depth-first name order.
    ///
    /// Unreadable or invalid manifests are skipped with a warning. When two
    /// directories produce the same identifier the first one wins.
    pub fn list_all(&self, snapshot: &MirrorSnapshot) -> Result<Vec<Skill>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut skills = Vec::new();
        let mut seen = HashSet::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e) && e.file_type().is_dir());

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory");
                    continue;
                },
            };
            let dir = entry.path();
            if !dir.join(MANIFEST_FILE).is_file() {
                continue;
            }
            let Ok(relative) = dir.strip_prefix(&self.root) else {
                continue;
            };

            let (id, read_only) = match classify(relative, snapshot) {
                Placement::Local => (dir_name(dir)?, false),
                Placement::Mirrored { mirror } => (format!("{mirror}/{}", dir_name(dir)?), true),
                Placement::Hidden => {
                    debug!(?dir, "skill not addressable from current mirror set");
                    continue;
                },
            };

            if seen.contains(&id) {
                warn!(%id, ?dir, "duplicate skill identifier, keeping first match");
                continue;
            }

            match load_checked(dir) {
                Ok(content) => {
                    seen.insert(id.clone());
                    skills.push(Skill {
                        id,
                        metadata: content.metadata,
                        body: content.body,
                        source_dir: dir.to_path_buf(),
                        read_only,
                    });
                },
                Err(e) => {
                    warn!(?dir, %e, "skipping invalid SKILL.md");
                },
            }
        }

        Ok(skills)
    }

    /// Resolve an identifier to its skill directory, re-validating the
    /// manifest name against the directory name.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        let parsed = SkillId::parse(id)?;
        let dir = self.locate(id, &parsed)?;
        load_checked(&dir)?;
        Ok(dir)
    }

    /// Resolve and fully load a skill.
    ///
    /// A skill under a disabled mirror still resolves here even though
    /// [`Self::list_all`] does not surface it.
    pub fn read(&self, id: &str, snapshot: &MirrorSnapshot) -> Result<Skill> {
        let parsed = SkillId::parse(id)?;
        let dir = self.locate(id, &parsed)?;
        let content = load_checked(&dir)?;
        Ok(Skill {
            id: id.to_string(),
            metadata: content.metadata,
            body: content.body,
            read_only: snapshot.is_mirror(parsed.top_segment()),
            source_dir: dir,
        })
    }

    fn locate(&self, id: &str, parsed: &SkillId<'_>) -> Result<PathBuf> {
        match *parsed {
            SkillId::Local(name) => {
                let dir = self.root.join(name);
                if dir.join(MANIFEST_FILE).is_file() {
                    Ok(dir)
                } else {
                    Err(Error::skill_not_found(id))
                }
            },
            SkillId::Mirrored { mirror, name } => {
                let mirror_root = self.root.join(mirror);
                if !mirror_root.is_dir() {
                    return Err(Error::skill_not_found(id));
                }
                find_skill_dir(&mirror_root, name).ok_or_else(|| Error::skill_not_found(id))
            },
        }
    }
}

/// First directory named `name` containing a manifest, depth-first from
/// `base` (inclusive).
fn find_skill_dir(base: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(base)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (!is_hidden(e) && e.file_type().is_dir()))
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_type().is_dir()
                && e.file_name().to_str() == Some(name)
                && e.path().join(MANIFEST_FILE).is_file()
        })
        .map(DirEntry::into_path)
}

fn dir_name(dir: &Path) -> Result<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(ToOwned::to_owned)
        .ok_or_else(|| Error::invalid_identifier(dir.display().to_string(), "non UTF-8 name"))
}

/// Read and parse `dir/SKILL.md`, requiring the declared name to equal the
/// directory name.
pub fn load_checked(dir: &Path) -> Result<SkillContent> {
    let manifest = dir.join(MANIFEST_FILE);
    let text = std::fs::read_to_string(&manifest)
        .map_err(|e| Error::path("failed to read SKILL.md", &manifest, e))?;
    let content = parse::parse_skill(&text)?;
    let directory = dir_name(dir)?;
    if content.metadata.name != directory {
        return Err(Error::name_mismatch(content.metadata.name, directory));
    }
    Ok(content)
}
