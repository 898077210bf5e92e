//! Mirror identity and the `.mirrors.json` sidecar.

use std::path::{Path, PathBuf};

use {
    sha2::{Digest, Sha256},
    tracing::warn,
};

use crate::{
    discover::is_safe_segment,
    error::{Error, Result},
    types::MirrorConfig,
};

/// Sidecar file name under the skills root.
pub const SIDECAR_FILE: &str = ".mirrors.json";

const ALLOWED_PREFIXES: &[&str] = &["https://", "http://", "ssh://", "git://", "file://", "git@"];

/// Stable id for a mirror URL: the first 12 hex chars of its SHA-256.
pub fn mirror_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

/// Reject URLs whose scheme git cannot be pointed at.
pub fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::InvalidMirrorUrl {
            url: url.to_string(),
            reason: "url is empty",
        });
    }
    if !ALLOWED_PREFIXES.iter().any(|p| url.starts_with(p)) {
        return Err(Error::InvalidMirrorUrl {
            url: url.to_string(),
            reason: "expected http(s)://, ssh://, git://, file:// or git@host:path",
        });
    }
    Ok(())
}

/// Working-directory name for a mirror URL.
///
/// `https://github.com/org/skills.git` and `git@github.com:org/skills.git`
/// both map to `skills`.
pub fn mirror_dir_name(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');
    let without_scheme = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed,
    };

    let name = match without_scheme.rsplit_once('/') {
        Some((_, last)) => last,
        None => without_scheme
            .split_once(':')
            .map_or(without_scheme, |(_, path)| path),
    };

    if is_safe_segment(name) {
        Ok(name.to_string())
    } else {
        Err(Error::InvalidMirrorUrl {
            url: url.to_string(),
            reason: "cannot derive a directory name",
        })
    }
}

impl MirrorConfig {
    /// Validate `url` and derive the id and directory name from it.
    pub fn from_url(url: &str) -> Result<Self> {
        validate_url(url)?;
        let url = url.trim().to_string();
        Ok(Self {
            id: mirror_id(&url),
            name: mirror_dir_name(&url)?,
            url,
            enabled: true,
        })
    }
}

/// Persistent mirror list with atomic writes.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    path: PathBuf,
}

impl MirrorStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store for the sidecar under `root`.
    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(SIDECAR_FILE))
    }

    /// Load the list, returning it empty if the file is missing or blank.
    ///
    /// `id` and `name` are re-derived from each URL. Entries whose URL no
    /// longer validates are dropped with a warning.
    pub fn load(&self) -> Result<Vec<MirrorConfig>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::path("failed to read mirror list", &self.path, e))?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let stored: Vec<MirrorConfig> = serde_json::from_str(&data)?;

        let mut mirrors = Vec::with_capacity(stored.len());
        for entry in stored {
            match MirrorConfig::from_url(&entry.url) {
                Ok(mut derived) => {
                    derived.enabled = entry.enabled;
                    mirrors.push(derived);
                },
                Err(e) => warn!(url = %entry.url, error = %e, "dropping invalid mirror entry"),
            }
        }
        Ok(mirrors)
    }

    /// Save the list atomically via temp file + rename.
    pub fn save(&self, mirrors: &[MirrorConfig]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(mirrors)?;
        std::fs::write(&tmp, data).map_err(|e| Error::path("failed to write mirror list", &tmp, e))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::path("failed to replace mirror list", &self.path, e))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
