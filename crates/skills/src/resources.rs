//! Files inside a skill's `scripts/`, `references/` and `assets/` sub-trees.
//!
//! Every function takes an already-resolved skill directory. Paths are
//! checked by [`path_guard::validate`] first, then the canonical target is
//! required to stay inside the canonical skill directory.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
    time::SystemTime,
};

use {
    base64::Engine as _,
    chrono::{DateTime, Utc},
    walkdir::WalkDir,
};

use crate::{
    error::{Error, Result},
    path_guard,
    types::{Encoding, Resource, ResourceContent, ResourceKind},
};

/// Largest resource accepted by [`write`].
pub const MAX_RESOURCE_SIZE: u64 = 10 * 1024 * 1024;

const SNIFF_LEN: u64 = 512;

const TEXT_APPLICATION_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-sh",
    "application/x-python",
    "application/x-yaml",
    "application/toml",
    "application/x-toml",
];

const MAGIC: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B", "application/gzip"),
];

// ── Operations ──────────────────────────────────────────────────────────────

/// All files under the three resource roots, sorted by path. Missing roots
/// are skipped and symlinks are not followed.
pub fn list(skill_dir: &Path) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for kind in ResourceKind::ALL {
        let base = skill_dir.join(kind.dir_name());
        let is_dir = fs::symlink_metadata(&base).is_ok_and(|m| m.is_dir());
        if !is_dir {
            continue;
        }
        for entry in WalkDir::new(&base).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = relative_path(skill_dir, entry.path())?;
            resources.push(describe(kind, relative, entry.path())?);
        }
    }
    Ok(resources)
}

/// Read a resource, as UTF-8 when it is readable text, otherwise base64.
pub fn read(skill_dir: &Path, path: &str) -> Result<ResourceContent> {
    let (relative, target) = existing_target(skill_dir, path)?;
    let meta = file_metadata(&target, &relative)?;
    let bytes = fs::read(&target).map_err(|e| Error::path("failed to read resource", &target, e))?;
    let head = &bytes[..bytes.len().min(SNIFF_LEN as usize)];
    let (mime_type, readable) = classify(&target, head);

    let (content, encoding) = match String::from_utf8(bytes) {
        Ok(text) if readable => (text, Encoding::Utf8),
        Ok(text) => (encode(text.as_bytes()), Encoding::Base64),
        Err(e) => (encode(e.as_bytes()), Encoding::Base64),
    };

    Ok(ResourceContent {
        content,
        encoding,
        mime_type,
        size: meta.len(),
    })
}

/// Describe a single resource without returning its content.
pub fn info(skill_dir: &Path, path: &str) -> Result<Resource> {
    let (relative, target) = existing_target(skill_dir, path)?;
    file_metadata(&target, &relative)?;
    let kind = kind_of(&relative)?;
    describe(kind, relative, &target)
}

/// Create or replace a resource, creating parent directories as needed.
pub fn write(skill_dir: &Path, path: &str, content: &[u8]) -> Result<Resource> {
    let size = content.len() as u64;
    if size > MAX_RESOURCE_SIZE {
        return Err(Error::TooLarge {
            size,
            limit: MAX_RESOURCE_SIZE,
        });
    }

    path_guard::validate(path)?;
    let relative = path_guard::normalize(path);
    let kind = kind_of(&relative)?;
    let root = canonical_root(skill_dir)?;
    let target = skill_dir.join(&relative);

    // The deepest existing ancestor must already be inside the skill before
    // any directory is created.
    let ancestor = nearest_existing(&target)?;
    ensure_contained(&root, &ancestor, path)?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::path("failed to create resource directory", parent, e))?;
        ensure_contained(&root, parent, path)?;
    }
    if fs::symlink_metadata(&target).is_ok() {
        ensure_contained(&root, &target, path)?;
    }

    fs::write(&target, content).map_err(|e| Error::path("failed to write resource", &target, e))?;
    describe(kind, relative, &target)
}

/// Delete a single resource file.
pub fn delete(skill_dir: &Path, path: &str) -> Result<()> {
    let (relative, target) = existing_target(skill_dir, path)?;
    file_metadata(&target, &relative)?;
    fs::remove_file(&target).map_err(|e| Error::path("failed to delete resource", &target, e))
}

// ── Classification ──────────────────────────────────────────────────────────

/// MIME type and readability from the file name and the first bytes.
pub fn classify(path: &Path, head: &[u8]) -> (String, bool) {
    let binary = head.contains(&0);
    let mime = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .or_else(|| sniff(head).map(str::to_string))
        .unwrap_or_else(|| {
            if !head.is_empty() && !binary {
                "text/plain".to_string()
            } else {
                "application/octet-stream".to_string()
            }
        });
    let readable = !binary && is_textual(&mime);
    (mime, readable)
}

fn sniff(head: &[u8]) -> Option<&'static str> {
    MAGIC
        .iter()
        .find(|(magic, _)| head.starts_with(magic))
        .map(|(_, mime)| *mime)
}

fn is_textual(mime: &str) -> bool {
    mime.starts_with("text/") || TEXT_APPLICATION_TYPES.contains(&mime)
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn kind_of(relative: &str) -> Result<ResourceKind> {
    path_guard::resource_kind(relative)
        .ok_or_else(|| Error::rejected_path(relative, "unknown resource prefix"))
}

fn canonical_root(skill_dir: &Path) -> Result<PathBuf> {
    skill_dir
        .canonicalize()
        .map_err(|e| Error::path("failed to canonicalize skill directory", skill_dir, e))
}

/// Validate `path` and return it normalized together with the on-disk
/// target, which must exist and canonicalize inside the skill.
fn existing_target(skill_dir: &Path, path: &str) -> Result<(String, PathBuf)> {
    path_guard::validate(path)?;
    let relative = path_guard::normalize(path);
    let root = canonical_root(skill_dir)?;
    let target = skill_dir.join(&relative);
    if fs::symlink_metadata(&target).is_err() {
        return Err(Error::resource_not_found(relative));
    }
    ensure_contained(&root, &target, path)?;
    Ok((relative, target))
}

fn ensure_contained(root: &Path, candidate: &Path, path: &str) -> Result<()> {
    let canonical = candidate
        .canonicalize()
        .map_err(|e| Error::path("failed to canonicalize resource path", candidate, e))?;
    if canonical.starts_with(root) {
        Ok(())
    } else {
        Err(Error::rejected_path(path, "resource escapes the skill directory"))
    }
}

fn nearest_existing(path: &Path) -> Result<PathBuf> {
    path.ancestors()
        .find(|p| fs::symlink_metadata(p).is_ok())
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::rejected_path(path.display().to_string(), "no existing ancestor"))
}

fn file_metadata(target: &Path, relative: &str) -> Result<fs::Metadata> {
    match fs::metadata(target) {
        Ok(meta) if meta.is_file() => Ok(meta),
        Ok(_) => Err(Error::resource_not_found(relative)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::resource_not_found(relative))
        },
        Err(e) => Err(Error::path("failed to stat resource", target, e)),
    }
}

fn relative_path(skill_dir: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(skill_dir).map_err(|_| {
        Error::rejected_path(path.display().to_string(), "resource outside skill directory")
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn read_head(path: &Path) -> Result<Vec<u8>> {
    let file = fs::File::open(path).map_err(|e| Error::path("failed to open resource", path, e))?;
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN)
        .read_to_end(&mut head)
        .map_err(|e| Error::path("failed to read resource", path, e))?;
    Ok(head)
}

fn describe(kind: ResourceKind, relative: String, path: &Path) -> Result<Resource> {
    let meta = fs::metadata(path).map_err(|e| Error::path("failed to stat resource", path, e))?;
    let head = read_head(path)?;
    let (mime_type, readable) = classify(path, &head);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let modified: DateTime<Utc> = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH).into();

    Ok(Resource {
        kind,
        path: relative,
        name,
        size: meta.len(),
        mime_type,
        readable,
        modified,
    })
}
