//! Portable gzip tarballs of a single skill directory.
//!
//! Archives contain `<name>/...` entries where `<name>` is the skill
//! directory's base name. Import is all-or-nothing: a failed extraction or a
//! manifest that does not validate removes everything that was written.

use std::{
    fs,
    path::{Component, Path},
};

use {
    flate2::{Compression, read::GzDecoder, write::GzEncoder},
    tracing::{info, warn},
    walkdir::WalkDir,
};

use crate::{
    discover::load_checked,
    error::{Error, Result},
    parse::{self, MANIFEST_FILE},
    path_guard,
};

/// Serialize `skill_dir` into a gzip-compressed tar. Symlinks are skipped.
pub fn export(skill_dir: &Path) -> Result<Vec<u8>> {
    let base = skill_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::invalid_archive("skill directory has no usable name"))?;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    builder.follow_symlinks(false);

    for entry in WalkDir::new(skill_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(skill_dir) else {
            continue;
        };
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let name = format!("{base}/{}", relative.join("/"));

        if file_type.is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else if file_type.is_file() {
            builder.append_path_with_name(entry.path(), &name)?;
        }
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Unpack an archive produced by [`export`] under `root`. Returns the new
/// skill's name.
pub fn import(bytes: &[u8], root: &Path) -> Result<String> {
    let name = scan(bytes)?;
    let dest = root.join(&name);
    if fs::symlink_metadata(&dest).is_ok() {
        return Err(Error::already_exists("skill", name));
    }

    fs::create_dir_all(root).map_err(|e| Error::path("failed to create skills root", root, e))?;

    let outcome = extract(bytes, root).and_then(|()| load_checked(&dest).map(|_| ()));
    match outcome {
        Ok(()) => {
            info!(%name, "imported skill archive");
            Ok(name)
        },
        Err(e) => {
            if fs::symlink_metadata(&dest).is_ok()
                && let Err(cleanup) = fs::remove_dir_all(&dest)
            {
                warn!(?dest, error = %cleanup, "failed to remove partially imported skill");
            }
            Err(e)
        },
    }
}

/// First pass: validate entry names and find the skill name.
fn scan(bytes: &[u8]) -> Result<String> {
    let malformed = |e: std::io::Error| Error::invalid_archive(e.to_string());
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut name: Option<String> = None;
    let mut manifests = 0usize;

    for entry in archive.entries().map_err(malformed)? {
        let entry = entry.map_err(malformed)?;
        let path = entry.path().map_err(malformed)?.into_owned();
        if !path_guard::is_contained(&path) {
            return Err(Error::invalid_archive(format!(
                "unsafe path component in entry: {}",
                path.display()
            )));
        }

        let segments: Vec<&str> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        let Some(first) = segments.first() else {
            continue;
        };

        if name.is_none() {
            if !parse::validate_name(first) {
                return Err(Error::invalid_archive(format!(
                    "top-level directory '{first}' is not a valid skill name"
                )));
            }
            name = Some((*first).to_string());
        }
        let expected = name.as_deref().unwrap_or_default();
        if *first != expected {
            return Err(Error::invalid_archive(format!(
                "entry {} lies outside {expected}/",
                path.display()
            )));
        }

        if segments.len() == 2
            && segments[1] == MANIFEST_FILE
            && entry.header().entry_type().is_file()
        {
            manifests += 1;
        }
    }

    let name = name.ok_or_else(|| Error::invalid_archive("archive is empty"))?;
    if manifests != 1 {
        return Err(Error::invalid_archive(format!(
            "expected exactly one {name}/{MANIFEST_FILE}, found {manifests}"
        )));
    }
    Ok(name)
}

/// Second pass: extract regular files and directories under `root`.
fn extract(bytes: &[u8], root: &Path) -> Result<()> {
    let canonical_root = root
        .canonicalize()
        .map_err(|e| Error::path("failed to canonicalize skills root", root, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("skipping symlink/hardlink archive entry");
            continue;
        }
        if !entry_type.is_file() && !entry_type.is_dir() {
            continue;
        }

        let path = entry.path()?.into_owned();
        if !path_guard::is_contained(&path) {
            return Err(Error::invalid_archive(format!(
                "unsafe path component in entry: {}",
                path.display()
            )));
        }

        let dest = root.join(&path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
            let canonical_parent = fs::canonicalize(parent)?;
            if !canonical_parent.starts_with(&canonical_root) {
                return Err(Error::invalid_archive("archive entry escaped skills root"));
            }
        }

        if let Ok(meta) = fs::symlink_metadata(&dest)
            && meta.file_type().is_symlink()
        {
            return Err(Error::invalid_archive(
                "archive entry resolves to symlink destination",
            ));
        }

        if entry_type.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }

        entry.unpack(&dest)?;
    }
    Ok(())
}
