//! Validation of relative resource paths.
//!
//! Every resource read, write, and delete goes through [`validate`] before the
//! path is joined onto a skill directory. Rejections abort the operation.

use std::path::{Component, Path};

use crate::{
    error::{Error, Result},
    types::ResourceKind,
};

/// Replace Windows separators with `/`.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Accept `path` only if it starts with one of the fixed resource prefixes,
/// has no `..` segment, and is not absolute.
pub fn validate(path: &str) -> Result<()> {
    let normalized = normalize(path);

    if normalized.starts_with('/') || Path::new(path).is_absolute() || has_drive_prefix(&normalized)
    {
        return Err(Error::rejected_path(path, "resource path must be relative"));
    }

    if normalized.split('/').any(|segment| segment == "..") {
        return Err(Error::rejected_path(path, "resource path cannot contain '..'"));
    }

    if resource_kind(&normalized).is_none() {
        return Err(Error::rejected_path(
            path,
            "resource path must start with scripts/, references/, or assets/",
        ));
    }

    Ok(())
}

/// Derive the resource kind from the path prefix alone.
pub fn resource_kind(path: &str) -> Option<ResourceKind> {
    let normalized = normalize(path);
    ResourceKind::ALL
        .into_iter()
        .find(|kind| normalized.starts_with(kind.prefix()))
}

/// True if every component of an archive entry path is a plain name and the
/// entry name contains no `..` anywhere, even inside a component.
pub fn is_contained(path: &Path) -> bool {
    !path.to_string_lossy().contains("..")
        && path.components().all(|component| match component {
            Component::Normal(_) | Component::CurDir => true,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => false,
        })
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
