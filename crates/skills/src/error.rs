use std::{error::Error as StdError, path::PathBuf};

use serde::Serialize;

/// Coarse classification callers use to decide how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    RejectedPath,
    NameMismatch,
    AlreadyExists,
    AuthRequired,
    Transient,
    Malformed,
    ReadOnly,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::RejectedPath => "rejected_path",
            Self::NameMismatch => "name_mismatch",
            Self::AlreadyExists => "already_exists",
            Self::AuthRequired => "auth_required",
            Self::Transient => "transient",
            Self::Malformed => "malformed",
            Self::ReadOnly => "read_only",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("rejected path '{path}': {reason}")]
    RejectedPath { path: String, reason: &'static str },

    #[error(
        "skill name in frontmatter ({declared}) does not match directory name ({directory})"
    )]
    NameMismatch { declared: String, directory: String },

    #[error("{what} already exists: {name}")]
    AlreadyExists { what: &'static str, name: String },

    #[error("authentication required for {url}")]
    AuthRequired { url: String },

    #[error("skill '{id}' is read-only (mirrored from a git repository)")]
    ReadOnly { id: String },

    #[error("invalid SKILL.md: {message}")]
    InvalidManifest { message: String },

    #[error("invalid skill identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },

    #[error("invalid archive: {message}")]
    InvalidArchive { message: String },

    #[error("invalid mirror url '{url}': {reason}")]
    InvalidMirrorUrl { url: String, reason: &'static str },

    #[error("content too large ({size} bytes, max {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("git {operation} failed: {message}")]
    Git {
        operation: &'static str,
        message: String,
    },

    #[error("search index error: {message}")]
    Index { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("{context} ({path}): {source}")]
    Path {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn skill_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            what: "skill",
            name: id.into(),
        }
    }

    #[must_use]
    pub fn resource_not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            what: "resource",
            name: path.into(),
        }
    }

    #[must_use]
    pub fn mirror_not_found(url: impl Into<String>) -> Self {
        Self::NotFound {
            what: "mirror",
            name: url.into(),
        }
    }

    #[must_use]
    pub fn rejected_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::RejectedPath {
            path: path.into(),
            reason,
        }
    }

    #[must_use]
    pub fn name_mismatch(declared: impl Into<String>, directory: impl Into<String>) -> Self {
        Self::NameMismatch {
            declared: declared.into(),
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn already_exists(what: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            what,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_identifier(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            id: id.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid_archive(message: impl Into<String>) -> Self {
        Self::InvalidArchive {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn git(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Git {
            operation,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn path(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Path {
            context,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RejectedPath { .. } => ErrorKind::RejectedPath,
            Self::NameMismatch { .. } => ErrorKind::NameMismatch,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::AuthRequired { .. } => ErrorKind::AuthRequired,
            Self::ReadOnly { .. } => ErrorKind::ReadOnly,
            Self::InvalidManifest { .. }
            | Self::InvalidIdentifier { .. }
            | Self::InvalidArchive { .. }
            | Self::InvalidMirrorUrl { .. }
            | Self::TooLarge { .. }
            | Self::Json(_) => ErrorKind::Malformed,
            Self::Git { .. }
            | Self::Index { .. }
            | Self::Io(_)
            | Self::Walk(_)
            | Self::Path { .. }
            | Self::External { .. } => ErrorKind::Transient,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Run filesystem-bound work on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::external("blocking task failed", e))?
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_classified() {
        assert_eq!(Error::skill_not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::AuthRequired {
                url: "https://example.com/a.git".into()
            }
            .kind(),
            ErrorKind::AuthRequired
        );
        assert_eq!(
            Error::git("pull", "network down").kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            Error::invalid_archive("empty").kind(),
            ErrorKind::Malformed
        );
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(Error::git("clone", "timeout").is_retryable());
        assert!(Error::Io(std::io::Error::other("disk")).is_retryable());
        assert!(
            !Error::AuthRequired {
                url: "git@example.com:a/b.git".into()
            }
            .is_retryable()
        );
        assert!(!Error::name_mismatch("a", "b").is_retryable());
    }

    #[test]
    fn name_mismatch_message_names_both_sides() {
        let msg = Error::name_mismatch("other", "demo").to_string();
        assert!(msg.contains("other"));
        assert!(msg.contains("demo"));
    }
}
