//! Skills catalog: discovery, resources, archives, and git mirrors.
//!
//! Skills are directories containing a `SKILL.md` file with YAML frontmatter
//! and markdown instructions. Local skills live directly under the root;
//! mirrored skills live anywhere inside a git working copy named after its
//! remote and are read-only.

pub mod archive;
pub mod catalog;
pub mod discover;
pub mod error;
pub mod git;
pub mod index;
pub mod mirror;
pub mod parse;
pub mod path_guard;
pub mod resources;
pub mod syncer;
pub mod types;
#[cfg(feature = "file-watcher")]
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    catalog::{Catalog, CatalogOptions},
    discover::{MirrorSnapshot, SkillResolver},
    error::{Error, ErrorKind, Result},
    git::{CliGitClient, GitClient, PullStatus},
    index::{IndexDocument, Indexer, MemoryIndex},
    syncer::{MirrorSyncer, SyncReport, SyncStatus},
    types::{
        Encoding, MirrorConfig, NewSkill, Resource, ResourceContent, ResourceKind, Skill,
        SkillMetadata, SkillUpdate,
    },
};
