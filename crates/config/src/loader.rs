use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ShelfConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "skillshelf.toml",
    "skillshelf.yaml",
    "skillshelf.yml",
    "skillshelf.json",
];

const APP_NAME: &str = "skillshelf";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ShelfConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./skillshelf.{toml,yaml,yml,json}` (project-local)
/// 2. `<config dir>/skillshelf.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ShelfConfig::default()` if no config file is found or it fails
/// to parse.
pub fn discover_and_load() -> ShelfConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    ShelfConfig::default()
}

/// Load an explicit file if given (errors are fatal), otherwise discover.
/// Environment overrides are applied on top either way.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<ShelfConfig> {
    let config = match explicit {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    };
    Ok(apply_env_overrides(config))
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.config_dir().to_path_buf())
}

/// Returns the user-global data directory.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.data_dir().to_path_buf())
}

/// `<data dir>/skills`, or `./skills` when no home directory is known.
pub fn default_skills_dir() -> PathBuf {
    data_dir()
        .map(|d| d.join("skills"))
        .unwrap_or_else(|| PathBuf::from("skills"))
}

/// Apply `SKILLSHELF_*` environment overrides (and the legacy unprefixed
/// names) to a loaded config.
pub fn apply_env_overrides(config: ShelfConfig) -> ShelfConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: ShelfConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ShelfConfig {
    let first = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| lookup(*n).filter(|v| !v.trim().is_empty()))
    };

    if let Some(dir) = first(&["SKILLSHELF_DIR", "SKILLS_DIR"]) {
        config.skills.dir = Some(PathBuf::from(dir.trim()));
    }

    if let Some(urls) = first(&["SKILLSHELF_GIT_REPOS", "GIT_REPOS"]) {
        for url in urls.split(',').map(str::trim).filter(|u| !u.is_empty()) {
            if !config.mirrors.urls.iter().any(|u| u == url) {
                config.mirrors.urls.push(url.to_string());
            }
        }
    }

    if let Some(raw) = first(&["SKILLSHELF_SYNC_INTERVAL_SECS"]) {
        match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => config.mirrors.sync_interval_secs = secs,
            _ => warn!(value = %raw, "ignoring invalid SKILLSHELF_SYNC_INTERVAL_SECS"),
        }
    }

    config
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ShelfConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
