use std::{collections::BTreeMap, path::PathBuf};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Deserializer, Serialize},
};

// ── Skill metadata ───────────────────────────────────────────────────────────

/// Metadata parsed from SKILL.md frontmatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMetadata {
    /// Skill name: lowercase, hyphens allowed, 1-64 chars. Must equal the
    /// directory name.
    #[serde(default)]
    pub name: String,
    /// Human-readable description, 1-1024 chars.
    #[serde(default)]
    pub description: String,
    /// SPDX license identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Environment requirements, max 500 chars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<String>,
    /// Freeform string map.
    #[serde(
        default,
        deserialize_with = "deserialize_string_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<BTreeMap<String, String>>,
    /// Space-delimited list of tools the skill may use.
    #[serde(
        default,
        rename = "allowed-tools",
        alias = "allowed_tools",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_tools: Option<String>,
}

impl SkillMetadata {
    /// `allowed-tools` split on whitespace.
    pub fn allowed_tools_list(&self) -> Vec<&str> {
        self.allowed_tools
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// Accept any YAML scalar as a map value, stringified. Nested values are an error.
fn deserialize_string_map<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw: Option<BTreeMap<String, serde_yaml::Value>> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        let value = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Null => String::new(),
            _ => {
                return Err(D::Error::custom(format!(
                    "metadata value for '{key}' must be a scalar"
                )));
            },
        };
        out.insert(key, value);
    }
    Ok(Some(out))
}

/// Manifest content: metadata + markdown body.
#[derive(Debug, Clone)]
pub struct SkillContent {
    pub metadata: SkillMetadata,
    pub body: String,
}

/// A skill as seen by callers. Rebuilt from disk on every access.
#[derive(Debug, Clone, Serialize)]
pub struct Skill {
    /// `name` for local skills, `mirror/name` for mirrored ones.
    pub id: String,
    pub metadata: SkillMetadata,
    pub body: String,
    pub source_dir: PathBuf,
    pub read_only: bool,
}

/// Fields accepted when creating a local skill.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSkill {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub compatibility: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub allowed_tools: Option<String>,
    #[serde(default)]
    pub body: String,
}

/// Fields accepted when updating a local skill. The name is fixed by the id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillUpdate {
    pub description: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub compatibility: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub allowed_tools: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl NewSkill {
    pub(crate) fn into_parts(self) -> (SkillMetadata, String) {
        let meta = SkillMetadata {
            name: self.name,
            description: self.description,
            license: self.license,
            compatibility: self.compatibility,
            metadata: self.metadata,
            allowed_tools: self.allowed_tools,
        };
        (meta, self.body)
    }
}

impl SkillUpdate {
    pub(crate) fn into_parts(self, name: &str) -> (SkillMetadata, String) {
        let meta = SkillMetadata {
            name: name.to_string(),
            description: self.description,
            license: self.license,
            compatibility: self.compatibility,
            metadata: self.metadata,
            allowed_tools: self.allowed_tools,
        };
        (meta, self.body)
    }
}

// ── Resources ────────────────────────────────────────────────────────────────

/// Which fixed sub-tree a resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Script,
    Reference,
    Asset,
}

impl ResourceKind {
    pub const ALL: [Self; 3] = [Self::Script, Self::Reference, Self::Asset];

    /// Directory name inside the skill, without trailing slash.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Script => "scripts",
            Self::Reference => "references",
            Self::Asset => "assets",
        }
    }

    /// Path prefix accepted by the path guard.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Script => "scripts/",
            Self::Reference => "references/",
            Self::Asset => "assets/",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Script => write!(f, "script"),
            Self::Reference => write!(f, "reference"),
            Self::Asset => write!(f, "asset"),
        }
    }
}

/// A file inside one of a skill's resource sub-trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub kind: ResourceKind,
    /// Relative to the skill root, forward slashes (e.g. `scripts/run.py`).
    pub path: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Text file that can be returned as UTF-8.
    pub readable: bool,
    pub modified: DateTime<Utc>,
}

/// How [`ResourceContent::content`] is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Encoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utf8 => write!(f, "utf-8"),
            Self::Base64 => write!(f, "base64"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceContent {
    pub content: String,
    pub encoding: Encoding,
    pub mime_type: String,
    pub size: u64,
}

// ── Mirrors ──────────────────────────────────────────────────────────────────

/// A configured git mirror, as stored in the sidecar file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub id: String,
    pub url: String,
    /// Working directory name under the skills root.
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
